//! Local descriptor table: selector -> (base, limit)

use crate::{Result, SegmentError};

/// How a descriptor came to exist, which decides who frees the memory behind it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DescriptorKind {
    /// Segment owns its linear region
    Owned,
    /// Alias over linear memory owned by someone else
    Alias,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Descriptor {
    pub base: u32,
    /// Segment size in bytes; valid offsets are `0..=size`
    pub size: u32,
    pub kind: DescriptorKind,
}

pub(crate) struct LocalDescriptorTable {
    entries: Vec<Option<Descriptor>>,
    limit: usize,
}

/// RPL 3, table indicator set
const SELECTOR_FLAGS: u16 = 0x7;

impl LocalDescriptorTable {
    pub fn new(limit: usize) -> Self {
        // Entry 0 is never handed out so that selector 0 stays the null selector
        Self {
            entries: vec![None],
            limit: limit.clamp(1, 8192),
        }
    }

    pub fn selector_for(index: usize) -> u16 {
        ((index as u16) << 3) | SELECTOR_FLAGS
    }

    fn index_of(selector: u16) -> Option<usize> {
        if selector & SELECTOR_FLAGS != SELECTOR_FLAGS {
            return None;
        }
        let index = (selector >> 3) as usize;
        (index != 0).then_some(index)
    }

    pub fn allocate(&mut self, descriptor: Descriptor) -> Result<u16> {
        let free = self
            .entries
            .iter()
            .skip(1)
            .position(Option::is_none)
            .map(|pos| pos + 1);

        let index = match free {
            Some(index) => index,
            None if self.entries.len() < self.limit => {
                self.entries.push(None);
                self.entries.len() - 1
            }
            None => return Err(SegmentError::SelectorsExhausted),
        };

        self.entries[index] = Some(descriptor);
        Ok(Self::selector_for(index))
    }

    pub fn get(&self, selector: u16) -> Result<Descriptor> {
        Self::index_of(selector)
            .and_then(|index| self.entries.get(index).copied().flatten())
            .ok_or(SegmentError::InvalidSelector(selector))
    }

    pub fn free(&mut self, selector: u16) -> Result<Descriptor> {
        Self::index_of(selector)
            .and_then(|index| self.entries.get_mut(index))
            .and_then(Option::take)
            .ok_or(SegmentError::InvalidSelector(selector))
    }

    pub fn count(&self, kind: DescriptorKind) -> usize {
        self.entries
            .iter()
            .flatten()
            .filter(|descriptor| descriptor.kind == kind)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(base: u32) -> Descriptor {
        Descriptor {
            base,
            size: 16,
            kind: DescriptorKind::Owned,
        }
    }

    #[test]
    fn test_selectors_skip_null_entry() {
        let mut ldt = LocalDescriptorTable::new(16);
        let first = ldt.allocate(owned(0x1000)).unwrap();
        assert_eq!(first, 0x000f);
        assert_eq!(ldt.get(first).unwrap().base, 0x1000);
        assert!(ldt.get(0).is_err());
    }

    #[test]
    fn test_freed_entry_is_reused() {
        let mut ldt = LocalDescriptorTable::new(16);
        let a = ldt.allocate(owned(0x1000)).unwrap();
        let _b = ldt.allocate(owned(0x2000)).unwrap();
        ldt.free(a).unwrap();
        assert!(ldt.get(a).is_err());
        assert_eq!(ldt.allocate(owned(0x3000)).unwrap(), a);
    }

    #[test]
    fn test_limit_is_enforced() {
        let mut ldt = LocalDescriptorTable::new(3);
        ldt.allocate(owned(0x1000)).unwrap();
        ldt.allocate(owned(0x2000)).unwrap();
        assert_eq!(
            ldt.allocate(owned(0x3000)),
            Err(SegmentError::SelectorsExhausted)
        );
    }
}
