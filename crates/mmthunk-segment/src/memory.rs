//! Flat linear memory backing every segment

use crate::{Result, SegmentError};
use std::collections::BTreeMap;

/// First linear address handed out; the low 64K stay unmapped so that small
/// integers never look like valid pointers
const ARENA_START: u32 = 0x0001_0000;
const ALIGN: u32 = 16;

fn align_up(addr: u32) -> Option<u32> {
    addr.checked_add(ALIGN - 1).map(|n| n & !(ALIGN - 1))
}

/// Regions keyed by base address; freed ranges are handed out again
pub(crate) struct LinearMemory {
    regions: BTreeMap<u32, Box<[u8]>>,
}

impl LinearMemory {
    pub fn new() -> Self {
        Self {
            regions: BTreeMap::new(),
        }
    }

    pub fn allocate(&mut self, size: usize) -> Result<u32> {
        let len = u32::try_from(size.max(1)).map_err(|_| SegmentError::OutOfMemory)?;
        let base = self.find_gap(len).ok_or(SegmentError::OutOfMemory)?;

        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(len as usize)
            .map_err(|_| SegmentError::OutOfMemory)?;
        bytes.resize(len as usize, 0);

        self.regions.insert(base, bytes.into_boxed_slice());
        Ok(base)
    }

    /// Lowest aligned address followed by `len` unused bytes (first fit)
    fn find_gap(&self, len: u32) -> Option<u32> {
        let mut cursor = ARENA_START;
        for (&base, region) in &self.regions {
            if base.saturating_sub(cursor) >= len {
                return Some(cursor);
            }
            let end = base.checked_add(region.len() as u32)?;
            cursor = cursor.max(align_up(end)?);
        }
        cursor.checked_add(len).map(|_| cursor)
    }

    pub fn free(&mut self, base: u32) -> bool {
        self.regions.remove(&base).is_some()
    }

    fn locate(&self, addr: u32, len: usize) -> Result<(u32, usize)> {
        let fault = SegmentError::Fault { addr, len };
        let (&base, region) = self.regions.range(..=addr).next_back().ok_or(fault.clone())?;
        let start = (addr - base) as usize;
        let end = start.checked_add(len).ok_or(fault.clone())?;
        if end > region.len() {
            return Err(fault);
        }
        Ok((base, start))
    }

    pub fn slice(&self, addr: u32, len: usize) -> Result<&[u8]> {
        let (base, start) = self.locate(addr, len)?;
        Ok(&self.regions[&base][start..start + len])
    }

    pub fn slice_mut(&mut self, addr: u32, len: usize) -> Result<&mut [u8]> {
        let (base, start) = self.locate(addr, len)?;
        match self.regions.get_mut(&base) {
            Some(region) => Ok(&mut region[start..start + len]),
            None => Err(SegmentError::Fault { addr, len }),
        }
    }

    /// Bytes from `addr` to the end of its region
    pub fn tail(&self, addr: u32) -> Result<&[u8]> {
        let (base, start) = self.locate(addr, 0)?;
        Ok(&self.regions[&base][start..])
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }
}
