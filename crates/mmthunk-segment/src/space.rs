//! The address translator shared by every bridge

use crate::ldt::{Descriptor, DescriptorKind, LocalDescriptorTable};
use crate::memory::LinearMemory;
use crate::{LinearAddr, Result, SegPtr, SegmentError};
use byteorder::{ByteOrder, LittleEndian};
use mmthunk_common::MemoryConfig;
use std::sync::{Mutex, MutexGuard, PoisonError};

struct Inner {
    ldt: LocalDescriptorTable,
    memory: LinearMemory,
    /// Reservations still allowed before `to_foreign` starts failing
    reservation_budget: Option<usize>,
}

/// Segmented view over a flat linear memory
///
/// Owns the LDT and the linear arena. 16-bit structures are allocated with
/// [`alloc_segment`](Self::alloc_segment); native memory that must be handed
/// to 16-bit code gets a temporary alias through
/// [`to_foreign`](Self::to_foreign), released again with
/// [`unreserve`](Self::unreserve).
pub struct AddressSpace {
    inner: Mutex<Inner>,
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new(&MemoryConfig::default())
    }
}

impl AddressSpace {
    pub fn new(config: &MemoryConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                ldt: LocalDescriptorTable::new(config.selector_limit),
                memory: LinearMemory::new(),
                reservation_budget: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================================================
    // Segments
    // ========================================================================

    /// Allocate a zeroed segment of `size` bytes and return `sel:0000`
    pub fn alloc_segment(&self, size: usize) -> Result<SegPtr> {
        if size > 0x1_0000 {
            return Err(SegmentError::OutOfMemory);
        }
        let mut inner = self.lock();
        let base = inner.memory.allocate(size)?;
        let descriptor = Descriptor {
            base,
            size: size as u32,
            kind: DescriptorKind::Owned,
        };
        match inner.ldt.allocate(descriptor) {
            Ok(selector) => {
                tracing::trace!("Allocated segment {:04x} ({} bytes)", selector, size);
                Ok(SegPtr::new(selector, 0))
            }
            Err(e) => {
                inner.memory.free(base);
                Err(e)
            }
        }
    }

    /// Allocate a segment holding `bytes`
    pub fn alloc_segment_with(&self, bytes: &[u8]) -> Result<SegPtr> {
        let ptr = self.alloc_segment(bytes.len())?;
        let linear = self.to_linear(ptr)?;
        self.write_bytes(linear, bytes)?;
        Ok(ptr)
    }

    /// Allocate a segment holding a NUL-terminated copy of `text`
    pub fn alloc_cstr(&self, text: &[u8]) -> Result<SegPtr> {
        let mut bytes = Vec::with_capacity(text.len() + 1);
        bytes.extend_from_slice(text);
        bytes.push(0);
        self.alloc_segment_with(&bytes)
    }

    pub fn free_segment(&self, ptr: SegPtr) -> Result<()> {
        let mut inner = self.lock();
        let descriptor = inner.ldt.get(ptr.selector())?;
        if descriptor.kind != DescriptorKind::Owned {
            return Err(SegmentError::InvalidSelector(ptr.selector()));
        }
        inner.ldt.free(ptr.selector())?;
        inner.memory.free(descriptor.base);
        Ok(())
    }

    /// Allocate native-only memory (no selector)
    pub fn alloc_linear(&self, size: usize) -> Result<LinearAddr> {
        self.lock().memory.allocate(size).map(LinearAddr)
    }

    pub fn free_linear(&self, addr: LinearAddr) -> bool {
        self.lock().memory.free(addr.0)
    }

    // ========================================================================
    // Translation
    // ========================================================================

    /// Translate `sel:off` to a linear address; null stays null
    pub fn to_linear(&self, ptr: SegPtr) -> Result<LinearAddr> {
        if ptr.is_null() {
            return Ok(LinearAddr::NULL);
        }
        let descriptor = self.lock().ldt.get(ptr.selector())?;
        let offset = ptr.offset() as u32;
        if offset > descriptor.size {
            return Err(SegmentError::Fault {
                addr: descriptor.base.wrapping_add(offset),
                len: 0,
            });
        }
        Ok(LinearAddr(descriptor.base + offset))
    }

    /// Reserve a 16-bit alias covering `len` bytes at `addr`
    ///
    /// Every non-null result must be handed back to [`unreserve`](Self::unreserve).
    pub fn to_foreign(&self, addr: LinearAddr, len: usize) -> Result<SegPtr> {
        if addr.is_null() {
            return Ok(SegPtr::NULL);
        }
        let mut inner = self.lock();
        if let Some(budget) = inner.reservation_budget.as_mut() {
            if *budget == 0 {
                tracing::debug!("Refusing reservation for {} (injected)", addr);
                return Err(SegmentError::OutOfMemory);
            }
            *budget -= 1;
        }
        let descriptor = Descriptor {
            base: addr.0,
            size: len.min(0xFFFF) as u32,
            kind: DescriptorKind::Alias,
        };
        let selector = inner.ldt.allocate(descriptor)?;
        tracing::trace!("Reserved {:04x} -> {} ({} bytes)", selector, addr, len);
        Ok(SegPtr::new(selector, 0))
    }

    /// Release an alias made by `to_foreign`; null is ignored
    pub fn unreserve(&self, ptr: SegPtr) -> Result<()> {
        if ptr.is_null() {
            return Ok(());
        }
        let mut inner = self.lock();
        let descriptor = inner.ldt.get(ptr.selector())?;
        if descriptor.kind != DescriptorKind::Alias {
            return Err(SegmentError::InvalidSelector(ptr.selector()));
        }
        inner.ldt.free(ptr.selector())?;
        Ok(())
    }

    /// Outstanding `to_foreign` aliases
    pub fn reservations(&self) -> usize {
        self.lock().ldt.count(DescriptorKind::Alias)
    }

    /// Live segments allocated with `alloc_segment`
    pub fn segments(&self) -> usize {
        self.lock().ldt.count(DescriptorKind::Owned)
    }

    /// Let `n` more reservations succeed, then fail every one after
    pub fn fail_reservations_after(&self, n: usize) {
        self.lock().reservation_budget = Some(n);
    }

    pub fn clear_faults(&self) {
        self.lock().reservation_budget = None;
    }

    // ========================================================================
    // Access
    // ========================================================================

    pub fn read_bytes(&self, addr: LinearAddr, len: usize) -> Result<Vec<u8>> {
        Ok(self.lock().memory.slice(addr.0, len)?.to_vec())
    }

    pub fn write_bytes(&self, addr: LinearAddr, bytes: &[u8]) -> Result<()> {
        self.lock()
            .memory
            .slice_mut(addr.0, bytes.len())?
            .copy_from_slice(bytes);
        Ok(())
    }

    pub fn read_u16(&self, addr: LinearAddr) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.lock().memory.slice(addr.0, 2)?))
    }

    pub fn read_i16(&self, addr: LinearAddr) -> Result<i16> {
        Ok(LittleEndian::read_i16(self.lock().memory.slice(addr.0, 2)?))
    }

    pub fn read_u32(&self, addr: LinearAddr) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.lock().memory.slice(addr.0, 4)?))
    }

    pub fn read_i32(&self, addr: LinearAddr) -> Result<i32> {
        Ok(LittleEndian::read_i32(self.lock().memory.slice(addr.0, 4)?))
    }

    pub fn write_u16(&self, addr: LinearAddr, value: u16) -> Result<()> {
        LittleEndian::write_u16(self.lock().memory.slice_mut(addr.0, 2)?, value);
        Ok(())
    }

    pub fn write_i16(&self, addr: LinearAddr, value: i16) -> Result<()> {
        LittleEndian::write_i16(self.lock().memory.slice_mut(addr.0, 2)?, value);
        Ok(())
    }

    pub fn write_u32(&self, addr: LinearAddr, value: u32) -> Result<()> {
        LittleEndian::write_u32(self.lock().memory.slice_mut(addr.0, 4)?, value);
        Ok(())
    }

    pub fn write_i32(&self, addr: LinearAddr, value: i32) -> Result<()> {
        LittleEndian::write_i32(self.lock().memory.slice_mut(addr.0, 4)?, value);
        Ok(())
    }

    /// Narrow string at `addr`, without its terminator
    ///
    /// A string running off the end of its region is a fault.
    pub fn read_cstr(&self, addr: LinearAddr) -> Result<Vec<u8>> {
        let inner = self.lock();
        let tail = inner.memory.tail(addr.0)?;
        match tail.iter().position(|&b| b == 0) {
            Some(end) => Ok(tail[..end].to_vec()),
            None => Err(SegmentError::Fault {
                addr: addr.0,
                len: tail.len() + 1,
            }),
        }
    }

    /// Convenience for `read_cstr(to_linear(ptr))`
    pub fn read_seg_cstr(&self, ptr: SegPtr) -> Result<Vec<u8>> {
        let linear = self.to_linear(ptr)?;
        self.read_cstr(linear)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_translates_without_side_effects() {
        let space = AddressSpace::default();
        assert_eq!(space.to_linear(SegPtr::NULL).unwrap(), LinearAddr::NULL);
        assert_eq!(space.to_foreign(LinearAddr::NULL, 16).unwrap(), SegPtr::NULL);
        assert_eq!(space.reservations(), 0);
        space.unreserve(SegPtr::NULL).unwrap();
    }

    #[test]
    fn test_segment_roundtrip_through_linear() {
        let space = AddressSpace::default();
        let seg = space.alloc_segment(8).unwrap();
        let lin = space.to_linear(seg.add(4)).unwrap();
        space.write_u32(lin, 0xdead_beef).unwrap();
        let base = space.to_linear(seg).unwrap();
        assert_eq!(space.read_u16(base.add(4)).unwrap(), 0xbeef);
        assert_eq!(space.read_u32(base.add(4)).unwrap(), 0xdead_beef);
        assert!(space.read_u32(base.add(6)).is_err());
    }

    #[test]
    fn test_offset_past_limit_faults() {
        let space = AddressSpace::default();
        let seg = space.alloc_segment(8).unwrap();
        assert!(space.to_linear(seg.add(8)).is_ok());
        assert!(matches!(
            space.to_linear(seg.add(9)),
            Err(SegmentError::Fault { .. })
        ));
        assert!(matches!(
            space.to_linear(SegPtr::new(0x4447, 0)),
            Err(SegmentError::InvalidSelector(0x4447))
        ));
    }

    #[test]
    fn test_reservation_aliases_linear_memory() {
        let space = AddressSpace::default();
        let lin = space.alloc_linear(4).unwrap();
        space.write_u32(lin, 42).unwrap();

        let alias = space.to_foreign(lin, 4).unwrap();
        assert_eq!(space.reservations(), 1);
        assert_eq!(space.to_linear(alias).unwrap(), lin);

        // Aliases and owned segments are released by different calls
        assert!(space.free_segment(alias).is_err());
        space.unreserve(alias).unwrap();
        assert_eq!(space.reservations(), 0);
        assert!(space.to_linear(alias).is_err());
        assert_eq!(space.read_u32(lin).unwrap(), 42);
    }

    #[test]
    fn test_reservation_fault_injection() {
        let space = AddressSpace::default();
        let lin = space.alloc_linear(4).unwrap();
        space.fail_reservations_after(1);
        let first = space.to_foreign(lin, 4).unwrap();
        assert_eq!(space.to_foreign(lin, 4), Err(SegmentError::OutOfMemory));
        space.clear_faults();
        space.unreserve(first).unwrap();
        assert_eq!(space.reservations(), 0);
    }

    #[test]
    fn test_read_cstr_stops_at_terminator() {
        let space = AddressSpace::default();
        let seg = space.alloc_cstr(b"cdaudio").unwrap();
        assert_eq!(space.read_seg_cstr(seg).unwrap(), b"cdaudio");

        let unterminated = space.alloc_segment_with(b"abc").unwrap();
        assert!(space.read_seg_cstr(unterminated).is_err());
    }

    #[test]
    fn test_free_segment_unmaps() {
        let space = AddressSpace::default();
        let seg = space.alloc_segment(4).unwrap();
        assert_eq!(space.segments(), 1);
        space.free_segment(seg).unwrap();
        assert_eq!(space.segments(), 0);
        assert!(space.to_linear(seg).is_err());
    }

    #[test]
    fn test_segment_churn_reuses_linear_space() {
        let space = AddressSpace::default();
        let first = space.alloc_segment(0xFFF0).unwrap();
        let base = space.to_linear(first).unwrap();
        space.free_segment(first).unwrap();

        for _ in 0..1_000 {
            let seg = space.alloc_segment(0xFFF0).unwrap();
            assert_eq!(space.to_linear(seg).unwrap(), base);
            space.free_segment(seg).unwrap();
        }
        assert_eq!(space.segments(), 0);
    }
}
