//! Segmented 16-bit address space for the multimedia thunks
//!
//! This module handles:
//! - Selector:offset pointers and their translation to flat linear addresses
//! - Foreign-visible aliases for linear memory (reserve / unreserve)
//! - A counted native heap with fault injection
//! - Narrow <-> wide string recoding

mod codec;
mod heap;
mod ldt;
mod memory;
mod space;

pub use codec::{wide_to_string, Codec};
pub use heap::{HeapBox, HeapStats, HeapVec, NativeHeap};
pub use space::AddressSpace;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SegmentError {
    #[error("Invalid selector {0:#06x}")]
    InvalidSelector(u16),

    #[error("Access fault at {addr:#010x} (+{len} bytes)")]
    Fault { addr: u32, len: usize },

    #[error("No free LDT entries left")]
    SelectorsExhausted,

    #[error("Out of memory")]
    OutOfMemory,
}

impl SegmentError {
    /// Allocation-class failures, as opposed to bad pointers
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, SegmentError::OutOfMemory | SegmentError::SelectorsExhausted)
    }
}

pub type Result<T> = std::result::Result<T, SegmentError>;

/// A 16:16 segmented pointer as seen by 16-bit code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SegPtr(pub u32);

impl SegPtr {
    pub const NULL: SegPtr = SegPtr(0);

    pub fn new(selector: u16, offset: u16) -> Self {
        SegPtr(((selector as u32) << 16) | offset as u32)
    }

    pub fn selector(self) -> u16 {
        (self.0 >> 16) as u16
    }

    pub fn offset(self) -> u16 {
        self.0 as u16
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Same segment, offset moved forward by `delta` bytes
    pub fn add(self, delta: u16) -> Self {
        SegPtr::new(self.selector(), self.offset().wrapping_add(delta))
    }
}

impl std::fmt::Display for SegPtr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04x}:{:04x}", self.selector(), self.offset())
    }
}

/// A flat address the native side can dereference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct LinearAddr(pub u32);

impl LinearAddr {
    pub const NULL: LinearAddr = LinearAddr(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    pub fn add(self, delta: u32) -> Self {
        LinearAddr(self.0.wrapping_add(delta))
    }
}

impl std::fmt::Display for LinearAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segptr_parts() {
        let ptr = SegPtr::new(0x1237, 0x0010);
        assert_eq!(ptr.0, 0x1237_0010);
        assert_eq!(ptr.selector(), 0x1237);
        assert_eq!(ptr.offset(), 0x0010);
        assert_eq!(ptr.add(4).offset(), 0x0014);
        assert_eq!(ptr.to_string(), "1237:0010");
    }

    #[test]
    fn test_oom_classification() {
        assert!(SegmentError::OutOfMemory.is_out_of_memory());
        assert!(SegmentError::SelectorsExhausted.is_out_of_memory());
        assert!(!SegmentError::InvalidSelector(7).is_out_of_memory());
    }
}
