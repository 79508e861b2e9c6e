//! MMIO bridge between 16-bit callers and a 32-bit MMIO layer
//!
//! This module handles:
//! - Installing 16-bit IO procedures behind callback-registry addresses
//! - `mmioOpen` / `mmioClose` / `mmioSendMessage` for 16-bit callers
//! - Calling 16-bit IO procedures from the native layer
//! - A loopback MMIO layer with in-memory files

mod bridge;
mod dispatch;
mod driver;
mod info;
pub mod layout;
mod loopback;
pub mod messages;

pub use bridge::MmioBridge;
pub use dispatch::IoProcDispatcher;
pub use driver::MmioDriver;
pub use info::MmioInfo;
pub use loopback::LoopbackMmio;
pub use messages::{fourcc, message_name};
pub use mmthunk_registry::Callback16;

use mmthunk_common::codes::{MMIOERR_OUTOFMEMORY, MMSYSERR_INVALPARAM};
use mmthunk_registry::{RegistryError, ThunkAddr};
use mmthunk_segment::{LinearAddr, SegmentError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MmioError {
    #[error("Bad 16-bit MMIO argument: {0}")]
    Segment(#[from] SegmentError),

    #[error("IO procedure table: {0}")]
    Registry(#[from] RegistryError),

    #[error("No IO procedure behind {0}")]
    NoProcedure(ThunkAddr),
}

impl MmioError {
    /// Result code reported across the MMIO boundary
    pub fn code(&self) -> u32 {
        match self {
            MmioError::Segment(e) if e.is_out_of_memory() => MMIOERR_OUTOFMEMORY,
            MmioError::Registry(RegistryError::Exhausted { .. })
            | MmioError::Registry(RegistryError::OutOfMemory) => MMIOERR_OUTOFMEMORY,
            _ => MMSYSERR_INVALPARAM,
        }
    }
}

pub type Result<T> = std::result::Result<T, MmioError>;

/// Owner of an IO-procedure record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoProcOwner {
    /// Installed for a FOURCC with `MMIO_INSTALLPROC`
    Installed { fourcc: u32 },
    /// Attached to an `mmioOpen` that has not returned yet
    Opening,
    /// Attached to an open file
    Handle(u16),
}

/// `lParam1` / `lParam2` of an MMIO message on the native side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageParam {
    Value(u32),
    Linear(LinearAddr),
}

impl MessageParam {
    /// The raw 32-bit value, whichever form it takes
    pub fn value(self) -> u32 {
        match self {
            MessageParam::Value(v) => v,
            MessageParam::Linear(addr) => addr.0,
        }
    }

    /// Non-null native address, if this parameter is one
    pub fn linear(self) -> Option<LinearAddr> {
        match self {
            MessageParam::Linear(addr) if !addr.is_null() => Some(addr),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(MmioError::from(SegmentError::OutOfMemory).code(), MMIOERR_OUTOFMEMORY);
        assert_eq!(
            MmioError::from(RegistryError::Exhausted { capacity: 4 }).code(),
            MMIOERR_OUTOFMEMORY
        );
        assert_eq!(
            MmioError::from(SegmentError::InvalidSelector(0x1f)).code(),
            MMSYSERR_INVALPARAM
        );
        assert_eq!(MmioError::NoProcedure(ThunkAddr(0x10)).code(), MMSYSERR_INVALPARAM);
    }

    #[test]
    fn test_message_param_forms() {
        assert_eq!(MessageParam::Value(9).value(), 9);
        assert_eq!(MessageParam::Linear(LinearAddr(0x1_0000)).value(), 0x1_0000);
        assert_eq!(MessageParam::Linear(LinearAddr::NULL).linear(), None);
        assert_eq!(MessageParam::Value(0x1_0000).linear(), None);
    }
}
