//! MCI bridge between 16-bit callers and a 32-bit wide MCI driver
//!
//! This module handles:
//! - Mapping 16-bit command blocks to native blocks and back
//! - The `mciSendCommand` / driver-message facade
//! - Yield procedures registered through the callback registry
//! - A loopback driver for tests and the command-line tool

mod bridge;
mod dispatch;
mod driver;
pub mod layout;
mod loopback;
pub mod mapper;
pub mod messages;
pub mod params;
mod shadow;

pub use bridge::MciBridge;
pub use dispatch::{Callback16, MessagePump, YieldDispatcher};
pub use driver::MciDriver;
pub use loopback::LoopbackMciDriver;
pub use mapper::{Disposition, MappedParam};
pub use messages::message_name;
pub use shadow::{MarshalContext, Shadow, ShadowBlock, ShadowParams};

use mmthunk_common::codes::{MCIERR_DRIVER_INTERNAL, MCIERR_OUT_OF_MEMORY, MMSYSERR_INVALPARAM};
use mmthunk_segment::SegmentError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MapError {
    #[error("No mapping known for message {0:#06x}")]
    UnknownMessage(u16),

    #[error("Out of memory while mapping parameters")]
    OutOfMemory,

    #[error("Bad 16-bit parameter block: {0}")]
    Fault(SegmentError),
}

impl From<SegmentError> for MapError {
    fn from(e: SegmentError) -> Self {
        if e.is_out_of_memory() {
            MapError::OutOfMemory
        } else {
            MapError::Fault(e)
        }
    }
}

impl MapError {
    /// Result code reported to the 16-bit caller
    pub fn code(&self) -> u32 {
        match self {
            MapError::UnknownMessage(_) => MCIERR_DRIVER_INTERNAL,
            MapError::OutOfMemory => MCIERR_OUT_OF_MEMORY,
            MapError::Fault(_) => MMSYSERR_INVALPARAM,
        }
    }
}

pub type Result<T> = std::result::Result<T, MapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(MapError::UnknownMessage(0x850).code(), 272);
        assert_eq!(MapError::from(SegmentError::OutOfMemory).code(), 264);
        assert_eq!(
            MapError::from(SegmentError::InvalidSelector(0x17)),
            MapError::Fault(SegmentError::InvalidSelector(0x17))
        );
    }
}
