//! The native MMIO layer the bridge forwards to

use crate::dispatch::IoProcDispatcher;
use crate::info::MmioInfo;
use crate::MessageParam;
use mmthunk_registry::ThunkAddr;
use std::sync::Arc;

/// Native multimedia file I/O
///
/// IO procedures are identified by callable addresses. When the layer
/// needs to run one it hands the address to the [`IoProcDispatcher`] it was
/// attached to.
pub trait MmioDriver: Send + Sync {
    /// Called once by the bridge before any other method
    fn attach(&self, _dispatcher: Arc<IoProcDispatcher>) {}

    /// `mmioInstallIOProc`: for `MMIO_INSTALLPROC` and `MMIO_REMOVEPROC`
    /// returns `proc` on success, for `MMIO_FINDPROC` the installed one
    fn install_io_proc(&self, fourcc: u32, proc: Option<ThunkAddr>, flags: u32)
        -> Option<ThunkAddr>;

    /// `mmioOpen`: the new handle, or 0 with `info.error_ret` set
    fn open(&self, filename: Option<&[u8]>, info: &mut MmioInfo, flags: u32) -> u16;

    /// `mmioClose`
    fn close(&self, hmmio: u16, flags: u32) -> u32;

    /// `mmioSendMessage`
    fn send_message(&self, hmmio: u16, msg: u16, lp1: MessageParam, lp2: MessageParam) -> i32;
}
