//! `mmioOpen16` and friends

use crate::dispatch::IoProcDispatcher;
use crate::driver::MmioDriver;
use crate::info::MmioInfo;
use crate::messages::{
    fourcc_name, message_name, MMIOM_OPEN, MMIOM_READ, MMIOM_RENAME, MMIOM_SEEK, MMIOM_WRITE,
    MMIOM_WRITEFLUSH, MMIO_FINDPROC, MMIO_INSTALLPROC, MMIO_PROC_MODES, MMIO_REMOVEPROC,
};
use crate::{IoProcOwner, MessageParam, Result};
use mmthunk_common::codes::MMSYSERR_NOERROR;
use mmthunk_common::BridgeConfig;
use mmthunk_registry::{Callback16, ThunkRegistry};
use mmthunk_segment::{AddressSpace, LinearAddr, SegPtr};
use std::sync::Arc;

/// 16-bit MMIO entry points on top of a native MMIO layer
pub struct MmioBridge<D> {
    space: Arc<AddressSpace>,
    registry: Arc<ThunkRegistry<IoProcOwner>>,
    dispatcher: Arc<IoProcDispatcher>,
    driver: D,
}

impl<D: MmioDriver> MmioBridge<D> {
    pub fn new(
        config: &BridgeConfig,
        space: Arc<AddressSpace>,
        driver: D,
        caller: Arc<dyn Callback16>,
    ) -> Self {
        let registry = Arc::new(ThunkRegistry::new(config.thunks.clone()));
        let dispatcher = Arc::new(IoProcDispatcher::new(
            space.clone(),
            registry.clone(),
            caller,
        ));
        driver.attach(dispatcher.clone());
        tracing::info!("MMIO bridge ready");
        Self {
            space,
            registry,
            dispatcher,
            driver,
        }
    }

    pub fn space(&self) -> &AddressSpace {
        &self.space
    }

    pub fn registry(&self) -> &Arc<ThunkRegistry<IoProcOwner>> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<IoProcDispatcher> {
        &self.dispatcher
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    // ========================================================================
    // IO procedures
    // ========================================================================

    /// `mmioInstallIOProc16`: the 16-bit procedure on success, null otherwise
    pub fn install_io_proc(&self, fourcc: u32, proc16: SegPtr, flags: u32) -> SegPtr {
        match flags & MMIO_PROC_MODES {
            MMIO_INSTALLPROC => self.install(fourcc, proc16, flags),
            MMIO_REMOVEPROC => self.remove(fourcc, proc16, flags),
            MMIO_FINDPROC => self
                .driver
                .install_io_proc(fourcc, None, flags)
                .and_then(|addr| self.registry.find_by_callable(addr))
                .map_or(SegPtr::NULL, |record| record.target()),
            other => {
                tracing::warn!("mmioInstallIOProc: bad mode {:#x}", other);
                SegPtr::NULL
            }
        }
    }

    fn install(&self, fourcc: u32, proc16: SegPtr, flags: u32) -> SegPtr {
        let record = match self
            .registry
            .allocate(IoProcOwner::Installed { fourcc }, proc16, 0)
        {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Cannot install IO proc '{}': {}", fourcc_name(fourcc), e);
                return SegPtr::NULL;
            }
        };
        if self
            .driver
            .install_io_proc(fourcc, Some(record.addr()), flags)
            .is_none()
        {
            self.registry.release(record.addr());
            return SegPtr::NULL;
        }
        tracing::debug!("IO proc '{}' -> {}", fourcc_name(fourcc), proc16);
        proc16
    }

    fn remove(&self, fourcc: u32, proc16: SegPtr, flags: u32) -> SegPtr {
        let owner = IoProcOwner::Installed { fourcc };
        let Some(record) = self
            .registry
            .find_where(|r| *r.context() == owner && r.target() == proc16)
        else {
            return SegPtr::NULL;
        };
        if self
            .driver
            .install_io_proc(fourcc, Some(record.addr()), flags)
            .is_none()
        {
            return SegPtr::NULL;
        }
        self.registry.release(record.addr());
        proc16
    }

    // ========================================================================
    // Files
    // ========================================================================

    /// `mmioOpen16`: the new handle, or 0
    ///
    /// A 16-bit IO procedure named by `info16` gets a callback record for
    /// the lifetime of the handle. `wErrorRet` and `hmmio` are written back.
    pub fn open(&self, filename16: SegPtr, info16: SegPtr, flags: u32) -> u16 {
        let base = match self.space.to_linear(info16) {
            Ok(base) => base,
            Err(e) => {
                tracing::warn!("mmioOpen: bad MMIOINFO16 {}: {}", info16, e);
                return 0;
            }
        };
        let (mut info, handle) = match self.try_open(filename16, base, flags) {
            Ok(opened) => opened,
            Err(e) => {
                tracing::warn!("mmioOpen not sent: {}", e);
                let info = MmioInfo {
                    error_ret: e.code(),
                    ..MmioInfo::default()
                };
                (info, 0)
            }
        };

        if !base.is_null() {
            info.hmmio = handle;
            if let Err(e) = info.write_outcome(&self.space, base) {
                tracing::warn!("Could not update MMIOINFO16: {}", e);
            }
        }
        handle
    }

    fn try_open(
        &self,
        filename16: SegPtr,
        base: LinearAddr,
        flags: u32,
    ) -> Result<(MmioInfo, u16)> {
        let filename = if filename16.is_null() {
            None
        } else {
            Some(self.space.read_seg_cstr(filename16)?)
        };
        let (mut info, proc16) = if base.is_null() {
            (MmioInfo::default(), SegPtr::NULL)
        } else {
            MmioInfo::read_foreign(&self.space, base)?
        };

        let record = if proc16.is_null() {
            None
        } else {
            Some(self.registry.allocate(IoProcOwner::Opening, proc16, 0)?)
        };
        info.io_proc = record.as_ref().map(|r| r.addr());

        let handle = self.driver.open(filename.as_deref(), &mut info, flags);
        if let Some(record) = record {
            if handle == 0 {
                self.registry.release(record.addr());
            } else if let Err(e) = self.registry.rebind(record.addr(), IoProcOwner::Handle(handle)) {
                tracing::warn!("IO proc of mmio {:#06x} lost its record: {}", handle, e);
            }
        }
        tracing::debug!(
            "mmioOpen({:?}) -> {:#06x} ({})",
            filename.as_deref().map(String::from_utf8_lossy),
            handle,
            info.error_ret
        );
        Ok((info, handle))
    }

    /// `mmioClose16`; IO-procedure records of the handle go with it
    pub fn close(&self, hmmio: u16, flags: u32) -> u32 {
        let result = self.driver.close(hmmio, flags);
        if result == MMSYSERR_NOERROR {
            let released = self
                .registry
                .release_where(|r| *r.context() == IoProcOwner::Handle(hmmio));
            if released > 0 {
                tracing::debug!("mmio {:#06x} closed, {} thunks released", hmmio, released);
            }
        }
        result
    }

    // ========================================================================
    // Messages
    // ========================================================================

    /// `mmioSendMessage16`
    pub fn send_message(&self, hmmio: u16, msg: u16, lp1: u32, lp2: u32) -> i32 {
        let (native1, native2) = match self.to_native(msg, lp1, lp2) {
            Ok(params) => params,
            Err(e) => {
                tracing::warn!("{} not sent: {}", message_name(msg), e);
                return e.code() as i32;
            }
        };
        let result = self.driver.send_message(hmmio, msg, native1, native2);
        tracing::trace!("{} on {:#06x} -> {}", message_name(msg), hmmio, result);
        result
    }

    fn to_native(&self, msg: u16, lp1: u32, lp2: u32) -> Result<(MessageParam, MessageParam)> {
        let linear = |value: u32| -> Result<MessageParam> {
            Ok(MessageParam::Linear(self.space.to_linear(SegPtr(value))?))
        };
        Ok(match msg {
            MMIOM_OPEN | MMIOM_READ | MMIOM_WRITE | MMIOM_WRITEFLUSH => {
                (linear(lp1)?, MessageParam::Value(lp2))
            }
            MMIOM_RENAME => (linear(lp1)?, linear(lp2)?),
            _ => (MessageParam::Value(lp1), MessageParam::Value(lp2)),
        })
    }

    /// `mmioRead16`: bytes read, or -1
    pub fn read(&self, hmmio: u16, buffer16: SegPtr, len: i32) -> i32 {
        self.send_message(hmmio, MMIOM_READ, buffer16.0, len as u32)
    }

    /// `mmioWrite16`: bytes written, or -1
    pub fn write(&self, hmmio: u16, buffer16: SegPtr, len: i32) -> i32 {
        self.send_message(hmmio, MMIOM_WRITE, buffer16.0, len as u32)
    }

    /// `mmioSeek16`: the new position, or -1
    pub fn seek(&self, hmmio: u16, offset: i32, origin: u32) -> i32 {
        self.send_message(hmmio, MMIOM_SEEK, offset as u32, origin)
    }
}
