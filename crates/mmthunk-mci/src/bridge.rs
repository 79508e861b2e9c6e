//! `mciSendCommand16` and friends

use crate::dispatch::{Callback16, MessagePump, YieldDispatcher};
use crate::driver::MciDriver;
use crate::mapper::{self, Disposition};
use crate::messages::{message_name, MCI_ALL_DEVICE_ID, MCI_CLOSE};
use crate::params::CommandParams;
use crate::shadow::MarshalContext;
use crate::MapError;
use mmthunk_common::codes::{MCIERR_NULL_PARAMETER_BLOCK, MMSYSERR_NOERROR};
use mmthunk_common::BridgeConfig;
use mmthunk_registry::ThunkRegistry;
use mmthunk_segment::{AddressSpace, Codec, HeapVec, NativeHeap, SegPtr};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
enum Route {
    Command,
    DriverMessage,
}

/// 16-bit MCI entry points on top of a native driver
pub struct MciBridge<D> {
    space: Arc<AddressSpace>,
    heap: NativeHeap,
    codec: Codec,
    registry: Arc<ThunkRegistry<u16>>,
    dispatcher: YieldDispatcher,
    driver: D,
}

impl<D: MciDriver> MciBridge<D> {
    pub fn new(
        config: &BridgeConfig,
        space: Arc<AddressSpace>,
        driver: D,
        caller: Arc<dyn Callback16>,
        pump: Arc<dyn MessagePump>,
    ) -> Self {
        let registry = Arc::new(ThunkRegistry::new(config.thunks.clone()));
        let dispatcher = YieldDispatcher::new(registry.clone(), caller, pump);
        tracing::info!(
            "MCI bridge ready (codepage {})",
            config.codepage.display_name()
        );
        Self {
            space,
            heap: NativeHeap::new(),
            codec: Codec::new(config.codepage),
            registry,
            dispatcher,
            driver,
        }
    }

    pub fn space(&self) -> &AddressSpace {
        &self.space
    }

    pub fn heap(&self) -> &NativeHeap {
        &self.heap
    }

    pub fn registry(&self) -> &Arc<ThunkRegistry<u16>> {
        &self.registry
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    fn context(&self) -> MarshalContext<'_> {
        MarshalContext::new(&self.space, &self.heap, self.codec)
    }

    /// `mciSendCommand16`
    pub fn send_command(&self, device: u16, msg: u16, flags: u32, param: u32) -> u32 {
        self.relay(Route::Command, device, msg, flags, param)
    }

    /// `MCI_SendCommandFrom16`: a 16-bit driver talking to the MCI layer
    pub fn send_message(&self, device: u16, msg: u16, flags: u32, param: u32) -> u32 {
        self.relay(Route::DriverMessage, device, msg, flags, param)
    }

    fn invoke(
        &self,
        route: Route,
        device: u16,
        msg: u16,
        flags: u32,
        params: CommandParams<'_>,
    ) -> u32 {
        match route {
            Route::Command => self.driver.send_command(device, msg, flags, params),
            Route::DriverMessage => self.driver.send_driver_message(device, msg, flags, params),
        }
    }

    fn relay(&self, route: Route, device: u16, msg: u16, flags: u32, param: u32) -> u32 {
        tracing::debug!(
            "{:?} dev={} {} flags={:#010x} param={:#010x}",
            route,
            device,
            message_name(msg),
            flags,
            param
        );

        let result = if param == 0 {
            self.invoke(route, device, msg, flags, CommandParams::Raw(0))
        } else {
            let ctx = self.context();
            let mut mapped = match mapper::map(&ctx, msg, flags, SegPtr(param)) {
                Ok(mapped) => mapped,
                Err(e) => {
                    tracing::warn!("{} not sent: {}", message_name(msg), e);
                    return e.code();
                }
            };
            let disposition = mapped.disposition();
            let result = self.invoke(route, device, msg, flags, mapped.as_params());
            if disposition == Disposition::Allocated {
                if let Err(e) = mapper::unmap(&ctx, msg, flags, Some(mapped), result) {
                    tracing::warn!("Could not copy {} results back: {}", message_name(msg), e);
                }
            }
            result
        };

        if msg == MCI_CLOSE && result == MMSYSERR_NOERROR {
            self.release_device(device);
        }
        tracing::debug!("{} -> {}", message_name(msg), result);
        result
    }

    /// Drop every callback record owned by a closed device
    fn release_device(&self, device: u16) {
        let released = if device == MCI_ALL_DEVICE_ID {
            self.registry.release_where(|_| true)
        } else {
            self.registry.release_where(|record| *record.context() == device)
        };
        if released > 0 {
            tracing::debug!("Device {} closed, {} thunks released", device, released);
        }
    }

    // ========================================================================
    // Yield procedures
    // ========================================================================

    /// `mciSetYieldProc16`
    pub fn set_yield_proc(&self, device: u16, proc16: SegPtr, data: u32) -> bool {
        let previous = self
            .driver
            .get_yield_proc(device)
            .and_then(|(addr, _)| self.registry.find_by_callable(addr));

        if proc16.is_null() {
            let ok = self.driver.set_yield_proc(device, None, data);
            if ok {
                if let Some(old) = previous {
                    self.registry.release(old.addr());
                }
            }
            return ok;
        }

        let record = match self.registry.allocate(device, proc16, data) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Cannot install yield proc for device {}: {}", device, e);
                return false;
            }
        };

        if !self.driver.set_yield_proc(device, Some(record.addr()), data) {
            self.registry.release(record.addr());
            return false;
        }
        if let Some(old) = previous {
            self.registry.release(old.addr());
        }
        true
    }

    /// `mciGetYieldProc16`: the 16-bit procedure and its data word
    pub fn get_yield_proc(&self, device: u16) -> Option<(SegPtr, u32)> {
        let (addr, data) = self.driver.get_yield_proc(device)?;
        match self.registry.find_by_callable(addr) {
            Some(record) => Some((record.target(), data)),
            None => {
                tracing::warn!("Yield proc {} of device {} is not a 16-bit thunk", addr, device);
                None
            }
        }
    }

    /// `mciDriverYield16`
    pub fn driver_yield(&self, device: u16) -> u32 {
        match self.driver.get_yield_proc(device) {
            Some((addr, data)) => self.dispatcher.dispatch(addr, device, data),
            None => self.dispatcher.default_action(),
        }
    }

    // ========================================================================
    // String interface
    // ========================================================================

    /// `mciSendString16`
    pub fn send_string(&self, command16: SegPtr, return16: SegPtr, return_len: u16, hwnd: u16) -> u32 {
        match self.try_send_string(command16, return16, return_len, hwnd) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("mciSendString not sent: {}", e);
                e.code()
            }
        }
    }

    fn try_send_string(
        &self,
        command16: SegPtr,
        return16: SegPtr,
        return_len: u16,
        hwnd: u16,
    ) -> crate::Result<u32> {
        if command16.is_null() {
            return Ok(MCIERR_NULL_PARAMETER_BLOCK);
        }
        let command = self.codec.dup_foreign(&self.space, &self.heap, command16)?;
        let capacity = if return16.is_null() { 0 } else { return_len as usize };
        let mut ret: HeapVec<u16> = self.heap.alloc_slice(capacity)?;

        let result = self.driver.send_string(&command, &mut ret, hwnd as u32);
        tracing::debug!(
            "mciSendString({:?}) -> {}",
            mmthunk_segment::wide_to_string(&command),
            result
        );

        if result == MMSYSERR_NOERROR && capacity > 0 {
            let dst = self.space.to_linear(return16)?;
            self.codec.store_narrow(&self.space, dst, capacity, &ret)?;
        }
        Ok(result)
    }

    /// `mciGetDeviceID16`; 0 when the name is unknown or unreadable
    pub fn get_device_id(&self, name16: SegPtr) -> u16 {
        if name16.is_null() {
            return 0;
        }
        match self.codec.dup_foreign(&self.space, &self.heap, name16) {
            Ok(name) => self.driver.get_device_id(&name),
            Err(e) => {
                tracing::warn!("mciGetDeviceID: {}", MapError::from(e));
                0
            }
        }
    }
}
