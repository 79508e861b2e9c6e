//! The dispatcher behind every yield-procedure address

pub use mmthunk_registry::Callback16;
use mmthunk_registry::{ThunkAddr, ThunkRegistry};
use std::sync::Arc;

/// Host event queue, polled when no yield procedure is installed
pub trait MessagePump: Send + Sync {
    /// Remove and dispatch one pending message; false if the queue was empty
    fn drain_one(&self) -> bool;
}

/// Resolves a yield-procedure address and performs the 32 -> 16 call
pub struct YieldDispatcher {
    registry: Arc<ThunkRegistry<u16>>,
    caller: Arc<dyn Callback16>,
    pump: Arc<dyn MessagePump>,
}

impl YieldDispatcher {
    pub fn new(
        registry: Arc<ThunkRegistry<u16>>,
        caller: Arc<dyn Callback16>,
        pump: Arc<dyn MessagePump>,
    ) -> Self {
        Self {
            registry,
            caller,
            pump,
        }
    }

    /// What happens when a yield is requested and nothing is installed
    pub fn default_action(&self) -> u32 {
        let drained = self.pump.drain_one();
        tracing::trace!("No yield procedure, pumped one message ({})", drained);
        0
    }

    /// Invoke the procedure registered at `addr` as `proc(device, data)`
    ///
    /// The record is taken as a snapshot, so a concurrent release cannot
    /// pull the target out from under the call.
    pub fn dispatch(&self, addr: ThunkAddr, device: u16, data: u32) -> u32 {
        let Some(record) = self.registry.find_by_callable(addr) else {
            return self.default_action();
        };
        let args = [device, (data >> 16) as u16, data as u16];
        tracing::trace!(
            "Yield for device {} -> {} (data {:#x})",
            device,
            record.target(),
            data
        );
        self.caller.call16(record.target(), &args)
    }
}
