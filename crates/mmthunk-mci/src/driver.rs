use crate::params::CommandParams;
use mmthunk_registry::ThunkAddr;

/// The native (wide) MCI implementation the bridge forwards to
///
/// Result codes are in the multimedia domain: 0 is success.
pub trait MciDriver: Send + Sync {
    /// `mciSendCommandW`
    fn send_command(&self, device: u16, msg: u16, flags: u32, params: CommandParams<'_>) -> u32;

    /// Command sent on behalf of a 16-bit driver (`MCI_SendCommandFrom16`)
    fn send_driver_message(
        &self,
        device: u16,
        msg: u16,
        flags: u32,
        params: CommandParams<'_>,
    ) -> u32 {
        self.send_command(device, msg, flags, params)
    }

    /// `mciSendStringW`; `ret` is the caller's output buffer, possibly empty
    fn send_string(&self, command: &[u16], ret: &mut [u16], hwnd: u32) -> u32;

    /// `mciGetDeviceIDW`; 0 when no device matches
    fn get_device_id(&self, name: &[u16]) -> u16;

    /// `mciSetYieldProc`; `None` removes the procedure. False for a bad device.
    fn set_yield_proc(&self, device: u16, proc_addr: Option<ThunkAddr>, data: u32) -> bool;

    /// `mciGetYieldProc`: the installed procedure and its data word
    fn get_yield_proc(&self, device: u16) -> Option<(ThunkAddr, u32)>;
}
