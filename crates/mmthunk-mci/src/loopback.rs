//! In-process MCI driver
//!
//! Keeps a device table and answers the common commands well enough for
//! the bridge to be exercised end to end. Plain blocks reach it translated
//! in place, so it reads and writes them through the address space.

use crate::driver::MciDriver;
use crate::layout;
use crate::messages::*;
use crate::params::{fill_wide, CommandParams, Rect, StrField, SysInfoReturn, WideParams};
use mmthunk_common::codes::*;
use mmthunk_registry::ThunkAddr;
use mmthunk_segment::{wide_to_string, AddressSpace, LinearAddr};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Media length every loopback device reports, in milliseconds
const MEDIA_LENGTH: u32 = 10_000;

#[derive(Debug, Clone)]
struct Device {
    device_type: String,
    element: Option<String>,
    alias: Option<String>,
    mode: u32,
    position: u32,
    caption: Option<String>,
    yield_proc: Option<(ThunkAddr, u32)>,
}

impl Device {
    fn name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.device_type)
    }
}

#[derive(Default)]
struct State {
    devices: BTreeMap<u16, Device>,
    last_escape: Option<String>,
}

pub struct LoopbackMciDriver {
    space: Arc<AddressSpace>,
    state: Mutex<State>,
}

impl LoopbackMciDriver {
    pub fn new(space: Arc<AddressSpace>) -> Self {
        Self {
            space,
            state: Mutex::new(State::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn open_devices(&self) -> usize {
        self.lock().devices.len()
    }

    /// Current mode (`MCI_MODE_*`) of an open device
    pub fn mode(&self, device: u16) -> Option<u32> {
        self.lock().devices.get(&device).map(|d| d.mode)
    }

    pub fn caption(&self, device: u16) -> Option<String> {
        self.lock().devices.get(&device).and_then(|d| d.caption.clone())
    }

    pub fn last_escape(&self) -> Option<String> {
        self.lock().last_escape.clone()
    }

    fn open_device(&self, device_type: String, element: Option<String>, alias: Option<String>) -> u16 {
        let mut state = self.lock();
        let id = (1..MCI_ALL_DEVICE_ID)
            .find(|id| !state.devices.contains_key(id))
            .unwrap_or(0);
        if id != 0 {
            tracing::debug!("Loopback opened {} as device {}", device_type, id);
            state.devices.insert(
                id,
                Device {
                    device_type,
                    element,
                    alias,
                    mode: MCI_MODE_STOP,
                    position: 0,
                    caption: None,
                    yield_proc: None,
                },
            );
        }
        id
    }

    fn close_device(&self, device: u16) -> u32 {
        let mut state = self.lock();
        if device == MCI_ALL_DEVICE_ID {
            state.devices.clear();
            return MMSYSERR_NOERROR;
        }
        match state.devices.remove(&device) {
            Some(_) => MMSYSERR_NOERROR,
            None => MCIERR_INVALID_DEVICE_ID,
        }
    }

    fn with_device(&self, device: u16, f: impl FnOnce(&mut Device) -> u32) -> u32 {
        match self.lock().devices.get_mut(&device) {
            Some(dev) => f(dev),
            None => MCIERR_INVALID_DEVICE_ID,
        }
    }

    fn read_u32(&self, addr: LinearAddr, offset: u32) -> Option<u32> {
        self.space.read_u32(addr.add(offset)).ok()
    }

    fn open(&self, flags: u32, params: CommandParams<'_>) -> u32 {
        let CommandParams::Wide(WideParams::Open(open)) = params else {
            return MCIERR_NULL_PARAMETER_BLOCK;
        };
        let element = open.element_name.text();
        let device_type = match (open.device_type.text(), &open.device_type) {
            (Some(name), _) => name,
            (None, StrField::Raw(id)) if flags & MCI_OPEN_TYPE_ID != 0 => {
                format!("devtype{}", id & 0xFFFF)
            }
            _ => match element.as_deref() {
                Some(file) => device_type_for(file).to_string(),
                None => return MCIERR_INVALID_DEVICE_NAME,
            },
        };
        let id = self.open_device(device_type, element, open.alias.text());
        if id == 0 {
            return MCIERR_OUT_OF_MEMORY;
        }
        open.device_id = id;
        MMSYSERR_NOERROR
    }

    fn status(&self, device: u16, flags: u32, params: CommandParams<'_>) -> u32 {
        match params {
            CommandParams::Linear(block) => {
                let Some(item) = self.read_u32(block, layout::generic::STATUS_ITEM) else {
                    return MMSYSERR_INVALPARAM;
                };
                let mut value = 0;
                let result = self.with_device(device, |dev| match item {
                    MCI_STATUS_LENGTH => {
                        value = MEDIA_LENGTH;
                        MMSYSERR_NOERROR
                    }
                    MCI_STATUS_POSITION => {
                        value = dev.position;
                        MMSYSERR_NOERROR
                    }
                    MCI_STATUS_MODE => {
                        value = dev.mode;
                        MMSYSERR_NOERROR
                    }
                    MCI_STATUS_READY => {
                        value = 1;
                        MMSYSERR_NOERROR
                    }
                    _ => MCIERR_UNSUPPORTED_FUNCTION,
                });
                if result == MMSYSERR_NOERROR
                    && self
                        .space
                        .write_u32(block.add(layout::generic::STATUS_RETURN), value)
                        .is_err()
                {
                    return MMSYSERR_INVALPARAM;
                }
                result
            }
            CommandParams::Wide(WideParams::Status(status)) => {
                self.with_device(device, |_| {
                    if flags & MCI_DGV_STATUS_DISKSPACE != 0 {
                        // Free space in KB, whatever the drive
                        status.ret = 1_048_576;
                    } else {
                        status.ret = status.reference & !0xF;
                    }
                    MMSYSERR_NOERROR
                })
            }
            _ => MCIERR_NULL_PARAMETER_BLOCK,
        }
    }

    fn transport(&self, device: u16, msg: u16, flags: u32, params: CommandParams<'_>) -> u32 {
        let block = match params {
            CommandParams::Linear(block) => Some(block),
            _ => None,
        };
        let (from, to) = match (msg, block) {
            (MCI_PLAY, Some(block)) => (
                (flags & MCI_FROM != 0).then(|| self.read_u32(block, layout::generic::PLAY_FROM)).flatten(),
                (flags & MCI_TO != 0).then(|| self.read_u32(block, layout::generic::PLAY_TO)).flatten(),
            ),
            (MCI_SEEK, Some(block)) => (
                None,
                (flags & MCI_TO != 0).then(|| self.read_u32(block, layout::generic::SEEK_TO)).flatten(),
            ),
            _ => (None, None),
        };

        self.with_device(device, |dev| {
            match msg {
                MCI_PLAY => {
                    if let Some(from) = from {
                        dev.position = from.min(MEDIA_LENGTH);
                    }
                    dev.mode = MCI_MODE_PLAY;
                    if let Some(to) = to {
                        // Synchronous stand-in: playback completes immediately
                        dev.position = to.min(MEDIA_LENGTH);
                    }
                }
                MCI_SEEK => {
                    dev.position = to.unwrap_or(0).min(MEDIA_LENGTH);
                    dev.mode = MCI_MODE_STOP;
                }
                MCI_STOP => dev.mode = MCI_MODE_STOP,
                MCI_PAUSE => dev.mode = MCI_MODE_PAUSE,
                MCI_RESUME => dev.mode = MCI_MODE_PLAY,
                _ => {}
            }
            MMSYSERR_NOERROR
        })
    }

    fn info(&self, device: u16, flags: u32, params: CommandParams<'_>) -> u32 {
        let CommandParams::Wide(WideParams::Info(info)) = params else {
            return MCIERR_NULL_PARAMETER_BLOCK;
        };
        self.with_device(device, |dev| {
            let text = if flags & MCI_INFO_FILE != 0 {
                dev.element.clone().unwrap_or_default()
            } else if flags & MCI_INFO_PRODUCT != 0 {
                format!("Loopback {}", dev.device_type)
            } else {
                return MCIERR_MISSING_PARAMETER;
            };
            fill_wide(&mut info.ret, &text);
            MMSYSERR_NOERROR
        })
    }

    fn sysinfo(&self, flags: u32, params: CommandParams<'_>) -> u32 {
        let CommandParams::Wide(WideParams::SysInfo(sysinfo)) = params else {
            return MCIERR_NULL_PARAMETER_BLOCK;
        };
        let state = self.lock();
        match &mut sysinfo.ret {
            SysInfoReturn::Quantity(count) => {
                **count = state.devices.len() as u32;
                MMSYSERR_NOERROR
            }
            SysInfoReturn::Text(text) if flags & MCI_SYSINFO_NAME != 0 => {
                let index = sysinfo.number as usize;
                match index.checked_sub(1).and_then(|i| state.devices.values().nth(i)) {
                    Some(dev) => {
                        fill_wide(text, dev.name());
                        MMSYSERR_NOERROR
                    }
                    None => MCIERR_OUTOFRANGE,
                }
            }
            SysInfoReturn::Text(_) => MCIERR_MISSING_PARAMETER,
        }
    }

    fn window_ops(&self, device: u16, params: CommandParams<'_>) -> u32 {
        let mut state = self.lock();
        if let CommandParams::Wide(WideParams::Escape(escape)) = &params {
            state.last_escape = escape.command.text();
            return MMSYSERR_NOERROR;
        }
        let Some(dev) = state.devices.get_mut(&device) else {
            return MCIERR_INVALID_DEVICE_ID;
        };
        match params {
            CommandParams::Wide(WideParams::Rect(rect)) => {
                if rect.rect == Rect::default() {
                    rect.rect = Rect {
                        left: 0,
                        top: 0,
                        right: 320,
                        bottom: 240,
                    };
                }
                MMSYSERR_NOERROR
            }
            CommandParams::Wide(WideParams::Window(window)) => {
                if let Some(text) = window.text.text() {
                    dev.caption = Some(text);
                }
                MMSYSERR_NOERROR
            }
            _ => MMSYSERR_NOERROR,
        }
    }
}

/// Device type implied by a file extension
fn device_type_for(file: &str) -> &'static str {
    let ext = file.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "mid" | "rmi" => "sequencer",
        "avi" => "avivideo",
        _ => "waveaudio",
    }
}

impl MciDriver for LoopbackMciDriver {
    fn send_command(&self, device: u16, msg: u16, flags: u32, params: CommandParams<'_>) -> u32 {
        match msg {
            MCI_OPEN | MCI_OPEN_DRIVER => self.open(flags, params),
            MCI_CLOSE | MCI_CLOSE_DRIVER => self.close_device(device),
            MCI_STATUS => self.status(device, flags, params),
            MCI_PLAY | MCI_SEEK | MCI_STOP | MCI_PAUSE | MCI_RESUME => {
                self.transport(device, msg, flags, params)
            }
            MCI_INFO => self.info(device, flags, params),
            MCI_SYSINFO => self.sysinfo(flags, params),
            MCI_WHERE | MCI_PUT | MCI_FREEZE | MCI_UNFREEZE | MCI_WINDOW | MCI_ESCAPE => {
                self.window_ops(device, params)
            }
            MCI_BREAK | MCI_SOUND => MMSYSERR_NOERROR,
            _ if is_driver_message(msg) => MMSYSERR_NOERROR,
            _ => self.with_device(device, |_| MMSYSERR_NOERROR),
        }
    }

    fn send_string(&self, command: &[u16], ret: &mut [u16], _hwnd: u32) -> u32 {
        let command = wide_to_string(command);
        let words: Vec<&str> = command.split_whitespace().collect();
        let Some((verb, args)) = words.split_first() else {
            return MCIERR_MISSING_PARAMETER;
        };
        let verb = verb.to_ascii_lowercase();
        let target = args.first().copied().unwrap_or("");

        if verb == "open" {
            if target.is_empty() {
                return MCIERR_MISSING_PARAMETER;
            }
            let alias = args
                .windows(2)
                .find(|pair| pair[0].eq_ignore_ascii_case("alias"))
                .map(|pair| pair[1].to_string());
            let id = self.open_device(target.to_string(), None, alias);
            fill_wide(ret, &id.to_string());
            return if id == 0 { MCIERR_OUT_OF_MEMORY } else { MMSYSERR_NOERROR };
        }

        let device = self.get_device_id(&target.encode_utf16().collect::<Vec<_>>());
        if device == 0 {
            return MCIERR_INVALID_DEVICE_NAME;
        }
        match verb.as_str() {
            "close" => self.close_device(device),
            "play" => self.transport(device, MCI_PLAY, 0, CommandParams::Raw(0)),
            "stop" => self.transport(device, MCI_STOP, 0, CommandParams::Raw(0)),
            "pause" => self.transport(device, MCI_PAUSE, 0, CommandParams::Raw(0)),
            "status" if args.get(1).is_some_and(|w| w.eq_ignore_ascii_case("mode")) => {
                self.with_device(device, |dev| {
                    let mode = match dev.mode {
                        MCI_MODE_PLAY => "playing",
                        MCI_MODE_PAUSE => "paused",
                        MCI_MODE_NOT_READY => "not ready",
                        _ => "stopped",
                    };
                    fill_wide(ret, mode);
                    MMSYSERR_NOERROR
                })
            }
            _ => MCIERR_UNRECOGNIZED_COMMAND,
        }
    }

    fn get_device_id(&self, name: &[u16]) -> u16 {
        let name = wide_to_string(name);
        if name.eq_ignore_ascii_case("all") {
            return MCI_ALL_DEVICE_ID;
        }
        self.lock()
            .devices
            .iter()
            .find(|(_, dev)| dev.name().eq_ignore_ascii_case(&name))
            .map_or(0, |(&id, _)| id)
    }

    fn set_yield_proc(&self, device: u16, proc_addr: Option<ThunkAddr>, data: u32) -> bool {
        match self.lock().devices.get_mut(&device) {
            Some(dev) => {
                dev.yield_proc = proc_addr.map(|addr| (addr, data));
                true
            }
            None => false,
        }
    }

    fn get_yield_proc(&self, device: u16) -> Option<(ThunkAddr, u32)> {
        self.lock().devices.get(&device).and_then(|dev| dev.yield_proc)
    }
}
