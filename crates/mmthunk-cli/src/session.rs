//! Runs replay steps through the MCI and MMIO bridges

use crate::script::{InfoItem, SeekOrigin, StatusItem, Step};
use anyhow::{anyhow, bail, Context, Result};
use mmthunk_common::codes::{error_name, mmio_error_name, MMSYSERR_NOERROR};
use mmthunk_common::BridgeConfig;
use mmthunk_mci::messages::*;
use mmthunk_mci::{layout, LoopbackMciDriver, MciBridge, MessagePump};
use mmthunk_mmio::messages::{MMIO_CREATE, MMIO_READWRITE, SEEK_CUR, SEEK_END, SEEK_SET};
use mmthunk_mmio::{LoopbackMmio, MmioBridge};
use mmthunk_registry::Callback16;
use mmthunk_segment::{AddressSpace, LinearAddr, SegPtr};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// The 16-bit side of a replay: there is no 16-bit code, so calls are
/// logged and answered with 0
#[derive(Default)]
pub struct ConsoleHost {
    calls: AtomicUsize,
}

impl ConsoleHost {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Callback16 for ConsoleHost {
    fn call16(&self, target: SegPtr, args: &[u16]) -> u32 {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tracing::info!("16-bit call {} {:04x?}", target, args);
        0
    }
}

impl MessagePump for ConsoleHost {
    fn drain_one(&self) -> bool {
        false
    }
}

/// What a step returned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// An MCI or `MMSYSERR` result code
    Mci { code: u32, detail: Option<String> },
    /// An MMIO result code
    Mmio { code: u32, detail: Option<String> },
    /// A byte count, position or callback return value
    Value { value: i64, detail: Option<String> },
    Done(bool),
}

impl Outcome {
    fn mci(code: u32) -> Self {
        Outcome::Mci { code, detail: None }
    }
}

fn with_detail(f: &mut fmt::Formatter<'_>, name: &str, detail: &Option<String>) -> fmt::Result {
    match detail {
        Some(detail) => write!(f, "{} {}", name, detail),
        None => f.write_str(name),
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Mci { code, detail } => with_detail(f, error_name(*code), detail),
            Outcome::Mmio { code, detail } => with_detail(f, mmio_error_name(*code), detail),
            Outcome::Value { value, detail } => with_detail(f, &value.to_string(), detail),
            Outcome::Done(ok) => f.write_str(if *ok { "TRUE" } else { "FALSE" }),
        }
    }
}

fn mode_name(mode: u32) -> String {
    match mode {
        MCI_MODE_NOT_READY => "not ready".into(),
        MCI_MODE_STOP => "stopped".into(),
        MCI_MODE_PLAY => "playing".into(),
        MCI_MODE_PAUSE => "paused".into(),
        other => other.to_string(),
    }
}

/// Parse `ssss:oooo` (hex) into a 16:16 pointer
pub fn parse_seg_ptr(text: &str) -> Result<SegPtr> {
    let (sel, off) = text
        .split_once(':')
        .ok_or_else(|| anyhow!("Expected ssss:oooo, got '{}'", text))?;
    let sel = u16::from_str_radix(sel, 16).with_context(|| format!("Bad selector in '{}'", text))?;
    let off = u16::from_str_radix(off, 16).with_context(|| format!("Bad offset in '{}'", text))?;
    Ok(SegPtr::new(sel, off))
}

/// One 16-bit task talking to the loopback drivers
pub struct Session {
    space: Arc<AddressSpace>,
    host: Arc<ConsoleHost>,
    mci: MciBridge<LoopbackMciDriver>,
    mmio: MmioBridge<LoopbackMmio>,
    devices: BTreeMap<String, u16>,
    files: BTreeMap<String, u16>,
    /// Segments allocated for the step in progress
    scratch: Vec<SegPtr>,
}

impl Session {
    pub fn new(config: &BridgeConfig, files: &BTreeMap<String, String>) -> Self {
        let space = Arc::new(AddressSpace::new(&config.memory));
        let host = Arc::new(ConsoleHost::default());

        let mci = MciBridge::new(
            config,
            space.clone(),
            LoopbackMciDriver::new(space.clone()),
            host.clone(),
            host.clone(),
        );
        let store = files
            .iter()
            .fold(LoopbackMmio::new(space.clone()), |mmio, (name, text)| {
                mmio.with_file(name, text.as_bytes())
            });
        let mmio = MmioBridge::new(config, space.clone(), store, host.clone());

        Self {
            space,
            host,
            mci,
            mmio,
            devices: BTreeMap::new(),
            files: BTreeMap::new(),
            scratch: Vec::new(),
        }
    }

    pub fn host(&self) -> &ConsoleHost {
        &self.host
    }

    pub fn mci(&self) -> &MciBridge<LoopbackMciDriver> {
        &self.mci
    }

    pub fn mmio(&self) -> &MmioBridge<LoopbackMmio> {
        &self.mmio
    }

    /// Run one step; 16-bit memory it needed is freed afterwards
    pub fn run(&mut self, step: &Step) -> Result<Outcome> {
        let outcome = self.dispatch(step);
        for ptr in self.scratch.drain(..) {
            if let Err(e) = self.space.free_segment(ptr) {
                tracing::warn!("Could not free scratch segment {}: {}", ptr, e);
            }
        }
        outcome
    }

    // ========================================================================
    // 16-bit memory
    // ========================================================================

    fn segment(&mut self, size: u32) -> Result<(SegPtr, LinearAddr)> {
        let ptr = self
            .space
            .alloc_segment(size as usize)
            .context("Out of 16-bit memory")?;
        self.scratch.push(ptr);
        Ok((ptr, self.space.to_linear(ptr)?))
    }

    fn cstr(&mut self, text: &str) -> Result<SegPtr> {
        let ptr = self
            .space
            .alloc_cstr(text.as_bytes())
            .context("Out of 16-bit memory")?;
        self.scratch.push(ptr);
        Ok(ptr)
    }

    fn text_at(&self, ptr: SegPtr) -> Result<String> {
        Ok(String::from_utf8_lossy(&self.space.read_seg_cstr(ptr)?).into_owned())
    }

    fn device(&self, name: &str) -> Result<u16> {
        if let Some(&id) = self.devices.get(name) {
            return Ok(id);
        }
        name.parse()
            .map_err(|_| anyhow!("Unknown device '{}' (open it first or give its id)", name))
    }

    fn file(&self, name: &str) -> Result<u16> {
        self.files
            .get(name)
            .copied()
            .ok_or_else(|| anyhow!("File '{}' is not open", name))
    }

    // ========================================================================
    // Steps
    // ========================================================================

    fn dispatch(&mut self, step: &Step) -> Result<Outcome> {
        match step {
            Step::Open {
                device_type,
                alias,
                element,
            } => self.open(device_type, alias.as_deref(), element.as_deref()),
            Step::Status { device, item } => self.status(device, *item),
            Step::Info {
                device,
                item,
                buffer,
            } => self.info(device, *item, *buffer),
            Step::Sysinfo { number, buffer } => self.sysinfo(*number, *buffer),
            Step::Play { device } => self.transport(device, MCI_PLAY),
            Step::Stop { device } => self.transport(device, MCI_STOP),
            Step::Pause { device } => self.transport(device, MCI_PAUSE),
            Step::Close { device } => self.close(device),
            Step::SetYield { device, proc, data } => {
                let device = self.device(device)?;
                let proc = parse_seg_ptr(proc)?;
                Ok(Outcome::Done(self.mci.set_yield_proc(device, proc, *data)))
            }
            Step::Yield { device } => {
                let device = self.device(device)?;
                Ok(Outcome::Value {
                    value: self.mci.driver_yield(device) as i64,
                    detail: None,
                })
            }
            Step::SendString { command, buffer } => self.send_string(command, *buffer),
            Step::MmioOpen { file, create } => self.mmio_open(file, *create),
            Step::MmioRead { file, len } => self.mmio_read(file, *len),
            Step::MmioWrite { file, text } => self.mmio_write(file, text),
            Step::MmioSeek {
                file,
                offset,
                origin,
            } => {
                let handle = self.file(file)?;
                let origin = match origin {
                    SeekOrigin::Set => SEEK_SET,
                    SeekOrigin::Cur => SEEK_CUR,
                    SeekOrigin::End => SEEK_END,
                };
                Ok(Outcome::Value {
                    value: self.mmio.seek(handle, *offset, origin) as i64,
                    detail: None,
                })
            }
            Step::MmioClose { file } => {
                let handle = self.file(file)?;
                let code = self.mmio.close(handle, 0);
                if code == MMSYSERR_NOERROR {
                    self.files.remove(file);
                }
                Ok(Outcome::Mmio { code, detail: None })
            }
        }
    }

    fn open(
        &mut self,
        device_type: &str,
        alias: Option<&str>,
        element: Option<&str>,
    ) -> Result<Outcome> {
        let (block, base) = self.segment(layout::open::SIZE)?;
        let mut flags = MCI_OPEN_TYPE | MCI_WAIT;

        let type_ptr = self.cstr(device_type)?;
        self.space.write_u32(base.add(layout::open::DEVICE_TYPE), type_ptr.0)?;
        if let Some(alias) = alias {
            let ptr = self.cstr(alias)?;
            self.space.write_u32(base.add(layout::open::ALIAS), ptr.0)?;
            flags |= MCI_OPEN_ALIAS;
        }
        if let Some(element) = element {
            let ptr = self.cstr(element)?;
            self.space.write_u32(base.add(layout::open::ELEMENT_NAME), ptr.0)?;
            flags |= MCI_OPEN_ELEMENT;
        }

        let code = self.mci.send_command(0, MCI_OPEN, flags, block.0);
        if code != MMSYSERR_NOERROR {
            return Ok(Outcome::mci(code));
        }
        let id = self.space.read_u16(base.add(layout::open::DEVICE_ID))?;
        self.devices
            .insert(alias.unwrap_or(device_type).to_string(), id);
        Ok(Outcome::Mci {
            code,
            detail: Some(format!("device {}", id)),
        })
    }

    fn status(&mut self, device: &str, item: StatusItem) -> Result<Outcome> {
        let device = self.device(device)?;
        let (block, base) = self.segment(12)?;
        let item_code = match item {
            StatusItem::Length => MCI_STATUS_LENGTH,
            StatusItem::Position => MCI_STATUS_POSITION,
            StatusItem::Mode => MCI_STATUS_MODE,
            StatusItem::Ready => MCI_STATUS_READY,
        };
        self.space
            .write_u32(base.add(layout::generic::STATUS_ITEM), item_code)?;

        let code = self
            .mci
            .send_command(device, MCI_STATUS, MCI_STATUS_ITEM | MCI_WAIT, block.0);
        if code != MMSYSERR_NOERROR {
            return Ok(Outcome::mci(code));
        }
        let value = self
            .space
            .read_u32(base.add(layout::generic::STATUS_RETURN))?;
        let detail = match item {
            StatusItem::Mode => mode_name(value),
            StatusItem::Ready => (value != 0).to_string(),
            _ => value.to_string(),
        };
        Ok(Outcome::Mci {
            code,
            detail: Some(detail),
        })
    }

    fn info(&mut self, device: &str, item: InfoItem, buffer: u16) -> Result<Outcome> {
        let device = self.device(device)?;
        let (out, _) = self.segment(buffer as u32)?;
        let (block, base) = self.segment(12)?;
        self.space.write_u32(base.add(layout::info::RETURN), out.0)?;
        self.space
            .write_u32(base.add(layout::info::RET_SIZE), buffer as u32)?;
        let flags = match item {
            InfoItem::Product => MCI_INFO_PRODUCT,
            InfoItem::File => MCI_INFO_FILE,
        };

        let code = self.mci.send_command(device, MCI_INFO, flags | MCI_WAIT, block.0);
        let detail = match code {
            MMSYSERR_NOERROR => Some(format!("{:?}", self.text_at(out)?)),
            _ => None,
        };
        Ok(Outcome::Mci { code, detail })
    }

    fn sysinfo(&mut self, number: Option<u32>, buffer: u16) -> Result<Outcome> {
        let (block, base) = self.segment(layout::sysinfo::SIZE)?;
        let (out, out_base) = match number {
            Some(_) => self.segment(buffer as u32)?,
            None => self.segment(4)?,
        };
        self.space.write_u32(base.add(layout::sysinfo::RETURN), out.0)?;
        let (flags, size) = match number {
            Some(n) => {
                self.space.write_u32(base.add(layout::sysinfo::NUMBER), n)?;
                (MCI_SYSINFO_NAME | MCI_SYSINFO_OPEN, buffer as u32)
            }
            None => (MCI_SYSINFO_QUANTITY | MCI_SYSINFO_OPEN, 4),
        };
        self.space
            .write_u32(base.add(layout::sysinfo::RET_SIZE), size)?;

        let code = self
            .mci
            .send_command(MCI_ALL_DEVICE_ID, MCI_SYSINFO, flags, block.0);
        if code != MMSYSERR_NOERROR {
            return Ok(Outcome::mci(code));
        }
        let detail = match number {
            Some(_) => format!("{:?}", self.text_at(out)?),
            None => self.space.read_u32(out_base)?.to_string(),
        };
        Ok(Outcome::Mci {
            code,
            detail: Some(detail),
        })
    }

    fn transport(&mut self, device: &str, msg: u16) -> Result<Outcome> {
        let device = self.device(device)?;
        Ok(Outcome::mci(self.mci.send_command(device, msg, MCI_WAIT, 0)))
    }

    fn close(&mut self, device: &str) -> Result<Outcome> {
        let id = self.device(device)?;
        let code = self.mci.send_command(id, MCI_CLOSE, MCI_WAIT, 0);
        if code == MMSYSERR_NOERROR {
            self.devices
                .retain(|_, open| id != MCI_ALL_DEVICE_ID && *open != id);
        }
        Ok(Outcome::mci(code))
    }

    fn send_string(&mut self, command: &str, buffer: u16) -> Result<Outcome> {
        let command16 = self.cstr(command)?;
        let (ret, _) = self.segment(buffer as u32)?;
        let code = self.mci.send_string(command16, ret, buffer, 0);
        let text = self.text_at(ret)?;
        let detail = (code == MMSYSERR_NOERROR && !text.is_empty()).then(|| format!("{:?}", text));
        Ok(Outcome::Mci { code, detail })
    }

    fn mmio_open(&mut self, file: &str, create: bool) -> Result<Outcome> {
        let name = self.cstr(file)?;
        let (info16, base) = self.segment(mmthunk_mmio::layout::SIZE)?;
        let flags = MMIO_READWRITE | if create { MMIO_CREATE } else { 0 };

        let handle = self.mmio.open(name, info16, flags);
        let code = self
            .space
            .read_u16(base.add(mmthunk_mmio::layout::ERROR_RET))? as u32;
        if handle == 0 {
            return Ok(Outcome::Mmio { code, detail: None });
        }
        self.files.insert(file.to_string(), handle);
        Ok(Outcome::Mmio {
            code,
            detail: Some(format!("handle {:#06x}", handle)),
        })
    }

    fn mmio_read(&mut self, file: &str, len: u16) -> Result<Outcome> {
        let handle = self.file(file)?;
        let (buffer, base) = self.segment(len as u32)?;
        let read = self.mmio.read(handle, buffer, len as i32);
        let detail = match usize::try_from(read) {
            Ok(n) => Some(format!(
                "{:?}",
                String::from_utf8_lossy(&self.space.read_bytes(base, n)?)
            )),
            Err(_) => None,
        };
        Ok(Outcome::Value {
            value: read as i64,
            detail,
        })
    }

    fn mmio_write(&mut self, file: &str, text: &str) -> Result<Outcome> {
        let handle = self.file(file)?;
        if text.len() > u16::MAX as usize {
            bail!("mmio-write text is longer than one segment");
        }
        let (buffer, base) = self.segment(text.len() as u32)?;
        self.space.write_bytes(base, text.as_bytes())?;
        Ok(Outcome::Value {
            value: self.mmio.write(handle, buffer, text.len() as i32) as i64,
            detail: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::Script;
    use mmthunk_common::codes::{MCIERR_INVALID_DEVICE_ID, MMIOERR_FILENOTFOUND};

    fn replay(text: &str) -> (Session, Vec<Outcome>) {
        let script = Script::parse(text).unwrap();
        let mut session = Session::new(&BridgeConfig::new(), &script.files);
        let outcomes = script
            .steps
            .iter()
            .map(|step| session.run(step).unwrap())
            .collect();
        (session, outcomes)
    }

    #[test]
    fn test_parse_seg_ptr() {
        assert_eq!(parse_seg_ptr("0027:0010").unwrap(), SegPtr::new(0x27, 0x10));
        assert!(parse_seg_ptr("0027").is_err());
        assert!(parse_seg_ptr("zz:0").is_err());
    }

    #[test]
    fn test_mci_session() {
        let (session, outcomes) = replay(
            r#"
            [[step]]
            op = "open"
            device_type = "waveaudio"
            alias = "w"

            [[step]]
            op = "play"
            device = "w"

            [[step]]
            op = "status"
            device = "w"
            item = "mode"

            [[step]]
            op = "info"
            device = "w"
            item = "product"

            [[step]]
            op = "sysinfo"

            [[step]]
            op = "set-yield"
            device = "w"
            proc = "0027:0010"

            [[step]]
            op = "yield"
            device = "w"

            [[step]]
            op = "close"
            device = "w"

            [[step]]
            op = "close"
            device = "1"
            "#,
        );

        assert_eq!(outcomes[0].to_string(), "MMSYSERR_NOERROR device 1");
        assert_eq!(outcomes[1], Outcome::mci(0));
        assert_eq!(outcomes[2].to_string(), "MMSYSERR_NOERROR playing");
        assert_eq!(
            outcomes[3].to_string(),
            "MMSYSERR_NOERROR \"Loopback waveaudio\""
        );
        assert_eq!(outcomes[4].to_string(), "MMSYSERR_NOERROR 1");
        assert_eq!(outcomes[5], Outcome::Done(true));
        assert_eq!(outcomes[6].to_string(), "0");
        assert_eq!(session.host().calls(), 1);
        assert_eq!(outcomes[7], Outcome::mci(0));
        assert_eq!(outcomes[8], Outcome::mci(MCIERR_INVALID_DEVICE_ID));
        assert_eq!(session.mci().registry().live(), 0);
        assert_eq!(session.space.segments(), 0);
    }

    #[test]
    fn test_mmio_session() {
        let (session, outcomes) = replay(
            r#"
            [files]
            "notes.txt" = "hello"

            [[step]]
            op = "mmio-open"
            file = "notes.txt"

            [[step]]
            op = "mmio-seek"
            file = "notes.txt"
            offset = 0
            origin = "end"

            [[step]]
            op = "mmio-write"
            file = "notes.txt"
            text = " world"

            [[step]]
            op = "mmio-seek"
            file = "notes.txt"
            offset = 0

            [[step]]
            op = "mmio-read"
            file = "notes.txt"
            len = 32

            [[step]]
            op = "mmio-close"
            file = "notes.txt"

            [[step]]
            op = "mmio-open"
            file = "missing.txt"
            "#,
        );

        assert_eq!(outcomes[0].to_string(), "MMSYSERR_NOERROR handle 0x0001");
        assert_eq!(outcomes[1].to_string(), "5");
        assert_eq!(outcomes[2].to_string(), "6");
        assert_eq!(outcomes[4].to_string(), "11 \"hello world\"");
        assert_eq!(outcomes[5], Outcome::Mmio { code: 0, detail: None });
        assert_eq!(
            outcomes[6],
            Outcome::Mmio {
                code: MMIOERR_FILENOTFOUND,
                detail: None
            }
        );
        assert_eq!(session.mmio().driver().open_files(), 0);
    }

    #[test]
    fn test_unknown_device_is_a_script_error() {
        let script = Script::parse("[[step]]\nop = \"play\"\ndevice = \"cd\"\n").unwrap();
        let mut session = Session::new(&BridgeConfig::new(), &script.files);
        assert!(session.run(&script.steps[0]).is_err());
    }
}
