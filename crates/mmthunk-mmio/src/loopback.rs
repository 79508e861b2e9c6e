//! In-process MMIO layer with files kept in memory

use crate::dispatch::IoProcDispatcher;
use crate::driver::MmioDriver;
use crate::info::MmioInfo;
use crate::messages::{
    fourcc_name, MMIOM_CLOSE, MMIOM_OPEN, MMIOM_READ, MMIOM_RENAME, MMIOM_SEEK, MMIOM_WRITE,
    MMIOM_WRITEFLUSH, MMIO_CREATE, MMIO_FINDPROC, MMIO_INSTALLPROC, MMIO_PROC_MODES,
    MMIO_REMOVEPROC, SEEK_CUR, SEEK_END, SEEK_SET,
};
use crate::MessageParam;
use mmthunk_common::codes::{
    MMIOERR_CANNOTOPEN, MMIOERR_FILENOTFOUND, MMSYSERR_INVALHANDLE, MMSYSERR_NOERROR,
};
use mmthunk_registry::ThunkAddr;
use mmthunk_segment::AddressSpace;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

enum Backend {
    /// Plain file in the loopback store
    Memory { position: usize },
    /// Every message goes to a 16-bit IO procedure
    Procedure(ThunkAddr),
}

struct OpenFile {
    name: Vec<u8>,
    info: MmioInfo,
    backend: Backend,
}

#[derive(Default)]
struct State {
    store: BTreeMap<Vec<u8>, Vec<u8>>,
    files: BTreeMap<u16, OpenFile>,
    procs: BTreeMap<u32, ThunkAddr>,
    next_handle: u16,
}

impl State {
    fn next_handle(&mut self) -> u16 {
        loop {
            self.next_handle = self.next_handle.wrapping_add(1).max(1);
            if !self.files.contains_key(&self.next_handle) {
                return self.next_handle;
            }
        }
    }
}

/// Native MMIO stand-in
///
/// Files opened without an IO procedure live in a byte-vector store keyed by
/// name. Files served by a 16-bit IO procedure route every message through
/// the attached [`IoProcDispatcher`].
pub struct LoopbackMmio {
    space: Arc<AddressSpace>,
    state: Mutex<State>,
    dispatcher: OnceLock<Arc<IoProcDispatcher>>,
}

impl LoopbackMmio {
    pub fn new(space: Arc<AddressSpace>) -> Self {
        Self {
            space,
            state: Mutex::new(State::default()),
            dispatcher: OnceLock::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed the store with a file
    pub fn with_file(self, name: &str, contents: &[u8]) -> Self {
        self.lock()
            .store
            .insert(name.as_bytes().to_vec(), contents.to_vec());
        self
    }

    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        self.lock().store.get(name.as_bytes()).cloned()
    }

    pub fn open_files(&self) -> usize {
        self.lock().files.len()
    }

    pub fn installed_procs(&self) -> usize {
        self.lock().procs.len()
    }

    /// Run an IO procedure with no lock held; it may call back into us
    fn call_proc(
        &self,
        addr: ThunkAddr,
        info: &mut MmioInfo,
        msg: u16,
        lp1: MessageParam,
        lp2: MessageParam,
    ) -> i32 {
        match self.dispatcher.get() {
            Some(dispatcher) => dispatcher.dispatch(addr, info, msg, lp1, lp2),
            None => {
                tracing::warn!("IO procedure {} called before a bridge was attached", addr);
                MMIOERR_CANNOTOPEN as i32
            }
        }
    }

    fn open_with_proc(&self, addr: ThunkAddr, name: &[u8], info: &mut MmioInfo, flags: u32) -> u16 {
        let Ok(scratch) = self.space.alloc_linear(name.len() + 1) else {
            info.error_ret = MMIOERR_CANNOTOPEN;
            return 0;
        };
        let written = self.space.write_bytes(scratch, name);
        let result = match written {
            Ok(()) => self.call_proc(
                addr,
                info,
                MMIOM_OPEN,
                MessageParam::Linear(scratch),
                MessageParam::Value(flags),
            ),
            Err(_) => MMIOERR_CANNOTOPEN as i32,
        };
        self.space.free_linear(scratch);

        if result != 0 {
            info.error_ret = result as u32;
            return 0;
        }
        let mut state = self.lock();
        let handle = state.next_handle();
        info.hmmio = handle;
        state.files.insert(
            handle,
            OpenFile {
                name: name.to_vec(),
                info: info.clone(),
                backend: Backend::Procedure(addr),
            },
        );
        handle
    }

    fn memory_message(
        &self,
        file: &mut OpenFile,
        store: &mut BTreeMap<Vec<u8>, Vec<u8>>,
        msg: u16,
        lp1: MessageParam,
        lp2: MessageParam,
    ) -> i32 {
        let Backend::Memory { position } = &mut file.backend else {
            return -1;
        };
        let data = store.entry(file.name.clone()).or_default();

        let result = match msg {
            MMIOM_READ => {
                let Some(buffer) = lp1.linear() else { return -1 };
                let start = (*position).min(data.len());
                let end = start.saturating_add(lp2.value() as usize).min(data.len());
                if self.space.write_bytes(buffer, &data[start..end]).is_err() {
                    return -1;
                }
                *position = end;
                (end - start) as i32
            }
            MMIOM_WRITE | MMIOM_WRITEFLUSH => {
                let Some(buffer) = lp1.linear() else { return -1 };
                let Ok(bytes) = self.space.read_bytes(buffer, lp2.value() as usize) else {
                    return -1;
                };
                let end = *position + bytes.len();
                if data.len() < end {
                    data.resize(end, 0);
                }
                data[*position..end].copy_from_slice(&bytes);
                *position = end;
                bytes.len() as i32
            }
            MMIOM_SEEK => {
                let offset = lp1.value() as i32 as i64;
                let origin = match lp2.value() {
                    SEEK_SET => 0,
                    SEEK_CUR => *position as i64,
                    SEEK_END => data.len() as i64,
                    _ => return -1,
                };
                let target = origin + offset;
                if target < 0 || target > i32::MAX as i64 {
                    return -1;
                }
                *position = target as usize;
                target as i32
            }
            MMIOM_CLOSE => 0,
            _ => {
                tracing::debug!("Loopback MMIO ignores message {:#06x}", msg);
                -1
            }
        };
        file.info.disk_offset = *position as i32;
        result
    }

    fn rename(&self, lp1: MessageParam, lp2: MessageParam) -> i32 {
        let (Some(old), Some(new)) = (lp1.linear(), lp2.linear()) else {
            return -1;
        };
        let (Ok(old), Ok(new)) = (self.space.read_cstr(old), self.space.read_cstr(new)) else {
            return -1;
        };
        let mut state = self.lock();
        match state.store.remove(&old) {
            Some(data) => {
                state.store.insert(new, data);
                0
            }
            None => MMIOERR_FILENOTFOUND as i32,
        }
    }
}

impl MmioDriver for LoopbackMmio {
    fn attach(&self, dispatcher: Arc<IoProcDispatcher>) {
        if self.dispatcher.set(dispatcher).is_err() {
            tracing::warn!("Loopback MMIO is already attached to a bridge");
        }
    }

    fn install_io_proc(
        &self,
        fourcc: u32,
        proc: Option<ThunkAddr>,
        flags: u32,
    ) -> Option<ThunkAddr> {
        let mut state = self.lock();
        match flags & MMIO_PROC_MODES {
            MMIO_INSTALLPROC => {
                let proc = proc?;
                state.procs.insert(fourcc, proc);
                tracing::debug!("Loopback IO proc '{}' -> {}", fourcc_name(fourcc), proc);
                Some(proc)
            }
            MMIO_REMOVEPROC => {
                let proc = proc?;
                if state.procs.get(&fourcc) == Some(&proc) {
                    state.procs.remove(&fourcc);
                    Some(proc)
                } else {
                    None
                }
            }
            MMIO_FINDPROC => state.procs.get(&fourcc).copied(),
            _ => None,
        }
    }

    fn open(&self, filename: Option<&[u8]>, info: &mut MmioInfo, flags: u32) -> u16 {
        info.error_ret = MMSYSERR_NOERROR;
        let name = filename.unwrap_or_default();

        let proc = info.io_proc.or_else(|| {
            (info.fcc_io_proc != 0)
                .then(|| self.lock().procs.get(&info.fcc_io_proc).copied())
                .flatten()
        });
        if let Some(addr) = proc {
            return self.open_with_proc(addr, name, info, flags);
        }
        if filename.is_none() {
            info.error_ret = MMIOERR_CANNOTOPEN;
            return 0;
        }

        let mut state = self.lock();
        if flags & MMIO_CREATE != 0 {
            state.store.insert(name.to_vec(), Vec::new());
        } else if !state.store.contains_key(name) {
            info.error_ret = MMIOERR_FILENOTFOUND;
            return 0;
        }

        let handle = state.next_handle();
        info.hmmio = handle;
        info.disk_offset = 0;
        state.files.insert(
            handle,
            OpenFile {
                name: name.to_vec(),
                info: info.clone(),
                backend: Backend::Memory { position: 0 },
            },
        );
        handle
    }

    fn close(&self, hmmio: u16, _flags: u32) -> u32 {
        let Some(mut file) = self.lock().files.remove(&hmmio) else {
            return MMSYSERR_INVALHANDLE;
        };
        if let Backend::Procedure(addr) = file.backend {
            let result = self.call_proc(
                addr,
                &mut file.info,
                MMIOM_CLOSE,
                MessageParam::Value(0),
                MessageParam::Value(0),
            );
            if result != 0 {
                tracing::debug!("IO proc refused MMIOM_CLOSE on {:#06x}: {}", hmmio, result);
            }
        }
        MMSYSERR_NOERROR
    }

    fn send_message(&self, hmmio: u16, msg: u16, lp1: MessageParam, lp2: MessageParam) -> i32 {
        if msg == MMIOM_RENAME && hmmio == 0 {
            return self.rename(lp1, lp2);
        }

        let mut state = self.lock();
        let State { store, files, .. } = &mut *state;
        let Some(file) = files.get_mut(&hmmio) else {
            return MMSYSERR_INVALHANDLE as i32;
        };
        let Backend::Procedure(addr) = file.backend else {
            return self.memory_message(file, store, msg, lp1, lp2);
        };

        let mut info = file.info.clone();
        drop(state);
        let result = self.call_proc(addr, &mut info, msg, lp1, lp2);
        if let Some(file) = self.lock().files.get_mut(&hmmio) {
            file.info = info;
        }
        result
    }
}
