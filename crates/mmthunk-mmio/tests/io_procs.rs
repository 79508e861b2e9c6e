//! 16-bit IO procedures driven through the loopback MMIO layer

use mmthunk_common::codes::*;
use mmthunk_common::{BridgeConfig, ThunkConfig};
use mmthunk_mmio::layout;
use mmthunk_mmio::messages::*;
use mmthunk_mmio::{Callback16, IoProcOwner, LoopbackMmio, MmioBridge};
use mmthunk_segment::{AddressSpace, LinearAddr, SegPtr};
use std::sync::{Arc, Mutex};

const CONTENT: &[u8] = b"CUSTOM";

/// A 16-bit IO procedure serving a fixed six-byte file
struct CustomProc {
    space: Arc<AddressSpace>,
    messages: Mutex<Vec<u16>>,
}

fn join(hi: u16, lo: u16) -> u32 {
    ((hi as u32) << 16) | lo as u32
}

impl Callback16 for CustomProc {
    fn call16(&self, _target: SegPtr, args: &[u16]) -> u32 {
        let block = self.space.to_linear(SegPtr(join(args[0], args[1]))).unwrap();
        let msg = args[2];
        let lp1 = SegPtr(join(args[3], args[4]));
        let lp2 = join(args[5], args[6]);
        self.messages.lock().unwrap().push(msg);

        match msg {
            MMIOM_OPEN => {
                if self.space.read_seg_cstr(lp1).unwrap() == b"bad.dat" {
                    MMIOERR_CANNOTOPEN
                } else {
                    0
                }
            }
            MMIOM_READ => {
                let offset = self.space.read_i32(block.add(layout::DISK_OFFSET)).unwrap();
                let start = (offset as usize).min(CONTENT.len());
                let end = (start + lp2 as usize).min(CONTENT.len());
                let buffer = self.space.to_linear(lp1).unwrap();
                self.space.write_bytes(buffer, &CONTENT[start..end]).unwrap();
                self.space
                    .write_i32(block.add(layout::DISK_OFFSET), end as i32)
                    .unwrap();
                (end - start) as u32
            }
            _ => 0,
        }
    }
}

type Bridge = MmioBridge<LoopbackMmio>;

fn setup(config: BridgeConfig) -> (Bridge, Arc<CustomProc>) {
    let space = Arc::new(AddressSpace::new(&config.memory));
    let proc = Arc::new(CustomProc {
        space: space.clone(),
        messages: Mutex::new(Vec::new()),
    });
    let driver = LoopbackMmio::new(space.clone()).with_file("plain.wav", b"RIFF....WAVE");
    let bridge = MmioBridge::new(&config, space, driver, proc.clone());
    (bridge, proc)
}

fn proc16() -> SegPtr {
    SegPtr::new(0x0047, 0x0020)
}

fn info_block(bridge: &Bridge, io_proc: SegPtr, fcc: u32) -> (SegPtr, LinearAddr) {
    let space = bridge.space();
    let block = space.alloc_segment(layout::SIZE as usize).unwrap();
    let base = space.to_linear(block).unwrap();
    space.write_u32(base.add(layout::IO_PROC), io_proc.0).unwrap();
    space.write_u32(base.add(layout::FCC_IO_PROC), fcc).unwrap();
    (block, base)
}

#[test]
fn test_install_find_remove() {
    let (bridge, _proc) = setup(BridgeConfig::new());
    let code = fourcc(b"CUST");

    assert_eq!(bridge.install_io_proc(code, proc16(), MMIO_INSTALLPROC), proc16());
    assert_eq!(bridge.install_io_proc(code, SegPtr::NULL, MMIO_FINDPROC), proc16());
    assert_eq!(bridge.registry().live(), 1);

    // Removing a procedure that was never installed changes nothing
    let stranger = SegPtr::new(0x0047, 0x0040);
    assert_eq!(bridge.install_io_proc(code, stranger, MMIO_REMOVEPROC), SegPtr::NULL);
    assert_eq!(bridge.registry().live(), 1);

    assert_eq!(bridge.install_io_proc(code, proc16(), MMIO_REMOVEPROC), proc16());
    assert_eq!(bridge.install_io_proc(code, SegPtr::NULL, MMIO_FINDPROC), SegPtr::NULL);
    assert_eq!(bridge.registry().live(), 0);
    assert_eq!(bridge.driver().installed_procs(), 0);
}

#[test]
fn test_install_null_or_without_mode_fails() {
    let (bridge, _proc) = setup(BridgeConfig::new());
    let code = fourcc(b"CUST");
    assert_eq!(bridge.install_io_proc(code, SegPtr::NULL, MMIO_INSTALLPROC), SegPtr::NULL);
    assert_eq!(bridge.install_io_proc(code, proc16(), 0), SegPtr::NULL);
    assert_eq!(bridge.registry().live(), 0);
}

#[test]
fn test_open_read_close_through_16bit_proc() {
    let (bridge, proc) = setup(BridgeConfig::new());
    let space = bridge.space();
    let name = space.alloc_cstr(b"custom.dat").unwrap();
    let (info16, base) = info_block(&bridge, proc16(), 0);

    let handle = bridge.open(name, info16, MMIO_READ);
    assert_ne!(handle, 0);
    assert_eq!(space.read_u16(base.add(layout::ERROR_RET)).unwrap(), 0);
    assert_eq!(space.read_u16(base.add(layout::HMMIO)).unwrap(), handle);

    let record = bridge
        .registry()
        .find_where(|r| *r.context() == IoProcOwner::Handle(handle))
        .unwrap();
    assert_eq!(record.target(), proc16());

    let buffer = space.alloc_segment(16).unwrap();
    assert_eq!(bridge.read(handle, buffer, 4), 4);
    assert_eq!(bridge.read(handle, buffer.add(4), 16), 2);
    assert_eq!(space.read_seg_cstr(buffer).unwrap(), CONTENT);
    assert_eq!(space.reservations(), 0);

    assert_eq!(bridge.close(handle, 0), MMSYSERR_NOERROR);
    assert_eq!(bridge.registry().live(), 0);
    assert_eq!(
        *proc.messages.lock().unwrap(),
        vec![MMIOM_OPEN, MMIOM_READ, MMIOM_READ, MMIOM_CLOSE]
    );
}

#[test]
fn test_refused_open_releases_record() {
    let (bridge, _proc) = setup(BridgeConfig::new());
    let name = bridge.space().alloc_cstr(b"bad.dat").unwrap();
    let (info16, base) = info_block(&bridge, proc16(), 0);

    assert_eq!(bridge.open(name, info16, MMIO_READ), 0);
    assert_eq!(
        bridge.space().read_u16(base.add(layout::ERROR_RET)).unwrap() as u32,
        MMIOERR_CANNOTOPEN
    );
    assert_eq!(bridge.registry().live(), 0);
    assert_eq!(bridge.driver().open_files(), 0);
}

#[test]
fn test_installed_proc_outlives_its_files() {
    let (bridge, _proc) = setup(BridgeConfig::new());
    let code = fourcc(b"CUST");
    bridge.install_io_proc(code, proc16(), MMIO_INSTALLPROC);

    let name = bridge.space().alloc_cstr(b"custom.dat").unwrap();
    let (info16, _) = info_block(&bridge, SegPtr::NULL, code);
    let handle = bridge.open(name, info16, MMIO_READ);
    assert_ne!(handle, 0);

    let buffer = bridge.space().alloc_segment(8).unwrap();
    assert_eq!(bridge.read(handle, buffer, 8), 6);

    assert_eq!(bridge.close(handle, 0), 0);
    assert_eq!(bridge.registry().live(), 1);
    assert_eq!(bridge.install_io_proc(code, SegPtr::NULL, MMIO_FINDPROC), proc16());
}

#[test]
fn test_exhausted_pool_fails_open() {
    let mut config = BridgeConfig::new();
    config.thunks = ThunkConfig::bounded(1);
    let (bridge, _proc) = setup(config);
    bridge.install_io_proc(fourcc(b"CUST"), proc16(), MMIO_INSTALLPROC);

    let name = bridge.space().alloc_cstr(b"custom.dat").unwrap();
    let (info16, base) = info_block(&bridge, SegPtr::new(0x0047, 0x0060), 0);
    assert_eq!(bridge.open(name, info16, MMIO_READ), 0);
    assert_eq!(
        bridge.space().read_u16(base.add(layout::ERROR_RET)).unwrap() as u32,
        MMIOERR_OUTOFMEMORY
    );
    assert_eq!(bridge.registry().live(), 1);
}

#[test]
fn test_failed_alias_leaves_no_reservation() {
    let (bridge, proc) = setup(BridgeConfig::new());
    let space = bridge.space();
    let name = space.alloc_cstr(b"custom.dat").unwrap();
    let (info16, _) = info_block(&bridge, proc16(), 0);
    let handle = bridge.open(name, info16, MMIO_READ);
    let buffer = space.alloc_segment(8).unwrap();
    let segments = space.segments();

    space.fail_reservations_after(0);
    assert_eq!(bridge.read(handle, buffer, 8), MMIOERR_OUTOFMEMORY as i32);
    space.clear_faults();

    assert_eq!(space.reservations(), 0);
    assert_eq!(space.segments(), segments);
    assert_eq!(*proc.messages.lock().unwrap(), vec![MMIOM_OPEN]);
}

#[test]
fn test_plain_file_and_message_translation() {
    let (bridge, proc) = setup(BridgeConfig::new());
    let space = bridge.space();
    let name = space.alloc_cstr(b"plain.wav").unwrap();

    let handle = bridge.open(name, SegPtr::NULL, MMIO_READWRITE);
    assert_ne!(handle, 0);
    assert_eq!(bridge.seek(handle, 8, SEEK_SET), 8);

    let buffer = space.alloc_segment(8).unwrap();
    assert_eq!(bridge.read(handle, buffer, 8), 4);
    assert_eq!(space.read_seg_cstr(buffer).unwrap(), b"WAVE");

    assert_eq!(
        bridge.send_message(handle, MMIOM_READ, SegPtr::new(0x0ff7, 0).0, 4),
        MMSYSERR_INVALPARAM as i32
    );
    assert_eq!(
        bridge.send_message(0x4321, MMIOM_SEEK, 0, SEEK_SET),
        MMSYSERR_INVALHANDLE as i32
    );
    assert_eq!(bridge.close(handle, 0), 0);

    let old = space.alloc_cstr(b"plain.wav").unwrap();
    let new = space.alloc_cstr(b"moved.wav").unwrap();
    assert_eq!(bridge.send_message(0, MMIOM_RENAME, old.0, new.0), 0);
    assert_eq!(bridge.driver().contents("moved.wav").unwrap(), b"RIFF....WAVE");

    // No 16-bit code ran for a plain file
    assert!(proc.messages.lock().unwrap().is_empty());
}

#[test]
fn test_missing_file_sets_error_ret() {
    let (bridge, _proc) = setup(BridgeConfig::new());
    let name = bridge.space().alloc_cstr(b"absent.wav").unwrap();
    let (info16, base) = info_block(&bridge, SegPtr::NULL, 0);
    assert_eq!(bridge.open(name, info16, MMIO_READ), 0);
    assert_eq!(
        bridge.space().read_u16(base.add(layout::ERROR_RET)).unwrap() as u32,
        MMIOERR_FILENOTFOUND
    );
    assert_eq!(bridge.space().read_u16(base.add(layout::HMMIO)).unwrap(), 0);
}
