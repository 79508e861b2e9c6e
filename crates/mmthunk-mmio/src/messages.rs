//! MMIO messages, open flags and FOURCC helpers

// ============================================================================
// IO-procedure messages
// ============================================================================

pub const MMIOM_READ: u16 = 0;
pub const MMIOM_WRITE: u16 = 1;
pub const MMIOM_SEEK: u16 = 2;
pub const MMIOM_OPEN: u16 = 3;
pub const MMIOM_CLOSE: u16 = 4;
pub const MMIOM_WRITEFLUSH: u16 = 5;
pub const MMIOM_RENAME: u16 = 6;
/// First application-defined message
pub const MMIOM_USER: u16 = 0x8000;

// ============================================================================
// Flags
// ============================================================================

pub const MMIO_READ: u32 = 0x0000_0000;
pub const MMIO_WRITE: u32 = 0x0000_0001;
pub const MMIO_READWRITE: u32 = 0x0000_0002;
pub const MMIO_RWMODE: u32 = 0x0000_0003;
pub const MMIO_CREATE: u32 = 0x0000_1000;
pub const MMIO_DELETE: u32 = 0x0000_0200;
pub const MMIO_EXIST: u32 = 0x0000_4000;
pub const MMIO_ALLOCBUF: u32 = 0x0001_0000;

/// `mmioInstallIOProc` modes
pub const MMIO_INSTALLPROC: u32 = 0x0001_0000;
pub const MMIO_GLOBALPROC: u32 = 0x1000_0000;
pub const MMIO_REMOVEPROC: u32 = 0x0002_0000;
pub const MMIO_FINDPROC: u32 = 0x0004_0000;
pub const MMIO_PROC_MODES: u32 = MMIO_INSTALLPROC | MMIO_REMOVEPROC | MMIO_FINDPROC;

/// Seek origins for `MMIOM_SEEK`
pub const SEEK_SET: u32 = 0;
pub const SEEK_CUR: u32 = 1;
pub const SEEK_END: u32 = 2;

/// Pack four characters into a FOURCC, first character in the low byte
pub const fn fourcc(code: &[u8; 4]) -> u32 {
    u32::from_le_bytes(*code)
}

/// Printable form of a FOURCC
pub fn fourcc_name(code: u32) -> String {
    code.to_le_bytes()
        .iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
        .collect()
}

/// Symbolic name of an MMIO message
pub fn message_name(msg: u16) -> &'static str {
    match msg {
        MMIOM_READ => "MMIOM_READ",
        MMIOM_WRITE => "MMIOM_WRITE",
        MMIOM_SEEK => "MMIOM_SEEK",
        MMIOM_OPEN => "MMIOM_OPEN",
        MMIOM_CLOSE => "MMIOM_CLOSE",
        MMIOM_WRITEFLUSH => "MMIOM_WRITEFLUSH",
        MMIOM_RENAME => "MMIOM_RENAME",
        m if m >= MMIOM_USER => "MMIOM_USER",
        _ => "MMIOM_UNKNOWN",
    }
}
