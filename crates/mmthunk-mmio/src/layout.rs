//! `MMIOINFO16` field offsets (packed, little-endian)

pub const FLAGS: u32 = 0;
pub const FCC_IO_PROC: u32 = 4;
/// 16:16 pointer to the 16-bit IO procedure, null for the built-in ones
pub const IO_PROC: u32 = 8;
pub const ERROR_RET: u32 = 12;
pub const TASK: u32 = 14;
pub const BUFFER_LEN: u32 = 16;
pub const BUFFER: u32 = 20;
pub const NEXT: u32 = 24;
pub const END_READ: u32 = 28;
pub const END_WRITE: u32 = 32;
pub const BUF_OFFSET: u32 = 36;
pub const DISK_OFFSET: u32 = 40;
pub const INFO: u32 = 44;
pub const RESERVED1: u32 = 60;
pub const RESERVED2: u32 = 64;
pub const HMMIO: u32 = 68;
pub const SIZE: u32 = 70;

/// `adwInfo` entries shared with a 16-bit IO procedure; the last one is
/// private to the native layer
pub const SHARED_INFO_WORDS: usize = 3;
