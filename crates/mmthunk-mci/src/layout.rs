//! Field offsets of the 16-bit MCI parameter blocks (packed, little-endian)
//!
//! Every block starts with a 32-bit `dwCallback`. Handles are 16-bit words
//! padded to a dword; string pointers are 16:16 segmented pointers.

pub const CALLBACK: u32 = 0;

/// Largest buffer a 16-bit caller can describe with one segment
pub const MAX_FOREIGN_BUFFER: u32 = 0x1_0000;

/// `MCI_OPEN_PARMS16`, optionally followed by an 8-byte extension
pub mod open {
    pub const DEVICE_ID: u32 = 4;
    pub const DEVICE_TYPE: u32 = 8;
    pub const ELEMENT_NAME: u32 = 12;
    pub const ALIAS: u32 = 16;
    pub const SIZE: u32 = 20;
    /// `dwStyle` + `hWndParent`, present when the high word of the flags is set.
    /// `MCI_WAVE_OPEN_PARMS16` carries only the first dword.
    pub const EXTENSION: u32 = SIZE;
    pub const EXTENSION_SIZE: u32 = 8;
}

/// `MCI_INFO_PARMS16` / `MCI_DGV_INFO_PARMS16`
pub mod info {
    pub const RETURN: u32 = 4;
    pub const RET_SIZE: u32 = 8;
    /// Only present in the digital-video variant
    pub const ITEM: u32 = 12;
}

/// `MCI_SYSINFO_PARMS16`
pub mod sysinfo {
    pub const RETURN: u32 = 4;
    pub const RET_SIZE: u32 = 8;
    pub const NUMBER: u32 = 12;
    pub const DEVICE_TYPE: u32 = 16;
    pub const SIZE: u32 = 20;
}

/// `MCI_BREAK_PARMS16`
pub mod brk {
    pub const VIRT_KEY: u32 = 4;
    pub const HWND_BREAK: u32 = 8;
    pub const SIZE: u32 = 12;
}

/// `MCI_VD_ESCAPE_PARMS16` and `MCI_SOUND_PARMS16` share this shape
pub mod string_block {
    pub const STRING: u32 = 4;
    pub const SIZE: u32 = 8;
}

/// `MCI_DGV_RECT_PARMS16`: a `RECT16` of four signed words
pub mod rect {
    pub const LEFT: u32 = 4;
    pub const TOP: u32 = 6;
    pub const RIGHT: u32 = 8;
    pub const BOTTOM: u32 = 10;
    pub const SIZE: u32 = 12;
}

/// `MCI_DGV_STATUS_PARMS16`
pub mod status {
    pub const RETURN: u32 = 4;
    pub const ITEM: u32 = 8;
    pub const TRACK: u32 = 12;
    pub const DRIVE: u32 = 16;
    pub const REFERENCE: u32 = 20;
    pub const SIZE: u32 = 24;
}

/// `MCI_OVLY_WINDOW_PARMS16`
pub mod window {
    pub const HWND: u32 = 4;
    pub const CMD_SHOW: u32 = 8;
    pub const TEXT: u32 = 12;
    pub const SIZE: u32 = 16;
}

/// Plain `MCI_STATUS_PARMS` / `MCI_PLAY_PARMS` / `MCI_SEEK_PARMS`, which
/// are identical in both widths and travel by address translation only
pub mod generic {
    pub const STATUS_RETURN: u32 = 4;
    pub const STATUS_ITEM: u32 = 8;
    pub const PLAY_FROM: u32 = 4;
    pub const PLAY_TO: u32 = 8;
    pub const SEEK_TO: u32 = 4;
}
