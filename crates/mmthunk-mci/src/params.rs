//! Native (wide) parameter blocks handed to the MCI driver

use mmthunk_segment::{wide_to_string, HeapBox, HeapVec, LinearAddr};

/// A string slot of a native block
///
/// Fields whose conversion is gated by a flag keep the untouched 16-bit
/// value when the flag is clear (a resource id, or a pointer the driver
/// must not follow). Only `Wide` owns memory.
#[derive(Debug)]
pub enum StrField {
    Raw(u32),
    Wide(HeapVec<u16>),
}

impl StrField {
    pub fn wide(&self) -> Option<&[u16]> {
        match self {
            StrField::Wide(text) => Some(text),
            StrField::Raw(_) => None,
        }
    }

    pub fn raw(&self) -> Option<u32> {
        match self {
            StrField::Raw(value) => Some(*value),
            StrField::Wide(_) => None,
        }
    }

    pub fn is_converted(&self) -> bool {
        matches!(self, StrField::Wide(_))
    }

    /// Converted text without its terminator
    pub fn text(&self) -> Option<String> {
        self.wide().map(wide_to_string)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

#[derive(Debug)]
pub struct MciRectParams {
    pub callback: u32,
    pub rect: Rect,
}

#[derive(Debug)]
pub struct MciStatusParams {
    pub callback: u32,
    pub ret: u32,
    pub item: u32,
    pub track: u32,
    pub drive: StrField,
    pub reference: u32,
}

#[derive(Debug)]
pub struct MciWindowParams {
    pub callback: u32,
    pub hwnd: u32,
    pub cmd_show: u32,
    pub text: StrField,
}

#[derive(Debug)]
pub struct MciBreakParams {
    pub callback: u32,
    pub virt_key: i32,
    pub hwnd_break: u32,
}

#[derive(Debug)]
pub struct MciEscapeParams {
    pub callback: u32,
    pub command: StrField,
}

#[derive(Debug)]
pub struct MciInfoParams {
    pub callback: u32,
    /// Output buffer of `ret_size` wide units, zeroed
    pub ret: HeapVec<u16>,
    pub ret_size: u32,
    pub item: u32,
}

#[derive(Debug)]
pub struct MciOpenParams {
    pub callback: u32,
    pub device_id: u16,
    pub device_type: StrField,
    pub element_name: StrField,
    pub alias: StrField,
    /// `dwStyle` and `hWndParent` of the window-capable variants
    pub extension: Option<[u32; 2]>,
}

#[derive(Debug)]
pub enum SysInfoReturn {
    Quantity(HeapBox<u32>),
    Text(HeapVec<u16>),
}

#[derive(Debug)]
pub struct MciSysInfoParams {
    pub callback: u32,
    pub ret: SysInfoReturn,
    pub ret_size: u32,
    pub number: u32,
    pub device_type: u16,
}

#[derive(Debug)]
pub struct MciSoundParams {
    pub callback: u32,
    pub sound_name: StrField,
}

/// Borrowed view of whichever native block a shadow holds
#[derive(Debug)]
pub enum WideParams<'a> {
    Rect(&'a mut MciRectParams),
    Status(&'a mut MciStatusParams),
    Window(&'a mut MciWindowParams),
    Break(&'a mut MciBreakParams),
    Escape(&'a mut MciEscapeParams),
    Info(&'a mut MciInfoParams),
    Open(&'a mut MciOpenParams),
    SysInfo(&'a mut MciSysInfoParams),
    Sound(&'a mut MciSoundParams),
}

/// The second parameter as the driver receives it
#[derive(Debug)]
pub enum CommandParams<'a> {
    /// Forwarded unchanged (null, or a driver message value)
    Raw(u32),
    /// A 16-bit block with the same layout in both widths, translated in place
    Linear(LinearAddr),
    /// A native block built for this call
    Wide(WideParams<'a>),
}

impl CommandParams<'_> {
    pub fn is_null(&self) -> bool {
        matches!(self, CommandParams::Raw(0))
    }
}

/// Copy `text` into a wide output buffer, truncating and terminating
pub fn fill_wide(buffer: &mut [u16], text: &str) {
    let Some(room) = buffer.len().checked_sub(1) else {
        return;
    };
    let mut written = 0;
    for (dst, unit) in buffer.iter_mut().zip(text.encode_utf16().take(room)) {
        *dst = unit;
        written += 1;
    }
    buffer[written] = 0;
}

#[cfg(test)]
mod tests {
    use super::*;
    use mmthunk_segment::NativeHeap;

    #[test]
    fn test_fill_wide_truncates() {
        let mut buf = [0xFFFFu16; 4];
        fill_wide(&mut buf, "sequencer");
        assert_eq!(buf, [b's' as u16, b'e' as u16, b'q' as u16, 0]);

        let mut empty: [u16; 0] = [];
        fill_wide(&mut empty, "x");
    }

    #[test]
    fn test_str_field_views() {
        let heap = NativeHeap::new();
        let mut buf = heap.alloc_slice::<u16>(4).unwrap();
        fill_wide(&mut buf, "cd");
        let field = StrField::Wide(buf);
        assert_eq!(field.text().as_deref(), Some("cd"));
        assert_eq!(field.raw(), None);

        let raw = StrField::Raw(0x0001_0002);
        assert!(!raw.is_converted());
        assert_eq!(raw.raw(), Some(0x0001_0002));
    }
}
