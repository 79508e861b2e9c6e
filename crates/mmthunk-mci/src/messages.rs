//! MCI command codes, installable-driver messages and the flag bits the
//! marshalling layer inspects

// ============================================================================
// Commands
// ============================================================================

pub const MCI_OPEN_DRIVER: u16 = 0x0801;
pub const MCI_CLOSE_DRIVER: u16 = 0x0802;
pub const MCI_OPEN: u16 = 0x0803;
pub const MCI_CLOSE: u16 = 0x0804;
pub const MCI_ESCAPE: u16 = 0x0805;
pub const MCI_PLAY: u16 = 0x0806;
pub const MCI_SEEK: u16 = 0x0807;
pub const MCI_STOP: u16 = 0x0808;
pub const MCI_PAUSE: u16 = 0x0809;
pub const MCI_INFO: u16 = 0x080A;
pub const MCI_GETDEVCAPS: u16 = 0x080B;
pub const MCI_SPIN: u16 = 0x080C;
pub const MCI_SET: u16 = 0x080D;
pub const MCI_STEP: u16 = 0x080E;
pub const MCI_RECORD: u16 = 0x080F;
pub const MCI_SYSINFO: u16 = 0x0810;
pub const MCI_BREAK: u16 = 0x0811;
pub const MCI_SOUND: u16 = 0x0812;
pub const MCI_SAVE: u16 = 0x0813;
pub const MCI_STATUS: u16 = 0x0814;
pub const MCI_CUE: u16 = 0x0830;
pub const MCI_REALIZE: u16 = 0x0840;
pub const MCI_WINDOW: u16 = 0x0841;
pub const MCI_PUT: u16 = 0x0842;
pub const MCI_WHERE: u16 = 0x0843;
pub const MCI_FREEZE: u16 = 0x0844;
pub const MCI_UNFREEZE: u16 = 0x0845;
pub const MCI_LOAD: u16 = 0x0850;
pub const MCI_CUT: u16 = 0x0851;
pub const MCI_COPY: u16 = 0x0852;
pub const MCI_PASTE: u16 = 0x0853;
pub const MCI_UPDATE: u16 = 0x0854;
pub const MCI_RESUME: u16 = 0x0855;
pub const MCI_DELETE: u16 = 0x0856;
pub const MCI_CONFIGURE: u16 = 0x087A;

// ============================================================================
// Installable driver messages
// ============================================================================

pub const DRV_LOAD: u16 = 0x0001;
pub const DRV_ENABLE: u16 = 0x0002;
pub const DRV_OPEN: u16 = 0x0003;
pub const DRV_CLOSE: u16 = 0x0004;
pub const DRV_DISABLE: u16 = 0x0005;
pub const DRV_FREE: u16 = 0x0006;
pub const DRV_CONFIGURE: u16 = 0x0007;
pub const DRV_QUERYCONFIGURE: u16 = 0x0008;
pub const DRV_INSTALL: u16 = 0x0009;
pub const DRV_REMOVE: u16 = 0x000A;
pub const DRV_EXITSESSION: u16 = 0x000B;
pub const DRV_EXITAPPLICATION: u16 = 0x000C;
pub const DRV_POWER: u16 = 0x000F;

// ============================================================================
// Flags
// ============================================================================

pub const MCI_NOTIFY: u32 = 0x0000_0001;
pub const MCI_WAIT: u32 = 0x0000_0002;
pub const MCI_FROM: u32 = 0x0000_0004;
pub const MCI_TO: u32 = 0x0000_0008;

pub const MCI_OPEN_SHAREABLE: u32 = 0x0000_0100;
pub const MCI_OPEN_ELEMENT: u32 = 0x0000_0200;
pub const MCI_OPEN_ALIAS: u32 = 0x0000_0400;
pub const MCI_OPEN_ELEMENT_ID: u32 = 0x0000_0800;
pub const MCI_OPEN_TYPE_ID: u32 = 0x0000_1000;
pub const MCI_OPEN_TYPE: u32 = 0x0000_2000;
/// `dwBufferSeconds` of `MCI_WAVE_OPEN_PARMS16` is valid
pub const MCI_WAVE_OPEN_BUFFER: u32 = 0x0001_0000;

pub const MCI_STATUS_ITEM: u32 = 0x0000_0100;
pub const MCI_STATUS_LENGTH: u32 = 0x0000_0001;
pub const MCI_STATUS_POSITION: u32 = 0x0000_0002;
pub const MCI_STATUS_MODE: u32 = 0x0000_0004;
pub const MCI_STATUS_READY: u32 = 0x0000_0007;

pub const MCI_INFO_PRODUCT: u32 = 0x0000_0100;
pub const MCI_INFO_FILE: u32 = 0x0000_0200;

pub const MCI_SYSINFO_QUANTITY: u32 = 0x0000_0100;
pub const MCI_SYSINFO_OPEN: u32 = 0x0000_0200;
pub const MCI_SYSINFO_NAME: u32 = 0x0000_0400;

pub const MCI_SOUND_NAME: u32 = 0x0000_0100;

pub const MCI_DGV_INFO_ITEM: u32 = 0x0002_0000;
pub const MCI_DGV_STATUS_REFERENCE: u32 = 0x0004_0000;
pub const MCI_DGV_WINDOW_TEXT: u32 = 0x0008_0000;
pub const MCI_DGV_STATUS_DISKSPACE: u32 = 0x0020_0000;

/// Device id addressing every open device at once
pub const MCI_ALL_DEVICE_ID: u16 = 0xFFFF;

const MCI_STRING_OFFSET: u32 = 512;
pub const MCI_MODE_NOT_READY: u32 = MCI_STRING_OFFSET + 12;
pub const MCI_MODE_STOP: u32 = MCI_STRING_OFFSET + 13;
pub const MCI_MODE_PLAY: u32 = MCI_STRING_OFFSET + 14;
pub const MCI_MODE_PAUSE: u32 = MCI_STRING_OFFSET + 17;

/// Symbolic name of an MCI command or driver message
pub fn message_name(msg: u16) -> &'static str {
    match msg {
        DRV_LOAD => "DRV_LOAD",
        DRV_ENABLE => "DRV_ENABLE",
        DRV_OPEN => "DRV_OPEN",
        DRV_CLOSE => "DRV_CLOSE",
        DRV_DISABLE => "DRV_DISABLE",
        DRV_FREE => "DRV_FREE",
        DRV_CONFIGURE => "DRV_CONFIGURE",
        DRV_QUERYCONFIGURE => "DRV_QUERYCONFIGURE",
        DRV_INSTALL => "DRV_INSTALL",
        DRV_REMOVE => "DRV_REMOVE",
        DRV_EXITSESSION => "DRV_EXITSESSION",
        DRV_EXITAPPLICATION => "DRV_EXITAPPLICATION",
        DRV_POWER => "DRV_POWER",
        MCI_OPEN_DRIVER => "MCI_OPEN_DRIVER",
        MCI_CLOSE_DRIVER => "MCI_CLOSE_DRIVER",
        MCI_OPEN => "MCI_OPEN",
        MCI_CLOSE => "MCI_CLOSE",
        MCI_ESCAPE => "MCI_ESCAPE",
        MCI_PLAY => "MCI_PLAY",
        MCI_SEEK => "MCI_SEEK",
        MCI_STOP => "MCI_STOP",
        MCI_PAUSE => "MCI_PAUSE",
        MCI_INFO => "MCI_INFO",
        MCI_GETDEVCAPS => "MCI_GETDEVCAPS",
        MCI_SPIN => "MCI_SPIN",
        MCI_SET => "MCI_SET",
        MCI_STEP => "MCI_STEP",
        MCI_RECORD => "MCI_RECORD",
        MCI_SYSINFO => "MCI_SYSINFO",
        MCI_BREAK => "MCI_BREAK",
        MCI_SOUND => "MCI_SOUND",
        MCI_SAVE => "MCI_SAVE",
        MCI_STATUS => "MCI_STATUS",
        MCI_CUE => "MCI_CUE",
        MCI_REALIZE => "MCI_REALIZE",
        MCI_WINDOW => "MCI_WINDOW",
        MCI_PUT => "MCI_PUT",
        MCI_WHERE => "MCI_WHERE",
        MCI_FREEZE => "MCI_FREEZE",
        MCI_UNFREEZE => "MCI_UNFREEZE",
        MCI_LOAD => "MCI_LOAD",
        MCI_CUT => "MCI_CUT",
        MCI_COPY => "MCI_COPY",
        MCI_PASTE => "MCI_PASTE",
        MCI_UPDATE => "MCI_UPDATE",
        MCI_RESUME => "MCI_RESUME",
        MCI_DELETE => "MCI_DELETE",
        MCI_CONFIGURE => "MCI_CONFIGURE",
        _ => "UNKNOWN",
    }
}

/// Installable-driver housekeeping messages, which carry no MCI structure
pub fn is_driver_message(msg: u16) -> bool {
    matches!(
        msg,
        DRV_LOAD
            | DRV_ENABLE
            | DRV_OPEN
            | DRV_CLOSE
            | DRV_DISABLE
            | DRV_FREE
            | DRV_CONFIGURE
            | DRV_QUERYCONFIGURE
            | DRV_INSTALL
            | DRV_REMOVE
            | DRV_EXITSESSION
            | DRV_EXITAPPLICATION
            | DRV_POWER
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_names() {
        assert_eq!(message_name(MCI_OPEN), "MCI_OPEN");
        assert_eq!(message_name(0x087A), "MCI_CONFIGURE");
        assert_eq!(message_name(DRV_POWER), "DRV_POWER");
        assert_eq!(message_name(0x0D00), "UNKNOWN");
    }

    #[test]
    fn test_driver_message_range_has_gaps() {
        assert!(is_driver_message(DRV_EXITAPPLICATION));
        assert!(!is_driver_message(0x000D));
        assert!(!is_driver_message(MCI_OPEN));
    }
}
