//! Multimedia result codes
//!
//! Every facade in the workspace answers in this domain: `0` is success,
//! `MMSYSERR_*` are generic system errors, `MCIERR_*` start at 256 and
//! `MMIOERR_*` share the same base.

// ============================================================================
// MMSYSERR
// ============================================================================

pub const MMSYSERR_NOERROR: u32 = 0;
pub const MMSYSERR_ERROR: u32 = 1;
pub const MMSYSERR_BADDEVICEID: u32 = 2;
pub const MMSYSERR_INVALHANDLE: u32 = 5;
pub const MMSYSERR_NODRIVER: u32 = 6;
pub const MMSYSERR_NOMEM: u32 = 7;
pub const MMSYSERR_NOTSUPPORTED: u32 = 8;
pub const MMSYSERR_INVALFLAG: u32 = 10;
pub const MMSYSERR_INVALPARAM: u32 = 11;

// ============================================================================
// MCIERR
// ============================================================================

pub const MCIERR_BASE: u32 = 256;
pub const MCIERR_INVALID_DEVICE_ID: u32 = MCIERR_BASE + 1;
pub const MCIERR_UNRECOGNIZED_COMMAND: u32 = MCIERR_BASE + 5;
pub const MCIERR_HARDWARE: u32 = MCIERR_BASE + 6;
pub const MCIERR_INVALID_DEVICE_NAME: u32 = MCIERR_BASE + 7;
pub const MCIERR_OUT_OF_MEMORY: u32 = MCIERR_BASE + 8;
pub const MCIERR_DEVICE_OPEN: u32 = MCIERR_BASE + 9;
pub const MCIERR_PARAM_OVERFLOW: u32 = MCIERR_BASE + 12;
pub const MCIERR_DRIVER_INTERNAL: u32 = MCIERR_BASE + 16;
pub const MCIERR_MISSING_PARAMETER: u32 = MCIERR_BASE + 17;
pub const MCIERR_UNSUPPORTED_FUNCTION: u32 = MCIERR_BASE + 18;
pub const MCIERR_FILE_NOT_FOUND: u32 = MCIERR_BASE + 19;
pub const MCIERR_OUTOFRANGE: u32 = MCIERR_BASE + 26;
pub const MCIERR_NULL_PARAMETER_BLOCK: u32 = MCIERR_BASE + 41;
pub const MCIERR_DEVICE_NOT_INSTALLED: u32 = MCIERR_BASE + 50;

// ============================================================================
// MMIOERR
// ============================================================================

pub const MMIOERR_BASE: u32 = 256;
pub const MMIOERR_FILENOTFOUND: u32 = MMIOERR_BASE + 1;
pub const MMIOERR_OUTOFMEMORY: u32 = MMIOERR_BASE + 2;
pub const MMIOERR_CANNOTOPEN: u32 = MMIOERR_BASE + 3;
pub const MMIOERR_CANNOTCLOSE: u32 = MMIOERR_BASE + 4;
pub const MMIOERR_CANNOTREAD: u32 = MMIOERR_BASE + 5;
pub const MMIOERR_CANNOTWRITE: u32 = MMIOERR_BASE + 6;
pub const MMIOERR_CANNOTSEEK: u32 = MMIOERR_BASE + 7;

/// Symbolic name of an MCI/MMSYSERR result code, for logs and the CLI
///
/// MMIOERR shares its numeric range with MCIERR, so MMIO callers should use
/// [`mmio_error_name`] instead.
pub fn error_name(code: u32) -> &'static str {
    match code {
        MMSYSERR_NOERROR => "MMSYSERR_NOERROR",
        MMSYSERR_ERROR => "MMSYSERR_ERROR",
        MMSYSERR_BADDEVICEID => "MMSYSERR_BADDEVICEID",
        MMSYSERR_INVALHANDLE => "MMSYSERR_INVALHANDLE",
        MMSYSERR_NODRIVER => "MMSYSERR_NODRIVER",
        MMSYSERR_NOMEM => "MMSYSERR_NOMEM",
        MMSYSERR_NOTSUPPORTED => "MMSYSERR_NOTSUPPORTED",
        MMSYSERR_INVALFLAG => "MMSYSERR_INVALFLAG",
        MMSYSERR_INVALPARAM => "MMSYSERR_INVALPARAM",
        MCIERR_INVALID_DEVICE_ID => "MCIERR_INVALID_DEVICE_ID",
        MCIERR_UNRECOGNIZED_COMMAND => "MCIERR_UNRECOGNIZED_COMMAND",
        MCIERR_HARDWARE => "MCIERR_HARDWARE",
        MCIERR_INVALID_DEVICE_NAME => "MCIERR_INVALID_DEVICE_NAME",
        MCIERR_OUT_OF_MEMORY => "MCIERR_OUT_OF_MEMORY",
        MCIERR_DEVICE_OPEN => "MCIERR_DEVICE_OPEN",
        MCIERR_PARAM_OVERFLOW => "MCIERR_PARAM_OVERFLOW",
        MCIERR_DRIVER_INTERNAL => "MCIERR_DRIVER_INTERNAL",
        MCIERR_MISSING_PARAMETER => "MCIERR_MISSING_PARAMETER",
        MCIERR_UNSUPPORTED_FUNCTION => "MCIERR_UNSUPPORTED_FUNCTION",
        MCIERR_FILE_NOT_FOUND => "MCIERR_FILE_NOT_FOUND",
        MCIERR_OUTOFRANGE => "MCIERR_OUTOFRANGE",
        MCIERR_NULL_PARAMETER_BLOCK => "MCIERR_NULL_PARAMETER_BLOCK",
        MCIERR_DEVICE_NOT_INSTALLED => "MCIERR_DEVICE_NOT_INSTALLED",
        _ => "UNKNOWN",
    }
}

/// Symbolic name of an MMIO result code
pub fn mmio_error_name(code: u32) -> &'static str {
    match code {
        MMIOERR_FILENOTFOUND => "MMIOERR_FILENOTFOUND",
        MMIOERR_OUTOFMEMORY => "MMIOERR_OUTOFMEMORY",
        MMIOERR_CANNOTOPEN => "MMIOERR_CANNOTOPEN",
        MMIOERR_CANNOTCLOSE => "MMIOERR_CANNOTCLOSE",
        MMIOERR_CANNOTREAD => "MMIOERR_CANNOTREAD",
        MMIOERR_CANNOTWRITE => "MMIOERR_CANNOTWRITE",
        MMIOERR_CANNOTSEEK => "MMIOERR_CANNOTSEEK",
        other => error_name(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mci_codes_follow_base() {
        assert_eq!(MCIERR_OUT_OF_MEMORY, 264);
        assert_eq!(MCIERR_DRIVER_INTERNAL, 272);
        assert_eq!(error_name(MCIERR_OUT_OF_MEMORY), "MCIERR_OUT_OF_MEMORY");
    }

    #[test]
    fn test_mmio_names_shadow_mci_range() {
        assert_eq!(mmio_error_name(258), "MMIOERR_OUTOFMEMORY");
        assert_eq!(mmio_error_name(MMSYSERR_INVALPARAM), "MMSYSERR_INVALPARAM");
        assert_eq!(error_name(0xdead), "UNKNOWN");
    }
}
