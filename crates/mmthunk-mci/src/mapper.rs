//! 16 -> 32 mapping of the second `mciSendCommand` parameter

use crate::messages::*;
use crate::params::CommandParams;
use crate::shadow::{MarshalContext, ShadowParams};
use crate::{MapError, Result};
use mmthunk_segment::{LinearAddr, SegPtr};

/// What mapping had to do for one parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Null parameter, or a message that carries no structure
    NotNeeded,
    /// Address translation only, nothing to release
    Translated,
    /// A shadow block is held and must be unmapped
    Allocated,
}

/// A mapped parameter, ready to be lent to the driver
#[derive(Debug)]
pub enum MappedParam {
    Untouched(u32),
    Linear(LinearAddr),
    Shadow(ShadowParams),
}

impl MappedParam {
    pub fn disposition(&self) -> Disposition {
        match self {
            MappedParam::Untouched(_) => Disposition::NotNeeded,
            MappedParam::Linear(_) => Disposition::Translated,
            MappedParam::Shadow(_) => Disposition::Allocated,
        }
    }

    /// Borrow the parameter in the shape the driver takes
    pub fn as_params(&mut self) -> CommandParams<'_> {
        match self {
            MappedParam::Untouched(value) => CommandParams::Raw(*value),
            MappedParam::Linear(addr) => CommandParams::Linear(*addr),
            MappedParam::Shadow(shadow) => CommandParams::Wide(shadow.params_mut()),
        }
    }
}

/// Commands whose block has the same layout in both widths
fn is_linear_passthrough(msg: u16, flags: u32) -> bool {
    match msg {
        MCI_CLOSE | MCI_CLOSE_DRIVER | MCI_CONFIGURE | MCI_COPY | MCI_CUE | MCI_CUT
        | MCI_DELETE | MCI_GETDEVCAPS | MCI_PASTE | MCI_PAUSE | MCI_PLAY | MCI_REALIZE
        | MCI_RECORD | MCI_RESUME | MCI_SEEK | MCI_SET | MCI_SPIN | MCI_STEP | MCI_STOP
        | MCI_UPDATE => true,
        // Only the digital-video extensions carry a string or extra input
        MCI_STATUS => flags & (MCI_DGV_STATUS_REFERENCE | MCI_DGV_STATUS_DISKSPACE) == 0,
        _ => false,
    }
}

/// Map `param` (a 16-bit pointer to the command's block) for the driver
pub fn map(ctx: &MarshalContext<'_>, msg: u16, flags: u32, param: SegPtr) -> Result<MappedParam> {
    if param.is_null() {
        return Ok(MappedParam::Untouched(0));
    }

    if is_linear_passthrough(msg, flags) {
        let linear = ctx.space.to_linear(param)?;
        tracing::trace!("{} {} -> {}", message_name(msg), param, linear);
        return Ok(MappedParam::Linear(linear));
    }

    if is_driver_message(msg) {
        return Ok(MappedParam::Untouched(param.0));
    }

    match ShadowParams::build(ctx, msg, flags, param) {
        Ok(Some(shadow)) => {
            tracing::trace!(
                "{} {} shadowed (flags {:#010x})",
                message_name(msg),
                param,
                flags
            );
            Ok(MappedParam::Shadow(shadow))
        }
        Ok(None) => {
            tracing::warn!("Don't know how to map {} ({:#06x})", message_name(msg), msg);
            Err(MapError::UnknownMessage(msg))
        }
        Err(e) => {
            tracing::debug!("Mapping {} failed: {}", message_name(msg), e);
            Err(e)
        }
    }
}

/// Undo [`map`]: copy outputs back and release any shadow
///
/// Parameters that were not shadowed are left alone.
pub fn unmap(
    ctx: &MarshalContext<'_>,
    msg: u16,
    flags: u32,
    mapped: Option<MappedParam>,
    result: u32,
) -> Result<()> {
    match mapped {
        Some(MappedParam::Shadow(shadow)) => {
            tracing::trace!(
                "Unmapping {} at {} (result {})",
                message_name(msg),
                shadow.origin(),
                result
            );
            shadow.unmap(ctx, flags, result)
        }
        Some(_) | None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout;
    use mmthunk_segment::{AddressSpace, Codec, NativeHeap};

    struct Fixture {
        space: AddressSpace,
        heap: NativeHeap,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                space: AddressSpace::default(),
                heap: NativeHeap::new(),
            }
        }

        fn ctx(&self) -> MarshalContext<'_> {
            MarshalContext::new(&self.space, &self.heap, Codec::default())
        }
    }

    #[test]
    fn test_passthrough_translates_address() {
        let fx = Fixture::new();
        let block = fx.space.alloc_segment(16).unwrap();
        let mapped = map(&fx.ctx(), MCI_PLAY, MCI_FROM, block).unwrap();
        assert_eq!(mapped.disposition(), Disposition::Translated);
        assert!(matches!(mapped, MappedParam::Linear(addr) if addr == fx.space.to_linear(block).unwrap()));
        assert_eq!(fx.heap.stats().allocations, 0);
    }

    #[test]
    fn test_plain_status_is_translated_but_dgv_status_is_shadowed() {
        let fx = Fixture::new();
        let block = fx.space.alloc_segment(layout::status::SIZE as usize).unwrap();
        let plain = map(&fx.ctx(), MCI_STATUS, MCI_STATUS_ITEM, block).unwrap();
        assert_eq!(plain.disposition(), Disposition::Translated);

        let dgv = map(&fx.ctx(), MCI_STATUS, MCI_DGV_STATUS_REFERENCE, block).unwrap();
        assert_eq!(dgv.disposition(), Disposition::Allocated);
        unmap(&fx.ctx(), MCI_STATUS, MCI_DGV_STATUS_REFERENCE, Some(dgv), 0).unwrap();
        assert_eq!(fx.heap.stats().live(), 0);
    }

    #[test]
    fn test_driver_messages_are_not_mapped() {
        let fx = Fixture::new();
        let mapped = map(&fx.ctx(), DRV_QUERYCONFIGURE, 0, SegPtr(0x1234)).unwrap();
        assert!(matches!(mapped, MappedParam::Untouched(0x1234)));
    }

    #[test]
    fn test_unknown_message_is_rejected() {
        let fx = Fixture::new();
        let block = fx.space.alloc_segment(16).unwrap();
        assert_eq!(
            map(&fx.ctx(), MCI_LOAD, 0, block).unwrap_err(),
            MapError::UnknownMessage(MCI_LOAD)
        );
    }

    #[test]
    fn test_bad_pointer_is_a_fault() {
        let fx = Fixture::new();
        let err = map(&fx.ctx(), MCI_INFO, 0, SegPtr::new(0x0fff, 0)).unwrap_err();
        assert!(matches!(err, MapError::Fault(_)));
    }

    #[test]
    fn test_unmap_tolerates_missing_param() {
        let fx = Fixture::new();
        unmap(&fx.ctx(), MCI_INFO, 0, None, 0).unwrap();
        unmap(&fx.ctx(), MCI_PLAY, 0, Some(MappedParam::Untouched(0)), 5).unwrap();
    }
}
