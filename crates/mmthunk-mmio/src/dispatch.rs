//! Calls into 16-bit IO procedures on behalf of the native MMIO layer

use crate::info::MmioInfo;
use crate::messages::{
    message_name, MMIOM_OPEN, MMIOM_READ, MMIOM_RENAME, MMIOM_WRITE, MMIOM_WRITEFLUSH,
};
use crate::{IoProcOwner, MessageParam, MmioError, Result};
use mmthunk_common::codes::MMSYSERR_INVALPARAM;
use mmthunk_registry::{Callback16, ThunkAddr, ThunkRecord, ThunkRegistry};
use mmthunk_segment::{AddressSpace, SegPtr};
use std::sync::Arc;

/// Foreign memory borrowed for one IO-procedure call
///
/// Dropping it releases every alias and the temporary `MMIOINFO16`, whichever
/// way the call ends.
struct Scratch<'a> {
    space: &'a AddressSpace,
    block: SegPtr,
    aliases: Vec<SegPtr>,
}

impl<'a> Scratch<'a> {
    fn new(space: &'a AddressSpace, image: &[u8]) -> Result<Self> {
        let block = space.alloc_segment_with(image)?;
        Ok(Self {
            space,
            block,
            aliases: Vec::new(),
        })
    }

    /// 16:16 view of a native buffer of `len` bytes
    fn alias(&mut self, param: MessageParam, len: usize) -> Result<u32> {
        let Some(addr) = param.linear() else {
            return Ok(param.value());
        };
        let ptr = self.space.to_foreign(addr, len)?;
        self.aliases.push(ptr);
        Ok(ptr.0)
    }

    /// 16:16 view of a native string, terminator included
    fn alias_str(&mut self, param: MessageParam) -> Result<u32> {
        let len = match param.linear() {
            Some(addr) => self.space.read_cstr(addr)?.len() + 1,
            None => 0,
        };
        self.alias(param, len)
    }
}

impl Drop for Scratch<'_> {
    fn drop(&mut self) {
        for alias in self.aliases.drain(..) {
            if let Err(e) = self.space.unreserve(alias) {
                tracing::warn!("Could not release alias {}: {}", alias, e);
            }
        }
        if let Err(e) = self.space.free_segment(self.block) {
            tracing::warn!("Could not free MMIOINFO16 at {}: {}", self.block, e);
        }
    }
}

fn split(value: u32) -> [u16; 2] {
    [(value >> 16) as u16, value as u16]
}

/// Resolves IO-procedure addresses and performs the 32 -> 16 call
pub struct IoProcDispatcher {
    space: Arc<AddressSpace>,
    registry: Arc<ThunkRegistry<IoProcOwner>>,
    caller: Arc<dyn Callback16>,
}

impl IoProcDispatcher {
    pub fn new(
        space: Arc<AddressSpace>,
        registry: Arc<ThunkRegistry<IoProcOwner>>,
        caller: Arc<dyn Callback16>,
    ) -> Self {
        Self {
            space,
            registry,
            caller,
        }
    }

    /// Run the IO procedure behind `addr` as `proc(lpmmioinfo, msg, lp1, lp2)`
    ///
    /// `info` is presented to the procedure as a temporary `MMIOINFO16`; the
    /// disk offset and shared info words it leaves there are copied back.
    pub fn dispatch(
        &self,
        addr: ThunkAddr,
        info: &mut MmioInfo,
        msg: u16,
        lp1: MessageParam,
        lp2: MessageParam,
    ) -> i32 {
        let Some(record) = self.registry.find_by_callable(addr) else {
            tracing::warn!("{} for {}: {}", message_name(msg), addr, MmioError::NoProcedure(addr));
            return MMSYSERR_INVALPARAM as i32;
        };

        match self.call(&record, info, msg, lp1, lp2) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("{} not delivered to {}: {}", message_name(msg), record.target(), e);
                e.code() as i32
            }
        }
    }

    fn call(
        &self,
        record: &ThunkRecord<IoProcOwner>,
        info: &mut MmioInfo,
        msg: u16,
        lp1: MessageParam,
        lp2: MessageParam,
    ) -> Result<i32> {
        let mut scratch = Scratch::new(&self.space, &info.foreign_image(record.target()))?;

        let (arg1, arg2) = match msg {
            MMIOM_READ | MMIOM_WRITE | MMIOM_WRITEFLUSH => {
                (scratch.alias(lp1, lp2.value() as usize)?, lp2.value())
            }
            MMIOM_OPEN => (scratch.alias_str(lp1)?, lp2.value()),
            MMIOM_RENAME => (scratch.alias_str(lp1)?, scratch.alias_str(lp2)?),
            _ => (lp1.value(), lp2.value()),
        };

        let [block_hi, block_lo] = split(scratch.block.0);
        let [lp1_hi, lp1_lo] = split(arg1);
        let [lp2_hi, lp2_lo] = split(arg2);
        let args = [block_hi, block_lo, msg, lp1_hi, lp1_lo, lp2_hi, lp2_lo];

        tracing::trace!(
            "{} -> {} (lp1 {:#010x}, lp2 {:#010x})",
            message_name(msg),
            record.target(),
            arg1,
            arg2
        );
        let result = self.caller.call16(record.target(), &args) as i32;

        let base = self.space.to_linear(scratch.block)?;
        info.read_shared(&self.space, base)?;
        Ok(result)
    }
}
