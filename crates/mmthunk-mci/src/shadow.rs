//! Shadow blocks: native copies of 16-bit parameter blocks
//!
//! Each block kind implements [`Marshal`], a map/unmap pair. Mapping reads
//! the 16-bit block and builds the native one, converting flagged strings;
//! unmapping copies outputs back. Memory is owned by the native heap
//! wrappers, so dropping a block (or a half-built one) frees exactly what
//! was allocated.

use crate::layout::{self, MAX_FOREIGN_BUFFER};
use crate::messages::*;
use crate::params::*;
use crate::Result;
use mmthunk_segment::{
    AddressSpace, Codec, HeapBox, HeapVec, LinearAddr, NativeHeap, SegPtr, SegmentError,
};

/// Services a map/unmap pair needs
#[derive(Clone, Copy)]
pub struct MarshalContext<'a> {
    pub space: &'a AddressSpace,
    pub heap: &'a NativeHeap,
    pub codec: Codec,
}

impl<'a> MarshalContext<'a> {
    pub fn new(space: &'a AddressSpace, heap: &'a NativeHeap, codec: Codec) -> Self {
        Self { space, heap, codec }
    }

    fn u32_at(&self, base: LinearAddr, offset: u32) -> Result<u32> {
        Ok(self.space.read_u32(base.add(offset))?)
    }

    fn u16_at(&self, base: LinearAddr, offset: u32) -> Result<u16> {
        Ok(self.space.read_u16(base.add(offset))?)
    }

    fn i16_at(&self, base: LinearAddr, offset: u32) -> Result<i16> {
        Ok(self.space.read_i16(base.add(offset))?)
    }

    /// Recode the 16-bit string at `ptr`; a null pointer stays null
    fn dup_str(&self, ptr: u32) -> Result<StrField> {
        if ptr == 0 {
            return Ok(StrField::Raw(0));
        }
        let wide = self.codec.dup_foreign(self.space, self.heap, SegPtr(ptr))?;
        Ok(StrField::Wide(wide))
    }

    /// Convert the string at `ptr` only when `convert` holds
    fn str_if(&self, convert: bool, ptr: u32) -> Result<StrField> {
        if convert {
            self.dup_str(ptr)
        } else {
            Ok(StrField::Raw(ptr))
        }
    }

    fn out_buffer(&self, units: u32) -> Result<HeapVec<u16>> {
        Ok(self
            .heap
            .alloc_slice::<u16>(units.min(MAX_FOREIGN_BUFFER) as usize)?)
    }

    /// Narrow `wide` into the 16-bit buffer at `ptr` of `capacity` bytes
    fn store_str(&self, ptr: u32, capacity: u32, wide: &[u16]) -> Result<()> {
        let dst = self.space.to_linear(SegPtr(ptr))?;
        self.codec
            .store_narrow(self.space, dst, capacity as usize, wide)?;
        Ok(())
    }
}

/// A native block together with the address of the 16-bit block it shadows
#[derive(Debug)]
pub struct ShadowBlock<P> {
    origin: SegPtr,
    params: P,
}

impl<P> ShadowBlock<P> {
    pub fn origin(&self) -> SegPtr {
        self.origin
    }

    pub fn params(&self) -> &P {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut P {
        &mut self.params
    }
}

pub type Shadow<P> = HeapBox<ShadowBlock<P>>;

/// Map/unmap pair of one block kind
pub(crate) trait Marshal: Sized {
    /// Build the native block from the 16-bit block at `src`
    fn map(ctx: &MarshalContext<'_>, flags: u32, src: LinearAddr) -> Result<Self>;

    /// Copy outputs back to the 16-bit block at `dst`
    fn unmap(&self, ctx: &MarshalContext<'_>, flags: u32, dst: LinearAddr, result: u32)
        -> Result<()>;
}

fn shadow<P: Marshal>(ctx: &MarshalContext<'_>, flags: u32, origin: SegPtr) -> Result<Shadow<P>> {
    let src = ctx.space.to_linear(origin)?;
    let params = P::map(ctx, flags, src)?;
    Ok(ctx.heap.alloc(ShadowBlock { origin, params })?)
}

fn unshadow<P: Marshal>(
    ctx: &MarshalContext<'_>,
    flags: u32,
    block: Shadow<P>,
    result: u32,
) -> Result<()> {
    let dst = ctx.space.to_linear(block.origin)?;
    block.params.unmap(ctx, flags, dst, result)
}

// ============================================================================
// Block kinds
// ============================================================================

impl Marshal for MciRectParams {
    fn map(ctx: &MarshalContext<'_>, _flags: u32, src: LinearAddr) -> Result<Self> {
        Ok(Self {
            callback: ctx.u32_at(src, layout::CALLBACK)?,
            rect: Rect {
                left: ctx.i16_at(src, layout::rect::LEFT)? as i32,
                top: ctx.i16_at(src, layout::rect::TOP)? as i32,
                right: ctx.i16_at(src, layout::rect::RIGHT)? as i32,
                bottom: ctx.i16_at(src, layout::rect::BOTTOM)? as i32,
            },
        })
    }

    fn unmap(&self, ctx: &MarshalContext<'_>, _flags: u32, dst: LinearAddr, _result: u32) -> Result<()> {
        let space = ctx.space;
        space.write_i16(dst.add(layout::rect::LEFT), self.rect.left as i16)?;
        space.write_i16(dst.add(layout::rect::TOP), self.rect.top as i16)?;
        space.write_i16(dst.add(layout::rect::RIGHT), self.rect.right as i16)?;
        space.write_i16(dst.add(layout::rect::BOTTOM), self.rect.bottom as i16)?;
        Ok(())
    }
}

impl Marshal for MciStatusParams {
    fn map(ctx: &MarshalContext<'_>, flags: u32, src: LinearAddr) -> Result<Self> {
        use layout::status::*;
        let reference = if flags & MCI_DGV_STATUS_REFERENCE != 0 {
            ctx.u32_at(src, REFERENCE)?
        } else {
            0
        };
        Ok(Self {
            callback: ctx.u32_at(src, layout::CALLBACK)?,
            ret: ctx.u32_at(src, RETURN)?,
            item: ctx.u32_at(src, ITEM)?,
            track: ctx.u32_at(src, TRACK)?,
            drive: ctx.str_if(
                flags & MCI_DGV_STATUS_DISKSPACE != 0,
                ctx.u32_at(src, DRIVE)?,
            )?,
            reference,
        })
    }

    fn unmap(&self, ctx: &MarshalContext<'_>, _flags: u32, dst: LinearAddr, result: u32) -> Result<()> {
        if result == 0 {
            ctx.space
                .write_u32(dst.add(layout::status::RETURN), self.ret)?;
        }
        Ok(())
    }
}

impl Marshal for MciWindowParams {
    fn map(ctx: &MarshalContext<'_>, flags: u32, src: LinearAddr) -> Result<Self> {
        use layout::window::*;
        Ok(Self {
            callback: ctx.u32_at(src, layout::CALLBACK)?,
            hwnd: ctx.u16_at(src, HWND)? as u32,
            cmd_show: ctx.u16_at(src, CMD_SHOW)? as u32,
            text: ctx.str_if(flags & MCI_DGV_WINDOW_TEXT != 0, ctx.u32_at(src, TEXT)?)?,
        })
    }

    fn unmap(&self, _ctx: &MarshalContext<'_>, _flags: u32, _dst: LinearAddr, _result: u32) -> Result<()> {
        Ok(())
    }
}

impl Marshal for MciBreakParams {
    fn map(ctx: &MarshalContext<'_>, _flags: u32, src: LinearAddr) -> Result<Self> {
        Ok(Self {
            callback: ctx.u32_at(src, layout::CALLBACK)?,
            virt_key: ctx.i16_at(src, layout::brk::VIRT_KEY)? as i32,
            hwnd_break: ctx.u16_at(src, layout::brk::HWND_BREAK)? as u32,
        })
    }

    fn unmap(&self, _ctx: &MarshalContext<'_>, _flags: u32, _dst: LinearAddr, _result: u32) -> Result<()> {
        Ok(())
    }
}

impl Marshal for MciEscapeParams {
    fn map(ctx: &MarshalContext<'_>, _flags: u32, src: LinearAddr) -> Result<Self> {
        Ok(Self {
            callback: ctx.u32_at(src, layout::CALLBACK)?,
            command: ctx.dup_str(ctx.u32_at(src, layout::string_block::STRING)?)?,
        })
    }

    fn unmap(&self, _ctx: &MarshalContext<'_>, _flags: u32, _dst: LinearAddr, _result: u32) -> Result<()> {
        Ok(())
    }
}

impl Marshal for MciSoundParams {
    fn map(ctx: &MarshalContext<'_>, _flags: u32, src: LinearAddr) -> Result<Self> {
        Ok(Self {
            callback: ctx.u32_at(src, layout::CALLBACK)?,
            sound_name: ctx.dup_str(ctx.u32_at(src, layout::string_block::STRING)?)?,
        })
    }

    fn unmap(&self, _ctx: &MarshalContext<'_>, _flags: u32, _dst: LinearAddr, _result: u32) -> Result<()> {
        Ok(())
    }
}

impl Marshal for MciInfoParams {
    fn map(ctx: &MarshalContext<'_>, flags: u32, src: LinearAddr) -> Result<Self> {
        use layout::info::*;
        let ret_size = ctx.u32_at(src, RET_SIZE)?;
        let item = if flags & MCI_DGV_INFO_ITEM != 0 {
            ctx.u32_at(src, ITEM)?
        } else {
            0
        };
        Ok(Self {
            callback: ctx.u32_at(src, layout::CALLBACK)?,
            ret: ctx.out_buffer(ret_size)?,
            ret_size,
            item,
        })
    }

    fn unmap(&self, ctx: &MarshalContext<'_>, _flags: u32, dst: LinearAddr, result: u32) -> Result<()> {
        if result != 0 {
            return Ok(());
        }
        let ptr = ctx.u32_at(dst, layout::info::RETURN)?;
        ctx.store_str(ptr, self.ret_size, &self.ret)
    }
}

impl Marshal for MciOpenParams {
    fn map(ctx: &MarshalContext<'_>, flags: u32, src: LinearAddr) -> Result<Self> {
        use layout::open::*;
        let convert_type = flags & (MCI_OPEN_TYPE | MCI_OPEN_TYPE_ID) == MCI_OPEN_TYPE;
        let convert_element =
            flags & (MCI_OPEN_ELEMENT | MCI_OPEN_ELEMENT_ID) == MCI_OPEN_ELEMENT;
        let convert_alias = flags & MCI_OPEN_ALIAS != 0;

        let callback = ctx.u32_at(src, layout::CALLBACK)?;
        let device_id = ctx.u16_at(src, DEVICE_ID)?;
        let device_type = ctx.str_if(convert_type, ctx.u32_at(src, DEVICE_TYPE)?)?;
        let element_name = ctx.str_if(convert_element, ctx.u32_at(src, ELEMENT_NAME)?)?;
        let alias = ctx.str_if(convert_alias, ctx.u32_at(src, ALIAS)?)?;
        let extension = if flags >> 16 != 0 {
            // Wave opens stop after the first dword; a missing second one reads as 0
            let second = match ctx.space.read_u32(src.add(EXTENSION + 4)) {
                Ok(value) => value,
                Err(SegmentError::Fault { .. }) => 0,
                Err(e) => return Err(e.into()),
            };
            Some([ctx.u32_at(src, EXTENSION)?, second])
        } else {
            None
        };

        Ok(Self {
            callback,
            device_id,
            device_type,
            element_name,
            alias,
            extension,
        })
    }

    fn unmap(&self, ctx: &MarshalContext<'_>, _flags: u32, dst: LinearAddr, _result: u32) -> Result<()> {
        ctx.space
            .write_u16(dst.add(layout::open::DEVICE_ID), self.device_id)?;
        Ok(())
    }
}

impl Marshal for MciSysInfoParams {
    fn map(ctx: &MarshalContext<'_>, flags: u32, src: LinearAddr) -> Result<Self> {
        use layout::sysinfo::*;
        let ret_size = ctx.u32_at(src, RET_SIZE)?;
        let ret = if flags & MCI_SYSINFO_QUANTITY != 0 {
            SysInfoReturn::Quantity(ctx.heap.alloc(0u32)?)
        } else {
            SysInfoReturn::Text(ctx.out_buffer(ret_size)?)
        };
        Ok(Self {
            callback: ctx.u32_at(src, layout::CALLBACK)?,
            ret,
            ret_size,
            number: ctx.u32_at(src, NUMBER)?,
            device_type: ctx.u16_at(src, DEVICE_TYPE)?,
        })
    }

    fn unmap(&self, ctx: &MarshalContext<'_>, _flags: u32, dst: LinearAddr, result: u32) -> Result<()> {
        if result != 0 {
            return Ok(());
        }
        let ptr = ctx.u32_at(dst, layout::sysinfo::RETURN)?;
        match &self.ret {
            SysInfoReturn::Quantity(count) => {
                let out = ctx.space.to_linear(SegPtr(ptr))?;
                if !out.is_null() {
                    ctx.space.write_u32(out, **count)?;
                }
                Ok(())
            }
            SysInfoReturn::Text(text) => ctx.store_str(ptr, self.ret_size, text),
        }
    }
}

// ============================================================================
// Dispatch over block kinds
// ============================================================================

/// Every shadow block kind the mapper can produce
#[derive(Debug)]
pub enum ShadowParams {
    Rect(Shadow<MciRectParams>),
    Status(Shadow<MciStatusParams>),
    Window(Shadow<MciWindowParams>),
    Break(Shadow<MciBreakParams>),
    Escape(Shadow<MciEscapeParams>),
    Info(Shadow<MciInfoParams>),
    Open(Shadow<MciOpenParams>),
    SysInfo(Shadow<MciSysInfoParams>),
    Sound(Shadow<MciSoundParams>),
}

impl ShadowParams {
    /// Build the shadow for a command that needs one, `None` otherwise
    pub(crate) fn build(
        ctx: &MarshalContext<'_>,
        msg: u16,
        flags: u32,
        origin: SegPtr,
    ) -> Result<Option<Self>> {
        let params = match msg {
            MCI_WHERE | MCI_FREEZE | MCI_UNFREEZE | MCI_PUT => {
                ShadowParams::Rect(shadow(ctx, flags, origin)?)
            }
            MCI_STATUS => ShadowParams::Status(shadow(ctx, flags, origin)?),
            MCI_WINDOW => ShadowParams::Window(shadow(ctx, flags, origin)?),
            MCI_BREAK => ShadowParams::Break(shadow(ctx, flags, origin)?),
            MCI_ESCAPE => ShadowParams::Escape(shadow(ctx, flags, origin)?),
            MCI_INFO => ShadowParams::Info(shadow(ctx, flags, origin)?),
            MCI_OPEN | MCI_OPEN_DRIVER => ShadowParams::Open(shadow(ctx, flags, origin)?),
            MCI_SYSINFO => ShadowParams::SysInfo(shadow(ctx, flags, origin)?),
            MCI_SOUND => ShadowParams::Sound(shadow(ctx, flags, origin)?),
            _ => return Ok(None),
        };
        Ok(Some(params))
    }

    /// The 16-bit block this shadow was built from
    pub fn origin(&self) -> SegPtr {
        match self {
            ShadowParams::Rect(block) => block.origin(),
            ShadowParams::Status(block) => block.origin(),
            ShadowParams::Window(block) => block.origin(),
            ShadowParams::Break(block) => block.origin(),
            ShadowParams::Escape(block) => block.origin(),
            ShadowParams::Info(block) => block.origin(),
            ShadowParams::Open(block) => block.origin(),
            ShadowParams::SysInfo(block) => block.origin(),
            ShadowParams::Sound(block) => block.origin(),
        }
    }

    pub fn params_mut(&mut self) -> WideParams<'_> {
        match self {
            ShadowParams::Rect(block) => WideParams::Rect(block.params_mut()),
            ShadowParams::Status(block) => WideParams::Status(block.params_mut()),
            ShadowParams::Window(block) => WideParams::Window(block.params_mut()),
            ShadowParams::Break(block) => WideParams::Break(block.params_mut()),
            ShadowParams::Escape(block) => WideParams::Escape(block.params_mut()),
            ShadowParams::Info(block) => WideParams::Info(block.params_mut()),
            ShadowParams::Open(block) => WideParams::Open(block.params_mut()),
            ShadowParams::SysInfo(block) => WideParams::SysInfo(block.params_mut()),
            ShadowParams::Sound(block) => WideParams::Sound(block.params_mut()),
        }
    }

    /// Copy outputs back and release the block with everything it owns
    pub(crate) fn unmap(self, ctx: &MarshalContext<'_>, flags: u32, result: u32) -> Result<()> {
        match self {
            ShadowParams::Rect(block) => unshadow(ctx, flags, block, result),
            ShadowParams::Status(block) => unshadow(ctx, flags, block, result),
            ShadowParams::Window(block) => unshadow(ctx, flags, block, result),
            ShadowParams::Break(block) => unshadow(ctx, flags, block, result),
            ShadowParams::Escape(block) => unshadow(ctx, flags, block, result),
            ShadowParams::Info(block) => unshadow(ctx, flags, block, result),
            ShadowParams::Open(block) => unshadow(ctx, flags, block, result),
            ShadowParams::SysInfo(block) => unshadow(ctx, flags, block, result),
            ShadowParams::Sound(block) => unshadow(ctx, flags, block, result),
        }
    }
}
