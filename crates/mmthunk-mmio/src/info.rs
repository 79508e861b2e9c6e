//! Native `MMIOINFO` and its 16-bit image

use crate::layout;
use byteorder::{ByteOrder, LittleEndian};
use mmthunk_registry::ThunkAddr;
use mmthunk_segment::{AddressSpace, LinearAddr, SegPtr};

/// Native counterpart of `MMIOINFO`
///
/// Buffer pointers are not carried: buffering lives entirely on the native
/// side and a 16-bit IO procedure never sees it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MmioInfo {
    pub flags: u32,
    pub fcc_io_proc: u32,
    /// Callable address of the 16-bit IO procedure serving this file
    pub io_proc: Option<ThunkAddr>,
    pub error_ret: u32,
    pub buffer_len: i32,
    pub buf_offset: i32,
    pub disk_offset: i32,
    pub info: [u32; 4],
    pub hmmio: u16,
}

impl MmioInfo {
    /// Parse a 16-bit `MMIOINFO16`; returns the native view and the 16-bit
    /// IO procedure it names (possibly null)
    pub fn read_foreign(
        space: &AddressSpace,
        base: LinearAddr,
    ) -> mmthunk_segment::Result<(Self, SegPtr)> {
        let bytes = space.read_bytes(base, layout::SIZE as usize)?;
        let u32_at = |off: u32| LittleEndian::read_u32(&bytes[off as usize..]);
        let i32_at = |off: u32| LittleEndian::read_i32(&bytes[off as usize..]);

        let mut info = [0u32; 4];
        LittleEndian::read_u32_into(&bytes[layout::INFO as usize..layout::RESERVED1 as usize], &mut info);

        let parsed = Self {
            flags: u32_at(layout::FLAGS),
            fcc_io_proc: u32_at(layout::FCC_IO_PROC),
            io_proc: None,
            error_ret: 0,
            buffer_len: i32_at(layout::BUFFER_LEN),
            buf_offset: i32_at(layout::BUF_OFFSET),
            disk_offset: i32_at(layout::DISK_OFFSET),
            info,
            hmmio: LittleEndian::read_u16(&bytes[layout::HMMIO as usize..]),
        };
        Ok((parsed, SegPtr(u32_at(layout::IO_PROC))))
    }

    /// The block a 16-bit IO procedure receives as its first argument
    pub fn foreign_image(&self, io_proc16: SegPtr) -> [u8; layout::SIZE as usize] {
        let mut image = [0u8; layout::SIZE as usize];
        let at = |off: u32| off as usize;
        LittleEndian::write_u32(&mut image[at(layout::FLAGS)..], self.flags);
        LittleEndian::write_u32(&mut image[at(layout::FCC_IO_PROC)..], self.fcc_io_proc);
        LittleEndian::write_u32(&mut image[at(layout::IO_PROC)..], io_proc16.0);
        LittleEndian::write_u16(&mut image[at(layout::ERROR_RET)..], self.error_ret as u16);
        LittleEndian::write_i32(&mut image[at(layout::DISK_OFFSET)..], self.disk_offset);
        for (i, word) in self.info.iter().take(layout::SHARED_INFO_WORDS).enumerate() {
            LittleEndian::write_u32(&mut image[at(layout::INFO) + 4 * i..], *word);
        }
        LittleEndian::write_u16(&mut image[at(layout::HMMIO)..], self.hmmio);
        image
    }

    /// Pick up what a 16-bit IO procedure may have changed
    pub fn read_shared(
        &mut self,
        space: &AddressSpace,
        base: LinearAddr,
    ) -> mmthunk_segment::Result<()> {
        self.disk_offset = space.read_i32(base.add(layout::DISK_OFFSET))?;
        for i in 0..layout::SHARED_INFO_WORDS {
            self.info[i] = space.read_u32(base.add(layout::INFO + 4 * i as u32))?;
        }
        Ok(())
    }

    /// Report the outcome of an open to the 16-bit structure
    pub fn write_outcome(
        &self,
        space: &AddressSpace,
        base: LinearAddr,
    ) -> mmthunk_segment::Result<()> {
        space.write_u16(base.add(layout::ERROR_RET), self.error_ret as u16)?;
        space.write_u16(base.add(layout::HMMIO), self.hmmio)
    }
}
