//! Narrow (code page) <-> wide (UTF-16) string recoding

use crate::{AddressSpace, HeapVec, LinearAddr, NativeHeap, Result, SegPtr};
use mmthunk_common::CodePage;

#[derive(Debug, Clone, Copy, Default)]
pub struct Codec {
    page: CodePage,
}

impl Codec {
    pub fn new(page: CodePage) -> Self {
        Self { page }
    }

    pub fn page(&self) -> CodePage {
        self.page
    }

    fn widen(&self, byte: u8) -> u16 {
        match self.page {
            CodePage::Latin1 => byte as u16,
            CodePage::Ascii if byte < 0x80 => byte as u16,
            CodePage::Ascii => self.page.default_char() as u16,
        }
    }

    fn narrow(&self, unit: u16) -> u8 {
        let limit = match self.page {
            CodePage::Latin1 => 0xFF,
            CodePage::Ascii => 0x7F,
        };
        if unit <= limit {
            unit as u8
        } else {
            self.page.default_char()
        }
    }

    /// Wide units needed for `narrow`, terminator included
    pub fn wide_len(&self, narrow: &[u8]) -> usize {
        let end = narrow.iter().position(|&b| b == 0).unwrap_or(narrow.len());
        end + 1
    }

    /// Recode a narrow string into a NUL-terminated wide heap buffer
    pub fn to_wide(&self, heap: &NativeHeap, narrow: &[u8]) -> Result<HeapVec<u16>> {
        let len = self.wide_len(narrow);
        let mut wide = heap.alloc_slice::<u16>(len)?;
        for (dst, &src) in wide.iter_mut().zip(narrow.iter().take(len - 1)) {
            *dst = self.widen(src);
        }
        Ok(wide)
    }

    /// Narrow bytes for `wide`, up to (not including) its first NUL
    pub fn to_narrow(&self, wide: &[u16]) -> Vec<u8> {
        wide.iter()
            .take_while(|&&unit| unit != 0)
            .map(|&unit| self.narrow(unit))
            .collect()
    }

    /// Duplicate the 16-bit string at `ptr` as a wide heap string
    pub fn dup_foreign(
        &self,
        space: &AddressSpace,
        heap: &NativeHeap,
        ptr: SegPtr,
    ) -> Result<HeapVec<u16>> {
        let narrow = space.read_seg_cstr(ptr)?;
        self.to_wide(heap, &narrow)
    }

    /// Write `wide` as a narrow string into a foreign buffer of `capacity` bytes
    ///
    /// The text is truncated to `capacity - 1` bytes and always terminated;
    /// nothing is written when `capacity` is zero. Returns the number of
    /// bytes stored, terminator included.
    pub fn store_narrow(
        &self,
        space: &AddressSpace,
        dst: LinearAddr,
        capacity: usize,
        wide: &[u16],
    ) -> Result<usize> {
        if capacity == 0 || dst.is_null() {
            return Ok(0);
        }
        let mut narrow = self.to_narrow(wide);
        narrow.truncate(capacity - 1);
        narrow.push(0);
        space.write_bytes(dst, &narrow)?;
        Ok(narrow.len())
    }
}

/// Lossy display form of a wide string, for logging
pub fn wide_to_string(wide: &[u16]) -> String {
    let end = wide.iter().position(|&u| u == 0).unwrap_or(wide.len());
    String::from_utf16_lossy(&wide[..end])
}
