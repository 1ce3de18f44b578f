//! Byte-addressed frame memory
//!
//! Grows in 32-byte words up to a fixed limit. Reads past the end of a copy
//! source are zero-filled.

use crate::contract::vm::VmError;
use crate::types::{word_from_bytes, word_to_bytes, Word, WORD_BYTES};

#[derive(Debug, Clone)]
pub struct Memory {
    data: Vec<u8>,
    limit: usize,
}

impl Memory {
    pub fn new(limit: usize) -> Self {
        Self {
            data: Vec::new(),
            limit,
        }
    }

    /// Current size in bytes, always a multiple of 32
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Make `[offset, offset + size)` addressable
    pub fn resize(&mut self, offset: usize, size: usize) -> Result<(), VmError> {
        if size == 0 {
            return Ok(());
        }
        let end = offset
            .checked_add(size)
            .ok_or(VmError::MemoryLimitExceeded(usize::MAX, self.limit))?;
        if end > self.limit {
            return Err(VmError::MemoryLimitExceeded(end, self.limit));
        }
        if end > self.data.len() {
            let words = end.div_ceil(WORD_BYTES);
            self.data.resize(words * WORD_BYTES, 0);
        }
        Ok(())
    }

    /// Borrow a range made addressable by [`Memory::resize`]
    pub fn slice(&self, offset: usize, size: usize) -> &[u8] {
        if size == 0 {
            return &[];
        }
        &self.data[offset..offset + size]
    }

    pub fn load_word(&mut self, offset: usize) -> Result<Word, VmError> {
        self.resize(offset, WORD_BYTES)?;
        Ok(word_from_bytes(self.slice(offset, WORD_BYTES)))
    }

    pub fn store_word(&mut self, offset: usize, value: &Word) -> Result<(), VmError> {
        self.resize(offset, WORD_BYTES)?;
        self.data[offset..offset + WORD_BYTES].copy_from_slice(&word_to_bytes(value));
        Ok(())
    }

    pub fn store_byte(&mut self, offset: usize, value: u8) -> Result<(), VmError> {
        self.resize(offset, 1)?;
        self.data[offset] = value;
        Ok(())
    }

    /// Copy `size` bytes of `source` starting at `source_offset`, zero-filling
    /// whatever lies past the end of `source`
    pub fn copy_padded(
        &mut self,
        offset: usize,
        source: &[u8],
        source_offset: usize,
        size: usize,
    ) -> Result<(), VmError> {
        if size == 0 {
            return Ok(());
        }
        self.resize(offset, size)?;
        let target = &mut self.data[offset..offset + size];
        target.fill(0);
        if source_offset < source.len() {
            let available = (source.len() - source_offset).min(size);
            target[..available].copy_from_slice(&source[source_offset..source_offset + available]);
        }
        Ok(())
    }
}
