// SPDX-License-Identifier: MIT

use crate::{BlockDev, DevError, DevResult, BLOCK_SIZE};

/// In-memory implementation of `BlockDev`.
///
/// Useful for tests and RAM-backed volumes.
#[derive(Debug)]
pub struct MemDev<'a> {
    buffer: &'a mut [u8],
    blocks: u32,
}

impl<'a> MemDev<'a> {
    /// Wraps a buffer as a device. The buffer length must be a whole
    /// number of blocks.
    pub fn new(buffer: &'a mut [u8]) -> DevResult<Self> {
        if buffer.len() % BLOCK_SIZE != 0 {
            return Err(DevError::BadSize);
        }
        let blocks = (buffer.len() / BLOCK_SIZE) as u32;
        Ok(Self { buffer, blocks })
    }

    #[inline]
    fn range(&self, n: u32, len: usize) -> DevResult<core::ops::Range<usize>> {
        if n >= self.blocks || len != BLOCK_SIZE {
            return Err(if len != BLOCK_SIZE {
                DevError::BadSize
            } else {
                DevError::OutOfBounds
            });
        }
        let start = n as usize * BLOCK_SIZE;
        Ok(start..start + BLOCK_SIZE)
    }
}

impl<'a> BlockDev for MemDev<'a> {
    #[inline]
    fn read_block(&mut self, n: u32, buf: &mut [u8]) -> DevResult {
        let range = self.range(n, buf.len())?;
        buf.copy_from_slice(&self.buffer[range]);
        Ok(())
    }

    #[inline]
    fn write_block(&mut self, n: u32, data: &[u8]) -> DevResult {
        let range = self.range(n, data.len())?;
        self.buffer[range].copy_from_slice(data);
        Ok(())
    }

    #[inline]
    fn block_count(&self) -> u32 {
        self.blocks
    }

    #[inline]
    fn flush(&mut self) -> DevResult {
        Ok(())
    }
}
