// SPDX-License-Identifier: MIT

// === Core modules ===
pub mod errors;
mod macros;

// === Backend modules ===
mod file;
mod mem;

// === Prelude re-exports (central entrypoint) ===
pub mod prelude {
    pub use super::errors::*;
    pub use super::file::FileDev;
    pub use super::mem::MemDev;
    pub use super::BlockDev;
    pub use super::BlockDevExt;
    pub use super::BlockDevStructExt;
    pub use super::BLOCK_SIZE;
}

// === Internal use ===
use crate::errors::*;
#[allow(clippy::single_component_path_imports)]
use paste;

// === Constants ===
/// Size of one device block in bytes. Every transfer is a whole block.
pub const BLOCK_SIZE: usize = 512;

// === Traits ===

/// Block device abstraction trait.
///
/// A device is an array of `BLOCK_SIZE` blocks addressed by index.
/// Implementations may target RAM, regular files, raw partitions, etc.
pub trait BlockDev {
    /// Reads block `n` into `buf`. `buf` must be exactly one block long.
    fn read_block(&mut self, n: u32, buf: &mut [u8]) -> DevResult;

    /// Writes `data` to block `n`. `data` must be exactly one block long.
    fn write_block(&mut self, n: u32, data: &[u8]) -> DevResult;

    /// Number of blocks the device holds.
    fn block_count(&self) -> u32;

    /// Flushes any buffered data (may be a no-op).
    fn flush(&mut self) -> DevResult;
}

/// Extension helpers for `BlockDev`.
///
/// Provides convenience operations built on whole-block transfers:
/// - multi-block (cluster) reads/writes
/// - zero fill
/// - primitive reads/writes inside a block (read_u32_at, ...)
pub trait BlockDevExt: BlockDev {
    /// Reads `count` consecutive blocks starting at `first` into `buf`.
    fn read_blocks(&mut self, first: u32, count: u32, buf: &mut [u8]) -> DevResult {
        if buf.len() != count as usize * BLOCK_SIZE {
            return Err(DevError::BadSize);
        }
        for i in 0..count {
            let start = i as usize * BLOCK_SIZE;
            self.read_block(first + i, &mut buf[start..start + BLOCK_SIZE])?;
        }
        Ok(())
    }

    /// Writes `count` consecutive blocks starting at `first` from `buf`.
    fn write_blocks(&mut self, first: u32, count: u32, buf: &[u8]) -> DevResult {
        if buf.len() != count as usize * BLOCK_SIZE {
            return Err(DevError::BadSize);
        }
        for i in 0..count {
            let start = i as usize * BLOCK_SIZE;
            self.write_block(first + i, &buf[start..start + BLOCK_SIZE])?;
        }
        Ok(())
    }

    /// Fills `count` blocks starting at `first` with zeroes.
    fn zero_blocks(&mut self, first: u32, count: u32) -> DevResult {
        const ZERO: [u8; BLOCK_SIZE] = [0u8; BLOCK_SIZE];
        for i in 0..count {
            self.write_block(first + i, &ZERO)?;
        }
        Ok(())
    }

    // Implements read/write helpers for primitive values at a byte
    // offset inside a block (u16, u32, u64).
    dev_impl_primitive_rw!(u16, u32, u64);
}

impl<T: BlockDev + ?Sized> BlockDevExt for T {}

/// Extension trait for reading and writing on-disk records with zerocopy.
///
/// A record is located by (block, byte offset inside the block) and must
/// not straddle a block boundary.
pub trait BlockDevStructExt: BlockDev {
    /// Reads a record of type `T` from block `n` at byte `offset`.
    fn read_struct<T>(&mut self, n: u32, offset: usize) -> DevResult<T>
    where
        T: zerocopy::FromBytes + zerocopy::KnownLayout + zerocopy::Immutable,
    {
        let size = core::mem::size_of::<T>();
        if offset + size > BLOCK_SIZE {
            return Err(DevError::OutOfBounds);
        }
        let mut buf = [0u8; BLOCK_SIZE];
        self.read_block(n, &mut buf)?;
        T::read_from_bytes(&buf[offset..offset + size])
            .map_err(|_| DevError::Io("record decode failed"))
    }

    /// Writes a record of type `T` into block `n` at byte `offset`,
    /// preserving the rest of the block.
    fn write_struct<T>(&mut self, n: u32, offset: usize, val: &T) -> DevResult
    where
        T: zerocopy::IntoBytes + zerocopy::KnownLayout + zerocopy::Immutable,
    {
        let bytes = val.as_bytes();
        if offset + bytes.len() > BLOCK_SIZE {
            return Err(DevError::OutOfBounds);
        }
        let mut buf = [0u8; BLOCK_SIZE];
        self.read_block(n, &mut buf)?;
        buf[offset..offset + bytes.len()].copy_from_slice(bytes);
        self.write_block(n, &buf)
    }
}

impl<T: BlockDev + ?Sized> BlockDevStructExt for T {}
