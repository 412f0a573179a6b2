// SPDX-License-Identifier: MIT

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::{BlockDev, DevError, DevResult, BLOCK_SIZE};

/// File-backed implementation of `BlockDev`.
///
/// A regular file plays the role of the raw storage device. The file size
/// must be a whole number of blocks; this is checked once at open time.
#[derive(Debug)]
pub struct FileDev {
    file: File,
    blocks: u32,
}

impl FileDev {
    /// Opens the support file at `path` for read/write access.
    pub fn open<P: AsRef<Path>>(path: P) -> DevResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        if len % BLOCK_SIZE as u64 != 0 {
            return Err(DevError::BadSize);
        }
        Ok(Self {
            file,
            blocks: (len / BLOCK_SIZE as u64) as u32,
        })
    }

    /// Flushes and closes the device.
    pub fn close(mut self) -> DevResult {
        self.flush()
    }

    #[inline]
    fn offset_of(&self, n: u32, len: usize) -> DevResult<u64> {
        if len != BLOCK_SIZE {
            return Err(DevError::BadSize);
        }
        if n >= self.blocks {
            return Err(DevError::OutOfBounds);
        }
        Ok(n as u64 * BLOCK_SIZE as u64)
    }
}

impl BlockDev for FileDev {
    fn read_block(&mut self, n: u32, buf: &mut [u8]) -> DevResult {
        let offset = self.offset_of(n, buf.len())?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn write_block(&mut self, n: u32, data: &[u8]) -> DevResult {
        let offset = self.offset_of(n, data.len())?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        Ok(())
    }

    #[inline]
    fn block_count(&self) -> u32 {
        self.blocks
    }

    fn flush(&mut self) -> DevResult {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::*;
    use std::io::Write as _;

    fn support_file(blocks: usize) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&vec![0u8; blocks * BLOCK_SIZE]).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn test_open_and_rw() {
        let f = support_file(8);
        let mut dev = FileDev::open(f.path()).unwrap();
        assert_eq!(dev.block_count(), 8);

        let mut block = [0u8; BLOCK_SIZE];
        block[7] = 0x5A;
        dev.write_block(3, &block).unwrap();

        let mut out = [0u8; BLOCK_SIZE];
        dev.read_block(3, &mut out).unwrap();
        assert_eq!(block, out);
        dev.close().unwrap();
    }

    #[test]
    fn test_open_rejects_ragged_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&[0u8; BLOCK_SIZE + 17]).unwrap();
        f.flush().unwrap();
        assert_eq!(FileDev::open(f.path()).err(), Some(DevError::BadSize));
    }

    #[test]
    fn test_out_of_bounds() {
        let f = support_file(2);
        let mut dev = FileDev::open(f.path()).unwrap();
        let block = [0u8; BLOCK_SIZE];
        assert_eq!(dev.write_block(2, &block), Err(DevError::OutOfBounds));
    }
}
