// SPDX-License-Identifier: MIT
//! File content access.
//!
//! Whole-cluster read/write against the logical indices of an inode, and
//! on top of that byte-granular reads and writes with size and timestamp
//! bookkeeping. A cluster that was never attached reads back zero filled;
//! writing attaches clusters on demand.

use sofsio::BlockDev;

use crate::constant::*;
use crate::ensure;
use crate::errors::{SofsError, SofsResult};
use crate::filesystem::Sofs;
use crate::inode_ops::Access;
use crate::types::inode::InodeState;

impl<'a, D: BlockDev + ?Sized> Sofs<'a, D> {
    /// Reads the payload of logical cluster `idx` of inode `n`. A hole
    /// reads back as zeroes.
    pub fn read_file_cluster(&mut self, n: u32, idx: u32) -> SofsResult<[u8; CLUSTER_PAYLOAD]> {
        self.read_inode(n, InodeState::InUse)?;
        let lc = self.get_cluster(n, idx)?;
        if lc == NULL_CLUSTER {
            return Ok([0u8; CLUSTER_PAYLOAD]);
        }
        Ok(self.read_cluster(lc)?.payload)
    }

    /// Writes the payload of logical cluster `idx` of inode `n`,
    /// attaching a fresh cluster first when the slot is empty.
    pub fn write_file_cluster(
        &mut self,
        n: u32,
        idx: u32,
        payload: &[u8; CLUSTER_PAYLOAD],
    ) -> SofsResult {
        self.read_inode(n, InodeState::InUse)?;
        let mut lc = self.get_cluster(n, idx)?;
        if lc == NULL_CLUSTER {
            lc = self.alloc_cluster_at(n, idx)?;
        }
        let mut cluster = self.read_cluster(lc)?;
        cluster.payload = *payload;
        self.write_cluster(lc, &cluster)
    }

    /// Reads up to `buf.len()` bytes starting at byte `pos`, bounded by
    /// the file size. Returns the number of bytes read.
    pub fn read_file(&mut self, n: u32, pos: u32, buf: &mut [u8]) -> SofsResult<usize> {
        let inode = self.read_inode(n, InodeState::InUse)?;
        ensure!(!inode.is_directory(), SofsError::IsADirectory);
        self.access_granted(n, Access::R)?;

        if pos >= inode.size {
            return Ok(0);
        }
        let end = inode.size.min(
            pos.checked_add(buf.len().min(u32::MAX as usize) as u32)
                .unwrap_or(u32::MAX),
        );

        let mut done = 0usize;
        let mut at = pos;
        while at < end {
            let idx = at / CLUSTER_PAYLOAD as u32;
            let off = (at % CLUSTER_PAYLOAD as u32) as usize;
            let chunk = (CLUSTER_PAYLOAD - off).min((end - at) as usize);
            let payload = self.read_file_cluster(n, idx)?;
            buf[done..done + chunk].copy_from_slice(&payload[off..off + chunk]);
            done += chunk;
            at += chunk as u32;
        }
        Ok(done)
    }

    /// Writes `data` starting at byte `pos`, growing the file as needed.
    pub fn write_file(&mut self, n: u32, pos: u32, data: &[u8]) -> SofsResult {
        let inode = self.read_inode(n, InodeState::InUse)?;
        ensure!(!inode.is_directory(), SofsError::IsADirectory);
        self.access_granted(n, Access::W)?;

        let max_bytes = MAX_FILE_CLUSTERS as u64 * CLUSTER_PAYLOAD as u64;
        let end = pos as u64 + data.len() as u64;
        ensure!(end <= max_bytes && end <= u32::MAX as u64, SofsError::FileTooBig);

        let mut done = 0usize;
        let mut at = pos;
        while done < data.len() {
            let idx = at / CLUSTER_PAYLOAD as u32;
            let off = (at % CLUSTER_PAYLOAD as u32) as usize;
            let chunk = (CLUSTER_PAYLOAD - off).min(data.len() - done);
            let mut payload = self.read_file_cluster(n, idx)?;
            payload[off..off + chunk].copy_from_slice(&data[done..done + chunk]);
            self.write_file_cluster(n, idx, &payload)?;
            done += chunk;
            at += chunk as u32;
        }

        let mut inode = self.inode_at(n)?;
        if end as u32 > inode.size {
            inode.size = end as u32;
        }
        self.write_inode(n, &inode, InodeState::InUse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::Identity;
    use crate::formatter::SofsFormatter;
    use crate::meta::DiskLayout;
    use crate::types::inode::InodeType;
    use sofsio::prelude::*;

    fn fresh_image(blocks: usize) -> Vec<u8> {
        let mut img = vec![0u8; blocks * BLOCK_SIZE];
        let layout = DiskLayout::compute(img.len() as u64, 8).unwrap();
        let mut dev = MemDev::new(&mut img).unwrap();
        SofsFormatter::new(&mut dev, &layout, "ftest", Identity::ROOT)
            .format(false)
            .unwrap();
        img
    }

    #[test]
    fn test_hole_reads_back_zeroes() {
        let mut img = fresh_image(100);
        let mut dev = MemDev::new(&mut img).unwrap();
        let mut fs = Sofs::mount(&mut dev, Identity::ROOT).unwrap();
        let n = fs.alloc_inode(InodeType::Regular).unwrap();

        let payload = fs.read_file_cluster(n, 4).unwrap();
        assert!(payload.iter().all(|&b| b == 0));
        assert_eq!(fs.get_cluster(n, 4).unwrap(), NULL_CLUSTER, "reads attach nothing");
    }

    #[test]
    fn test_cluster_write_read_roundtrip() {
        let mut img = fresh_image(100);
        let mut dev = MemDev::new(&mut img).unwrap();
        let mut fs = Sofs::mount(&mut dev, Identity::ROOT).unwrap();
        let n = fs.alloc_inode(InodeType::Regular).unwrap();

        let mut payload = [0u8; CLUSTER_PAYLOAD];
        for (i, b) in payload.iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
        fs.write_file_cluster(n, 2, &payload).unwrap();
        assert_eq!(fs.read_file_cluster(n, 2).unwrap(), payload);
        assert_eq!(fs.inode_at(n).unwrap().clucount, 1);
    }

    #[test]
    fn test_byte_rw_across_cluster_boundary() {
        let mut img = fresh_image(100);
        let mut dev = MemDev::new(&mut img).unwrap();
        let mut fs = Sofs::mount(&mut dev, Identity::ROOT).unwrap();
        let n = fs.alloc_inode(InodeType::Regular).unwrap();

        let data: Vec<u8> = (0..3000u32).map(|i| (i % 233) as u8).collect();
        let pos = CLUSTER_PAYLOAD as u32 - 100;
        fs.write_file(n, pos, &data).unwrap();

        let inode = fs.inode_at(n).unwrap();
        assert_eq!(inode.size, pos + 3000);

        let mut back = vec![0u8; 3000];
        assert_eq!(fs.read_file(n, pos, &mut back).unwrap(), 3000);
        assert_eq!(back, data);

        // reads stop at the file size
        let mut tail = [0u8; 64];
        let got = fs.read_file(n, inode.size - 10, &mut tail).unwrap();
        assert_eq!(got, 10);
        assert_eq!(fs.read_file(n, inode.size, &mut tail).unwrap(), 0);
    }

    #[test]
    fn test_directories_are_rejected() {
        let mut img = fresh_image(100);
        let mut dev = MemDev::new(&mut img).unwrap();
        let mut fs = Sofs::mount(&mut dev, Identity::ROOT).unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(
            fs.read_file(0, 0, &mut buf),
            Err(SofsError::IsADirectory)
        );
        assert_eq!(fs.write_file(0, 0, &buf), Err(SofsError::IsADirectory));
    }
}
