// SPDX-License-Identifier: MIT
//! The mounted filesystem handle.
//!
//! `Sofs` owns the device handle, an in-memory copy of the superblock and
//! a single-slot cache over the inode table, one block at a time. Every
//! mutation of the cached superblock or of a cached table block is paired
//! with a store before the mutating operation reports success.

use sofsio::prelude::*;
use zerocopy::{FromBytes, IntoBytes};

use crate::constant::*;
use crate::ensure;
use crate::errors::{SofsError, SofsResult};
use crate::types::{Cluster, Inode, Superblock};

/// Identity of the caller, checked by the permission evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub uid: u32,
    pub gid: u32,
}

impl Identity {
    pub const ROOT: Identity = Identity { uid: 0, gid: 0 };

    pub fn new(uid: u32, gid: u32) -> Identity {
        Identity { uid, gid }
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.uid == 0
    }
}

/// One cached block of the inode table.
struct ItableSlot {
    block: u32,
    buf: [u8; BLOCK_SIZE],
}

/// A mounted SOFS14 volume.
pub struct Sofs<'a, D: BlockDev + ?Sized> {
    pub(crate) dev: &'a mut D,
    pub(crate) ident: Identity,
    pub(crate) sb: Superblock,
    itable: Option<ItableSlot>,
}

impl<'a, D: BlockDev + ?Sized> Sofs<'a, D> {
    /// Mounts the volume: loads and validates the superblock and records
    /// the mounted status on disk.
    pub fn mount(dev: &'a mut D, ident: Identity) -> SofsResult<Self> {
        let mut buf = [0u8; BLOCK_SIZE];
        dev.read_block(SUPERBLOCK_BLOCK, &mut buf)?;
        let sb = Superblock::read_from_bytes(&buf).map_err(|_| SofsError::Io(DevError::BadSize))?;

        let mut fs = Sofs {
            dev,
            ident,
            sb,
            itable: None,
        };
        fs.check_superblock()?;
        fs.sb.mstat = MSTAT_MOUNTED;
        fs.store_superblock()?;
        Ok(fs)
    }

    /// Unmounts the volume, recording the clean shutdown.
    pub fn unmount(mut self) -> SofsResult {
        self.sb.mstat = MSTAT_UNMOUNTED;
        self.store_superblock()?;
        self.dev.flush()?;
        Ok(())
    }

    /// The cached superblock.
    #[inline]
    pub fn superblock(&self) -> &Superblock {
        &self.sb
    }

    /// The identity operations are evaluated against.
    #[inline]
    pub fn identity(&self) -> Identity {
        self.ident
    }

    /// Writes the cached superblock back to block 0.
    pub(crate) fn store_superblock(&mut self) -> SofsResult {
        self.dev
            .write_block(SUPERBLOCK_BLOCK, self.sb.as_bytes())?;
        Ok(())
    }

    // === inode table, one block at a time ===

    fn load_itable_block(&mut self, block: u32) -> SofsResult<&mut ItableSlot> {
        let stale = match &self.itable {
            Some(slot) => slot.block != block,
            None => true,
        };
        if stale {
            let mut buf = [0u8; BLOCK_SIZE];
            self.dev.read_block(block, &mut buf)?;
            self.itable = Some(ItableSlot { block, buf });
        }
        Ok(self.itable.as_mut().expect("slot just filled"))
    }

    /// Raw copy of inode record `n`, with no state validation. State-aware
    /// access lives in the per-inode operations.
    pub fn inode_at(&mut self, n: u32) -> SofsResult<Inode> {
        ensure!(n < self.sb.itotal, SofsError::InvalidArg);
        let (block, offset) = self.sb.inode_location(n);
        let slot = self.load_itable_block(block)?;
        Inode::read_from_bytes(&slot.buf[offset..offset + INODE_SIZE])
            .map_err(|_| SofsError::Internal("inode record decode failed"))
    }

    /// Writes inode record `n` through the table cache to the device.
    pub(crate) fn put_inode(&mut self, n: u32, inode: &Inode) -> SofsResult {
        ensure!(n < self.sb.itotal, SofsError::InvalidArg);
        let (block, offset) = self.sb.inode_location(n);
        let slot = self.load_itable_block(block)?;
        slot.buf[offset..offset + INODE_SIZE].copy_from_slice(inode.as_bytes());
        let buf = slot.buf;
        self.dev.write_block(block, &buf)?;
        Ok(())
    }

    // === data clusters ===

    /// Reads logical cluster `lc`, header and payload.
    pub fn read_cluster(&mut self, lc: u32) -> SofsResult<Cluster> {
        ensure!(lc < self.sb.dzone_total, SofsError::InvalidArg);
        let first = self.sb.cluster_block(lc);
        let mut cluster = Cluster::free_clean();
        self.dev.read_blocks(
            first,
            BLOCKS_PER_CLUSTER as u32,
            cluster.as_mut_bytes(),
        )?;
        Ok(cluster)
    }

    /// Writes logical cluster `lc`, header and payload.
    pub fn write_cluster(&mut self, lc: u32, cluster: &Cluster) -> SofsResult {
        ensure!(lc < self.sb.dzone_total, SofsError::InvalidArg);
        let first = self.sb.cluster_block(lc);
        self.dev
            .write_blocks(first, BLOCKS_PER_CLUSTER as u32, cluster.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::SofsFormatter;
    use crate::meta::DiskLayout;

    fn format_image(blocks: usize, inodes: u32) -> Vec<u8> {
        let mut img = vec![0u8; blocks * BLOCK_SIZE];
        let layout = DiskLayout::compute(img.len() as u64, inodes).unwrap();
        let mut dev = MemDev::new(&mut img).unwrap();
        SofsFormatter::new(&mut dev, &layout, "vol", Identity::ROOT)
            .format(false)
            .unwrap();
        img
    }

    #[test]
    fn test_mount_sets_status_and_unmount_clears_it() {
        let mut img = format_image(19, 16);
        {
            let mut dev = MemDev::new(&mut img).unwrap();
            let fs = Sofs::mount(&mut dev, Identity::ROOT).unwrap();
            assert_eq!(fs.superblock().mstat, MSTAT_MOUNTED);
            fs.unmount().unwrap();
        }
        let mut dev = MemDev::new(&mut img).unwrap();
        let fs = Sofs::mount(&mut dev, Identity::ROOT).unwrap();
        assert_eq!(fs.superblock().label(), "vol");
    }

    #[test]
    fn test_mount_rejects_sentinel_magic() {
        let mut img = format_image(19, 16);
        // regress the magic to the formatting sentinel
        img[0..4].copy_from_slice(&MAGIC_SENTINEL.to_le_bytes());
        let mut dev = MemDev::new(&mut img).unwrap();
        assert!(Sofs::mount(&mut dev, Identity::ROOT).is_err());
    }

    #[test]
    fn test_inode_table_crosses_block_boundary() {
        let mut img = format_image(19, 16);
        let mut dev = MemDev::new(&mut img).unwrap();
        let mut fs = Sofs::mount(&mut dev, Identity::ROOT).unwrap();

        // inode 0 lives in table block 1, inode 8 in table block 2
        let root = fs.inode_at(0).unwrap();
        assert!(root.is_directory());
        let other = fs.inode_at(8).unwrap();
        assert_eq!(other.state(), Some(crate::InodeState::FreeClean));
        // and back again
        let root = fs.inode_at(0).unwrap();
        assert!(root.is_directory());
    }

    #[test]
    fn test_cluster_roundtrip() {
        let mut img = format_image(19, 16);
        let mut dev = MemDev::new(&mut img).unwrap();
        let mut fs = Sofs::mount(&mut dev, Identity::ROOT).unwrap();

        let mut cluster = fs.read_cluster(1).unwrap();
        cluster.payload[0] = 0x42;
        cluster.payload[CLUSTER_PAYLOAD - 1] = 0x24;
        fs.write_cluster(1, &cluster).unwrap();

        let back = fs.read_cluster(1).unwrap();
        assert_eq!(back.payload[0], 0x42);
        assert_eq!(back.payload[CLUSTER_PAYLOAD - 1], 0x24);
    }

    #[test]
    fn test_cluster_bounds() {
        let mut img = format_image(19, 16);
        let mut dev = MemDev::new(&mut img).unwrap();
        let mut fs = Sofs::mount(&mut dev, Identity::ROOT).unwrap();
        assert_eq!(fs.read_cluster(4).unwrap_err(), SofsError::InvalidArg);
    }
}
