// SPDX-License-Identifier: MIT
//! The formatter.
//!
//! Lays SOFS14 onto a raw device: a superblock whose magic still carries
//! the formatting sentinel, the inode table as one fully threaded free
//! list with inode 0 taken by the root directory, the root directory's
//! first cluster, and every remaining cluster chained into the on-disk
//! free list. The magic is flipped to its final value only after every
//! other structure landed, so an interrupted format leaves a volume that
//! can never be mounted.

use sofsio::prelude::*;
use zerocopy::IntoBytes;

use crate::constant::*;
use crate::ensure;
use crate::errors::{SofsError, SofsResult};
use crate::filesystem::Identity;
use crate::meta::DiskLayout;
use crate::types::direntry::DirEntry;
use crate::types::inode::{Inode, InodeAux};
use crate::types::{Cluster, Superblock};
use crate::util::unix_now;

pub struct SofsFormatter<'a, D: BlockDev + ?Sized> {
    dev: &'a mut D,
    layout: &'a DiskLayout,
    name: &'a str,
    ident: Identity,
}

impl<'a, D: BlockDev + ?Sized> SofsFormatter<'a, D> {
    pub fn new(
        dev: &'a mut D,
        layout: &'a DiskLayout,
        name: &'a str,
        ident: Identity,
    ) -> Self {
        Self {
            dev,
            layout,
            name,
            ident,
        }
    }

    /// Formats the device. With `zero` the payload of every free cluster
    /// is wiped as well.
    pub fn format(&mut self, zero: bool) -> SofsResult {
        ensure!(
            self.dev.block_count() == self.layout.n_total,
            SofsError::InvalidArg
        );

        let mut sb = Superblock::formatting(self.layout, self.name);
        self.dev.write_block(SUPERBLOCK_BLOCK, sb.as_bytes())?;

        self.fill_inode_table()?;
        self.fill_root_cluster()?;
        self.fill_free_chain(zero)?;

        // everything landed; the volume becomes mountable
        sb.magic = MAGIC_NUMBER;
        self.dev.write_block(SUPERBLOCK_BLOCK, sb.as_bytes())?;
        self.dev.flush()?;
        Ok(())
    }

    /// Inode 0 in use as the root directory, every other record free and
    /// clean, threaded into one list from 1 to `itotal - 1`.
    fn fill_inode_table(&mut self) -> SofsResult {
        let itotal = self.layout.itotal;
        let now = unix_now();

        let mut root = Inode::free_clean(NULL_INODE, NULL_INODE);
        root.mode = MODE_DIRECTORY | MODE_PERM_MASK;
        root.refcount = 2;
        root.owner = self.ident.uid;
        root.group = self.ident.gid;
        root.size = (DIR_ENTRIES_PER_CLUSTER * DIR_ENTRY_SIZE) as u32;
        root.clucount = 1;
        root.d[0] = ROOT_CLUSTER;
        root.set_aux(InodeAux::Times {
            atime: now,
            mtime: now,
        });

        for block in 0..self.layout.itable_blocks {
            let mut buf = [0u8; BLOCK_SIZE];
            for slot in 0..INODES_PER_BLOCK as u32 {
                let n = block * INODES_PER_BLOCK as u32 + slot;
                let record = if n == ROOT_INODE {
                    root
                } else {
                    let next = if n == itotal - 1 { NULL_INODE } else { n + 1 };
                    let prev = if n == 1 { NULL_INODE } else { n - 1 };
                    Inode::free_clean(next, prev)
                };
                let start = slot as usize * INODE_SIZE;
                buf[start..start + INODE_SIZE].copy_from_slice(record.as_bytes());
            }
            self.dev.write_block(ITABLE_START + block, &buf)?;
        }
        Ok(())
    }

    /// Cluster 0: the root directory seen as empty, "." and ".." both
    /// pointing at inode 0.
    fn fill_root_cluster(&mut self) -> SofsResult {
        let mut cluster = Cluster::free_clean();
        cluster.stat = ROOT_INODE;
        cluster.format_dir();
        cluster.set_entry_at(0, &DirEntry::new(".", ROOT_INODE));
        cluster.set_entry_at(1, &DirEntry::new("..", ROOT_INODE));
        self.dev.write_blocks(
            self.layout.cluster_block(ROOT_CLUSTER),
            BLOCKS_PER_CLUSTER as u32,
            cluster.as_bytes(),
        )?;
        Ok(())
    }

    /// Clusters 1 to `dzone_total - 1` chained into the free list through
    /// their own headers.
    fn fill_free_chain(&mut self, zero: bool) -> SofsResult {
        let total = self.layout.dzone_total;
        for lc in 1..total {
            let prev = if lc == 1 { NULL_CLUSTER } else { lc - 1 };
            let next = if lc == total - 1 { NULL_CLUSTER } else { lc + 1 };
            let first_block = self.layout.cluster_block(lc);

            if zero {
                let mut cluster = Cluster::free_clean();
                cluster.prev = prev;
                cluster.next = next;
                self.dev
                    .write_blocks(first_block, BLOCKS_PER_CLUSTER as u32, cluster.as_bytes())?;
            } else {
                // quick format: only the header block is touched
                let mut buf = [0u8; BLOCK_SIZE];
                buf[0..4].copy_from_slice(&prev.to_le_bytes());
                buf[4..8].copy_from_slice(&next.to_le_bytes());
                buf[8..12].copy_from_slice(&NULL_INODE.to_le_bytes());
                self.dev.write_block(first_block, &buf)?;
            }
        }
        Ok(())
    }

    /// Reads the freshly written metadata back and checks it is
    /// structurally sound, without mounting the volume.
    pub fn verify(&mut self) -> SofsResult {
        let sb: Superblock = self.dev.read_struct(SUPERBLOCK_BLOCK, 0)?;
        ensure!(sb.magic == MAGIC_NUMBER, SofsError::Internal("magic not finalised"));
        ensure!(sb.mstat == MSTAT_PRISTINE, SofsError::Internal("volume not pristine"));
        ensure!(
            1 + sb.itable_blocks + sb.dzone_total * BLOCKS_PER_CLUSTER as u32 == sb.ntotal,
            SofsError::Internal("block accounting does not add up")
        );
        ensure!(
            sb.ifree == sb.itotal - 1 && sb.dzone_free == sb.dzone_total - 1,
            SofsError::Internal("free counts wrong for a fresh volume")
        );

        // root inode
        let (block, offset) = sb.inode_location(ROOT_INODE);
        let root: Inode = self.dev.read_struct(block, offset)?;
        ensure!(
            root.is_directory() && root.refcount == 2 && root.d[0] == ROOT_CLUSTER,
            SofsError::Internal("root inode malformed")
        );

        // root directory content
        let mut cluster = Cluster::free_clean();
        self.dev.read_blocks(
            sb.cluster_block(ROOT_CLUSTER),
            BLOCKS_PER_CLUSTER as u32,
            cluster.as_mut_bytes(),
        )?;
        let dot = cluster.entry_at(0);
        let dotdot = cluster.entry_at(1);
        ensure!(
            cluster.stat == ROOT_INODE
                && dot.name_str() == "."
                && dot.ninode == ROOT_INODE
                && dotdot.name_str() == ".."
                && dotdot.ninode == ROOT_INODE,
            SofsError::Internal("root directory malformed")
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::Sofs;

    fn layout_for(blocks: usize, inodes: u32) -> DiskLayout {
        DiskLayout::compute((blocks * BLOCK_SIZE) as u64, inodes).unwrap()
    }

    #[test]
    fn test_format_19_block_device() {
        let layout = layout_for(19, 16);
        let mut img = vec![0u8; 19 * BLOCK_SIZE];
        let mut dev = MemDev::new(&mut img).unwrap();

        let mut fmt = SofsFormatter::new(&mut dev, &layout, "SOFS14", Identity::ROOT);
        fmt.format(false).unwrap();
        fmt.verify().unwrap();

        let mut fs = Sofs::mount(&mut dev, Identity::ROOT).unwrap();
        let sb = fs.superblock();
        assert_eq!(sb.itable_blocks, 2);
        assert_eq!(sb.itotal, 16);
        assert_eq!(sb.ifree, 15);
        assert_eq!(sb.dzone_total, 4);
        assert_eq!(sb.dzone_free, 3);
        assert_eq!(sb.ihead, 1);
        assert_eq!(sb.itail, 15);
        assert_eq!(sb.dhead, 1);
        assert_eq!(sb.dtail, 3);
        assert_eq!(sb.retrieve_len(), 0);
        assert_eq!(sb.insert_len(), 0);

        // both walks agree with the counters
        assert_eq!(fs.count_free_inodes_forward().unwrap(), 15);
        assert_eq!(fs.count_free_inodes_backward().unwrap(), 15);
        assert_eq!(fs.count_free_list_clusters().unwrap(), 3);
        fs.check_free_cluster_accounting().unwrap();
    }

    #[test]
    fn test_interrupted_format_is_unmountable() {
        let layout = layout_for(19, 16);
        let mut img = vec![0u8; 19 * BLOCK_SIZE];
        let mut dev = MemDev::new(&mut img).unwrap();

        // only the first phase: the sentinel superblock
        let sb = Superblock::formatting(&layout, "broken");
        dev.write_block(SUPERBLOCK_BLOCK, sb.as_bytes()).unwrap();

        assert!(Sofs::mount(&mut dev, Identity::ROOT).is_err());
    }

    #[test]
    fn test_zero_fill_wipes_free_payloads() {
        let layout = layout_for(19, 16);
        let mut img = vec![0xEEu8; 19 * BLOCK_SIZE];
        let mut dev = MemDev::new(&mut img).unwrap();

        SofsFormatter::new(&mut dev, &layout, "z", Identity::ROOT)
            .format(true)
            .unwrap();

        let mut fs = Sofs::mount(&mut dev, Identity::ROOT).unwrap();
        for lc in 1..fs.superblock().dzone_total {
            let cluster = fs.read_cluster(lc).unwrap();
            assert!(cluster.payload.iter().all(|&b| b == 0), "cluster {lc}");
        }
    }

    #[test]
    fn test_quick_format_leaves_payload_tail_untouched() {
        let layout = layout_for(19, 16);
        let mut img = vec![0xEEu8; 19 * BLOCK_SIZE];
        let mut dev = MemDev::new(&mut img).unwrap();

        SofsFormatter::new(&mut dev, &layout, "q", Identity::ROOT)
            .format(false)
            .unwrap();

        let mut fs = Sofs::mount(&mut dev, Identity::ROOT).unwrap();
        let cluster = fs.read_cluster(1).unwrap();
        // bytes past the header block still carry the old pattern
        assert!(cluster.payload[BLOCK_SIZE..].iter().all(|&b| b == 0xEE));
    }

    #[test]
    fn test_format_rejects_size_mismatch() {
        let layout = layout_for(19, 16);
        let mut img = vec![0u8; 23 * BLOCK_SIZE];
        let mut dev = MemDev::new(&mut img).unwrap();
        assert_eq!(
            SofsFormatter::new(&mut dev, &layout, "m", Identity::ROOT).format(false),
            Err(SofsError::InvalidArg)
        );
    }
}
