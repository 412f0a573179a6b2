// SPDX-License-Identifier: MIT
//! Superblock record (block 0).

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::constant::*;
use crate::meta::DiskLayout;

/// Superblock record (512 bytes, occupies block 0).
///
/// Holds the volume header, the inode-table descriptor with the endpoints
/// of the double-linked free-inode list, and the data-zone descriptor with
/// the two free-cluster reference caches and the endpoints of the on-disk
/// free-cluster list.
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct Superblock {
    /// Magic number; `MAGIC_SENTINEL` until formatting has completed.
    pub magic: u32,
    /// On-disk format version.
    pub version: u32,
    /// Volume label, null terminated.
    pub name: [u8; VOLUME_NAME_SIZE],
    /// Mount status (pristine / mounted / unmounted-clean).
    pub mstat: u32,
    /// Total number of blocks on the device.
    pub ntotal: u32,

    /// First block of the inode table (always 1).
    pub itable_start: u32,
    /// Number of blocks of the inode table.
    pub itable_blocks: u32,
    /// Total number of inodes.
    pub itotal: u32,
    /// Number of free inodes.
    pub ifree: u32,
    /// Head of the free-inode list, or `NULL_INODE`.
    pub ihead: u32,
    /// Tail of the free-inode list, or `NULL_INODE`.
    pub itail: u32,

    /// First block of the data zone.
    pub dzone_start: u32,
    /// Total number of data clusters.
    pub dzone_total: u32,
    /// Number of free data clusters, in whichever of the three places.
    pub dzone_free: u32,

    /// Next unused slot of the retrieval cache; `FREE_CACHE_SIZE` means
    /// the cache is exhausted.
    pub retrieve_idx: u32,
    /// Retrieval cache: free-cluster references drained by allocations.
    pub retrieve_cache: [u32; FREE_CACHE_SIZE],
    /// Next empty slot of the insertion cache; 0 means the cache is empty.
    pub insert_idx: u32,
    /// Insertion cache: free-cluster references filled by frees.
    pub insert_cache: [u32; FREE_CACHE_SIZE],

    /// Head of the on-disk free-cluster list, or `NULL_CLUSTER`.
    pub dhead: u32,
    /// Tail of the on-disk free-cluster list, or `NULL_CLUSTER`.
    pub dtail: u32,

    /// Padding to the block size.
    pub reserved: [u8; 340],
}

impl Superblock {
    /// Builds the in-progress superblock the formatter writes first: the
    /// magic number still carries the sentinel and both caches are empty.
    pub fn formatting(layout: &DiskLayout, name: &str) -> Superblock {
        let mut label = [0u8; VOLUME_NAME_SIZE];
        for (dst, b) in label
            .iter_mut()
            .zip(name.bytes().take(VOLUME_NAME_SIZE - 1))
        {
            *dst = b;
        }

        Superblock {
            magic: MAGIC_SENTINEL,
            version: VERSION_NUMBER,
            name: label,
            mstat: MSTAT_PRISTINE,
            ntotal: layout.n_total,
            itable_start: ITABLE_START,
            itable_blocks: layout.itable_blocks,
            itotal: layout.itotal,
            // inode 0 and cluster 0 belong to the root directory
            ifree: layout.itotal - 1,
            ihead: 1,
            itail: layout.itotal - 1,
            dzone_start: layout.dzone_start,
            dzone_total: layout.dzone_total,
            dzone_free: layout.dzone_total - 1,
            retrieve_idx: FREE_CACHE_SIZE as u32,
            retrieve_cache: [NULL_CLUSTER; FREE_CACHE_SIZE],
            insert_idx: 0,
            insert_cache: [NULL_CLUSTER; FREE_CACHE_SIZE],
            dhead: if layout.dzone_total > 1 {
                1
            } else {
                NULL_CLUSTER
            },
            dtail: if layout.dzone_total > 1 {
                layout.dzone_total - 1
            } else {
                NULL_CLUSTER
            },
            reserved: [0u8; 340],
        }
    }

    /// Volume label as a string slice, up to the first null byte.
    pub fn label(&self) -> &str {
        let end = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.name.len());
        core::str::from_utf8(&self.name[..end]).unwrap_or("")
    }

    /// Layout view over the descriptor fields.
    pub fn layout(&self) -> DiskLayout {
        DiskLayout {
            n_total: self.ntotal,
            itable_blocks: self.itable_blocks,
            itotal: self.itotal,
            dzone_start: self.dzone_start,
            dzone_total: self.dzone_total,
        }
    }

    /// Physical block holding inode `n`, and the record offset inside it.
    #[inline]
    pub fn inode_location(&self, n: u32) -> (u32, usize) {
        self.layout().inode_location(n)
    }

    /// Physical block index of the first block of logical cluster `lc`.
    #[inline]
    pub fn cluster_block(&self, lc: u32) -> u32 {
        self.dzone_start + lc * BLOCKS_PER_CLUSTER as u32
    }

    /// Occupancy of the retrieval cache.
    #[inline]
    pub fn retrieve_len(&self) -> u32 {
        FREE_CACHE_SIZE as u32 - self.retrieve_idx
    }

    /// Occupancy of the insertion cache.
    #[inline]
    pub fn insert_len(&self) -> u32 {
        self.insert_idx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_is_one_block() {
        assert_eq!(core::mem::size_of::<Superblock>(), BLOCK_SIZE);
    }

    #[test]
    fn test_formatting_snapshot() {
        let layout = DiskLayout::compute(19 * BLOCK_SIZE as u64, 16).unwrap();
        let sb = Superblock::formatting(&layout, "TESTVOL");

        assert_eq!(sb.magic, MAGIC_SENTINEL);
        assert_eq!(sb.label(), "TESTVOL");
        assert_eq!(sb.ifree, 15);
        assert_eq!(sb.ihead, 1);
        assert_eq!(sb.itail, 15);
        assert_eq!(sb.dzone_free, 3);
        assert_eq!(sb.dhead, 1);
        assert_eq!(sb.dtail, 3);
        assert_eq!(sb.retrieve_len(), 0);
        assert_eq!(sb.insert_len(), 0);
    }

    #[test]
    fn test_label_truncated_to_field() {
        let layout = DiskLayout::compute(19 * BLOCK_SIZE as u64, 16).unwrap();
        let long = "x".repeat(60);
        let sb = Superblock::formatting(&layout, &long);
        assert_eq!(sb.label().len(), VOLUME_NAME_SIZE - 1);
    }
}
