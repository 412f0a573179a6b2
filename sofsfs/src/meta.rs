// SPDX-License-Identifier: MIT

use crate::constant::*;
use crate::errors::{SofsError, SofsResult};
use crate::ensure;

/// Volume layout derived from the device size and the requested number of
/// inodes.
///
/// Full occupation of the device seen as an array of blocks supposes
///
/// ```text
/// n_total = 1 + itable_blocks + dzone_total * BLOCKS_PER_CLUSTER
/// ```
///
/// which does not always have integer solutions, so the inode table
/// absorbs the remainder: after sizing the data zone, `itable_blocks` is
/// re-derived from the equation and the inode count grows accordingly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskLayout {
    /// Total number of blocks on the device.
    pub n_total: u32,
    /// Number of blocks of the inode table.
    pub itable_blocks: u32,
    /// Total number of inodes.
    pub itotal: u32,
    /// First block of the data zone.
    pub dzone_start: u32,
    /// Total number of data clusters.
    pub dzone_total: u32,
}

impl DiskLayout {
    /// Computes the layout for a device of `size_bytes` with `itotal_req`
    /// inodes. A requested count of zero picks the default of one inode
    /// per eight blocks.
    pub fn compute(size_bytes: u64, itotal_req: u32) -> SofsResult<DiskLayout> {
        ensure!(
            size_bytes % BLOCK_SIZE as u64 == 0,
            SofsError::InvalidArg
        );
        let n_total = (size_bytes / BLOCK_SIZE as u64) as u32;

        let mut itotal = itotal_req;
        if itotal == 0 {
            itotal = n_total / 8;
        }
        ensure!(itotal > 0, SofsError::InvalidArg);

        let mut itable_blocks = itotal.div_ceil(INODES_PER_BLOCK as u32);
        ensure!(n_total > 1 + itable_blocks, SofsError::InvalidArg);

        let dzone_total = (n_total - 1 - itable_blocks) / BLOCKS_PER_CLUSTER as u32;
        ensure!(dzone_total >= 1, SofsError::InvalidArg);

        // Final adjustment: the inode table absorbs the leftover blocks.
        itable_blocks = n_total - 1 - dzone_total * BLOCKS_PER_CLUSTER as u32;
        itotal = itable_blocks * INODES_PER_BLOCK as u32;

        Ok(DiskLayout {
            n_total,
            itable_blocks,
            itotal,
            dzone_start: ITABLE_START + itable_blocks,
            dzone_total,
        })
    }

    /// Physical block holding inode `n`, and the record offset inside it.
    #[inline]
    pub fn inode_location(&self, n: u32) -> (u32, usize) {
        (
            ITABLE_START + n / INODES_PER_BLOCK as u32,
            (n as usize % INODES_PER_BLOCK) * INODE_SIZE,
        )
    }

    /// Physical block index of the first block of logical cluster `lc`.
    #[inline]
    pub fn cluster_block(&self, lc: u32) -> u32 {
        self.dzone_start + lc * BLOCKS_PER_CLUSTER as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_19_blocks_16_inodes() {
        let layout = DiskLayout::compute(19 * BLOCK_SIZE as u64, 16).unwrap();
        assert_eq!(layout.n_total, 19);
        assert_eq!(layout.itable_blocks, 2);
        assert_eq!(layout.itotal, 16);
        assert_eq!(layout.dzone_start, 3);
        assert_eq!(layout.dzone_total, 4);
        // the occupation equation holds exactly
        assert_eq!(
            1 + layout.itable_blocks + layout.dzone_total * BLOCKS_PER_CLUSTER as u32,
            layout.n_total
        );
    }

    #[test]
    fn test_remainder_absorbed_by_inode_table() {
        // 100 blocks, 8 inodes: one table block would leave two blocks
        // unaccounted; the re-derivation widens the table to three blocks.
        let layout = DiskLayout::compute(100 * BLOCK_SIZE as u64, 8).unwrap();
        assert_eq!(layout.itable_blocks, 3);
        assert_eq!(layout.itotal, 24);
        assert_eq!(layout.dzone_total, 24);
        assert_eq!(
            1 + layout.itable_blocks + layout.dzone_total * BLOCKS_PER_CLUSTER as u32,
            layout.n_total
        );
    }

    #[test]
    fn test_default_inode_count() {
        let layout = DiskLayout::compute(1024 * BLOCK_SIZE as u64, 0).unwrap();
        // default is one inode per eight blocks, then rounded by layout
        assert!(layout.itotal >= 1024 / 8);
        assert_eq!(
            1 + layout.itable_blocks + layout.dzone_total * BLOCKS_PER_CLUSTER as u32,
            layout.n_total
        );
    }

    #[test]
    fn test_rejects_ragged_size() {
        assert_eq!(
            DiskLayout::compute(19 * BLOCK_SIZE as u64 + 1, 16),
            Err(SofsError::InvalidArg)
        );
    }

    #[test]
    fn test_rejects_too_small_device() {
        assert_eq!(
            DiskLayout::compute(2 * BLOCK_SIZE as u64, 8),
            Err(SofsError::InvalidArg)
        );
    }
}
