// SPDX-License-Identifier: MIT
//! Quick structural validators.
//!
//! These are cheap, local checks: a record is examined against the state
//! its caller expects, and the superblock against its own arithmetic.
//! Errors from this module are the non-recoverable "inconsistent" family
//! and signal a corrupted device.

use sofsio::BlockDev;

use crate::constant::*;
use crate::ensure;
use crate::errors::{SofsError, SofsResult};
use crate::filesystem::Sofs;
use crate::types::inode::{Inode, InodeState};

/// Validates an inode expected to be in use.
pub fn check_inode_in_use(inode: &Inode) -> SofsResult {
    match inode.state() {
        Some(InodeState::InUse) => Ok(()),
        _ => Err(SofsError::InodeInUseInconsistent),
    }
}

/// Validates an inode expected to be free, clean or dirty.
pub fn check_inode_free(inode: &Inode) -> SofsResult {
    match inode.state() {
        Some(InodeState::FreeClean) => {
            let clean = inode.d.iter().all(|&r| r == NULL_CLUSTER)
                && inode.i1 == NULL_CLUSTER
                && inode.i2 == NULL_CLUSTER
                && inode.clucount == 0;
            ensure!(clean, SofsError::Internal("free inode still holds references"));
            Ok(())
        }
        Some(InodeState::FreeDirty) => Ok(()),
        _ => Err(SofsError::Internal("inode is not free")),
    }
}

/// Validates an inode expected to be free in the dirty state.
pub fn check_inode_free_dirty(inode: &Inode) -> SofsResult {
    match inode.state() {
        Some(InodeState::FreeDirty) => Ok(()),
        _ => Err(SofsError::FreeInodeDirtyInconsistent),
    }
}

impl<'a, D: BlockDev + ?Sized> Sofs<'a, D> {
    /// Quick structural check of the cached superblock.
    pub fn check_superblock(&self) -> SofsResult {
        let sb = &self.sb;
        ensure!(sb.magic != MAGIC_SENTINEL, SofsError::Internal("volume was never fully formatted"));
        ensure!(sb.magic == MAGIC_NUMBER, SofsError::Internal("bad magic number"));
        ensure!(sb.version == VERSION_NUMBER, SofsError::Internal("unsupported version"));
        ensure!(sb.itable_start == ITABLE_START, SofsError::Internal("bad inode table start"));
        ensure!(
            1 + sb.itable_blocks + sb.dzone_total * BLOCKS_PER_CLUSTER as u32 == sb.ntotal,
            SofsError::Internal("block accounting does not add up")
        );
        ensure!(
            sb.itotal == sb.itable_blocks * INODES_PER_BLOCK as u32,
            SofsError::Internal("inode table size mismatch")
        );
        ensure!(sb.ifree <= sb.itotal - 1, SofsError::Internal("free inode count too high"));
        ensure!(
            sb.dzone_free <= sb.dzone_total - 1,
            SofsError::Internal("free cluster count too high")
        );
        ensure!(
            (sb.ihead == NULL_INODE) == (sb.ifree == 0)
                && (sb.itail == NULL_INODE) == (sb.ifree == 0),
            SofsError::Internal("free inode list endpoints inconsistent")
        );
        ensure!(
            (sb.dhead == NULL_CLUSTER) == (sb.dtail == NULL_CLUSTER),
            SofsError::Internal("free cluster list endpoints inconsistent")
        );
        ensure!(
            sb.retrieve_idx <= FREE_CACHE_SIZE as u32 && sb.insert_idx <= FREE_CACHE_SIZE as u32,
            SofsError::Internal("cache index out of range")
        );
        Ok(())
    }

    /// Validates the header of cluster `lc` and returns its `stat` field.
    pub fn cluster_status(&mut self, lc: u32) -> SofsResult<u32> {
        let cluster = self.read_cluster(lc)?;
        let stat = cluster.stat;
        ensure!(
            stat == NULL_INODE || stat < self.sb.itotal,
            SofsError::ClusterHeaderInconsistent
        );
        Ok(stat)
    }

    /// Length of the free-inode list walked head to tail via `next`.
    pub fn count_free_inodes_forward(&mut self) -> SofsResult<u32> {
        let mut count = 0;
        let mut cur = self.sb.ihead;
        while cur != NULL_INODE {
            ensure!(cur < self.sb.itotal, SofsError::Internal("free inode link out of range"));
            ensure!(count < self.sb.itotal, SofsError::Internal("free inode list loops"));
            let inode = self.inode_at(cur)?;
            check_inode_free(&inode)?;
            cur = inode
                .next_free()
                .ok_or(SofsError::Internal("free inode without link"))?;
            count += 1;
        }
        Ok(count)
    }

    /// Length of the free-inode list walked tail to head via `prev`.
    pub fn count_free_inodes_backward(&mut self) -> SofsResult<u32> {
        let mut count = 0;
        let mut cur = self.sb.itail;
        while cur != NULL_INODE {
            ensure!(cur < self.sb.itotal, SofsError::Internal("free inode link out of range"));
            ensure!(count < self.sb.itotal, SofsError::Internal("free inode list loops"));
            let inode = self.inode_at(cur)?;
            check_inode_free(&inode)?;
            cur = inode
                .prev_free()
                .ok_or(SofsError::Internal("free inode without link"))?;
            count += 1;
        }
        Ok(count)
    }

    /// Length of the on-disk free-cluster list walked head to tail.
    pub fn count_free_list_clusters(&mut self) -> SofsResult<u32> {
        let mut count = 0;
        let mut cur = self.sb.dhead;
        while cur != NULL_CLUSTER {
            ensure!(
                cur < self.sb.dzone_total,
                SofsError::Internal("free cluster link out of range")
            );
            ensure!(
                count < self.sb.dzone_total,
                SofsError::Internal("free cluster list loops")
            );
            let cluster = self.read_cluster(cur)?;
            cur = cluster.next;
            count += 1;
        }
        Ok(count)
    }

    /// Asserts the three-place accounting of free clusters: caches plus
    /// on-disk list must sum to the counter in the superblock.
    pub fn check_free_cluster_accounting(&mut self) -> SofsResult {
        let on_list = self.count_free_list_clusters()?;
        let total = self.sb.retrieve_len() + self.sb.insert_len() + on_list;
        ensure!(
            total == self.sb.dzone_free,
            SofsError::Internal("free cluster accounting does not add up")
        );
        Ok(())
    }
}
