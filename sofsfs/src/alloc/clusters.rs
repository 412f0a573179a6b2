// SPDX-License-Identifier: MIT
//! The free-cluster repository.
//!
//! Free data clusters live in three places at once: a retrieval cache in
//! the superblock drained by allocations, an insertion cache filled by
//! frees, and an on-disk double-linked list threaded through the headers
//! of the free clusters themselves. The invariant across the three is
//!
//! ```text
//! retrieve occupancy + insert occupancy + list length = dzone_free
//! ```
//!
//! When the retrieval cache runs out it is replenished from the head of
//! the list; when the list itself runs out the insertion cache is
//! depleted into it first. When the insertion cache fills up it is
//! depleted to the tail of the list.

use sofsio::BlockDev;

use crate::check::{check_inode_free_dirty, check_inode_in_use};
use crate::constant::*;
use crate::ensure;
use crate::errors::{SofsError, SofsResult};
use crate::filesystem::Sofs;
use crate::types::inode::InodeState;

impl<'a, D: BlockDev + ?Sized> Sofs<'a, D> {
    /// Allocates a free data cluster and associates it to inode `n_inode`.
    ///
    /// The reference is taken from the retrieval cache. A cluster released
    /// without being dissociated from its previous owner is cleaned before
    /// it is handed out. On return the header reads
    /// `{prev: null, next: null, stat: n_inode}`.
    pub fn alloc_data_cluster(&mut self, n_inode: u32) -> SofsResult<u32> {
        ensure!(
            n_inode != ROOT_INODE && n_inode < self.sb.itotal,
            SofsError::InvalidArg
        );
        ensure!(self.sb.dzone_free > 0, SofsError::NoSpace);

        let inode = self.inode_at(n_inode)?;
        check_inode_in_use(&inode)?;

        if self.sb.retrieve_idx == FREE_CACHE_SIZE as u32 {
            self.replenish()?;
        }

        let slot = self.sb.retrieve_idx as usize;
        let nclust = self.sb.retrieve_cache[slot];
        ensure!(
            nclust != NULL_CLUSTER && nclust < self.sb.dzone_total,
            SofsError::Internal("retrieval cache corrupt")
        );
        self.sb.retrieve_cache[slot] = NULL_CLUSTER;
        self.sb.retrieve_idx += 1;
        self.sb.dzone_free -= 1;
        self.store_superblock()?;

        // a dirty cluster still names the inode it was torn from
        let cluster = self.read_cluster(nclust)?;
        if cluster.stat != NULL_INODE {
            ensure!(
                cluster.stat < self.sb.itotal,
                SofsError::ClusterHeaderInconsistent
            );
            self.clean_cluster_entry(cluster.stat, nclust)?;
        }

        let mut cluster = self.read_cluster(nclust)?;
        cluster.prev = NULL_CLUSTER;
        cluster.next = NULL_CLUSTER;
        cluster.stat = n_inode;
        self.write_cluster(nclust, &cluster)?;

        Ok(nclust)
    }

    /// Releases data cluster `nclust` into the insertion cache.
    ///
    /// The header keeps its `stat` field, so the cluster stays dirty until
    /// someone dissociates it; `prev` and `next` are nulled. Cluster 0,
    /// the root directory's first cluster, can never be freed.
    pub fn free_data_cluster(&mut self, nclust: u32) -> SofsResult {
        ensure!(
            nclust != ROOT_CLUSTER && nclust < self.sb.dzone_total,
            SofsError::InvalidArg
        );

        let mut cluster = self.read_cluster(nclust)?;
        ensure!(cluster.stat != NULL_INODE, SofsError::InvalidArg);
        ensure!(
            cluster.stat < self.sb.itotal,
            SofsError::ClusterHeaderInconsistent
        );

        cluster.prev = NULL_CLUSTER;
        cluster.next = NULL_CLUSTER;
        self.write_cluster(nclust, &cluster)?;

        if self.sb.insert_idx == FREE_CACHE_SIZE as u32 {
            self.deplete()?;
        }

        let slot = self.sb.insert_idx as usize;
        self.sb.insert_cache[slot] = nclust;
        self.sb.insert_idx += 1;
        self.sb.dzone_free += 1;
        self.store_superblock()?;

        Ok(())
    }

    /// Refills the retrieval cache from the head of the on-disk list.
    ///
    /// Walks `next` links from the head, parking each reference in the
    /// cache from slot `capacity - need` upward and nulling the links of
    /// every cluster taken. If the list dries up before `need` is met the
    /// insertion cache is depleted into the list and the walk resumes.
    fn replenish(&mut self) -> SofsResult {
        let need = self.sb.dzone_free.min(FREE_CACHE_SIZE as u32) as usize;
        let first_slot = FREE_CACHE_SIZE - need;

        let mut cur = self.sb.dhead;
        for slot in first_slot..FREE_CACHE_SIZE {
            if cur == NULL_CLUSTER {
                // the list ran dry; move the insertion cache onto it
                self.sb.dhead = NULL_CLUSTER;
                self.sb.dtail = NULL_CLUSTER;
                self.deplete()?;
                cur = self.sb.dhead;
                ensure!(
                    cur != NULL_CLUSTER,
                    SofsError::Internal("free cluster accounting does not add up")
                );
            }
            ensure!(
                cur < self.sb.dzone_total,
                SofsError::Internal("free cluster link out of range")
            );
            let mut cluster = self.read_cluster(cur)?;
            self.sb.retrieve_cache[slot] = cur;
            let next = cluster.next;
            cluster.prev = NULL_CLUSTER;
            cluster.next = NULL_CLUSTER;
            self.write_cluster(cur, &cluster)?;
            cur = next;
        }

        self.sb.dhead = cur;
        if cur != NULL_CLUSTER {
            let mut head = self.read_cluster(cur)?;
            head.prev = NULL_CLUSTER;
            self.write_cluster(cur, &head)?;
        } else {
            self.sb.dtail = NULL_CLUSTER;
        }
        self.sb.retrieve_idx = first_slot as u32;
        self.store_superblock()?;

        Ok(())
    }

    /// Drains the insertion cache onto the tail of the on-disk list.
    fn deplete(&mut self) -> SofsResult {
        let count = self.sb.insert_idx as usize;
        if count == 0 {
            return Ok(());
        }

        let old_tail = self.sb.dtail;
        if old_tail != NULL_CLUSTER {
            let mut tail = self.read_cluster(old_tail)?;
            tail.next = self.sb.insert_cache[0];
            self.write_cluster(old_tail, &tail)?;
        }

        for k in 0..count {
            let c = self.sb.insert_cache[k];
            ensure!(
                c != NULL_CLUSTER && c < self.sb.dzone_total,
                SofsError::Internal("insertion cache corrupt")
            );
            let mut cluster = self.read_cluster(c)?;
            cluster.prev = if k == 0 {
                old_tail
            } else {
                self.sb.insert_cache[k - 1]
            };
            cluster.next = if k == count - 1 {
                NULL_CLUSTER
            } else {
                self.sb.insert_cache[k + 1]
            };
            self.write_cluster(c, &cluster)?;
        }

        self.sb.dtail = self.sb.insert_cache[count - 1];
        if self.sb.dhead == NULL_CLUSTER {
            self.sb.dhead = self.sb.insert_cache[0];
        }
        for slot in self.sb.insert_cache.iter_mut() {
            *slot = NULL_CLUSTER;
        }
        self.sb.insert_idx = 0;
        self.store_superblock()?;

        Ok(())
    }

    /// Dissociates cluster `nclust` from the inode its header still names.
    ///
    /// Used when the allocator pops a dirty reference: the previous owner,
    /// free-dirty or still in use, keeps a stale reference to the cluster
    /// that must be wiped before the cluster changes hands.
    pub(crate) fn clean_cluster_entry(&mut self, n_inode: u32, nclust: u32) -> SofsResult {
        let inode = self.inode_at(n_inode)?;
        match inode.state() {
            Some(InodeState::FreeDirty) => check_inode_free_dirty(&inode)?,
            Some(InodeState::InUse) => check_inode_in_use(&inode)?,
            _ => return Err(SofsError::ClusterHeaderInconsistent),
        }

        let mut inode = inode;

        // direct table
        if let Some(k) = (0..DIRECT_REFS).find(|&k| inode.d[k] == nclust) {
            inode.d[k] = NULL_CLUSTER;
            self.put_inode(n_inode, &inode)?;
            return self.mark_cluster_clean(nclust);
        }

        // the single-indirect index cluster itself, then its entries
        if inode.i1 == nclust {
            inode.i1 = NULL_CLUSTER;
            self.put_inode(n_inode, &inode)?;
            return self.mark_cluster_clean(nclust);
        }
        if inode.i1 != NULL_CLUSTER && self.wipe_ref_in_index(inode.i1, nclust)? {
            return self.mark_cluster_clean(nclust);
        }

        // the double-indirect tree
        if inode.i2 == nclust {
            inode.i2 = NULL_CLUSTER;
            self.put_inode(n_inode, &inode)?;
            return self.mark_cluster_clean(nclust);
        }
        if inode.i2 != NULL_CLUSTER {
            let i2c = self.read_cluster(inode.i2)?;
            for k in 0..REFS_PER_CLUSTER {
                let sub = i2c.ref_at(k);
                if sub == nclust {
                    let mut i2c = i2c;
                    i2c.set_ref_at(k, NULL_CLUSTER);
                    self.write_cluster(inode.i2, &i2c)?;
                    return self.mark_cluster_clean(nclust);
                }
                if sub != NULL_CLUSTER && self.wipe_ref_in_index(sub, nclust)? {
                    return self.mark_cluster_clean(nclust);
                }
            }
        }

        Err(SofsError::NotInList)
    }

    fn wipe_ref_in_index(&mut self, index_cluster: u32, nclust: u32) -> SofsResult<bool> {
        let mut ic = self.read_cluster(index_cluster)?;
        for k in 0..REFS_PER_CLUSTER {
            if ic.ref_at(k) == nclust {
                ic.set_ref_at(k, NULL_CLUSTER);
                self.write_cluster(index_cluster, &ic)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn mark_cluster_clean(&mut self, nclust: u32) -> SofsResult {
        let mut cluster = self.read_cluster(nclust)?;
        cluster.stat = NULL_INODE;
        self.write_cluster(nclust, &cluster)?;
        Ok(())
    }
}
