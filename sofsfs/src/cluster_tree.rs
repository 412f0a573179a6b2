// SPDX-License-Identifier: MIT
//! The per-inode data-cluster reference tree.
//!
//! An inode addresses up to `DIRECT_REFS + REFS_PER_CLUSTER +
//! REFS_PER_CLUSTER^2` data clusters through a single logical index:
//! the direct table, then one single-indirect index cluster, then a
//! double-indirect tree of index clusters. Index clusters are allocated
//! lazily and count towards the inode's `clucount`.
//!
//! Freeing keeps the reference slots in place (the cluster turns dirty on
//! the free structure and the leftover reference is what later lets the
//! dirty inode be cleaned); dissociating wipes them. An index cluster is
//! released as soon as none of its entries is attached any more, where a
//! reference counts as attached while its cluster names the inode as
//! owner and has not been released into the repository.

use std::collections::HashSet;

use sofsio::BlockDev;

use crate::check::{check_inode_free_dirty, check_inode_in_use};
use crate::constant::*;
use crate::ensure;
use crate::errors::{SofsError, SofsResult};
use crate::filesystem::Sofs;
use crate::types::Cluster;

/// Operation applied to one logical slot of the reference tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterOp {
    /// Return the referenced cluster, never modifying anything.
    Get,
    /// Allocate a cluster into an empty slot and chain it to its
    /// logical neighbours.
    Alloc,
    /// Release the referenced cluster to the repository, leaving the
    /// reference in place.
    Free,
    /// Release the cluster, dissociate it from the inode and wipe the
    /// reference.
    FreeClean,
    /// Dissociate the already-released cluster and wipe the reference;
    /// only legal on a free-dirty inode.
    Clean,
}

/// Where a logical index lands in the reference tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Direct(usize),
    Single(usize),
    Double(usize, usize),
}

fn slot_of(idx: u32) -> Slot {
    let idx = idx as usize;
    if idx < DIRECT_REFS {
        Slot::Direct(idx)
    } else if idx < DIRECT_REFS + REFS_PER_CLUSTER {
        Slot::Single(idx - DIRECT_REFS)
    } else {
        let off = idx - DIRECT_REFS - REFS_PER_CLUSTER;
        Slot::Double(off / REFS_PER_CLUSTER, off % REFS_PER_CLUSTER)
    }
}

impl<'a, D: BlockDev + ?Sized> Sofs<'a, D> {
    /// Logical cluster referenced at index `idx`, or `NULL_CLUSTER`.
    pub fn get_cluster(&mut self, n_inode: u32, idx: u32) -> SofsResult<u32> {
        self.handle_cluster(n_inode, idx, ClusterOp::Get)
    }

    /// Allocates a data cluster at index `idx` of inode `n_inode`.
    pub fn alloc_cluster_at(&mut self, n_inode: u32, idx: u32) -> SofsResult<u32> {
        self.handle_cluster(n_inode, idx, ClusterOp::Alloc)
    }

    /// Releases the cluster at index `idx`, reference left in place.
    pub fn free_cluster_at(&mut self, n_inode: u32, idx: u32) -> SofsResult {
        self.handle_cluster(n_inode, idx, ClusterOp::Free)?;
        Ok(())
    }

    /// Releases and dissociates the cluster at index `idx`.
    pub fn free_clean_cluster_at(&mut self, n_inode: u32, idx: u32) -> SofsResult {
        self.handle_cluster(n_inode, idx, ClusterOp::FreeClean)?;
        Ok(())
    }

    /// Dissociates the cluster at index `idx` of a free-dirty inode.
    pub fn clean_cluster_at(&mut self, n_inode: u32, idx: u32) -> SofsResult {
        self.handle_cluster(n_inode, idx, ClusterOp::Clean)?;
        Ok(())
    }

    /// Applies `op` to the slot at logical index `idx` of inode
    /// `n_inode`. Returns the cluster reference for `Get` and `Alloc`,
    /// `NULL_CLUSTER` otherwise.
    pub fn handle_cluster(&mut self, n_inode: u32, idx: u32, op: ClusterOp) -> SofsResult<u32> {
        ensure!(n_inode < self.sb.itotal, SofsError::InvalidArg);
        ensure!((idx as usize) < MAX_FILE_CLUSTERS, SofsError::InvalidArg);

        let inode = self.inode_at(n_inode)?;
        match op {
            ClusterOp::Clean => check_inode_free_dirty(&inode)?,
            _ => check_inode_in_use(&inode)?,
        }

        match op {
            ClusterOp::Get => self.slot_value(n_inode, idx),
            ClusterOp::Alloc => self.alloc_slot(n_inode, idx),
            ClusterOp::Free => {
                self.free_slot(n_inode, idx)?;
                Ok(NULL_CLUSTER)
            }
            ClusterOp::FreeClean => {
                self.free_clean_slot(n_inode, idx)?;
                Ok(NULL_CLUSTER)
            }
            ClusterOp::Clean => {
                self.clean_slot(n_inode, idx)?;
                Ok(NULL_CLUSTER)
            }
        }
    }

    /// Applies `op` (`Free`, `FreeClean` or `Clean`) to every allocated
    /// logical index `>= start`, working through the double-indirect,
    /// then single-indirect, then direct ranges.
    pub fn handle_clusters_from(&mut self, n_inode: u32, start: u32, op: ClusterOp) -> SofsResult {
        ensure!(n_inode < self.sb.itotal, SofsError::InvalidArg);
        ensure!((start as usize) < MAX_FILE_CLUSTERS, SofsError::InvalidArg);

        let inode = self.inode_at(n_inode)?;
        match op {
            ClusterOp::Free => {
                check_inode_in_use(&inode)?;
                self.bulk_free_from(n_inode, start)
            }
            ClusterOp::FreeClean | ClusterOp::Clean => {
                if op == ClusterOp::Clean {
                    check_inode_free_dirty(&inode)?;
                } else {
                    check_inode_in_use(&inode)?;
                }
                while let Some(idx) = self.highest_attached(n_inode, start)? {
                    self.handle_cluster(n_inode, idx, op)?;
                }
                Ok(())
            }
            _ => Err(SofsError::InvalidArg),
        }
    }

    // === slot reads ===

    fn slot_value(&mut self, n_inode: u32, idx: u32) -> SofsResult<u32> {
        let inode = self.inode_at(n_inode)?;
        match slot_of(idx) {
            Slot::Direct(k) => Ok(inode.d[k]),
            Slot::Single(off) => {
                if inode.i1 == NULL_CLUSTER {
                    return Ok(NULL_CLUSTER);
                }
                let ic = self.read_index(inode.i1)?;
                Ok(ic.ref_at(off))
            }
            Slot::Double(k, j) => {
                if inode.i2 == NULL_CLUSTER {
                    return Ok(NULL_CLUSTER);
                }
                let i2c = self.read_index(inode.i2)?;
                let sub = i2c.ref_at(k);
                if sub == NULL_CLUSTER {
                    return Ok(NULL_CLUSTER);
                }
                let subc = self.read_index(sub)?;
                Ok(subc.ref_at(j))
            }
        }
    }

    fn read_index(&mut self, lc: u32) -> SofsResult<Cluster> {
        ensure!(lc < self.sb.dzone_total, SofsError::RefListInconsistent);
        self.read_cluster(lc)
    }

    // === Alloc ===

    fn alloc_slot(&mut self, n_inode: u32, idx: u32) -> SofsResult<u32> {
        ensure!(
            self.slot_value(n_inode, idx)? == NULL_CLUSTER,
            SofsError::AlreadyInList
        );

        // the data cluster and any missing index clusters must all be
        // available before anything is installed
        let needed = match slot_of(idx) {
            Slot::Direct(_) => 1,
            Slot::Single(_) => 1 + u32::from(self.inode_at(n_inode)?.i1 == NULL_CLUSTER),
            Slot::Double(k, _) => {
                let inode = self.inode_at(n_inode)?;
                if inode.i2 == NULL_CLUSTER {
                    3
                } else {
                    1 + u32::from(self.read_index(inode.i2)?.ref_at(k) == NULL_CLUSTER)
                }
            }
        };
        ensure!(self.sb.dzone_free >= needed, SofsError::NoSpace);

        let nc = match slot_of(idx) {
            Slot::Direct(k) => {
                let nc = self.alloc_data_cluster(n_inode)?;
                let mut inode = self.inode_at(n_inode)?;
                inode.d[k] = nc;
                inode.clucount += 1;
                self.put_inode(n_inode, &inode)?;
                nc
            }
            Slot::Single(off) => {
                let inode = self.inode_at(n_inode)?;
                if inode.i1 == NULL_CLUSTER {
                    let ic = self.alloc_data_cluster(n_inode)?;
                    self.init_index_cluster(ic)?;
                    let mut inode = self.inode_at(n_inode)?;
                    inode.i1 = ic;
                    inode.clucount += 1;
                    self.put_inode(n_inode, &inode)?;
                }
                let nc = self.alloc_data_cluster(n_inode)?;
                let i1 = self.inode_at(n_inode)?.i1;
                let mut ic = self.read_index(i1)?;
                ic.set_ref_at(off, nc);
                self.write_cluster(i1, &ic)?;
                let mut inode = self.inode_at(n_inode)?;
                inode.clucount += 1;
                self.put_inode(n_inode, &inode)?;
                nc
            }
            Slot::Double(k, j) => {
                let inode = self.inode_at(n_inode)?;
                if inode.i2 == NULL_CLUSTER {
                    let ic = self.alloc_data_cluster(n_inode)?;
                    self.init_index_cluster(ic)?;
                    let mut inode = self.inode_at(n_inode)?;
                    inode.i2 = ic;
                    inode.clucount += 1;
                    self.put_inode(n_inode, &inode)?;
                }
                let i2 = self.inode_at(n_inode)?.i2;
                if self.read_index(i2)?.ref_at(k) == NULL_CLUSTER {
                    let sub = self.alloc_data_cluster(n_inode)?;
                    self.init_index_cluster(sub)?;
                    let mut i2c = self.read_index(i2)?;
                    i2c.set_ref_at(k, sub);
                    self.write_cluster(i2, &i2c)?;
                    let mut inode = self.inode_at(n_inode)?;
                    inode.clucount += 1;
                    self.put_inode(n_inode, &inode)?;
                }
                let nc = self.alloc_data_cluster(n_inode)?;
                let sub = self.read_index(i2)?.ref_at(k);
                let mut subc = self.read_index(sub)?;
                subc.set_ref_at(j, nc);
                self.write_cluster(sub, &subc)?;
                let mut inode = self.inode_at(n_inode)?;
                inode.clucount += 1;
                self.put_inode(n_inode, &inode)?;
                nc
            }
        };

        self.attach_sibling(n_inode, idx, nc)?;
        Ok(nc)
    }

    /// Zero-initialises a freshly allocated index cluster: every
    /// reference slot to the null sentinel.
    fn init_index_cluster(&mut self, lc: u32) -> SofsResult {
        let mut cluster = self.read_cluster(lc)?;
        cluster.fill_null_refs();
        self.write_cluster(lc, &cluster)
    }

    /// Chains the newly attached cluster to the clusters at the adjacent
    /// logical indices of the same file, in both directions.
    fn attach_sibling(&mut self, n_inode: u32, idx: u32, nc: u32) -> SofsResult {
        let prev_lc = if idx > 0 {
            self.slot_value(n_inode, idx - 1)?
        } else {
            NULL_CLUSTER
        };
        let next_lc = if ((idx + 1) as usize) < MAX_FILE_CLUSTERS {
            self.slot_value(n_inode, idx + 1)?
        } else {
            NULL_CLUSTER
        };

        let mut cluster = self.read_cluster(nc)?;
        cluster.prev = prev_lc;
        cluster.next = next_lc;
        self.write_cluster(nc, &cluster)?;

        if prev_lc != NULL_CLUSTER {
            let mut prev = self.read_cluster(prev_lc)?;
            prev.next = nc;
            self.write_cluster(prev_lc, &prev)?;
        }
        if next_lc != NULL_CLUSTER {
            let mut next = self.read_cluster(next_lc)?;
            next.prev = nc;
            self.write_cluster(next_lc, &next)?;
        }
        Ok(())
    }

    // === Free ===

    fn free_slot(&mut self, n_inode: u32, idx: u32) -> SofsResult {
        let lc = self.slot_value(n_inode, idx)?;
        ensure!(lc != NULL_CLUSTER, SofsError::NotInList);
        ensure!(
            !self.repository_resident()?.contains(&lc),
            SofsError::AlreadyInList
        );

        self.free_data_cluster(lc)?;
        self.bump_clucount(n_inode, 1)?;

        // release index clusters left without attached entries
        match slot_of(idx) {
            Slot::Direct(_) => {}
            Slot::Single(_) => {
                let i1 = self.inode_at(n_inode)?.i1;
                if i1 != NULL_CLUSTER && !self.index_has_attached(n_inode, i1)? {
                    self.free_data_cluster(i1)?;
                    self.bump_clucount(n_inode, 1)?;
                }
            }
            Slot::Double(k, _) => {
                let i2 = self.inode_at(n_inode)?.i2;
                if i2 != NULL_CLUSTER {
                    let sub = self.read_index(i2)?.ref_at(k);
                    if sub != NULL_CLUSTER && !self.index_has_attached(n_inode, sub)? {
                        self.free_data_cluster(sub)?;
                        self.bump_clucount(n_inode, 1)?;
                    }
                    if !self.double_has_attached(n_inode, i2)? {
                        self.free_data_cluster(i2)?;
                        self.bump_clucount(n_inode, 1)?;
                    }
                }
            }
        }
        Ok(())
    }

    // === FreeClean / Clean ===

    fn free_clean_slot(&mut self, n_inode: u32, idx: u32) -> SofsResult {
        let lc = self.slot_value(n_inode, idx)?;
        ensure!(lc != NULL_CLUSTER, SofsError::NotInList);
        ensure!(
            !self.repository_resident()?.contains(&lc),
            SofsError::AlreadyInList
        );
        ensure!(
            self.read_cluster(lc)?.stat == n_inode,
            SofsError::WrongClusterOwner
        );

        self.free_data_cluster(lc)?;
        self.dissociate_cluster(lc)?;
        self.wipe_slot(n_inode, idx)?;
        self.bump_clucount(n_inode, 1)?;
        self.collapse_empty_indexes(n_inode, idx, true)
    }

    fn clean_slot(&mut self, n_inode: u32, idx: u32) -> SofsResult {
        let lc = self.slot_value(n_inode, idx)?;
        ensure!(lc != NULL_CLUSTER, SofsError::NotInList);
        ensure!(
            self.read_cluster(lc)?.stat == n_inode,
            SofsError::WrongClusterOwner
        );

        // the release already happened; only the association is undone
        self.dissociate_cluster(lc)?;
        self.wipe_slot(n_inode, idx)?;
        self.collapse_empty_indexes(n_inode, idx, false)
    }

    fn dissociate_cluster(&mut self, lc: u32) -> SofsResult {
        let mut cluster = self.read_cluster(lc)?;
        cluster.stat = NULL_INODE;
        self.write_cluster(lc, &cluster)
    }

    fn wipe_slot(&mut self, n_inode: u32, idx: u32) -> SofsResult {
        match slot_of(idx) {
            Slot::Direct(k) => {
                let mut inode = self.inode_at(n_inode)?;
                inode.d[k] = NULL_CLUSTER;
                self.put_inode(n_inode, &inode)
            }
            Slot::Single(off) => {
                let i1 = self.inode_at(n_inode)?.i1;
                ensure!(i1 != NULL_CLUSTER, SofsError::RefListInconsistent);
                let mut ic = self.read_index(i1)?;
                ic.set_ref_at(off, NULL_CLUSTER);
                self.write_cluster(i1, &ic)
            }
            Slot::Double(k, j) => {
                let i2 = self.inode_at(n_inode)?.i2;
                ensure!(i2 != NULL_CLUSTER, SofsError::RefListInconsistent);
                let sub = self.read_index(i2)?.ref_at(k);
                ensure!(sub != NULL_CLUSTER, SofsError::RefListInconsistent);
                let mut subc = self.read_index(sub)?;
                subc.set_ref_at(j, NULL_CLUSTER);
                self.write_cluster(sub, &subc)
            }
        }
    }

    /// After a slot was wiped, dissolves index clusters whose reference
    /// slots are all null. With `release` the index cluster also goes
    /// back to the repository; without it (the Clean path) only the
    /// association is undone.
    fn collapse_empty_indexes(&mut self, n_inode: u32, idx: u32, release: bool) -> SofsResult {
        match slot_of(idx) {
            Slot::Direct(_) => Ok(()),
            Slot::Single(_) => {
                let i1 = self.inode_at(n_inode)?.i1;
                ensure!(i1 != NULL_CLUSTER, SofsError::RefListInconsistent);
                if self.read_index(i1)?.all_refs_null() {
                    if release {
                        self.free_data_cluster(i1)?;
                        self.bump_clucount(n_inode, 1)?;
                    }
                    self.dissociate_cluster(i1)?;
                    let mut inode = self.inode_at(n_inode)?;
                    inode.i1 = NULL_CLUSTER;
                    self.put_inode(n_inode, &inode)?;
                }
                Ok(())
            }
            Slot::Double(k, _) => {
                let i2 = self.inode_at(n_inode)?.i2;
                ensure!(i2 != NULL_CLUSTER, SofsError::RefListInconsistent);
                let sub = self.read_index(i2)?.ref_at(k);
                ensure!(sub != NULL_CLUSTER, SofsError::RefListInconsistent);
                if self.read_index(sub)?.all_refs_null() {
                    if release {
                        self.free_data_cluster(sub)?;
                        self.bump_clucount(n_inode, 1)?;
                    }
                    self.dissociate_cluster(sub)?;
                    let mut i2c = self.read_index(i2)?;
                    i2c.set_ref_at(k, NULL_CLUSTER);
                    self.write_cluster(i2, &i2c)?;

                    if self.read_index(i2)?.all_refs_null() {
                        if release {
                            self.free_data_cluster(i2)?;
                            self.bump_clucount(n_inode, 1)?;
                        }
                        self.dissociate_cluster(i2)?;
                        let mut inode = self.inode_at(n_inode)?;
                        inode.i2 = NULL_CLUSTER;
                        self.put_inode(n_inode, &inode)?;
                    }
                }
                Ok(())
            }
        }
    }

    // === attachment probes ===

    /// Every cluster reference currently resident in the repository:
    /// both superblock caches plus the on-disk list.
    fn repository_resident(&mut self) -> SofsResult<HashSet<u32>> {
        let mut resident = HashSet::new();
        for &c in self.sb.retrieve_cache.iter() {
            if c != NULL_CLUSTER {
                resident.insert(c);
            }
        }
        for &c in self.sb.insert_cache[..self.sb.insert_idx as usize].iter() {
            resident.insert(c);
        }
        let mut cur = self.sb.dhead;
        let mut seen = 0u32;
        while cur != NULL_CLUSTER {
            ensure!(
                cur < self.sb.dzone_total && seen < self.sb.dzone_total,
                SofsError::Internal("free cluster list corrupt")
            );
            resident.insert(cur);
            cur = self.read_cluster(cur)?.next;
            seen += 1;
        }
        Ok(resident)
    }

    /// Whether the referenced data cluster is still attached to the
    /// file: it names the inode as owner and has not been released to
    /// the repository.
    fn ref_is_attached(
        &mut self,
        n_inode: u32,
        lc: u32,
        resident: &HashSet<u32>,
    ) -> SofsResult<bool> {
        if lc == NULL_CLUSTER || lc >= self.sb.dzone_total || resident.contains(&lc) {
            return Ok(false);
        }
        Ok(self.read_cluster(lc)?.stat == n_inode)
    }

    fn index_has_attached(&mut self, n_inode: u32, index_lc: u32) -> SofsResult<bool> {
        let resident = self.repository_resident()?;
        self.index_has_attached_in(n_inode, index_lc, &resident)
    }

    fn index_has_attached_in(
        &mut self,
        n_inode: u32,
        index_lc: u32,
        resident: &HashSet<u32>,
    ) -> SofsResult<bool> {
        let ic = self.read_index(index_lc)?;
        for k in 0..REFS_PER_CLUSTER {
            if self.ref_is_attached(n_inode, ic.ref_at(k), resident)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn double_has_attached(&mut self, n_inode: u32, i2_lc: u32) -> SofsResult<bool> {
        let resident = self.repository_resident()?;
        let i2c = self.read_index(i2_lc)?;
        for k in 0..REFS_PER_CLUSTER {
            let sub = i2c.ref_at(k);
            if sub != NULL_CLUSTER
                && sub < self.sb.dzone_total
                && !resident.contains(&sub)
                && self.index_has_attached_in(n_inode, sub, &resident)?
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    // === bulk walks ===

    fn bump_clucount(&mut self, n_inode: u32, by: u32) -> SofsResult {
        let mut inode = self.inode_at(n_inode)?;
        inode.clucount = inode.clucount.saturating_sub(by);
        self.put_inode(n_inode, &inode)
    }

    /// Frees every attached cluster at a logical index `>= start`,
    /// double-indirect range first, index clusters included once their
    /// entries are gone. References stay in place throughout.
    fn bulk_free_from(&mut self, n_inode: u32, start: u32) -> SofsResult {
        let inode = self.inode_at(n_inode)?;
        let resident = self.repository_resident()?;

        if inode.i2 != NULL_CLUSTER && !resident.contains(&inode.i2) {
            let i2c = self.read_index(inode.i2)?;
            for k in (0..REFS_PER_CLUSTER).rev() {
                let sub = i2c.ref_at(k);
                if sub == NULL_CLUSTER || resident.contains(&sub) {
                    continue;
                }
                let base = (DIRECT_REFS + REFS_PER_CLUSTER + k * REFS_PER_CLUSTER) as u32;
                if base + REFS_PER_CLUSTER as u32 <= start {
                    break;
                }
                let subc = self.read_index(sub)?;
                for j in (0..REFS_PER_CLUSTER).rev() {
                    let idx = base + j as u32;
                    if idx < start {
                        break;
                    }
                    let lc = subc.ref_at(j);
                    if self.ref_is_attached(n_inode, lc, &resident)? {
                        self.free_data_cluster(lc)?;
                        self.bump_clucount(n_inode, 1)?;
                    }
                }
                if !self.index_has_attached(n_inode, sub)? {
                    self.free_data_cluster(sub)?;
                    self.bump_clucount(n_inode, 1)?;
                }
            }
            if !self.double_has_attached(n_inode, inode.i2)? {
                self.free_data_cluster(inode.i2)?;
                self.bump_clucount(n_inode, 1)?;
            }
        }

        if inode.i1 != NULL_CLUSTER
            && !resident.contains(&inode.i1)
            && start < (DIRECT_REFS + REFS_PER_CLUSTER) as u32
        {
            let ic = self.read_index(inode.i1)?;
            for j in (0..REFS_PER_CLUSTER).rev() {
                let idx = (DIRECT_REFS + j) as u32;
                if idx < start {
                    break;
                }
                let lc = ic.ref_at(j);
                if self.ref_is_attached(n_inode, lc, &resident)? {
                    self.free_data_cluster(lc)?;
                    self.bump_clucount(n_inode, 1)?;
                }
            }
            if !self.index_has_attached(n_inode, inode.i1)? {
                self.free_data_cluster(inode.i1)?;
                self.bump_clucount(n_inode, 1)?;
            }
        }

        for k in (0..DIRECT_REFS).rev() {
            if (k as u32) < start {
                break;
            }
            if self.ref_is_attached(n_inode, inode.d[k], &resident)? {
                self.free_data_cluster(inode.d[k])?;
                self.bump_clucount(n_inode, 1)?;
            }
        }
        Ok(())
    }

    /// Highest logical index `>= start` whose slot still holds a
    /// reference, or `None` once the tree is bare.
    fn highest_attached(&mut self, n_inode: u32, start: u32) -> SofsResult<Option<u32>> {
        let inode = self.inode_at(n_inode)?;

        if inode.i2 != NULL_CLUSTER {
            let i2c = self.read_index(inode.i2)?;
            for k in (0..REFS_PER_CLUSTER).rev() {
                let sub = i2c.ref_at(k);
                if sub == NULL_CLUSTER {
                    continue;
                }
                let base = (DIRECT_REFS + REFS_PER_CLUSTER + k * REFS_PER_CLUSTER) as u32;
                let subc = self.read_index(sub)?;
                for j in (0..REFS_PER_CLUSTER).rev() {
                    if subc.ref_at(j) != NULL_CLUSTER {
                        let idx = base + j as u32;
                        return if idx >= start { Ok(Some(idx)) } else { Ok(None) };
                    }
                }
            }
        }

        if inode.i1 != NULL_CLUSTER {
            let ic = self.read_index(inode.i1)?;
            for j in (0..REFS_PER_CLUSTER).rev() {
                if ic.ref_at(j) != NULL_CLUSTER {
                    let idx = (DIRECT_REFS + j) as u32;
                    if idx >= start {
                        return Ok(Some(idx));
                    }
                    break;
                }
            }
        }

        for k in (0..DIRECT_REFS).rev() {
            if inode.d[k] != NULL_CLUSTER {
                let idx = k as u32;
                return if idx >= start { Ok(Some(idx)) } else { Ok(None) };
            }
        }
        Ok(None)
    }
}
