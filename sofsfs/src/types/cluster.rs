// SPDX-License-Identifier: MIT
//! Data cluster record.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::constant::*;
use crate::types::direntry::DirEntry;

/// Data cluster record: a three-word header followed by the payload.
///
/// The payload is one of: raw file bytes, an array of
/// `DIR_ENTRIES_PER_CLUSTER` directory entries, or an array of
/// `REFS_PER_CLUSTER` cluster references. The header links the cluster
/// either into the free-cluster list (`prev`/`next` are list links,
/// `stat` keeps the releasing inode until the cluster is cleaned) or into
/// the sibling chain of its owning inode (`prev`/`next` are the clusters
/// at the adjacent logical indices, `stat` is the owner).
#[derive(Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct Cluster {
    pub prev: u32,
    pub next: u32,
    /// Owning inode, or `NULL_INODE` for a clean free cluster.
    pub stat: u32,
    pub payload: [u8; CLUSTER_PAYLOAD],
}

impl Cluster {
    /// A clean free cluster with a zeroed payload.
    pub fn free_clean() -> Cluster {
        Cluster {
            prev: NULL_CLUSTER,
            next: NULL_CLUSTER,
            stat: NULL_INODE,
            payload: [0u8; CLUSTER_PAYLOAD],
        }
    }

    /// Whether the header says the cluster sits on the free list without
    /// a leftover owner.
    #[inline]
    pub fn is_free_clean(&self) -> bool {
        self.stat == NULL_INODE
    }

    // === reference payload ===

    /// Reference at slot `idx` of an index cluster.
    pub fn ref_at(&self, idx: usize) -> u32 {
        debug_assert!(idx < REFS_PER_CLUSTER);
        let start = idx * 4;
        u32::from_le_bytes(self.payload[start..start + 4].try_into().unwrap())
    }

    /// Stores a reference at slot `idx` of an index cluster.
    pub fn set_ref_at(&mut self, idx: usize, val: u32) {
        debug_assert!(idx < REFS_PER_CLUSTER);
        let start = idx * 4;
        self.payload[start..start + 4].copy_from_slice(&val.to_le_bytes());
    }

    /// Fills every reference slot with the null sentinel.
    pub fn fill_null_refs(&mut self) {
        for idx in 0..REFS_PER_CLUSTER {
            self.set_ref_at(idx, NULL_CLUSTER);
        }
    }

    /// Whether every reference slot holds the null sentinel.
    pub fn all_refs_null(&self) -> bool {
        (0..REFS_PER_CLUSTER).all(|idx| self.ref_at(idx) == NULL_CLUSTER)
    }

    // === directory payload ===

    /// Directory entry at slot `idx`.
    pub fn entry_at(&self, idx: usize) -> DirEntry {
        debug_assert!(idx < DIR_ENTRIES_PER_CLUSTER);
        let start = idx * DIR_ENTRY_SIZE;
        DirEntry::read_from_bytes(&self.payload[start..start + DIR_ENTRY_SIZE])
            .expect("directory entry layout")
    }

    /// Stores a directory entry at slot `idx`.
    pub fn set_entry_at(&mut self, idx: usize, entry: &DirEntry) {
        debug_assert!(idx < DIR_ENTRIES_PER_CLUSTER);
        let start = idx * DIR_ENTRY_SIZE;
        self.payload[start..start + DIR_ENTRY_SIZE].copy_from_slice(entry.as_bytes());
    }

    /// Formats the payload as a directory with every slot free and clean.
    pub fn format_dir(&mut self) {
        let free = DirEntry::free_clean();
        for idx in 0..DIR_ENTRIES_PER_CLUSTER {
            self.set_entry_at(idx, &free);
        }
    }
}

impl core::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Cluster")
            .field("prev", &self.prev)
            .field("next", &self.next)
            .field("stat", &self.stat)
            .finish_non_exhaustive()
    }
}
