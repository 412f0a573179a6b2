// SPDX-License-Identifier: MIT
//! Directory entry record.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::constant::*;

/// State of a directory entry slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Non-empty name, valid inode reference.
    InUse,
    /// Tombstone: the first and last name bytes were swapped; the inode
    /// reference is still valid.
    Deleted,
    /// Name all zero, inode reference null.
    FreeClean,
}

/// Directory entry record (64 bytes, `DIR_ENTRIES_PER_CLUSTER` per
/// cluster). The name is null padded; a deleted entry keeps its old first
/// byte parked in the very last name byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct DirEntry {
    pub name: [u8; MAX_NAME + 1],
    pub ninode: u32,
}

impl DirEntry {
    /// A free slot in the clean state.
    pub fn free_clean() -> DirEntry {
        DirEntry {
            name: [0u8; MAX_NAME + 1],
            ninode: NULL_INODE,
        }
    }

    /// A fresh in-use entry. The name must already be validated.
    pub fn new(name: &str, ninode: u32) -> DirEntry {
        let mut entry = DirEntry::free_clean();
        entry.name[..name.len()].copy_from_slice(name.as_bytes());
        entry.ninode = ninode;
        entry
    }

    pub fn state(&self) -> EntryState {
        if self.name[0] != 0 {
            EntryState::InUse
        } else if self.name[MAX_NAME] != 0 {
            EntryState::Deleted
        } else {
            EntryState::FreeClean
        }
    }

    /// Entry name, up to the first null byte. Empty for non-in-use slots.
    pub fn name_str(&self) -> &str {
        let end = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.name.len());
        core::str::from_utf8(&self.name[..end]).unwrap_or("")
    }

    /// Replaces the name in place, null padding the remainder.
    pub fn set_name(&mut self, name: &str) {
        self.name = [0u8; MAX_NAME + 1];
        self.name[..name.len()].copy_from_slice(name.as_bytes());
    }

    /// Marks the entry deleted by swapping the first and last name bytes.
    /// The inode reference survives.
    pub fn mark_deleted(&mut self) {
        self.name.swap(0, MAX_NAME);
    }

    /// Returns the slot to the free-clean state.
    pub fn clear(&mut self) {
        *self = DirEntry::free_clean();
    }
}

/// Validates an entry name: non-empty, no path separator, bounded length.
pub fn check_name(name: &str) -> crate::errors::SofsResult<()> {
    use crate::errors::SofsError;

    crate::ensure!(!name.is_empty(), SofsError::InvalidArg);
    crate::ensure!(!name.contains('/'), SofsError::InvalidArg);
    crate::ensure!(!name.as_bytes().contains(&0), SofsError::InvalidArg);
    crate::ensure!(name.len() <= MAX_NAME, SofsError::NameTooLong);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SofsError;

    #[test]
    fn test_record_size() {
        assert_eq!(core::mem::size_of::<DirEntry>(), DIR_ENTRY_SIZE);
    }

    #[test]
    fn test_states() {
        let mut entry = DirEntry::free_clean();
        assert_eq!(entry.state(), EntryState::FreeClean);

        entry = DirEntry::new("report.txt", 5);
        assert_eq!(entry.state(), EntryState::InUse);
        assert_eq!(entry.name_str(), "report.txt");
        assert_eq!(entry.ninode, 5);

        entry.mark_deleted();
        assert_eq!(entry.state(), EntryState::Deleted);
        assert_eq!(entry.ninode, 5);
        assert_eq!(entry.name[MAX_NAME], b'r');

        entry.clear();
        assert_eq!(entry.state(), EntryState::FreeClean);
        assert_eq!(entry.ninode, NULL_INODE);
    }

    #[test]
    fn test_name_validation() {
        assert!(check_name("ok").is_ok());
        assert_eq!(check_name(""), Err(SofsError::InvalidArg));
        assert_eq!(check_name("a/b"), Err(SofsError::InvalidArg));
        let long = "x".repeat(MAX_NAME + 1);
        assert_eq!(check_name(&long), Err(SofsError::NameTooLong));
        assert!(check_name(&"y".repeat(MAX_NAME)).is_ok());
    }
}
