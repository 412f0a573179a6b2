// SPDX-License-Identifier: MIT
//! Per-inode operations: whole-record read and write with time
//! bookkeeping, cleaning of free-dirty inodes, and the permission check.

use bitflags::bitflags;
use sofsio::BlockDev;

use crate::check::{check_inode_free_dirty, check_inode_in_use};
use crate::cluster_tree::ClusterOp;
use crate::constant::*;
use crate::ensure;
use crate::errors::{SofsError, SofsResult};
use crate::filesystem::Sofs;
use crate::types::inode::{Inode, InodeAux, InodeState};
use crate::util::unix_now;

bitflags! {
    /// Access request evaluated against the permission triplets.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Access: u16 {
        const R = 0b100;
        const W = 0b010;
        const X = 0b001;
    }
}

impl<'a, D: BlockDev + ?Sized> Sofs<'a, D> {
    /// Reads inode `n` after validating it against the expected state
    /// (`InUse` or `FreeDirty`). Reading an in-use inode refreshes its
    /// access time on disk; the returned copy carries the new stamp.
    pub fn read_inode(&mut self, n: u32, expected: InodeState) -> SofsResult<Inode> {
        ensure!(n < self.sb.itotal, SofsError::InvalidArg);

        let mut inode = self.inode_at(n)?;
        match expected {
            InodeState::InUse => {
                check_inode_in_use(&inode)?;
                inode.touch_atime(unix_now());
                self.put_inode(n, &inode)?;
            }
            InodeState::FreeDirty => {
                ensure!(n != ROOT_INODE, SofsError::InvalidArg);
                check_inode_free_dirty(&inode)?;
            }
            InodeState::FreeClean => return Err(SofsError::InvalidArg),
        }
        Ok(inode)
    }

    /// Writes the record over inode `n`, which must already be in the
    /// expected state on disk. Writing an in-use inode refreshes both of
    /// its time stamps.
    pub fn write_inode(&mut self, n: u32, record: &Inode, expected: InodeState) -> SofsResult {
        ensure!(n < self.sb.itotal, SofsError::InvalidArg);

        let on_disk = self.inode_at(n)?;
        let mut record = *record;
        match expected {
            InodeState::InUse => {
                check_inode_in_use(&on_disk)?;
                check_inode_in_use(&record)?;
                record.touch(unix_now());
            }
            InodeState::FreeDirty => {
                ensure!(n != ROOT_INODE, SofsError::InvalidArg);
                check_inode_free_dirty(&on_disk)?;
                check_inode_free_dirty(&record)?;
            }
            InodeState::FreeClean => return Err(SofsError::InvalidArg),
        }
        self.put_inode(n, &record)
    }

    /// Cleans a free-dirty inode: every leftover cluster reference is
    /// dissociated and the record returns to the free-clean state, still
    /// threaded into the free list where it was.
    pub fn clean_inode(&mut self, n: u32) -> SofsResult {
        ensure!(n != ROOT_INODE && n < self.sb.itotal, SofsError::InvalidArg);

        let inode = self.inode_at(n)?;
        check_inode_free_dirty(&inode)?;
        let (next, prev) = match inode.aux() {
            Some(InodeAux::FreeLink { next, prev }) => (next, prev),
            _ => return Err(SofsError::FreeInodeDirtyInconsistent),
        };

        self.handle_clusters_from(n, 0, ClusterOp::Clean)?;

        self.put_inode(n, &Inode::free_clean(next, prev))
    }

    /// Evaluates an access request against inode `n` for the calling
    /// identity. Root always has read and write, and execute whenever any
    /// of the three triplets grants it. Everyone else is matched against
    /// exactly one triplet: owner, then group, then other.
    pub fn access_granted(&mut self, n: u32, ops: Access) -> SofsResult {
        ensure!(!ops.is_empty(), SofsError::InvalidArg);
        ensure!(n < self.sb.itotal, SofsError::InvalidArg);

        let inode = self.inode_at(n)?;
        check_inode_in_use(&inode)?;

        let mode = inode.mode;
        let owner = (mode >> 6) & 0o7;
        let group = (mode >> 3) & 0o7;
        let other = mode & 0o7;

        if self.ident.is_root() {
            let wants_x = ops.contains(Access::X);
            let any_x = (owner | group | other) & Access::X.bits() != 0;
            if wants_x && !any_x {
                return Err(SofsError::NoAccess);
            }
            return Ok(());
        }

        let triplet = if self.ident.uid == inode.owner {
            owner
        } else if self.ident.gid == inode.group {
            group
        } else {
            other
        };
        if ops.bits() & triplet == ops.bits() {
            Ok(())
        } else {
            Err(SofsError::NoAccess)
        }
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

    fn fresh_image() -> Vec<u8> {
        let mut img = vec![0u8; 100 * BLOCK_SIZE];
        let layout = DiskLayout::compute(img.len() as u64, 8).unwrap();
        let mut dev = MemDev::new(&mut img).unwrap();
        SofsFormatter::new(&mut dev, &layout, "otest", Identity::ROOT)
            .format(false)
            .unwrap();
        img
    }

    #[test]
    fn test_read_inode_checks_state() {
        let mut img = fresh_image();
        let mut dev = MemDev::new(&mut img).unwrap();
        let mut fs = Sofs::mount(&mut dev, Identity::ROOT).unwrap();

        let root = fs.read_inode(0, InodeState::InUse).unwrap();
        assert!(root.is_directory());

        // inode 1 is free and clean; neither expectation matches
        assert_eq!(
            fs.read_inode(1, InodeState::InUse),
            Err(SofsError::InodeInUseInconsistent)
        );
        assert_eq!(
            fs.read_inode(1, InodeState::FreeDirty),
            Err(SofsError::FreeInodeDirtyInconsistent)
        );
        assert_eq!(
            fs.read_inode(999, InodeState::InUse),
            Err(SofsError::InvalidArg)
        );
    }

    #[test]
    fn test_write_inode_stamps_times() {
        let mut img = fresh_image();
        let mut dev = MemDev::new(&mut img).unwrap();
        let mut fs = Sofs::mount(&mut dev, Identity::ROOT).unwrap();

        let n = fs.alloc_inode(InodeType::Regular).unwrap();
        let mut inode = fs.read_inode(n, InodeState::InUse).unwrap();
        inode.mode |= 0o640;
        inode.size = 123;
        fs.write_inode(n, &inode, InodeState::InUse).unwrap();

        let back = fs.inode_at(n).unwrap();
        assert_eq!(back.size, 123);
        assert_eq!(back.mode & MODE_PERM_MASK, 0o640);
        assert!(back.times().is_some());
    }

    #[test]
    fn test_clean_inode_restores_free_clean() {
        let mut img = fresh_image();
        let mut dev = MemDev::new(&mut img).unwrap();
        let mut fs = Sofs::mount(&mut dev, Identity::ROOT).unwrap();

        let n = fs.alloc_inode(InodeType::Regular).unwrap();
        for idx in 0..3u32 {
            fs.alloc_cluster_at(n, idx).unwrap();
        }
        fs.handle_clusters_from(n, 0, ClusterOp::Free).unwrap();
        fs.free_inode(n).unwrap();

        let dirty = fs.inode_at(n).unwrap();
        assert_eq!(dirty.state(), Some(InodeState::FreeDirty));
        let link_next = dirty.next_free().unwrap();

        fs.clean_inode(n).unwrap();
        let clean = fs.inode_at(n).unwrap();
        assert_eq!(clean.state(), Some(InodeState::FreeClean));
        assert_eq!(clean.next_free(), Some(link_next), "list links survive");
        assert_eq!(clean.clucount, 0);
        assert!(clean.d.iter().all(|&r| r == NULL_CLUSTER));

        // cleaning inode 0 or an in-use inode is refused
        assert_eq!(fs.clean_inode(0), Err(SofsError::InvalidArg));
        let m = fs.alloc_inode(InodeType::Regular).unwrap();
        assert_eq!(
            fs.clean_inode(m),
            Err(SofsError::FreeInodeDirtyInconsistent)
        );
    }

    #[test]
    fn test_access_owner_group_other() {
        let mut img = fresh_image();
        let mut dev = MemDev::new(&mut img).unwrap();
        let mut fs = Sofs::mount(&mut dev, Identity::new(10, 20)).unwrap();

        let n = fs.alloc_inode(InodeType::Regular).unwrap();
        let mut inode = fs.read_inode(n, InodeState::InUse).unwrap();
        inode.mode |= 0o640; // rw- r-- ---
        fs.write_inode(n, &inode, InodeState::InUse).unwrap();

        // owner triplet
        assert!(fs.access_granted(n, Access::R | Access::W).is_ok());
        assert_eq!(fs.access_granted(n, Access::X), Err(SofsError::NoAccess));

        // group identity falls through to the group triplet
        fs.ident = Identity::new(11, 20);
        assert!(fs.access_granted(n, Access::R).is_ok());
        assert_eq!(fs.access_granted(n, Access::W), Err(SofsError::NoAccess));

        // anyone else gets the other triplet
        fs.ident = Identity::new(11, 21);
        assert_eq!(fs.access_granted(n, Access::R), Err(SofsError::NoAccess));

        // empty request is malformed
        fs.ident = Identity::new(10, 20);
        assert_eq!(
            fs.access_granted(n, Access::empty()),
            Err(SofsError::InvalidArg)
        );
    }

    #[test]
    fn test_access_root_rules() {
        let mut img = fresh_image();
        let mut dev = MemDev::new(&mut img).unwrap();
        let mut fs = Sofs::mount(&mut dev, Identity::new(10, 10)).unwrap();

        let n = fs.alloc_inode(InodeType::Regular).unwrap();
        let mut inode = fs.read_inode(n, InodeState::InUse).unwrap();
        inode.mode |= 0o600;
        fs.write_inode(n, &inode, InodeState::InUse).unwrap();

        fs.ident = Identity::ROOT;
        // read and write always, execute only if someone may execute
        assert!(fs.access_granted(n, Access::R | Access::W).is_ok());
        assert_eq!(fs.access_granted(n, Access::X), Err(SofsError::NoAccess));

        let mut inode = fs.read_inode(n, InodeState::InUse).unwrap();
        inode.mode |= 0o001;
        fs.write_inode(n, &inode, InodeState::InUse).unwrap();
        assert!(fs.access_granted(n, Access::X).is_ok());
    }
}
