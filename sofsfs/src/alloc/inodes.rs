// SPDX-License-Identifier: MIT
//! The free-inode list.
//!
//! Free inodes form a double-linked list threaded through the records
//! themselves: the overloaded vD1/vD2 pair of a free inode holds its
//! next/prev links. The list is FIFO: allocation pops the head, release
//! pushes at the tail.

use sofsio::BlockDev;

use crate::check::{check_inode_free, check_inode_in_use};
use crate::constant::*;
use crate::ensure;
use crate::errors::{SofsError, SofsResult};
use crate::filesystem::Sofs;
use crate::types::inode::{Inode, InodeAux, InodeState, InodeType};
use crate::util::unix_now;

impl<'a, D: BlockDev + ?Sized> Sofs<'a, D> {
    /// Allocates a free inode of the given type.
    ///
    /// The head of the free list is popped, cleaned first if it is dirty,
    /// and initialised: type set with permissions reset, ownership taken
    /// from the calling identity, all references null, both timestamps set
    /// to the current time.
    pub fn alloc_inode(&mut self, itype: InodeType) -> SofsResult<u32> {
        ensure!(self.sb.ifree > 0, SofsError::NoSpace);
        let n = self.sb.ihead;
        ensure!(n != NULL_INODE && n < self.sb.itotal, SofsError::Internal("free inode head corrupt"));

        let mut inode = self.inode_at(n)?;
        check_inode_free(&inode)?;
        if inode.state() == Some(InodeState::FreeDirty) {
            // dangling references from the previous life are dissociated
            self.clean_inode(n)?;
            inode = self.inode_at(n)?;
        }

        let next = inode
            .next_free()
            .ok_or(SofsError::Internal("free inode without link"))?;

        let now = unix_now();
        let mut fresh = Inode::free_clean(NULL_INODE, NULL_INODE);
        fresh.mode = itype.mode_bits();
        fresh.owner = self.ident.uid;
        fresh.group = self.ident.gid;
        fresh.set_aux(InodeAux::Times {
            atime: now,
            mtime: now,
        });
        self.put_inode(n, &fresh)?;

        // unlink the old head
        self.sb.ihead = next;
        if next != NULL_INODE {
            let mut succ = self.inode_at(next)?;
            let succ_next = succ
                .next_free()
                .ok_or(SofsError::Internal("free inode without link"))?;
            succ.set_aux(InodeAux::FreeLink {
                next: succ_next,
                prev: NULL_INODE,
            });
            self.put_inode(next, &succ)?;
        } else {
            self.sb.itail = NULL_INODE;
        }
        self.sb.ifree -= 1;
        self.store_superblock()?;

        Ok(n)
    }

    /// Releases inode `n` to the free list.
    ///
    /// The record keeps its type bits next to the free flag, leaving it
    /// recognisably dirty; its data clusters are not released here. The
    /// record is pushed at the tail of the list.
    pub fn free_inode(&mut self, n: u32) -> SofsResult {
        ensure!(n != ROOT_INODE && n < self.sb.itotal, SofsError::InvalidArg);

        let mut inode = self.inode_at(n)?;
        check_inode_in_use(&inode)?;

        inode.mode |= MODE_FREE;
        inode.set_aux(InodeAux::FreeLink {
            next: NULL_INODE,
            prev: self.sb.itail,
        });
        self.put_inode(n, &inode)?;

        if self.sb.ifree == 0 {
            self.sb.ihead = n;
            self.sb.itail = n;
        } else {
            let tail = self.sb.itail;
            ensure!(
                tail != NULL_INODE && tail < self.sb.itotal,
                SofsError::Internal("free inode tail corrupt")
            );
            let mut old_tail = self.inode_at(tail)?;
            let tail_prev = old_tail
                .prev_free()
                .ok_or(SofsError::Internal("free inode without link"))?;
            old_tail.set_aux(InodeAux::FreeLink {
                next: n,
                prev: tail_prev,
            });
            self.put_inode(tail, &old_tail)?;
            self.sb.itail = n;
        }
        self.sb.ifree += 1;
        self.store_superblock()?;

        Ok(())
    }
}
