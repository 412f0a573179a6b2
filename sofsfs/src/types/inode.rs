// SPDX-License-Identifier: MIT
//! Inode record.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::constant::*;

/// File type carried by an in-use inode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeType {
    Regular,
    Directory,
    Symlink,
}

impl InodeType {
    pub fn mode_bits(self) -> u16 {
        match self {
            InodeType::Regular => MODE_REGULAR,
            InodeType::Directory => MODE_DIRECTORY,
            InodeType::Symlink => MODE_SYMLINK,
        }
    }

    pub fn from_mode(mode: u16) -> Option<InodeType> {
        match mode & MODE_TYPE_MASK {
            MODE_REGULAR => Some(InodeType::Regular),
            MODE_DIRECTORY => Some(InodeType::Directory),
            MODE_SYMLINK => Some(InodeType::Symlink),
            _ => None,
        }
    }
}

/// State of an inode record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeState {
    /// Type bit set, free flag clear; the overloaded pair holds times.
    InUse,
    /// Mode is exactly the free sentinel; references erased.
    FreeClean,
    /// Free flag set with the old type bits still visible; references may
    /// still point at released clusters.
    FreeDirty,
}

/// The meaning of the overloaded vD1/vD2 pair, discriminated by the inode
/// state. On disk the same eight bytes hold either the two timestamps of
/// an in-use inode or the links threading a free inode into the free list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeAux {
    Times { atime: u32, mtime: u32 },
    FreeLink { next: u32, prev: u32 },
}

/// Inode record (64 bytes, `INODES_PER_BLOCK` per table block).
///
/// The vD1/vD2 slots are deliberately private: their meaning depends on
/// the inode state and all access goes through [`InodeAux`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct Inode {
    /// Type bits, free flag and permission bits.
    pub mode: u16,
    /// Number of directory entries pointing at this inode.
    pub refcount: u16,
    /// Owner user id.
    pub owner: u32,
    /// Owner group id.
    pub group: u32,
    /// File size in bytes.
    pub size: u32,
    /// Number of data clusters attached, index clusters included.
    pub clucount: u32,
    vd1: u32,
    vd2: u32,
    /// Direct cluster references.
    pub d: [u32; DIRECT_REFS],
    /// Single-indirect reference.
    pub i1: u32,
    /// Double-indirect reference.
    pub i2: u32,
}

impl Inode {
    /// A free inode in the clean state, linked into the free list.
    pub fn free_clean(next: u32, prev: u32) -> Inode {
        Inode {
            mode: MODE_FREE,
            refcount: 0,
            owner: 0,
            group: 0,
            size: 0,
            clucount: 0,
            vd1: next,
            vd2: prev,
            d: [NULL_CLUSTER; DIRECT_REFS],
            i1: NULL_CLUSTER,
            i2: NULL_CLUSTER,
        }
    }

    /// Classifies the record; `None` means the mode field is corrupt.
    pub fn state(&self) -> Option<InodeState> {
        if self.mode == MODE_FREE {
            return Some(InodeState::FreeClean);
        }
        if self.mode & MODE_FREE != 0 {
            return InodeType::from_mode(self.mode).map(|_| InodeState::FreeDirty);
        }
        InodeType::from_mode(self.mode).map(|_| InodeState::InUse)
    }

    /// File type of an in-use or free-dirty inode.
    pub fn file_type(&self) -> Option<InodeType> {
        InodeType::from_mode(self.mode)
    }

    #[inline]
    pub fn is_directory(&self) -> bool {
        self.mode & MODE_FREE == 0 && self.mode & MODE_DIRECTORY != 0
    }

    #[inline]
    pub fn is_symlink(&self) -> bool {
        self.mode & MODE_FREE == 0 && self.mode & MODE_SYMLINK != 0
    }

    /// The overloaded pair, interpreted according to the current state.
    pub fn aux(&self) -> Option<InodeAux> {
        match self.state()? {
            InodeState::InUse => Some(InodeAux::Times {
                atime: self.vd1,
                mtime: self.vd2,
            }),
            InodeState::FreeClean | InodeState::FreeDirty => Some(InodeAux::FreeLink {
                next: self.vd1,
                prev: self.vd2,
            }),
        }
    }

    /// Writes the overloaded pair. The caller is responsible for having
    /// put the mode field into the matching state first.
    pub fn set_aux(&mut self, aux: InodeAux) {
        match aux {
            InodeAux::Times { atime, mtime } => {
                self.vd1 = atime;
                self.vd2 = mtime;
            }
            InodeAux::FreeLink { next, prev } => {
                self.vd1 = next;
                self.vd2 = prev;
            }
        }
    }

    /// Free-list successor of a free inode.
    pub fn next_free(&self) -> Option<u32> {
        match self.aux()? {
            InodeAux::FreeLink { next, .. } => Some(next),
            InodeAux::Times { .. } => None,
        }
    }

    /// Free-list predecessor of a free inode.
    pub fn prev_free(&self) -> Option<u32> {
        match self.aux()? {
            InodeAux::FreeLink { prev, .. } => Some(prev),
            InodeAux::Times { .. } => None,
        }
    }

    /// Access and modification times of an in-use inode.
    pub fn times(&self) -> Option<(u32, u32)> {
        match self.aux()? {
            InodeAux::Times { atime, mtime } => Some((atime, mtime)),
            InodeAux::FreeLink { .. } => None,
        }
    }

    /// Updates the access time of an in-use inode, keeping mtime.
    pub fn touch_atime(&mut self, now: u32) {
        self.vd1 = now;
    }

    /// Updates both times of an in-use inode.
    pub fn touch(&mut self, now: u32) {
        self.vd1 = now;
        self.vd2 = now;
    }

    /// Reference slot of the direct table, `None` past the direct range.
    #[inline]
    pub fn direct(&self, idx: usize) -> Option<u32> {
        self.d.get(idx).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_size() {
        assert_eq!(core::mem::size_of::<Inode>(), INODE_SIZE);
    }

    #[test]
    fn test_state_classification() {
        let mut inode = Inode::free_clean(3, NULL_INODE);
        assert_eq!(inode.state(), Some(InodeState::FreeClean));
        assert_eq!(inode.next_free(), Some(3));
        assert_eq!(inode.prev_free(), Some(NULL_INODE));

        inode.mode = MODE_DIRECTORY | 0o755;
        assert_eq!(inode.state(), Some(InodeState::InUse));
        assert!(inode.is_directory());

        inode.mode |= MODE_FREE;
        assert_eq!(inode.state(), Some(InodeState::FreeDirty));
        assert_eq!(inode.file_type(), Some(InodeType::Directory));

        inode.mode = MODE_FREE | 0o777; // free flag with no type bits
        assert_eq!(inode.state(), None);
    }

    #[test]
    fn test_aux_follows_state() {
        let mut inode = Inode::free_clean(NULL_INODE, NULL_INODE);
        inode.mode = MODE_REGULAR;
        inode.set_aux(InodeAux::Times {
            atime: 100,
            mtime: 200,
        });
        assert_eq!(inode.times(), Some((100, 200)));
        assert_eq!(inode.next_free(), None);

        inode.mode |= MODE_FREE;
        // same bytes, reinterpreted as links once the inode is free
        assert_eq!(
            inode.aux(),
            Some(InodeAux::FreeLink {
                next: 100,
                prev: 200
            })
        );
    }
}
