// SPDX-License-Identifier: MIT
//! The directory layer.
//!
//! A directory's payload is a flat run of fixed-size entries,
//! `DIR_ENTRIES_PER_CLUSTER` per cluster, concatenated across the file's
//! logical clusters. Removal leaves a tombstone (first and last name
//! bytes swapped) so the reference survives until the record is reused;
//! detachment scrubs the slot back to free-clean.

use sofsio::BlockDev;
use zerocopy::{FromBytes, IntoBytes};

use crate::constant::*;
use crate::errors::{SofsError, SofsResult};
use crate::{bail, ensure};
use crate::filesystem::Sofs;
use crate::inode_ops::Access;
use crate::types::direntry::{check_name, DirEntry, EntryState};
use crate::types::inode::InodeState;

/// Outcome of a name lookup inside one directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryLookup {
    /// The entry exists at flat index `idx`.
    Found { ninode: u32, idx: u32 },
    /// No such entry; `free_idx` is the first reusable slot (a clean free
    /// entry if one exists, the next never-used slot otherwise).
    Absent { free_idx: u32 },
}

/// Bytes of directory payload one cluster holds.
const DIR_BYTES_PER_CLUSTER: u32 = (DIR_ENTRIES_PER_CLUSTER * DIR_ENTRY_SIZE) as u32;

fn entry_in(payload: &[u8; CLUSTER_PAYLOAD], slot: usize) -> DirEntry {
    let start = slot * DIR_ENTRY_SIZE;
    DirEntry::read_from_bytes(&payload[start..start + DIR_ENTRY_SIZE])
        .expect("directory entry layout")
}

fn put_entry_in(payload: &mut [u8; CLUSTER_PAYLOAD], slot: usize, entry: &DirEntry) {
    let start = slot * DIR_ENTRY_SIZE;
    payload[start..start + DIR_ENTRY_SIZE].copy_from_slice(entry.as_bytes());
}

impl<'a, D: BlockDev + ?Sized> Sofs<'a, D> {
    /// Searches directory `dir` for `name`, also recording the first
    /// reusable slot on the way. Requires execute permission on `dir`.
    pub fn lookup_entry(&mut self, dir: u32, name: &str) -> SofsResult<EntryLookup> {
        check_name(name)?;
        let dirnode = self.read_inode(dir, InodeState::InUse)?;
        ensure!(dirnode.is_directory(), SofsError::NotADirectory);
        self.access_granted(dir, Access::X)?;

        let clusters = dirnode.size / DIR_BYTES_PER_CLUSTER;
        let mut first_free: Option<u32> = None;
        for ci in 0..clusters {
            let payload = self.read_file_cluster(dir, ci)?;
            for slot in 0..DIR_ENTRIES_PER_CLUSTER {
                let entry = entry_in(&payload, slot);
                let idx = ci * DIR_ENTRIES_PER_CLUSTER as u32 + slot as u32;
                match entry.state() {
                    EntryState::InUse if entry.name_str() == name => {
                        return Ok(EntryLookup::Found {
                            ninode: entry.ninode,
                            idx,
                        });
                    }
                    EntryState::FreeClean if first_free.is_none() => {
                        first_free = Some(idx);
                    }
                    _ => {}
                }
            }
        }

        let next = clusters * DIR_ENTRIES_PER_CLUSTER as u32;
        let free_idx = first_free.unwrap_or(next);
        ensure!(
            (free_idx as usize) < MAX_FILE_CLUSTERS * DIR_ENTRIES_PER_CLUSTER,
            SofsError::FileTooBig
        );
        Ok(EntryLookup::Absent { free_idx })
    }

    /// Resolves `name` inside directory `dir` to its inode and entry
    /// index, failing with `NoEntry` when it does not exist.
    pub fn get_dir_entry_by_name(&mut self, dir: u32, name: &str) -> SofsResult<(u32, u32)> {
        match self.lookup_entry(dir, name)? {
            EntryLookup::Found { ninode, idx } => Ok((ninode, idx)),
            EntryLookup::Absent { .. } => Err(SofsError::NoEntry),
        }
    }

    /// Adds a fresh entry `name` -> `ent` to directory `dir`. When `ent`
    /// is a directory it is initialised as empty, with "." and ".."
    /// written into its first cluster.
    pub fn add_dir_entry(&mut self, dir: u32, name: &str, ent: u32) -> SofsResult {
        self.add_att_entry(dir, name, ent, false)
    }

    /// Attaches an already fully-formed directory `ent` under `dir`,
    /// re-pointing its ".." at the new parent.
    pub fn attach_dir_entry(&mut self, dir: u32, name: &str, ent: u32) -> SofsResult {
        self.add_att_entry(dir, name, ent, true)
    }

    fn add_att_entry(&mut self, dir: u32, name: &str, ent: u32, attach: bool) -> SofsResult {
        ensure!(ent < self.sb.itotal, SofsError::InvalidArg);
        check_name(name)?;

        let dirnode = self.read_inode(dir, InodeState::InUse)?;
        ensure!(dirnode.is_directory(), SofsError::NotADirectory);
        self.access_granted(dir, Access::W | Access::X)?;

        let entnode = self.read_inode(ent, InodeState::InUse)?;
        self.access_granted(ent, Access::R | Access::X)?;
        if attach {
            ensure!(entnode.is_directory(), SofsError::NotADirectory);
        }
        ensure!(entnode.refcount <= u16::MAX - 2, SofsError::TooManyLinks);
        ensure!(dirnode.refcount < u16::MAX, SofsError::TooManyLinks);

        let free_idx = match self.lookup_entry(dir, name)? {
            EntryLookup::Found { .. } => bail!(SofsError::Exists),
            EntryLookup::Absent { free_idx } => free_idx,
        };

        let ci = free_idx / DIR_ENTRIES_PER_CLUSTER as u32;
        let slot = free_idx as usize % DIR_ENTRIES_PER_CLUSTER;
        if self.get_cluster(dir, ci)? == NULL_CLUSTER {
            let lc = self.alloc_cluster_at(dir, ci)?;
            let mut cluster = self.read_cluster(lc)?;
            cluster.format_dir();
            self.write_cluster(lc, &cluster)?;
            let mut dirnode = self.inode_at(dir)?;
            dirnode.size += DIR_BYTES_PER_CLUSTER;
            self.put_inode(dir, &dirnode)?;
        }

        let lc = self.get_cluster(dir, ci)?;
        let mut cluster = self.read_cluster(lc)?;
        cluster.set_entry_at(slot, &DirEntry::new(name, ent));
        self.write_cluster(lc, &cluster)?;

        if attach {
            // the subsidiary directory changes parent
            let mut payload = self.read_file_cluster(ent, 0)?;
            let mut dotdot = entry_in(&payload, 1);
            dotdot.ninode = dir;
            put_entry_in(&mut payload, 1, &dotdot);
            self.write_file_cluster(ent, 0, &payload)?;

            self.bump_refcount(ent, 2)?;
            self.bump_refcount(dir, 1)?;
        } else if entnode.is_directory() {
            // a brand-new directory gets its "." and ".." written out
            let lc0 = self.alloc_cluster_at(ent, 0)?;
            let mut cluster = self.read_cluster(lc0)?;
            cluster.format_dir();
            cluster.set_entry_at(0, &DirEntry::new(".", ent));
            cluster.set_entry_at(1, &DirEntry::new("..", dir));
            self.write_cluster(lc0, &cluster)?;

            let mut entnode = self.inode_at(ent)?;
            entnode.size += DIR_BYTES_PER_CLUSTER;
            entnode.refcount += 2;
            self.write_inode(ent, &entnode, InodeState::InUse)?;
            self.bump_refcount(dir, 1)?;
        } else {
            self.bump_refcount(ent, 1)?;
        }

        // stamp the directory's modification time
        let dirnode = self.inode_at(dir)?;
        self.write_inode(dir, &dirnode, InodeState::InUse)
    }

    /// Removes entry `name` from directory `dir`, leaving a tombstone.
    /// Once nothing references the target inode any more, its data
    /// clusters are released and the inode is freed (dirty).
    pub fn rem_dir_entry(&mut self, dir: u32, name: &str) -> SofsResult {
        self.rem_detach_entry(dir, name, false)
    }

    /// Detaches entry `name` from directory `dir`, scrubbing the slot.
    /// The target inode is kept, ready to be attached elsewhere.
    pub fn detach_dir_entry(&mut self, dir: u32, name: &str) -> SofsResult {
        self.rem_detach_entry(dir, name, true)
    }

    fn rem_detach_entry(&mut self, dir: u32, name: &str, detach: bool) -> SofsResult {
        check_name(name)?;
        ensure!(name != "." && name != "..", SofsError::InvalidArg);

        let dirnode = self.read_inode(dir, InodeState::InUse)?;
        ensure!(dirnode.is_directory(), SofsError::NotADirectory);
        self.access_granted(dir, Access::X)?;
        self.access_granted(dir, Access::W)
            .map_err(|_| SofsError::PermissionDenied)?;

        let (ent, idx) = self.get_dir_entry_by_name(dir, name)?;
        let entnode = self.read_inode(ent, InodeState::InUse)?;
        let is_dir = entnode.is_directory();

        if !detach && is_dir {
            ensure!(self.dir_is_empty(ent)?, SofsError::NotEmpty);
        }

        let ci = idx / DIR_ENTRIES_PER_CLUSTER as u32;
        let slot = idx as usize % DIR_ENTRIES_PER_CLUSTER;
        let lc = self.get_cluster(dir, ci)?;
        ensure!(lc != NULL_CLUSTER, SofsError::Internal("directory hole"));
        let mut cluster = self.read_cluster(lc)?;
        let mut entry = cluster.entry_at(slot);
        if detach {
            entry.clear();
        } else {
            entry.mark_deleted();
        }
        cluster.set_entry_at(slot, &entry);
        self.write_cluster(lc, &cluster)?;

        // the named entry, plus the "."/".." pair for directories
        self.drop_refcount(ent, if is_dir { 2 } else { 1 })?;
        if is_dir {
            self.drop_refcount(dir, 1)?;
        }

        let entnode = self.inode_at(ent)?;
        if !detach && entnode.refcount == 0 {
            self.handle_clusters_from(ent, 0, crate::ClusterOp::Free)?;
            self.free_inode(ent)?;
        }

        let dirnode = self.inode_at(dir)?;
        self.write_inode(dir, &dirnode, InodeState::InUse)
    }

    /// Renames entry `old_name` of directory `dir` to `new_name`,
    /// overwriting the name in place.
    pub fn rename_dir_entry(&mut self, dir: u32, old_name: &str, new_name: &str) -> SofsResult {
        check_name(old_name)?;
        check_name(new_name)?;
        ensure!(
            old_name != "." && old_name != ".." && new_name != "." && new_name != "..",
            SofsError::InvalidArg
        );

        let dirnode = self.read_inode(dir, InodeState::InUse)?;
        ensure!(dirnode.is_directory(), SofsError::NotADirectory);
        self.access_granted(dir, Access::W | Access::X)?;

        if let EntryLookup::Found { .. } = self.lookup_entry(dir, new_name)? {
            bail!(SofsError::Exists);
        }
        let (_, idx) = self.get_dir_entry_by_name(dir, old_name)?;

        let ci = idx / DIR_ENTRIES_PER_CLUSTER as u32;
        let slot = idx as usize % DIR_ENTRIES_PER_CLUSTER;
        let lc = self.get_cluster(dir, ci)?;
        ensure!(lc != NULL_CLUSTER, SofsError::Internal("directory hole"));
        let mut cluster = self.read_cluster(lc)?;
        let mut entry = cluster.entry_at(slot);
        entry.set_name(new_name);
        cluster.set_entry_at(slot, &entry);
        self.write_cluster(lc, &cluster)?;

        let dirnode = self.inode_at(dir)?;
        self.write_inode(dir, &dirnode, InodeState::InUse)
    }

    /// Whether directory `n` holds nothing besides "." and "..".
    pub fn dir_is_empty(&mut self, n: u32) -> SofsResult<bool> {
        let dirnode = self.read_inode(n, InodeState::InUse)?;
        ensure!(dirnode.is_directory(), SofsError::NotADirectory);

        let clusters = dirnode.size / DIR_BYTES_PER_CLUSTER;
        for ci in 0..clusters {
            let payload = self.read_file_cluster(n, ci)?;
            for slot in 0..DIR_ENTRIES_PER_CLUSTER {
                let entry = entry_in(&payload, slot);
                if entry.state() == EntryState::InUse {
                    let name = entry.name_str();
                    if name != "." && name != ".." {
                        return Ok(false);
                    }
                }
            }
        }
        Ok(true)
    }

    fn bump_refcount(&mut self, n: u32, by: u16) -> SofsResult {
        let mut inode = self.inode_at(n)?;
        inode.refcount += by;
        self.put_inode(n, &inode)
    }

    fn drop_refcount(&mut self, n: u32, by: u16) -> SofsResult {
        let mut inode = self.inode_at(n)?;
        ensure!(inode.refcount >= by, SofsError::Internal("refcount underflow"));
        inode.refcount -= by;
        self.put_inode(n, &inode)
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

    fn fresh_image(blocks: usize) -> Vec<u8> {
        let mut img = vec![0u8; blocks * BLOCK_SIZE];
        let layout = DiskLayout::compute(img.len() as u64, 16).unwrap();
        let mut dev = MemDev::new(&mut img).unwrap();
        SofsFormatter::new(&mut dev, &layout, "dtest", Identity::ROOT)
            .format(false)
            .unwrap();
        img
    }

    /// Allocates an inode and opens up its permissions, the way the
    /// system-call layer does after a create.
    fn mknod<D: BlockDev + ?Sized>(fs: &mut Sofs<'_, D>, t: InodeType) -> u32 {
        let n = fs.alloc_inode(t).unwrap();
        let mut inode = fs.inode_at(n).unwrap();
        inode.mode |= 0o755;
        fs.put_inode(n, &inode).unwrap();
        n
    }

    #[test]
    fn test_add_and_lookup() {
        let mut img = fresh_image(100);
        let mut dev = MemDev::new(&mut img).unwrap();
        let mut fs = Sofs::mount(&mut dev, Identity::ROOT).unwrap();

        let f = mknod(&mut fs, InodeType::Regular);
        fs.add_dir_entry(0, "readme", f).unwrap();

        let (ninode, idx) = fs.get_dir_entry_by_name(0, "readme").unwrap();
        assert_eq!(ninode, f);
        assert_eq!(idx, 2, "slot after . and ..");
        assert_eq!(fs.inode_at(f).unwrap().refcount, 1);

        assert_eq!(fs.add_dir_entry(0, "readme", f), Err(SofsError::Exists));
        assert_eq!(
            fs.get_dir_entry_by_name(0, "missing"),
            Err(SofsError::NoEntry)
        );
    }

    #[test]
    fn test_new_directory_gets_dot_entries() {
        let mut img = fresh_image(100);
        let mut dev = MemDev::new(&mut img).unwrap();
        let mut fs = Sofs::mount(&mut dev, Identity::ROOT).unwrap();

        let d = mknod(&mut fs, InodeType::Directory);
        fs.add_dir_entry(0, "sub", d).unwrap();

        let (dot, _) = fs.get_dir_entry_by_name(d, ".").unwrap();
        let (dotdot, _) = fs.get_dir_entry_by_name(d, "..").unwrap();
        assert_eq!(dot, d);
        assert_eq!(dotdot, 0);

        // named entry plus "." point at the child; ".." points back
        assert_eq!(fs.inode_at(d).unwrap().refcount, 2);
        assert_eq!(fs.inode_at(0).unwrap().refcount, 3);
        assert_eq!(
            fs.inode_at(d).unwrap().size,
            DIR_BYTES_PER_CLUSTER
        );
    }

    #[test]
    fn test_remove_leaves_tombstone_and_releases() {
        let mut img = fresh_image(100);
        let mut dev = MemDev::new(&mut img).unwrap();
        let mut fs = Sofs::mount(&mut dev, Identity::ROOT).unwrap();
        let free_inodes = fs.superblock().ifree;
        let free_clusters = fs.superblock().dzone_free;

        let f = mknod(&mut fs, InodeType::Regular);
        fs.add_dir_entry(0, "data.bin", f).unwrap();
        fs.write_file(f, 0, &[7u8; 5000]).unwrap();

        fs.rem_dir_entry(0, "data.bin").unwrap();
        assert_eq!(
            fs.get_dir_entry_by_name(0, "data.bin"),
            Err(SofsError::NoEntry)
        );

        // the slot is a tombstone, not a clean hole
        let payload = fs.read_file_cluster(0, 0).unwrap();
        let entry = entry_in(&payload, 2);
        assert_eq!(entry.state(), EntryState::Deleted);
        assert_eq!(entry.ninode, f, "tombstone keeps the reference");

        // inode went back to the list dirty, clusters to the repository
        assert_eq!(fs.superblock().ifree, free_inodes);
        assert_eq!(fs.superblock().dzone_free, free_clusters);
        assert_eq!(
            fs.inode_at(f).unwrap().state(),
            Some(InodeState::FreeDirty)
        );
        fs.check_free_cluster_accounting().unwrap();
    }

    #[test]
    fn test_remove_nonempty_directory_is_refused() {
        let mut img = fresh_image(100);
        let mut dev = MemDev::new(&mut img).unwrap();
        let mut fs = Sofs::mount(&mut dev, Identity::ROOT).unwrap();

        let d = mknod(&mut fs, InodeType::Directory);
        fs.add_dir_entry(0, "sub", d).unwrap();
        let f = mknod(&mut fs, InodeType::Regular);
        fs.add_dir_entry(d, "inner", f).unwrap();

        assert_eq!(fs.rem_dir_entry(0, "sub"), Err(SofsError::NotEmpty));

        fs.rem_dir_entry(d, "inner").unwrap();
        fs.rem_dir_entry(0, "sub").unwrap();
        assert_eq!(fs.inode_at(0).unwrap().refcount, 2, "root back to baseline");
    }

    #[test]
    fn test_detach_then_attach_rehomes_subtree() {
        let mut img = fresh_image(100);
        let mut dev = MemDev::new(&mut img).unwrap();
        let mut fs = Sofs::mount(&mut dev, Identity::ROOT).unwrap();

        let a = mknod(&mut fs, InodeType::Directory);
        let b = mknod(&mut fs, InodeType::Directory);
        fs.add_dir_entry(0, "a", a).unwrap();
        fs.add_dir_entry(0, "b", b).unwrap();
        let f = mknod(&mut fs, InodeType::Regular);
        fs.add_dir_entry(b, "payload", f).unwrap();

        fs.detach_dir_entry(0, "b").unwrap();
        // the subtree survives detachment
        assert_eq!(fs.inode_at(b).unwrap().state(), Some(InodeState::InUse));
        assert_eq!(fs.get_dir_entry_by_name(0, "b"), Err(SofsError::NoEntry));

        fs.attach_dir_entry(a, "b", b).unwrap();
        let (found, _) = fs.get_dir_entry_by_name(a, "b").unwrap();
        assert_eq!(found, b);
        let (dotdot, _) = fs.get_dir_entry_by_name(b, "..").unwrap();
        assert_eq!(dotdot, a, "\"..\" re-pointed at the new parent");
        let (inner, _) = fs.get_dir_entry_by_name(b, "payload").unwrap();
        assert_eq!(inner, f);
    }

    #[test]
    fn test_rename_in_place() {
        let mut img = fresh_image(100);
        let mut dev = MemDev::new(&mut img).unwrap();
        let mut fs = Sofs::mount(&mut dev, Identity::ROOT).unwrap();

        let f = mknod(&mut fs, InodeType::Regular);
        fs.add_dir_entry(0, "draft", f).unwrap();
        let (_, idx_before) = fs.get_dir_entry_by_name(0, "draft").unwrap();

        fs.rename_dir_entry(0, "draft", "final").unwrap();
        let (ninode, idx) = fs.get_dir_entry_by_name(0, "final").unwrap();
        assert_eq!(ninode, f);
        assert_eq!(idx, idx_before, "renamed in place");
        assert_eq!(fs.get_dir_entry_by_name(0, "draft"), Err(SofsError::NoEntry));

        assert_eq!(
            fs.rename_dir_entry(0, ".", "dot"),
            Err(SofsError::InvalidArg)
        );
        let g = mknod(&mut fs, InodeType::Regular);
        fs.add_dir_entry(0, "other", g).unwrap();
        assert_eq!(
            fs.rename_dir_entry(0, "other", "final"),
            Err(SofsError::Exists)
        );
    }

    #[test]
    fn test_deleted_slot_is_not_reused_but_clean_slot_is() {
        let mut img = fresh_image(100);
        let mut dev = MemDev::new(&mut img).unwrap();
        let mut fs = Sofs::mount(&mut dev, Identity::ROOT).unwrap();

        let f = mknod(&mut fs, InodeType::Regular);
        fs.add_dir_entry(0, "first", f).unwrap();
        let g = mknod(&mut fs, InodeType::Regular);
        fs.add_dir_entry(0, "second", g).unwrap();

        // a removal leaves a tombstone, which lookup must not hand out
        fs.rem_dir_entry(0, "first").unwrap();
        let h = mknod(&mut fs, InodeType::Regular);
        fs.add_dir_entry(0, "third", h).unwrap();
        let (_, idx) = fs.get_dir_entry_by_name(0, "third").unwrap();
        assert_eq!(idx, 4, "tombstone at 2 skipped");

        // a detach scrubs the slot, which is then reused
        fs.detach_dir_entry(0, "second").unwrap();
        let i = mknod(&mut fs, InodeType::Regular);
        fs.add_dir_entry(0, "fourth", i).unwrap();
        let (_, idx) = fs.get_dir_entry_by_name(0, "fourth").unwrap();
        assert_eq!(idx, 3, "clean slot reused");
    }

    #[test]
    fn test_permission_checks() {
        let mut img = fresh_image(100);
        let mut dev = MemDev::new(&mut img).unwrap();
        let mut fs = Sofs::mount(&mut dev, Identity::new(5, 5)).unwrap();

        // a directory owned by someone else, no group/other write
        fs.ident = Identity::new(6, 6);
        let d = mknod(&mut fs, InodeType::Directory);
        let mut inode = fs.inode_at(d).unwrap();
        inode.mode = (inode.mode & !MODE_PERM_MASK) | 0o755;
        fs.put_inode(d, &inode).unwrap();
        fs.ident = Identity::ROOT;
        fs.add_dir_entry(0, "locked", d).unwrap();

        fs.ident = Identity::new(5, 5);
        let f = fs.alloc_inode(InodeType::Regular).unwrap();
        assert_eq!(
            fs.add_dir_entry(d, "nope", f),
            Err(SofsError::NoAccess)
        );
        assert_eq!(
            fs.rem_dir_entry(d, "anything"),
            Err(SofsError::PermissionDenied)
        );
    }
}
