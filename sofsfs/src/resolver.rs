// SPDX-License-Identifier: MIT
//! Absolute-path resolution.
//!
//! Walks the directory hierarchy component by component, returning the
//! pair (parent inode, entry inode) of the rightmost component. Symbolic
//! links are expanded in place, relative targets against the directory
//! holding the link; at most `MAX_SYMLINK_HOPS` links may be traversed
//! within one resolution.

use std::collections::VecDeque;

use sofsio::BlockDev;

use crate::constant::*;
use crate::ensure;
use crate::errors::{SofsError, SofsResult};
use crate::filesystem::Sofs;
use crate::types::inode::InodeState;

impl<'a, D: BlockDev + ?Sized> Sofs<'a, D> {
    /// Resolves the absolute path `path` to the inode pair
    /// (parent directory, entry) of its rightmost component.
    pub fn resolve_path(&mut self, path: &str) -> SofsResult<(u32, u32)> {
        ensure!(!path.is_empty(), SofsError::InvalidArg);
        ensure!(path.len() <= MAX_PATH, SofsError::NameTooLong);
        ensure!(path.starts_with('/'), SofsError::InvalidArg);

        let mut work: VecDeque<String> = path
            .split('/')
            .filter(|c| !c.is_empty())
            .map(str::to_owned)
            .collect();

        let mut parent = ROOT_INODE;
        let mut cur = ROOT_INODE;
        let mut hops = 0u32;

        while let Some(comp) = work.pop_front() {
            let holder = cur;
            let (ninode, _) = self.get_dir_entry_by_name(holder, &comp)?;
            let node = self.read_inode(ninode, InodeState::InUse)?;

            if node.is_symlink() {
                hops += 1;
                ensure!(hops <= MAX_SYMLINK_HOPS, SofsError::TooManySymlinks);

                let target = self.symlink_target(ninode)?;
                ensure!(!target.is_empty(), SofsError::NoEntry);
                for piece in target.split('/').filter(|c| !c.is_empty()).rev() {
                    work.push_front(piece.to_owned());
                }
                if target.starts_with('/') {
                    parent = ROOT_INODE;
                    cur = ROOT_INODE;
                } else {
                    // relative to the directory holding the link
                    cur = holder;
                }
                continue;
            }

            if !work.is_empty() {
                ensure!(node.is_directory(), SofsError::NotADirectory);
            }
            parent = holder;
            cur = ninode;
        }

        Ok((parent, cur))
    }

    /// Target path stored in symlink inode `n`.
    pub fn symlink_target(&mut self, n: u32) -> SofsResult<String> {
        let inode = self.read_inode(n, InodeState::InUse)?;
        ensure!(inode.is_symlink(), SofsError::InvalidArg);
        ensure!(
            inode.size as usize <= CLUSTER_PAYLOAD,
            SofsError::Internal("symlink payload too large")
        );

        let payload = self.read_file_cluster(n, 0)?;
        let bytes = &payload[..inode.size as usize];
        String::from_utf8(bytes.to_vec()).map_err(|_| SofsError::Internal("symlink not valid utf-8"))
    }

    /// Stores `target` as the path of symlink inode `n`.
    pub fn set_symlink_target(&mut self, n: u32, target: &str) -> SofsResult {
        let inode = self.read_inode(n, InodeState::InUse)?;
        ensure!(inode.is_symlink(), SofsError::InvalidArg);
        ensure!(!target.is_empty(), SofsError::InvalidArg);
        ensure!(
            target.len() <= MAX_PATH && target.len() <= CLUSTER_PAYLOAD,
            SofsError::NameTooLong
        );

        let mut payload = [0u8; CLUSTER_PAYLOAD];
        payload[..target.len()].copy_from_slice(target.as_bytes());
        self.write_file_cluster(n, 0, &payload)?;

        let mut inode = self.inode_at(n)?;
        inode.size = target.len() as u32;
        self.write_inode(n, &inode, InodeState::InUse)
    }
}
