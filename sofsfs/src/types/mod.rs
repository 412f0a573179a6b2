// SPDX-License-Identifier: MIT
//! On-disk record formats.
//!
//! Every record is a `#[repr(C)]` struct with an explicitly padding-free
//! layout, read and written through zerocopy. All multi-byte integers are
//! little-endian on disk; the structs use native integers and the crate
//! targets little-endian hosts, as the rest of the tooling stack does.

pub mod cluster;
pub mod direntry;
pub mod inode;
pub mod superblock;

pub use cluster::Cluster;
pub use direntry::DirEntry;
pub use inode::Inode;
pub use superblock::Superblock;
