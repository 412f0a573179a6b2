// SPDX-License-Identifier: MIT

use core::fmt;

pub use sofsio::errors::{DevError, DevResult};

/// Result type for filesystem operations.
pub type SofsResult<T = ()> = Result<T, SofsError>;

/// Error type for filesystem operations.
///
/// The taxonomy is flat: one variant per condition, no nesting except the
/// device error carried by `Io`. Every variant maps to a distinct negative
/// integer through [`SofsError::errno`], which is what the system-call
/// surface hands back to its callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SofsError {
    /// An argument is out of range or malformed.
    InvalidArg,
    /// No free inode or data cluster is left.
    NoSpace,
    /// No directory entry with the given name exists.
    NoEntry,
    /// A directory entry with the given name already exists.
    Exists,
    /// The inode is not a directory and one was required.
    NotADirectory,
    /// The inode is a directory and one was not allowed.
    IsADirectory,
    /// The directory still holds entries other than "." and "..".
    NotEmpty,
    /// The entry name exceeds the maximum length.
    NameTooLong,
    /// Path resolution traversed more symbolic links than allowed.
    TooManySymlinks,
    /// The maximum number of directory links has been reached.
    TooManyLinks,
    /// The file has grown to its maximum size.
    FileTooBig,
    /// The permission bits deny the requested access.
    NoAccess,
    /// The operation is not permitted on this inode.
    PermissionDenied,
    /// The storage device is not open.
    DeviceNotOpen,
    /// The storage device failed.
    Io(DevError),
    /// Some lower-level structure is inconsistent.
    Internal(&'static str),
    /// An inode expected to be in use is inconsistent.
    InodeInUseInconsistent,
    /// A free inode in the dirty state is inconsistent.
    FreeInodeDirtyInconsistent,
    /// A data cluster header is inconsistent.
    ClusterHeaderInconsistent,
    /// The list of cluster references of an inode is inconsistent.
    RefListInconsistent,
    /// The reference slot is already occupied.
    AlreadyInList,
    /// The reference slot is empty.
    NotInList,
    /// A cluster header names a different owning inode.
    WrongClusterOwner,
}

impl SofsError {
    pub fn msg(&self) -> &'static str {
        match self {
            SofsError::InvalidArg => "invalid argument",
            SofsError::NoSpace => "no space left on device",
            SofsError::NoEntry => "no such entry",
            SofsError::Exists => "entry already exists",
            SofsError::NotADirectory => "not a directory",
            SofsError::IsADirectory => "is a directory",
            SofsError::NotEmpty => "directory not empty",
            SofsError::NameTooLong => "name too long",
            SofsError::TooManySymlinks => "too many symbolic links",
            SofsError::TooManyLinks => "too many links",
            SofsError::FileTooBig => "maximum file size exceeded",
            SofsError::NoAccess => "access denied",
            SofsError::PermissionDenied => "operation not permitted",
            SofsError::DeviceNotOpen => "device not open",
            SofsError::Io(_) => "I/O failure",
            SofsError::Internal(msg) => msg,
            SofsError::InodeInUseInconsistent => "inode in use is inconsistent",
            SofsError::FreeInodeDirtyInconsistent => "free inode in dirty state is inconsistent",
            SofsError::ClusterHeaderInconsistent => "data cluster header is inconsistent",
            SofsError::RefListInconsistent => "cluster reference list is inconsistent",
            SofsError::AlreadyInList => "cluster reference already in list",
            SofsError::NotInList => "cluster reference not in list",
            SofsError::WrongClusterOwner => "cluster belongs to another inode",
        }
    }

    /// Negative integer code, POSIX errno values where one exists and a
    /// private range for the consistency family.
    pub fn errno(&self) -> i32 {
        match self {
            SofsError::InvalidArg => -22,
            SofsError::NoSpace => -28,
            SofsError::NoEntry => -2,
            SofsError::Exists => -17,
            SofsError::NotADirectory => -20,
            SofsError::IsADirectory => -21,
            SofsError::NotEmpty => -39,
            SofsError::NameTooLong => -36,
            SofsError::TooManySymlinks => -40,
            SofsError::TooManyLinks => -31,
            SofsError::FileTooBig => -27,
            SofsError::NoAccess => -13,
            SofsError::PermissionDenied => -1,
            SofsError::DeviceNotOpen => -9,
            SofsError::Io(_) => -5,
            SofsError::Internal(_) => -80,
            SofsError::InodeInUseInconsistent => -501,
            SofsError::FreeInodeDirtyInconsistent => -502,
            SofsError::ClusterHeaderInconsistent => -503,
            SofsError::RefListInconsistent => -504,
            SofsError::AlreadyInList => -505,
            SofsError::NotInList => -506,
            SofsError::WrongClusterOwner => -507,
        }
    }
}

impl fmt::Display for SofsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg())?;
        if let SofsError::Io(dev) = self {
            write!(f, ": {}", dev)?;
        }
        Ok(())
    }
}

impl std::error::Error for SofsError {}

impl From<DevError> for SofsError {
    #[inline]
    fn from(e: DevError) -> Self {
        match e {
            DevError::NotOpen => SofsError::DeviceNotOpen,
            other => SofsError::Io(other),
        }
    }
}

impl From<&'static str> for SofsError {
    #[inline]
    fn from(msg: &'static str) -> Self {
        SofsError::Internal(msg)
    }
}
