// SPDX-License-Identifier: MIT

use core::fmt;

/// Result type for block device operations.
pub type DevResult<T = ()> = core::result::Result<T, DevError>;

/// Error type for block device operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevError {
    /// Block index beyond the end of the device.
    OutOfBounds,
    /// Buffer or device size is not a whole number of blocks.
    BadSize,
    /// The device has not been opened or was already closed.
    NotOpen,
    /// Underlying I/O failure.
    Io(&'static str),
}

impl DevError {
    pub fn msg(&self) -> &'static str {
        match self {
            DevError::OutOfBounds => "block index out of bounds",
            DevError::BadSize => "size is not a multiple of the block size",
            DevError::NotOpen => "device not open",
            DevError::Io(msg) => msg,
        }
    }
}

impl fmt::Display for DevError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg())
    }
}

impl std::error::Error for DevError {}

impl From<std::io::Error> for DevError {
    #[cold]
    #[inline(never)]
    fn from(e: std::io::Error) -> Self {
        // Leak the string to produce a 'static str. Acceptable for error mapping.
        let leaked: &'static str = Box::leak(e.to_string().into_boxed_str());
        DevError::Io(leaked)
    }
}
