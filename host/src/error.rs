//! The module containing the error type shared across fallible host
//! operations.
//!
//! The cache and memory-bus adapter are deliberately infallible (SPI
//! transfers below the cache are fire-and-forget); only backing-store
//! init, the storage facade, and cold-boot image loading return
//! [`HostError`].

use core::fmt;

/// An error surfaced by a fallible host operation.
///
/// Generic over the two external collaborators' own error types so this
/// crate does not need to invent a lossy "everything is a string" error.
pub enum HostError<SpiErr, StorageErr> {
    /// The SPI transport reported an error during a backing-store or
    /// storage-card transaction.
    Spi(SpiErr),
    /// The storage collaborator (card mount, file open/seek/read/write)
    /// reported an error.
    Storage(StorageErr),
    /// The PSRAM init sequence did not observe the known-good-die byte.
    PsramNotDetected,
    /// A file to be streamed into guest RAM exceeds the space reserved
    /// for it.
    ImageTooLarge {
        /// The short file name that was too large.
        path: &'static str,
        /// The maximum size, in bytes, that would have fit.
        max: u32,
    },
    /// A file read returned fewer bytes than its own reported size.
    ShortRead {
        /// The short file name that was short-read.
        path: &'static str,
        /// Bytes expected.
        expected: usize,
        /// Bytes actually read.
        got: usize,
    },
    /// Neither DTB patch sentinel was found while scanning the loaded
    /// device-tree blob.
    DtbSentinelMissing,
    /// A snapshot file's size did not match `ram_amt + size_of interpreter
    /// state`.
    SnapshotSizeMismatch {
        /// Size the snapshot file should have had.
        expected: u64,
        /// Size it actually had.
        got: u64,
    },
    /// A block transfer was requested with no block-device file handle
    /// open.
    BlockDeviceNotOpen,
}

impl<SpiErr, StorageErr> HostError<SpiErr, StorageErr> {
    /// Converts this error into the small integer code latched into
    /// `blk_err` and surfaced to the guest on CSR `0x155`.
    ///
    /// Used only at the CSR-bridge boundary; everywhere else `HostError`
    /// propagates as a normal [`Result`].
    pub fn to_blk_err_code(&self) -> u32 {
        match self {
            Self::Spi(_) => 1,
            Self::Storage(_) => 2,
            Self::PsramNotDetected => 3,
            Self::ImageTooLarge { .. } => 4,
            Self::ShortRead { .. } => 5,
            Self::DtbSentinelMissing => 6,
            Self::SnapshotSizeMismatch { .. } => 7,
            Self::BlockDeviceNotOpen => 8,
        }
    }
}

impl<SpiErr: fmt::Debug, StorageErr: fmt::Debug> fmt::Debug for HostError<SpiErr, StorageErr> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spi(err) => write!(f, "Spi({err:?})"),
            Self::Storage(err) => write!(f, "Storage({err:?})"),
            Self::PsramNotDetected => write!(f, "PsramNotDetected"),
            Self::ImageTooLarge { path, max } => {
                write!(f, "ImageTooLarge {{ path: {path:?}, max: {max} }}")
            }
            Self::ShortRead {
                path,
                expected,
                got,
            } => write!(
                f,
                "ShortRead {{ path: {path:?}, expected: {expected}, got: {got} }}"
            ),
            Self::DtbSentinelMissing => write!(f, "DtbSentinelMissing"),
            Self::SnapshotSizeMismatch { expected, got } => write!(
                f,
                "SnapshotSizeMismatch {{ expected: {expected}, got: {got} }}"
            ),
            Self::BlockDeviceNotOpen => write!(f, "BlockDeviceNotOpen"),
        }
    }
}
