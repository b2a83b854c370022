//! Compile-time constants that shape the cache geometry, guest RAM layout,
//! and persisted file names. Mirrors the board's actual flash/RAM budget;
//! changing these requires re-flashing, not a runtime switch.

use static_assertions::const_assert_eq;

/// Number of address bits consumed by the in-line byte offset.
pub const OFFSET_BITS: u32 = 6;

/// Number of address bits selecting a cache set.
pub const INDEX_BITS: u32 = 7;

/// Bytes per cache line. Derived from [`OFFSET_BITS`].
pub const CACHE_LINE_SIZE: usize = 1 << OFFSET_BITS;

/// Number of sets in the cache. Derived from [`INDEX_BITS`].
pub const CACHE_SET_SIZE: usize = 1 << INDEX_BITS;

const_assert_eq!(CACHE_LINE_SIZE, 64);
const_assert_eq!(CACHE_SET_SIZE, 128);

/// Guest RAM size, in megabytes.
pub const EMULATOR_RAM_MB: usize = 16;

/// Guest RAM size, in bytes.
pub const RAM_AMT: usize = EMULATOR_RAM_MB * 1024 * 1024;

/// Size in bytes of the device-tree blob region reserved at the top of RAM.
pub const DTB_SIZE: usize = 0x2000;

/// Divisor applied to the time source before it is handed to the guest as
/// elapsed microseconds. Larger values slow down the guest's perceived clock.
pub const EMULATOR_TIME_DIV: u64 = 1;

/// When `true`, elapsed guest time is derived from the instruction/cycle
/// counter rather than a wall-clock source. Useful on boards with no
/// free-running timer wired up yet.
pub const EMULATOR_FIXED_UPDATE: bool = false;

/// Kernel command line patched into the DTB's `"abcd"` sentinel at cold boot.
pub const KERNEL_CMDLINE: &str = "console=ttyS0 earlycon=sbi root=/dev/vda rw";

/// Short (8.3-style) file name of the kernel image on the storage device.
pub const KERNEL_FILENAME: &str = "ZIMAGE";

/// Short file name of the device-tree blob.
pub const DTB_FILENAME: &str = "RV32.DTB";

/// Short file name of the raw block-device image backing the guest disk.
pub const BLK_FILENAME: &str = "BLK.IMG";

/// Short file name of the hibernation snapshot.
pub const SNAPSHOT_FILENAME: &str = "SNAPSHOT.BIN";

/// Short file name of the single-byte persisted power-state registry.
pub const STAT_FILENAME: &str = "STAT";

/// Number of instructions executed per call into the interpreter when
/// running normally.
pub const INSTRS_PER_FLIP: usize = 4096;

/// Number of instructions executed per call into the interpreter when
/// single-stepping.
pub const INSTRS_PER_FLIP_SINGLE_STEP: usize = 1;

/// The logging level threshold installed at boot.
pub const LOGGING_LEVEL: log::LevelFilter = log::LevelFilter::Info;

/// Number of times [`crate::storage`] mount is retried before the host
/// treats it as a fatal failure.
pub const STORAGE_MOUNT_RETRIES: u32 = 5;

/// Delay, in milliseconds, between storage mount retries.
pub const STORAGE_MOUNT_RETRY_DELAY_MS: u32 = 200;

/// Sector size used by the block-device transport, in bytes.
pub const SECTOR_SIZE: usize = 512;
