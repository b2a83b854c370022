//! Functions layered on the [`Storage`] collaborator: mount-with-retry,
//! stream-file-into-ram, and read/write of the whole-file snapshot and
//! one-byte power-state registry.
//!
//! Kept as free functions over `&mut S`, not a wrapping struct, since
//! the CSR bridge and the VM loop each need to hold their own open file
//! against the same underlying collaborator at different times.

use crate::backing_store::BackingStore;
use crate::config::STORAGE_MOUNT_RETRIES;
use crate::error::HostError;
use crate::hal::Storage;
use core::convert::Infallible;

const STREAM_CHUNK: usize = 1024;

/// Mounts `storage`, retrying up to [`STORAGE_MOUNT_RETRIES`] times with
/// `delay_ms` milliseconds between attempts.
///
/// # Errors
///
/// Returns the last mount error if every attempt fails.
pub fn mount<S: Storage>(
    storage: &mut S,
    mut sleep_ms: impl FnMut(u32),
    delay_ms: u32,
) -> Result<(), HostError<Infallible, S::Error>> {
    let mut last_err = None;
    for attempt in 0..STORAGE_MOUNT_RETRIES {
        match storage.mount() {
            Ok(()) => return Ok(()),
            Err(err) => {
                log::warn!("storage mount attempt {attempt} failed");
                last_err = Some(err);
                sleep_ms(delay_ms);
            }
        }
    }
    Err(HostError::Storage(last_err.expect("retries > 0")))
}

/// Streams the whole of file `name` into `store` starting at
/// `ram_offset`, chunked at 1024 bytes.
///
/// # Errors
///
/// Returns [`HostError::ImageTooLarge`] if the file would overrun
/// `max_len`, or [`HostError::ShortRead`]/[`HostError::Storage`] on I/O
/// failure.
pub fn load_file_into_ram<S: Storage>(
    storage: &mut S,
    name: &'static str,
    ram_offset: u32,
    max_len: u32,
    store: &mut impl BackingStore,
) -> Result<u32, HostError<Infallible, S::Error>> {
    let mut file = storage.open(name, false).map_err(HostError::Storage)?;
    let size = storage.size(&mut file).map_err(HostError::Storage)?;
    if size > u64::from(max_len) {
        return Err(HostError::ImageTooLarge {
            path: name,
            max: max_len,
        });
    }

    let mut buf = [0u8; STREAM_CHUNK];
    let mut remaining = size;
    let mut offset = ram_offset;
    while remaining > 0 {
        let want = core::cmp::min(remaining, STREAM_CHUNK as u64) as usize;
        let got = storage
            .read(&mut file, &mut buf[..want])
            .map_err(HostError::Storage)?;
        if got != want {
            return Err(HostError::ShortRead {
                path: name,
                expected: want,
                got,
            });
        }
        store.write(offset, &buf[..want]);
        offset += want as u32;
        remaining -= want as u64;
    }
    Ok(size as u32)
}

/// Writes a hibernation snapshot: `ram_amt` bytes streamed from `store`
/// starting at address 0, followed verbatim by `interpreter_state`.
///
/// # Errors
///
/// Returns [`HostError::Storage`] on I/O failure.
pub fn save_snapshot<S: Storage>(
    storage: &mut S,
    name: &'static str,
    ram_amt: u32,
    interpreter_state: &[u8],
    store: &mut impl BackingStore,
) -> Result<(), HostError<Infallible, S::Error>> {
    let mut file = storage.open(name, true).map_err(HostError::Storage)?;
    storage.seek(&mut file, 0).map_err(HostError::Storage)?;

    let mut buf = [0u8; STREAM_CHUNK];
    let mut remaining = ram_amt;
    let mut offset = 0u32;
    while remaining > 0 {
        let want = core::cmp::min(remaining, STREAM_CHUNK as u32) as usize;
        store.read(offset, &mut buf[..want]);
        storage
            .write(&mut file, &buf[..want])
            .map_err(HostError::Storage)?;
        offset += want as u32;
        remaining -= want as u32;
    }
    storage
        .write(&mut file, interpreter_state)
        .map_err(HostError::Storage)
}

/// Restores guest RAM and the interpreter-state record from a
/// previously saved snapshot.
///
/// # Errors
///
/// Returns [`HostError::SnapshotSizeMismatch`] if the file's size does
/// not match `ram_amt + interpreter_state.len()`, or
/// [`HostError::Storage`]/[`HostError::ShortRead`] on I/O failure.
pub fn load_snapshot<S: Storage>(
    storage: &mut S,
    name: &'static str,
    ram_amt: u32,
    interpreter_state: &mut [u8],
    store: &mut impl BackingStore,
) -> Result<(), HostError<Infallible, S::Error>> {
    let mut file = storage.open(name, false).map_err(HostError::Storage)?;
    let expected = u64::from(ram_amt) + interpreter_state.len() as u64;
    let got = storage.size(&mut file).map_err(HostError::Storage)?;
    if got != expected {
        return Err(HostError::SnapshotSizeMismatch { expected, got });
    }

    let mut buf = [0u8; STREAM_CHUNK];
    let mut remaining = ram_amt;
    let mut offset = 0u32;
    while remaining > 0 {
        let want = core::cmp::min(remaining, STREAM_CHUNK as u32) as usize;
        let got = storage
            .read(&mut file, &mut buf[..want])
            .map_err(HostError::Storage)?;
        if got != want {
            return Err(HostError::ShortRead {
                path: name,
                expected: want,
                got,
            });
        }
        store.write(offset, &buf[..want]);
        offset += want as u32;
        remaining -= want as u32;
    }

    let got = storage
        .read(&mut file, interpreter_state)
        .map_err(HostError::Storage)?;
    if got != interpreter_state.len() {
        return Err(HostError::ShortRead {
            path: name,
            expected: interpreter_state.len(),
            got,
        });
    }
    Ok(())
}

/// Reads the single-byte power-state registry, returning `None` if the
/// file does not yet exist or is empty.
pub fn read_power_state_byte<S: Storage>(storage: &mut S, name: &'static str) -> Option<u8> {
    let mut file = storage.open(name, false).ok()?;
    let mut buf = [0u8; 1];
    let got = storage.read(&mut file, &mut buf).ok()?;
    (got == 1).then_some(buf[0])
}

/// Overwrites the single-byte power-state registry.
///
/// # Errors
///
/// Returns [`HostError::Storage`] on I/O failure.
pub fn write_power_state_byte<S: Storage>(
    storage: &mut S,
    name: &'static str,
    value: u8,
) -> Result<(), HostError<Infallible, S::Error>> {
    let mut file = storage.open(name, true).map_err(HostError::Storage)?;
    storage.seek(&mut file, 0).map_err(HostError::Storage)?;
    storage.write(&mut file, &[value]).map_err(HostError::Storage)
}
