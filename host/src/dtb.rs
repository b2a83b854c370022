//! Patches the two placeholders a stock device-tree blob carries for a
//! RAM-backed guest: the DTB's own base address and the kernel command
//! line.

use crate::backing_store::BackingStore;
use crate::config::DTB_SIZE;
use crate::error::HostError;
use core::convert::Infallible;

const BASE_ADDR_SENTINEL: u32 = 0x00C0_FF03;
const CMDLINE_SENTINEL: u32 = 0x6463_6261; // ASCII "abcd", little-endian word.

/// Scans the `DTB_SIZE`-byte blob at `dtb_base` in `store`, replacing the
/// base-address sentinel with the byte-reversed (big-endian) DTB base
/// address, and overwriting from the `"abcd"` sentinel with a
/// NUL-terminated `cmdline`.
///
/// # Errors
///
/// Returns [`HostError::DtbSentinelMissing`] if either sentinel is not
/// found, or if `cmdline` (plus its NUL terminator) does not fit before
/// the end of the blob.
pub fn patch<SpiErr, StorageErr>(
    store: &mut impl BackingStore,
    dtb_base: u32,
    cmdline: &str,
) -> Result<(), HostError<SpiErr, StorageErr>> {
    let mut blob = [0u8; DTB_SIZE];
    store.read(dtb_base, &mut blob);

    let base_addr_offset = find_word(&blob, BASE_ADDR_SENTINEL).ok_or(HostError::DtbSentinelMissing)?;
    blob[base_addr_offset..base_addr_offset + 4].copy_from_slice(&dtb_base.to_be_bytes());

    let cmdline_offset = find_word(&blob, CMDLINE_SENTINEL).ok_or(HostError::DtbSentinelMissing)?;
    let bytes = cmdline.as_bytes();
    if cmdline_offset + bytes.len() + 1 > DTB_SIZE {
        return Err(HostError::DtbSentinelMissing);
    }
    blob[cmdline_offset..cmdline_offset + bytes.len()].copy_from_slice(bytes);
    blob[cmdline_offset + bytes.len()] = 0;

    store.write(dtb_base, &blob);
    Ok(())
}

fn find_word(blob: &[u8], word: u32) -> Option<usize> {
    blob.chunks_exact(4)
        .position(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) == word)
        .map(|idx| idx * 4)
}
