//! The guest/host control-register bridge: console I/O, block-device
//! transport, and the hibernation trigger, reached by the guest through
//! a small set of custom CSR numbers.

use crate::backing_store::BackingStore;
use crate::cache::Cache;
use crate::config::SECTOR_SIZE;
use crate::error::HostError;
use crate::hal::{Console, Storage};
use core::convert::Infallible;

/// CSR numbers serviced directly by the bridge. Anything else is
/// delegated to a board-specific custom-CSR hook.
pub mod csr {
    /// Write: append the low byte to the console.
    pub const CONSOLE_OUT: u16 = 0x139;
    /// Read: next console input byte, or `0xFFFF_FFFF` if none pending.
    pub const CONSOLE_IN: u16 = 0x140;
    /// Read: configured block-device size in bytes.
    pub const BLK_SIZE: u16 = 0x150;
    /// Write: latch the guest-physical block-transfer pointer.
    pub const BLK_RAM_PTR: u16 = 0x151;
    /// Write: latch the block-device byte offset and seek.
    pub const BLK_OFFSET: u16 = 0x152;
    /// Write: latch the transfer size, in bytes (multiple of 512).
    pub const BLK_TRANSFER_SIZE: u16 = 0x153;
    /// Write: go. Non-zero drains a guest-to-device write; zero drains a
    /// device-to-guest read.
    pub const BLK_GO: u16 = 0x154;
    /// Read: the error code latched by the last block transfer.
    pub const BLK_ERR: u16 = 0x155;
    /// Write: request hibernation at the next batch boundary.
    pub const HIBERNATE_REQUEST: u16 = 0x170;
}

/// Address offset subtracted from a guest-virtual block-transfer pointer
/// to obtain a guest-physical address, matching the RAM image's mapped
/// base in the guest's address space.
pub const RAM_IMAGE_OFFSET: u32 = 0x8000_0000;

/// State and logic behind the CSR table in the component design.
pub struct CsrBridge<Blk: Storage> {
    blk_size: u64,
    blk_ram_ptr: u32,
    blk_transfer_size: u32,
    blk_err: u32,
    hibernate_requested: bool,
    blk_file: Option<Blk::File>,
}

impl<Blk: Storage> CsrBridge<Blk> {
    /// Creates a bridge for a block device of `blk_size` bytes. The
    /// caller is responsible for having already opened `blk_file`.
    pub fn new(blk_size: u64, blk_file: Blk::File) -> Self {
        Self {
            blk_size,
            blk_ram_ptr: 0,
            blk_transfer_size: 0,
            blk_err: 0,
            hibernate_requested: false,
            blk_file: Some(blk_file),
        }
    }

    /// Returns and clears the hibernate-request flag. Polled by the VM
    /// loop between instruction batches, never mid-batch.
    pub fn take_hibernate_request(&mut self) -> bool {
        core::mem::take(&mut self.hibernate_requested)
    }

    /// Services a guest CSR read.
    pub fn csr_read(&mut self, csr: u16, console: &mut impl Console) -> u32 {
        match csr {
            csr::CONSOLE_IN => {
                if console.has_input() {
                    u32::from(console.read_byte())
                } else {
                    0xFFFF_FFFF
                }
            }
            csr::BLK_SIZE => self.blk_size as u32,
            csr::BLK_ERR => self.blk_err,
            _ => 0,
        }
    }

    /// Services a guest CSR write that does not require block-device or
    /// cache access (console output, pointer/offset/size latches, and
    /// the hibernate request). Block-device "go" is handled separately
    /// by [`Self::service_block_transfer`] because it needs `cache` and
    /// `blk_storage`.
    pub fn csr_write(&mut self, csr: u16, value: u32, blk_storage: &mut Blk, console: &mut impl Console) {
        match csr {
            csr::CONSOLE_OUT => console.write_byte(value as u8),
            csr::BLK_RAM_PTR => self.blk_ram_ptr = value.wrapping_sub(RAM_IMAGE_OFFSET),
            csr::BLK_OFFSET => {
                if let Some(file) = &mut self.blk_file {
                    if let Err(err) = blk_storage.seek(file, u64::from(value)) {
                        self.blk_err = HostError::<Infallible, Blk::Error>::Storage(err).to_blk_err_code();
                    }
                }
            }
            csr::BLK_TRANSFER_SIZE => self.blk_transfer_size = value,
            csr::HIBERNATE_REQUEST => self.hibernate_requested = true,
            _ => {}
        }
    }

    /// Drains the latched block transfer: `write != 0` streams guest
    /// memory to the device; `write == 0` streams the device into guest
    /// memory. One sector (512 bytes, 128 little-endian words) at a
    /// time, matching the guest-visible word order.
    ///
    /// Every latched sector is drained regardless of a per-sector
    /// failure; `blk_err` latches whichever error the last sector
    /// produced (or `0` if none did), matching the reference firmware's
    /// "go" handler, which never breaks its sector loop early.
    pub fn service_block_transfer(
        &mut self,
        write: bool,
        cache: &mut Cache,
        store: &mut impl BackingStore,
        blk_storage: &mut Blk,
    ) {
        let Some(file) = self.blk_file.as_mut() else {
            self.blk_err = HostError::<Infallible, Blk::Error>::BlockDeviceNotOpen.to_blk_err_code();
            return;
        };

        let sectors = self.blk_transfer_size as usize / SECTOR_SIZE;
        let mut guest_addr = self.blk_ram_ptr;
        let mut sector_buf = [0u8; SECTOR_SIZE];
        let mut err = 0;

        for _ in 0..sectors {
            if write {
                for word in sector_buf.chunks_exact_mut(4) {
                    let v = cache.read(guest_addr, 4, store);
                    word.copy_from_slice(&v.to_le_bytes());
                    guest_addr += 4;
                }
                if let Err(e) = blk_storage.write(file, &sector_buf) {
                    err = HostError::<Infallible, Blk::Error>::Storage(e).to_blk_err_code();
                }
            } else {
                match blk_storage.read(file, &mut sector_buf) {
                    Ok(got) if got == SECTOR_SIZE => {
                        for word in sector_buf.chunks_exact(4) {
                            let v = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
                            cache.write(guest_addr, 4, v, store);
                            guest_addr += 4;
                        }
                    }
                    Ok(got) => {
                        err = HostError::<Infallible, Blk::Error>::ShortRead {
                            path: "",
                            expected: SECTOR_SIZE,
                            got,
                        }
                        .to_blk_err_code();
                        guest_addr += SECTOR_SIZE as u32;
                    }
                    Err(e) => {
                        err = HostError::<Infallible, Blk::Error>::Storage(e).to_blk_err_code();
                        guest_addr += SECTOR_SIZE as u32;
                    }
                }
            }
        }
        self.blk_err = err;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::vec::Vec;

    struct FakeConsole {
        input: VecDeque<u8>,
        output: Vec<u8>,
    }

    impl Console for FakeConsole {
        fn has_input(&mut self) -> bool {
            !self.input.is_empty()
        }

        fn read_byte(&mut self) -> u8 {
            self.input.pop_front().unwrap_or(0)
        }

        fn write_byte(&mut self, byte: u8) {
            self.output.push(byte);
        }
    }

    struct FakeFile;

    struct FakeBlkStorage {
        data: Vec<u8>,
        pos: usize,
    }

    impl Storage for FakeBlkStorage {
        type Error = Infallible;
        type File = FakeFile;

        fn mount(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }

        fn open(&mut self, _name: &str, _create: bool) -> Result<Self::File, Self::Error> {
            Ok(FakeFile)
        }

        fn size(&mut self, _file: &mut Self::File) -> Result<u64, Self::Error> {
            Ok(self.data.len() as u64)
        }

        fn seek(&mut self, _file: &mut Self::File, offset: u64) -> Result<(), Self::Error> {
            self.pos = offset as usize;
            Ok(())
        }

        fn read(&mut self, _file: &mut Self::File, buf: &mut [u8]) -> Result<usize, Self::Error> {
            let n = buf.len().min(self.data.len().saturating_sub(self.pos));
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }

        fn write(&mut self, _file: &mut Self::File, buf: &[u8]) -> Result<(), Self::Error> {
            let end = self.pos + buf.len();
            if self.data.len() < end {
                self.data.resize(end, 0);
            }
            self.data[self.pos..end].copy_from_slice(buf);
            self.pos = end;
            Ok(())
        }
    }

    struct FakeBackingStore {
        ram: Vec<u8>,
    }

    impl BackingStore for FakeBackingStore {
        fn read(&mut self, addr: u32, buf: &mut [u8]) {
            let addr = addr as usize;
            buf.copy_from_slice(&self.ram[addr..addr + buf.len()]);
        }

        fn write(&mut self, addr: u32, buf: &[u8]) {
            let addr = addr as usize;
            self.ram[addr..addr + buf.len()].copy_from_slice(buf);
        }
    }

    // S3: "go" with the write bit set drains guest memory into storage,
    // two sectors at a time.
    #[test]
    fn block_transfer_write_drains_guest_memory_to_storage() {
        let mut cache = Cache::new();
        let mut store = FakeBackingStore {
            ram: std::vec![0u8; 1 << 16],
        };
        let guest_addr = 0x1000u32;
        for (i, offset) in (0..1024u32).step_by(4).enumerate() {
            cache.write(guest_addr + offset, 4, i as u32, &mut store);
        }
        let mut blk_storage = FakeBlkStorage {
            data: std::vec![0u8; 1024],
            pos: 0,
        };
        let mut bridge = CsrBridge::new(1024, FakeFile);
        bridge.blk_ram_ptr = guest_addr;
        bridge.blk_transfer_size = 1024;

        bridge.service_block_transfer(true, &mut cache, &mut store, &mut blk_storage);

        assert_eq!(bridge.blk_err, 0);
        assert_eq!(&blk_storage.data[0..4], &0u32.to_le_bytes());
        assert_eq!(&blk_storage.data[4..8], &1u32.to_le_bytes());
    }

    // S3 (read direction): "go" with the write bit clear drains storage
    // into guest memory.
    #[test]
    fn block_transfer_read_fills_guest_memory_from_storage() {
        let mut cache = Cache::new();
        let mut store = FakeBackingStore {
            ram: std::vec![0u8; 1 << 16],
        };
        let mut data = std::vec![0u8; 1024];
        data[0..4].copy_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        let mut blk_storage = FakeBlkStorage { data, pos: 0 };
        let mut bridge = CsrBridge::new(1024, FakeFile);
        let guest_addr = 0x2000u32;
        bridge.blk_ram_ptr = guest_addr;
        bridge.blk_transfer_size = 1024;

        bridge.service_block_transfer(false, &mut cache, &mut store, &mut blk_storage);

        assert_eq!(bridge.blk_err, 0);
        assert_eq!(cache.read(guest_addr, 4, &mut store), 0xDEAD_BEEF);
    }

    // A short read on one sector is latched as the terminal error but
    // does not stop the remaining sectors of the transfer from draining.
    #[test]
    fn block_transfer_drains_every_sector_even_after_a_short_read() {
        let mut cache = Cache::new();
        let mut store = FakeBackingStore {
            ram: std::vec![0u8; 1 << 16],
        };
        // Only one sector's worth of data backs a two-sector transfer;
        // the second sector's read comes back short.
        let mut blk_storage = FakeBlkStorage {
            data: std::vec![0xAAu8; SECTOR_SIZE],
            pos: 0,
        };
        let mut bridge = CsrBridge::new(SECTOR_SIZE as u64, FakeFile);
        let guest_addr = 0x3000u32;
        bridge.blk_ram_ptr = guest_addr;
        bridge.blk_transfer_size = (SECTOR_SIZE * 2) as u32;

        bridge.service_block_transfer(false, &mut cache, &mut store, &mut blk_storage);

        assert_ne!(bridge.blk_err, 0, "the short second sector must be latched as an error");
        // The first sector still made it into guest memory.
        assert_eq!(cache.read(guest_addr, 4, &mut store), 0xAAAA_AAAA);
    }

    // S4: a console-out CSR write reaches the console, and console-in
    // drains queued input (or reports none pending).
    #[test]
    fn console_csr_write_and_read() {
        let mut bridge = CsrBridge::<FakeBlkStorage>::new(0, FakeFile);
        let mut blk_storage = FakeBlkStorage {
            data: Vec::new(),
            pos: 0,
        };
        let mut console = FakeConsole {
            input: VecDeque::new(),
            output: Vec::new(),
        };

        bridge.csr_write(csr::CONSOLE_OUT, 0x41, &mut blk_storage, &mut console);
        assert_eq!(console.output, [0x41]);

        assert_eq!(bridge.csr_read(csr::CONSOLE_IN, &mut console), 0xFFFF_FFFF);

        console.input.push_back(0x41);
        assert_eq!(bridge.csr_read(csr::CONSOLE_IN, &mut console), 0x41);
        assert_eq!(bridge.csr_read(csr::CONSOLE_IN, &mut console), 0xFFFF_FFFF);
    }
}
