//! The memory-bus adapter binding the interpreter's load/store/CSR
//! hooks to the cache and the CSR bridge, and routing the two MMIO UART
//! addresses to the guest console.

use crate::backing_store::BackingStore;
use crate::bridge::CsrBridge;
use crate::cache::Cache;
use crate::hal::{Console, Storage};
use crate::interpreter::MemoryBus;

/// MMIO address of the 8250-style UART's data register.
pub const UART_DATA_ADDR: u32 = 0x1000_0000;
/// MMIO address of the 8250-style UART's line-status register.
pub const UART_LSR_ADDR: u32 = 0x1000_0005;

/// A fault code the interpreter itself treats as unrecoverable
/// (the guest's own trap vector has no handler for it), regardless of
/// [`Bus::fail_on_all_faults`].
const FATAL_FAULT_CODE: u32 = 3;

/// Borrows everything the interpreter needs for the duration of one
/// instruction batch. Constructed fresh per batch by the VM loop rather
/// than stored, since it only holds borrows.
pub struct Bus<'a, Store, Blk: Storage, Con: Console> {
    /// The cache standing in for guest RAM.
    pub cache: &'a mut Cache,
    /// The backing store the cache refills from and writes back to.
    pub store: &'a mut Store,
    /// The CSR bridge (console, block transport, hibernate trigger).
    pub bridge: &'a mut CsrBridge<Blk>,
    /// The block-storage collaborator the bridge seeks/reads/writes.
    pub blk_storage: &'a mut Blk,
    /// The guest console.
    pub console: &'a mut Con,
    /// When `true`, any fault reported through [`Self::post_execute`]
    /// aborts the batch instead of being masked back to the guest's own
    /// trap vector.
    pub fail_on_all_faults: bool,
}

impl<'a, Store: BackingStore, Blk: Storage, Con: Console> MemoryBus for Bus<'a, Store, Blk, Con> {
    fn load(&mut self, addr: u32, size: u8) -> u32 {
        if addr == UART_LSR_ADDR {
            return 0x60 | u32::from(self.console.has_input());
        }
        if addr == UART_DATA_ADDR {
            return if self.console.has_input() {
                u32::from(self.console.read_byte())
            } else {
                0
            };
        }
        self.cache.read(addr, size as usize, self.store)
    }

    fn load_signed(&mut self, addr: u32, size: u8) -> i32 {
        let raw = self.load(addr, size);
        match size {
            1 => i32::from(raw as u8 as i8),
            2 => i32::from(raw as u16 as i16),
            _ => raw as i32,
        }
    }

    fn store(&mut self, addr: u32, size: u8, value: u32) {
        if addr == UART_DATA_ADDR {
            self.console.write_byte(value as u8);
            return;
        }
        self.cache.write(addr, size as usize, value, self.store);
    }

    fn csr_read(&mut self, csr: u16) -> u32 {
        self.bridge.csr_read(csr, self.console)
    }

    fn csr_write(&mut self, csr: u16, value: u32) {
        if csr == crate::bridge::csr::BLK_GO {
            self.bridge
                .service_block_transfer(value != 0, self.cache, self.store, self.blk_storage);
            return;
        }
        self.bridge.csr_write(csr, value, self.blk_storage, self.console);
    }

    fn post_execute(&mut self, fault_code: u32) -> u32 {
        if fault_code == 0 || fault_code == FATAL_FAULT_CODE || self.fail_on_all_faults {
            fault_code
        } else {
            // Mask a recoverable fault back to 0 so the interpreter lets
            // the guest's own trap vector handle it instead of
            // escalating to the batch-terminating dispatch code.
            0
        }
    }
}
