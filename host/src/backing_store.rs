//! Driver for the external serial PSRAM chip that backs all of guest
//! memory. Talks SPI opcodes over a [`SpiDevice`]; the actual bit-banging
//! or DMA transfer is the collaborator's problem.

use crate::error::HostError;
use crate::hal::SpiDevice;
use core::convert::Infallible;

const OPCODE_WRITE: u8 = 0x02;
const OPCODE_FAST_READ: u8 = 0x0B;
const OPCODE_RESET_ENABLE: u8 = 0x66;
const OPCODE_RESET: u8 = 0x99;
const OPCODE_READ_ID: u8 = 0x9F;
const KNOWN_GOOD_DIE_BYTE: u8 = 0x5D;

/// A byte-addressable backing store the cache refills from and writes
/// back to.
///
/// Infallible by design (see the error-handling design note): the cache
/// never has to reason about a failed refill or writeback, matching the
/// reference firmware's fire-and-forget SPI transfers below the cache.
/// A driver that observes a transport error here has nowhere useful to
/// report it other than a log line.
pub trait BackingStore {
    /// Reads `buf.len()` bytes starting at `addr`.
    fn read(&mut self, addr: u32, buf: &mut [u8]);
    /// Writes `buf` starting at `addr`.
    fn write(&mut self, addr: u32, buf: &[u8]);
}

/// Driver for a serial PSRAM chip reachable over `Spi`.
pub struct PsramDriver<Spi> {
    spi: Spi,
}

impl<Spi: SpiDevice> PsramDriver<Spi> {
    /// Wraps `spi`. Call [`Self::init`] before any access.
    pub fn new(spi: Spi) -> Self {
        Self { spi }
    }

    /// Performs the reset sequence and checks the known-good-die byte.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::PsramNotDetected`] if the identification
    /// response does not carry the expected byte, or [`HostError::Spi`]
    /// if the transport itself failed.
    pub fn init(
        &mut self,
        mut delay_ms: impl FnMut(u32),
    ) -> Result<(), HostError<Spi::Error, Infallible>> {
        self.spi
            .transaction(|spi| spi.write(&[OPCODE_RESET_ENABLE]))
            .map_err(HostError::Spi)?;
        self.spi
            .transaction(|spi| spi.write(&[OPCODE_RESET]))
            .map_err(HostError::Spi)?;
        delay_ms(10);

        let mut id = [0u8; 6];
        self.spi
            .transaction(|spi| {
                spi.write(&[OPCODE_READ_ID])?;
                spi.read(&mut id)
            })
            .map_err(HostError::Spi)?;

        if id[1] == KNOWN_GOOD_DIE_BYTE {
            Ok(())
        } else {
            Err(HostError::PsramNotDetected)
        }
    }

    fn addr_bytes(addr: u32) -> [u8; 3] {
        [(addr >> 16) as u8, (addr >> 8) as u8, addr as u8]
    }
}

impl<Spi: SpiDevice> BackingStore for PsramDriver<Spi> {
    fn read(&mut self, addr: u32, buf: &mut [u8]) {
        let addr_bytes = Self::addr_bytes(addr);
        let result = self.spi.transaction(|spi| {
            spi.write(&[OPCODE_FAST_READ])?;
            spi.write(&addr_bytes)?;
            spi.write(&[0])?;
            spi.read(buf)
        });
        if result.is_err() {
            log::warn!("PSRAM read at {addr:#x} failed");
        }
    }

    fn write(&mut self, addr: u32, buf: &[u8]) {
        let addr_bytes = Self::addr_bytes(addr);
        let result = self.spi.transaction(|spi| {
            spi.write(&[OPCODE_WRITE])?;
            spi.write(&addr_bytes)?;
            spi.write(buf)
        });
        if result.is_err() {
            log::warn!("PSRAM write at {addr:#x} failed");
        }
    }
}
