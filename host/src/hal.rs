//! Traits describing the external collaborators this crate is built
//! against but does not implement: the SPI transport shared by the
//! backing-store driver and the storage facade, the storage medium
//! itself, the guest console, and the power button / timing source.
//!
//! Board integrations supply concrete types implementing these traits;
//! everything above this module is hardware-independent and can be
//! exercised against fakes.

use embedded_hal::digital::v2::OutputPin;

/// A synchronous SPI transport with an explicit chip-select pin.
///
/// Mirrors the shape `embedded-hal`'s blocking SPI traits expose, but
/// bundles chip-select handling so the backing-store driver and the
/// storage facade do not each have to re-derive "assert CS, transfer,
/// deassert CS".
pub trait SpiDevice {
    /// The error type produced by a transfer or by toggling the
    /// chip-select pin.
    type Error;
    /// The chip-select pin's own error type.
    type Cs: OutputPin;

    /// Returns the chip-select pin.
    fn cs(&mut self) -> &mut Self::Cs;

    /// Writes `out` to the bus, ignoring anything read back.
    fn write(&mut self, out: &[u8]) -> Result<(), Self::Error>;

    /// Reads `buf.len()` bytes from the bus, clocking out zero bytes.
    fn read(&mut self, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Asserts chip-select, runs `f`, then deasserts chip-select
    /// regardless of the outcome.
    fn transaction<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, Self::Error>,
    ) -> Result<T, Self::Error> {
        let _ = self.cs().set_low();
        let result = f(self);
        let _ = self.cs().set_high();
        result
    }
}

/// A block-oriented persistent storage medium reachable by short
/// (8.3-style) file name, standing in for the minimal FAT reader.
pub trait Storage {
    /// The error type produced by mount, open, seek, read, or write.
    type Error;
    /// A handle to one open file.
    type File;

    /// Mounts the medium. Called once at host init; the VM loop assumes
    /// it has already succeeded.
    fn mount(&mut self) -> Result<(), Self::Error>;

    /// Opens `name`, truncating and creating it if `create` is set and
    /// it does not exist.
    fn open(&mut self, name: &str, create: bool) -> Result<Self::File, Self::Error>;

    /// Returns the size of an open file, in bytes.
    fn size(&mut self, file: &mut Self::File) -> Result<u64, Self::Error>;

    /// Seeks to an absolute byte offset.
    fn seek(&mut self, file: &mut Self::File, offset: u64) -> Result<(), Self::Error>;

    /// Reads into `buf`, returning the number of bytes actually read.
    fn read(&mut self, file: &mut Self::File, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Writes all of `buf`.
    fn write(&mut self, file: &mut Self::File, buf: &[u8]) -> Result<(), Self::Error>;
}

/// A byte-oriented guest console: the UART the guest kernel talks to.
pub trait Console {
    /// Returns `true` if a byte is available to read without blocking.
    fn has_input(&mut self) -> bool;
    /// Reads one previously-available byte.
    fn read_byte(&mut self) -> u8;
    /// Writes one byte, blocking until the transmitter accepts it.
    fn write_byte(&mut self, byte: u8);
}

/// The power button and coarse timing source.
pub trait Platform {
    /// Returns `true` while the power button is held asserted.
    fn power_button_pressed(&mut self) -> bool;
    /// Returns a free-running microsecond counter.
    fn micros(&mut self) -> u64;
    /// Sleeps for approximately `ms` milliseconds.
    fn sleep_ms(&mut self, ms: u32);
}
