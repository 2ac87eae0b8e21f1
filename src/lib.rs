//! An [`embedded-hal`]-based driver for serial (SPI) NOR flash chips.
//!
//! The driver reads the chip's JEDEC identification bytes, derives capacity,
//! geometry and addressing width from them, and sequences the
//! write-enable/ready-poll protocol that erase and program commands require.
//! Chips the capacity table does not know still work for raw commands, but
//! report a size of 0.
//!
//! [`embedded-hal`]: https://docs.rs/embedded-hal/

#![doc(html_root_url = "https://docs.rs/spi-nor/0.1.0")]
#![warn(missing_debug_implementations, rust_2018_idioms)]
#![cfg_attr(not(test), no_std)]

#[macro_use]
mod log;
pub mod bus;
mod error;
pub mod prelude;
pub mod series25;
mod utils;

pub use crate::error::Error;

use embedded_hal::blocking::spi::Transfer;
use embedded_hal::digital::v2::OutputPin;

/// A trait for reading operations from a memory chip.
pub trait Read<SPI: Transfer<u8>, CS: OutputPin> {
    /// Reads bytes from a memory chip.
    ///
    /// # Parameters
    /// * `addr`: The address to start reading at.
    /// * `buf`: The buffer to read `buf.len()` bytes into.
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Error<SPI, CS>>;
}

/// A trait for erasing operations on a memory chip.
///
/// Erase units are addressed by index, not by byte address. Writing goes
/// through the driver's page buffer instead (see
/// [`series25::Flash::write_page`]), since NOR flash programs one page at a
/// time and only onto previously erased memory.
pub trait BlockDevice<SPI: Transfer<u8>, CS: OutputPin> {
    /// Erases the 4 KiB sector with the given index.
    fn erase_sector(&mut self, sector: u32) -> Result<(), Error<SPI, CS>>;

    /// Erases the 64 KiB block with the given index.
    fn erase_block(&mut self, block: u32) -> Result<(), Error<SPI, CS>>;

    /// Erases the memory chip fully.
    ///
    /// Warning: Full erase operations can take a significant amount of time.
    /// Check your device's datasheet for precise numbers.
    fn erase_chip(&mut self) -> Result<(), Error<SPI, CS>>;
}
