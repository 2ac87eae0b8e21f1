//! Single-transaction framing for the SPI bus.
//!
//! Everything in this module performs exactly one exchange with the chip per
//! call: the select line is asserted, the command byte (plus address and data
//! phases where the command has them) is clocked through, and the select line
//! is released again. Sequencing of multi-command operations lives in
//! [`crate::series25`].

use crate::Error;
use embedded_hal::blocking::spi::Transfer;
use embedded_hal::digital::v2::OutputPin;

/// Command bytes understood by this chip family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// Read memory at normal speed.
    Read = 0x03,
    /// Read memory at full clock, with one dummy byte after the address.
    FastRead = 0x0B,
    /// Read the 3-byte JEDEC identification.
    ReadJedecId = 0x9F,
    /// Program up to one page of previously erased memory.
    PageProg = 0x02,
    /// Read status register 1.
    ReadStatus = 0x05,
    /// Read status register 2.
    ReadStatus2 = 0x35,
    /// Write status register 1 (and 2, on chips taking a two-byte write).
    WriteStatus = 0x01,
    /// Write status register 2 on chips with a split status write.
    WriteStatus2 = 0x31,
    /// Set the write enable latch.
    WriteEnable = 0x06,
    /// Clear the write enable latch.
    WriteDisable = 0x04,
    /// Erase a 4 KiB sector.
    SectorErase = 0x20,
    /// Erase a 64 KiB block.
    BlockErase = 0xD8,
    /// Erase the whole chip.
    ChipErase = 0xC7,
    /// Fast read with 4-line data transfer.
    QuadRead = 0x6B,
    /// First half of the software reset sequence.
    EnableReset = 0x66,
    /// Second half of the software reset sequence.
    Reset = 0x99,
    /// Switch the chip to 4-byte addresses.
    // TODO: issue this when a chip above 16 MiB is detected; encoding wider
    // addresses alone is not enough for such parts.
    Enter4ByteAddr = 0xB7,
    /// Switch the chip back to 3-byte addresses.
    Exit4ByteAddr = 0xE9,
}

/// Number of address bytes put on the wire, derived from chip capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addressing {
    /// 2-byte addresses, chips of 64 KiB and below.
    TwoByte,
    /// 3-byte addresses, the common case up to 16 MiB.
    ThreeByte,
    /// 4-byte addresses, chips above 16 MiB.
    FourByte,
}

impl Addressing {
    /// Selects the address width for a chip of `total_size` bytes.
    pub fn for_capacity(total_size: u32) -> Self {
        if total_size > 16 * 1024 * 1024 {
            Addressing::FourByte
        } else if total_size > 64 * 1024 {
            Addressing::ThreeByte
        } else {
            Addressing::TwoByte
        }
    }

    /// Number of address bytes sent on the wire.
    pub fn bytes(self) -> usize {
        match self {
            Addressing::TwoByte => 2,
            Addressing::ThreeByte => 3,
            Addressing::FourByte => 4,
        }
    }

    /// Encodes `addr` big-endian into the front of `buf`, truncated to this
    /// width, and returns the number of bytes written.
    fn fill(self, addr: u32, buf: &mut [u8]) -> usize {
        let n = self.bytes();
        for (i, byte) in buf[..n].iter_mut().enumerate() {
            *byte = (addr >> (8 * (n - 1 - i))) as u8;
        }
        n
    }
}

/// Sink for per-transaction diagnostics.
///
/// The bus reports every command byte it puts on the wire, along with the
/// address and transfer length for commands that carry them. Implement this
/// to mirror traffic to a console or capture it in tests; the default
/// [`NoTrace`] discards everything and costs nothing.
pub trait Trace {
    /// Called once per bus transaction, before the transfer starts.
    fn command(&mut self, command: u8, addr: Option<u32>, len: Option<usize>);
}

/// Discards all diagnostics.
#[derive(Debug, Default)]
pub struct NoTrace;

impl Trace for NoTrace {
    #[inline(always)]
    fn command(&mut self, _command: u8, _addr: Option<u32>, _len: Option<usize>) {}
}

/// Owns the SPI master and select line and frames every exchange.
///
/// # Type Parameters
///
/// * **`SPI`**: The SPI master to which the flash chip is attached.
/// * **`CS`**: The **C**hip-**S**elect line attached to the `\CS`/`\CE` pin
///   of the flash chip.
/// * **`TR`**: Diagnostic sink, [`NoTrace`] by default.
#[derive(Debug)]
pub struct Bus<SPI: Transfer<u8>, CS: OutputPin, TR: Trace = NoTrace> {
    spi: SPI,
    cs: CS,
    addressing: Addressing,
    trace: TR,
}

impl<SPI: Transfer<u8>, CS: OutputPin, TR: Trace> Bus<SPI, CS, TR> {
    /// Wraps an SPI master and select pin.
    ///
    /// Starts out with 3-byte addressing, the width every supported chip
    /// accepts for the identification exchange.
    pub fn new(spi: SPI, cs: CS, trace: TR) -> Self {
        Bus {
            spi,
            cs,
            addressing: Addressing::ThreeByte,
            trace,
        }
    }

    /// The address width currently used for address-bearing commands.
    pub fn addressing(&self) -> Addressing {
        self.addressing
    }

    /// Switches the address width. Must agree with what the chip expects.
    pub fn set_addressing(&mut self, addressing: Addressing) {
        self.addressing = addressing;
    }

    /// Releases the SPI master and select pin.
    pub fn free(self) -> (SPI, CS) {
        (self.spi, self.cs)
    }

    /// Runs one framed transfer, asserting CS for its duration.
    fn command(&mut self, bytes: &mut [u8]) -> Result<(), Error<SPI, CS>> {
        // If the SPI transfer fails, make sure to disable CS anyways
        self.cs.set_low().map_err(Error::Gpio)?;
        let spi_result = self.spi.transfer(bytes).map_err(Error::Spi);
        self.cs.set_high().map_err(Error::Gpio)?;
        spi_result?;
        Ok(())
    }

    /// Sends `command`, then clocks one 0xFF filler byte per byte of
    /// `response` while capturing what the chip shifts back.
    pub fn read_command(
        &mut self,
        command: Opcode,
        response: &mut [u8],
    ) -> Result<(), Error<SPI, CS>> {
        self.trace.command(command as u8, None, Some(response.len()));
        for byte in response.iter_mut() {
            *byte = 0xFF;
        }
        let mut cmd_buf = [command as u8];
        self.cs.set_low().map_err(Error::Gpio)?;
        let mut spi_result = self.spi.transfer(&mut cmd_buf);
        if spi_result.is_ok() {
            spi_result = self.spi.transfer(response);
        }
        self.cs.set_high().map_err(Error::Gpio)?;
        spi_result.map(|_| ()).map_err(Error::Spi)
    }

    /// Sends a bare command byte with no data phase.
    pub fn write_command(&mut self, command: Opcode) -> Result<(), Error<SPI, CS>> {
        self.trace.command(command as u8, None, None);
        self.command(&mut [command as u8])
    }

    /// Sends `command` followed by a data payload, capturing no response.
    ///
    /// `data` is clobbered with whatever the chip shifts back during the
    /// payload phase.
    pub fn write_command_with(
        &mut self,
        command: Opcode,
        data: &mut [u8],
    ) -> Result<(), Error<SPI, CS>> {
        self.trace.command(command as u8, None, Some(data.len()));
        let mut cmd_buf = [command as u8];
        self.cs.set_low().map_err(Error::Gpio)?;
        let mut spi_result = self.spi.transfer(&mut cmd_buf);
        if spi_result.is_ok() {
            spi_result = self.spi.transfer(data);
        }
        self.cs.set_high().map_err(Error::Gpio)?;
        spi_result.map(|_| ()).map_err(Error::Spi)
    }

    /// Sends `command` followed by `addr` at the current width. No data
    /// phase.
    pub fn erase_command(&mut self, command: Opcode, addr: u32) -> Result<(), Error<SPI, CS>> {
        self.trace.command(command as u8, Some(addr), None);
        let mut cmd_buf = [command as u8, 0, 0, 0, 0];
        let len = 1 + self.addressing.fill(addr, &mut cmd_buf[1..]);
        self.command(&mut cmd_buf[..len])
    }

    /// Reads `buf.len()` bytes of memory starting at `addr`.
    ///
    /// With `fast` set the 0x0B opcode is used, which clocks one dummy byte
    /// between the address and the data phase.
    pub fn read_memory(
        &mut self,
        addr: u32,
        buf: &mut [u8],
        fast: bool,
    ) -> Result<(), Error<SPI, CS>> {
        let opcode = if fast { Opcode::FastRead } else { Opcode::Read };
        self.trace.command(opcode as u8, Some(addr), Some(buf.len()));
        let mut cmd_buf = [0; 6];
        cmd_buf[0] = opcode as u8;
        let mut len = 1 + self.addressing.fill(addr, &mut cmd_buf[1..]);
        if fast {
            len += 1;
        }
        self.cs.set_low().map_err(Error::Gpio)?;
        let mut spi_result = self.spi.transfer(&mut cmd_buf[..len]);
        if spi_result.is_ok() {
            spi_result = self.spi.transfer(buf);
        }
        self.cs.set_high().map_err(Error::Gpio)?;
        spi_result.map(|_| ()).map_err(Error::Spi)
    }

    /// Sends the page program command, `addr`, then the payload.
    ///
    /// The chip only accepts this while its write enable latch is set, and
    /// wraps around within the page when the payload runs past a page
    /// boundary. `data` is clobbered like in [`Bus::write_command_with`].
    pub fn write_memory(&mut self, addr: u32, data: &mut [u8]) -> Result<(), Error<SPI, CS>> {
        self.trace
            .command(Opcode::PageProg as u8, Some(addr), Some(data.len()));
        let mut cmd_buf = [0; 5];
        cmd_buf[0] = Opcode::PageProg as u8;
        let len = 1 + self.addressing.fill(addr, &mut cmd_buf[1..]);
        self.cs.set_low().map_err(Error::Gpio)?;
        let mut spi_result = self.spi.transfer(&mut cmd_buf[..len]);
        if spi_result.is_ok() {
            spi_result = self.spi.transfer(data);
        }
        self.cs.set_high().map_err(Error::Gpio)?;
        spi_result.map(|_| ()).map_err(Error::Spi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8]) -> u32 {
        bytes.iter().fold(0, |acc, &b| (acc << 8) | u32::from(b))
    }

    #[test]
    fn address_roundtrip_within_width() {
        let addrs = [
            0u32,
            1,
            0xFF,
            0x1234,
            0xFFFF,
            0x0001_0000,
            0x0012_3456,
            0x00FF_FFFF,
            0x0123_4567,
            0xFFFF_FFFF,
        ];
        let modes = [
            Addressing::TwoByte,
            Addressing::ThreeByte,
            Addressing::FourByte,
        ];
        for &addr in &addrs {
            for &mode in &modes {
                let mut buf = [0; 4];
                let n = mode.fill(addr, &mut buf);
                assert_eq!(n, mode.bytes());
                let mask = ((1u64 << (8 * n)) - 1) as u32;
                assert_eq!(decode(&buf[..n]), addr & mask, "addr {:#x} at width {}", addr, n);
            }
        }
    }

    #[test]
    fn address_encoding_is_big_endian() {
        let mut buf = [0; 4];
        Addressing::FourByte.fill(0x0123_4567, &mut buf);
        assert_eq!(buf, [0x01, 0x23, 0x45, 0x67]);

        Addressing::ThreeByte.fill(0xABCDEF, &mut buf);
        assert_eq!(&buf[..3], [0xAB, 0xCD, 0xEF]);

        Addressing::TwoByte.fill(0xBEEF, &mut buf);
        assert_eq!(&buf[..2], [0xBE, 0xEF]);
    }

    #[test]
    fn width_follows_capacity_thresholds() {
        assert_eq!(Addressing::for_capacity(0), Addressing::TwoByte);
        assert_eq!(Addressing::for_capacity(64 * 1024), Addressing::TwoByte);
        assert_eq!(Addressing::for_capacity(64 * 1024 + 1), Addressing::ThreeByte);
        assert_eq!(Addressing::for_capacity(1024 * 1024), Addressing::ThreeByte);
        // 24 bits address exactly 16 MiB, so that size still fits in 3 bytes.
        assert_eq!(
            Addressing::for_capacity(16 * 1024 * 1024),
            Addressing::ThreeByte
        );
        assert_eq!(
            Addressing::for_capacity(16 * 1024 * 1024 + 1),
            Addressing::FourByte
        );
    }
}
