//! Driver for 25-series SPI NOR flash chips.
//!
//! The driver owns a [`Bus`] for the wire protocol, the parameters detected
//! from the chip's identification bytes, and a one-page scratch buffer for
//! read/modify/write cycles. Erase and program commands are bracketed by the
//! ready-poll/write-enable sequence the chips require.

use crate::bus::{Addressing, Bus, NoTrace, Opcode, Trace};
use crate::utils::HexSlice;
use crate::{BlockDevice, Error, Read};
use bitflags::bitflags;
use core::fmt;
use embedded_hal::blocking::spi::Transfer;
use embedded_hal::digital::v2::OutputPin;

/// Smallest programmable unit, in bytes.
pub const PAGE_SIZE: u32 = 256;
/// Smallest erasable unit, 16 pages.
pub const SECTOR_SIZE: u32 = 16 * PAGE_SIZE;
/// 64 KiB erase unit, 256 pages.
pub const BLOCK_SIZE: u32 = 256 * PAGE_SIZE;

/// How many status polls [`Flash::wait_until_ready`] spends before giving up.
const READY_POLL_LIMIT: u32 = 1_000_000;

/// Capacity in bytes for a (memory type, capacity code) pair, 0 if the pair
/// is unknown.
fn capacity_bytes(memory_type: u8, capacity: u8) -> u32 {
    match (memory_type, capacity) {
        (0x40, 0x14) => 1024 * 1024,
        (0x40, 0x18) => 16 * 1024 * 1024,
        (0x70, 0x18) => 16 * 1024 * 1024,
        _ => 0,
    }
}

/// 3-byte JEDEC manufacturer and device identification.
pub struct Identification {
    /// Response to the identification command: manufacturer id, memory type,
    /// capacity code.
    bytes: [u8; 3],
}

impl Identification {
    /// The JEDEC manufacturer code for this chip.
    pub fn mfr_code(&self) -> u8 {
        self.bytes[0]
    }

    /// The memory type byte. Together with the capacity code it indexes the
    /// capacity table.
    pub fn memory_type(&self) -> u8 {
        self.bytes[1]
    }

    /// The capacity code byte.
    pub fn capacity_code(&self) -> u8 {
        self.bytes[2]
    }
}

impl fmt::Debug for Identification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Identification")
            .field(&HexSlice(&self.bytes))
            .finish()
    }
}

bitflags! {
    /// Status register bits.
    pub struct Status: u8 {
        /// Erase or write in progress.
        const BUSY = 1 << 0;
        /// Status of the **W**rite **E**nable **L**atch.
        const WEL = 1 << 1;
        /// The 3 protection region bits.
        const PROT = 0b0001_1100;
        /// **S**tatus **R**egister **W**rite **D**isable bit.
        const SRWD = 1 << 7;
    }
}

/// Parameters of the attached chip.
///
/// Filled in from the identification bytes during [`Flash::init`]; the
/// capability flags cannot be detected that way and stay at their safe
/// defaults unless enabled through [`Flash::configure`].
#[derive(Debug, Clone)]
pub struct DeviceParams {
    /// Total capacity in bytes. 0 when the chip is not in the capacity
    /// table, in which case no geometry query means anything.
    pub total_size: u32,
    /// Power-on settle time in microseconds.
    pub start_up_time_us: u16,
    /// First identification byte.
    pub manufacturer_id: u8,
    /// Second identification byte.
    pub memory_type: u8,
    /// Third identification byte.
    pub capacity: u8,
    /// Highest clock the part supports for all operations, in MHz. A hint
    /// for host SPI configuration, not consulted by the driver.
    pub max_clock_speed_mhz: u8,
    /// Mask of the Quad Enable bit in the top status register byte, 0 when
    /// the part has none.
    pub quad_enable_bit_mask: u8,
    /// The part has sector protection registers.
    pub has_sector_protection: bool,
    /// Supports the 0x0B fast read command with 8 dummy cycles.
    pub supports_fast_read: bool,
    /// Supports the fast read quad output command 0x6B.
    pub supports_qspi: bool,
    /// Supports the quad input page program command 0x32.
    pub supports_qspi_writes: bool,
    /// Status register 2 takes its own 0x31 write instead of a two-byte
    /// 0x01 write.
    pub write_status_register_split: bool,
    /// The status register is a single byte and 0x35 is unsupported.
    pub single_status_byte: bool,
    /// FRAM part: no erase needed, much simpler writes.
    pub is_fram: bool,
}

impl Default for DeviceParams {
    /// Placeholder describing a generic 1 MiB part; overwritten as soon as
    /// the real chip has been identified.
    fn default() -> Self {
        DeviceParams {
            total_size: 1024 * 1024,
            start_up_time_us: 5000,
            manufacturer_id: 0xEF,
            memory_type: 0x40,
            capacity: 0x14,
            max_clock_speed_mhz: 10,
            quad_enable_bit_mask: 0x00,
            has_sector_protection: false,
            supports_fast_read: false,
            supports_qspi: false,
            supports_qspi_writes: false,
            write_status_register_split: false,
            single_status_byte: false,
            is_fram: false,
        }
    }
}

/// Driver for 25-series SPI NOR flash chips.
///
/// # Type Parameters
///
/// * **`SPI`**: The SPI master to which the flash chip is attached.
/// * **`CS`**: The **C**hip-**S**elect line attached to the `\CS`/`\CE` pin
///   of the flash chip.
/// * **`TR`**: Diagnostic sink for bus commands, [`NoTrace`] by default.
#[derive(Debug)]
pub struct Flash<SPI: Transfer<u8>, CS: OutputPin, TR: Trace = NoTrace> {
    bus: Bus<SPI, CS, TR>,
    params: DeviceParams,
    page_buf: [u8; PAGE_SIZE as usize],
}

impl<SPI: Transfer<u8>, CS: OutputPin> Flash<SPI, CS> {
    /// Creates a new driver with diagnostics disabled.
    ///
    /// # Parameters
    ///
    /// * **`spi`**: An SPI master. Must be configured to operate in the
    ///   correct mode for the device.
    /// * **`cs`**: The **C**hip-**S**elect Pin connected to the `\CS`/`\CE`
    ///   pin of the flash chip. Will be driven low when accessing the
    ///   device.
    pub fn init(spi: SPI, cs: CS) -> Result<Self, Error<SPI, CS>> {
        Flash::init_with_trace(spi, cs, NoTrace)
    }
}

impl<SPI: Transfer<u8>, CS: OutputPin, TR: Trace> Flash<SPI, CS, TR> {
    /// Creates a new driver, reporting every bus command to `trace`.
    ///
    /// The select line is deasserted first so the chip sees a clean frame
    /// boundary, then the identification bytes are read and capacity and
    /// addressing width derived from them. A chip missing from the capacity
    /// table still constructs fine but reports a size of 0.
    pub fn init_with_trace(spi: SPI, mut cs: CS, trace: TR) -> Result<Self, Error<SPI, CS>> {
        cs.set_high().map_err(Error::Gpio)?;
        let mut this = Flash {
            bus: Bus::new(spi, cs, trace),
            params: DeviceParams::default(),
            page_buf: [0; PAGE_SIZE as usize],
        };
        let id = this.read_jedec_id()?;
        info!("Flash::init: id = {:?}", id);
        this.params.manufacturer_id = id.mfr_code();
        this.params.memory_type = id.memory_type();
        this.params.capacity = id.capacity_code();
        this.params.total_size = capacity_bytes(id.memory_type(), id.capacity_code());
        this.bus
            .set_addressing(Addressing::for_capacity(this.params.total_size));
        Ok(this)
    }

    /// Releases the SPI master and select pin.
    ///
    /// The select line is left deasserted; switching the pin back to an
    /// input is up to the caller, as is shutting down the SPI peripheral.
    pub fn free(self) -> (SPI, CS) {
        self.bus.free()
    }

    /// Reads the JEDEC manufacturer/device identification.
    pub fn read_jedec_id(&mut self) -> Result<Identification, Error<SPI, CS>> {
        let mut bytes = [0; 3];
        self.bus.read_command(Opcode::ReadJedecId, &mut bytes)?;
        Ok(Identification { bytes })
    }

    /// The identification bytes packed into 24 bits, manufacturer highest.
    pub fn jedec_id(&self) -> u32 {
        (u32::from(self.params.manufacturer_id) << 16)
            | (u32::from(self.params.memory_type) << 8)
            | u32::from(self.params.capacity)
    }

    /// Parameters detected during [`Flash::init`].
    pub fn params(&self) -> &DeviceParams {
        &self.params
    }

    /// Adjusts the device parameters in place.
    ///
    /// Identification only reveals capacity, so flags like
    /// `supports_fast_read` stay off unless the caller knows the part and
    /// enables them here. The addressing width is recomputed afterwards in
    /// case `total_size` changed.
    pub fn configure(&mut self, f: impl FnOnce(&mut DeviceParams)) {
        f(&mut self.params);
        self.bus
            .set_addressing(Addressing::for_capacity(self.params.total_size));
    }

    /// The address width currently in use on the bus.
    pub fn addressing(&self) -> Addressing {
        self.bus.addressing()
    }

    /// Reads status register 1.
    pub fn read_status(&mut self) -> Result<Status, Error<SPI, CS>> {
        let mut buf = [0];
        self.bus.read_command(Opcode::ReadStatus, &mut buf)?;
        Ok(Status::from_bits_truncate(buf[0]))
    }

    /// Reads status register 2 as a raw byte.
    ///
    /// Parts with `single_status_byte` set do not implement the command and
    /// answer with bus noise.
    pub fn read_status2(&mut self) -> Result<u8, Error<SPI, CS>> {
        let mut buf = [0];
        self.bus.read_command(Opcode::ReadStatus2, &mut buf)?;
        Ok(buf[0])
    }

    /// Whether the chip will accept a new command: neither the busy bit nor
    /// the write enable latch is set.
    pub fn is_ready(&mut self) -> Result<bool, Error<SPI, CS>> {
        Ok((self.read_status()? & (Status::BUSY | Status::WEL)).is_empty())
    }

    /// Busy-waits until the chip reports ready.
    ///
    /// Polls the status register in a tight loop with no delay in between,
    /// so treat this as a long blocking call while an erase or program is
    /// running. Gives up with [`Error::Timeout`] once the poll budget is
    /// spent.
    pub fn wait_until_ready(&mut self) -> Result<(), Error<SPI, CS>> {
        for _ in 0..READY_POLL_LIMIT {
            if self.is_ready()? {
                return Ok(());
            }
        }
        Err(Error::Timeout)
    }

    /// Sets the write enable latch.
    ///
    /// The chip clears the latch itself after every program or erase
    /// command, so each one needs a fresh enable. [`BlockDevice`] and
    /// [`Flash::write_page`] issue it internally.
    pub fn write_enable(&mut self) -> Result<(), Error<SPI, CS>> {
        self.bus.write_command(Opcode::WriteEnable)
    }

    /// Clears the write enable latch.
    pub fn write_disable(&mut self) -> Result<(), Error<SPI, CS>> {
        self.bus.write_command(Opcode::WriteDisable)
    }

    /// Writes status register 1.
    ///
    /// Parts without a split status write take the register 2 byte in the
    /// same command; only the single-register form is issued here.
    pub fn write_status(&mut self, value: u8) -> Result<(), Error<SPI, CS>> {
        self.write_enable()?;
        self.bus.write_command_with(Opcode::WriteStatus, &mut [value])
    }

    /// Fills the page buffer from the page containing `addr`.
    ///
    /// Waits for a running operation to finish first; if that wait times
    /// out, the buffer keeps its previous, now stale, contents. Returns the
    /// page-aligned address that was read.
    pub fn read_page(&mut self, addr: u32) -> Result<u32, Error<SPI, CS>> {
        let addr = addr & !(PAGE_SIZE - 1);
        self.wait_until_ready()?;
        let fast = self.params.supports_fast_read;
        self.bus.read_memory(addr, &mut self.page_buf, fast)?;
        Ok(addr)
    }

    /// Programs the page buffer onto the page containing `addr`.
    ///
    /// The target page must have been erased beforehand; programming can
    /// only clear bits. Returns the page-aligned address written. The
    /// buffer is clobbered during the transfer, so refill it before the
    /// next call.
    pub fn write_page(&mut self, addr: u32) -> Result<u32, Error<SPI, CS>> {
        self.wait_until_ready()?;
        self.write_enable()?;
        let addr = addr & !(PAGE_SIZE - 1);
        self.bus.write_memory(addr, &mut self.page_buf)?;
        self.write_disable()?;
        Ok(addr)
    }

    /// Scratch page buffer used by [`Flash::read_page`] and
    /// [`Flash::write_page`].
    ///
    /// Contents may be inspected and patched in place between the two
    /// calls. There is exactly one buffer per driver, so interleaving other
    /// buffer-using operations discards it.
    pub fn page_buffer(&mut self) -> &mut [u8; PAGE_SIZE as usize] {
        &mut self.page_buf
    }

    /// Total capacity in bytes, 0 when the chip was not recognized.
    pub fn size(&self) -> u32 {
        self.params.total_size
    }

    /// Bytes per page.
    pub fn page_size(&self) -> u32 {
        PAGE_SIZE
    }

    /// Number of pages.
    pub fn pages(&self) -> u32 {
        self.params.total_size / PAGE_SIZE
    }

    /// Number of 4 KiB sectors.
    pub fn sectors(&self) -> u32 {
        self.params.total_size / SECTOR_SIZE
    }

    /// Number of 64 KiB blocks.
    pub fn blocks(&self) -> u32 {
        self.params.total_size / BLOCK_SIZE
    }
}

impl<SPI: Transfer<u8>, CS: OutputPin, TR: Trace> Read<SPI, CS> for Flash<SPI, CS, TR> {
    /// Reads flash contents into `buf`, starting at `addr`.
    ///
    /// Note that `addr` is not fully decoded: chips only look at the lowest
    /// bits needed to cover their size, so the contents are "mirrored" at
    /// addresses past the end of the array. Uses the fast read command when
    /// `supports_fast_read` is enabled.
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Error<SPI, CS>> {
        let fast = self.params.supports_fast_read;
        self.bus.read_memory(addr, buf, fast)
    }
}

impl<SPI: Transfer<u8>, CS: OutputPin, TR: Trace> BlockDevice<SPI, CS> for Flash<SPI, CS, TR> {
    /// Erases the 4 KiB sector with index `sector`.
    ///
    /// Waits for a previous operation to finish, then sets the write enable
    /// latch and issues the command. The erase itself runs inside the chip;
    /// the next operation's ready-wait picks it up. On a ready-wait timeout
    /// nothing is issued.
    fn erase_sector(&mut self, sector: u32) -> Result<(), Error<SPI, CS>> {
        self.wait_until_ready()?;
        self.write_enable()?;
        self.bus
            .erase_command(Opcode::SectorErase, sector * SECTOR_SIZE)
    }

    /// Erases the 64 KiB block with index `block`. Same sequencing as
    /// [`BlockDevice::erase_sector`].
    fn erase_block(&mut self, block: u32) -> Result<(), Error<SPI, CS>> {
        self.wait_until_ready()?;
        self.write_enable()?;
        self.bus.erase_command(Opcode::BlockErase, block * BLOCK_SIZE)
    }

    fn erase_chip(&mut self) -> Result<(), Error<SPI, CS>> {
        self.wait_until_ready()?;
        self.write_enable()?;
        self.bus.write_command(Opcode::ChipErase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Chip model shared between the simulated SPI master and select pin.
    struct SimState {
        jedec: [u8; 3],
        /// Status polls left before the busy bits read back clear.
        busy_polls: u32,
        /// Byte driven back for every memory-read data cycle.
        read_fill: u8,
        /// Completed frames, logged as the MOSI bytes between select and
        /// deselect. Status polls are not recorded.
        frames: Vec<Vec<u8>>,
        /// Total number of status register reads.
        polls: u32,
        current: Option<Vec<u8>>,
    }

    impl SimState {
        fn new(jedec: [u8; 3]) -> Rc<RefCell<SimState>> {
            Rc::new(RefCell::new(SimState {
                jedec,
                busy_polls: 0,
                read_fill: 0xA5,
                frames: Vec::new(),
                polls: 0,
                current: None,
            }))
        }

        fn exchange(&mut self, mosi: u8) -> u8 {
            let (opcode, idx) = {
                let frame = self.current.as_mut().expect("transfer outside a CS frame");
                let idx = frame.len();
                frame.push(mosi);
                if idx == 0 {
                    return 0xFF; // opcode cycle, chip not driving yet
                }
                (frame[0], idx)
            };
            match opcode {
                0x9F => self.jedec.get(idx - 1).copied().unwrap_or(0xFF),
                0x05 => {
                    self.polls += 1;
                    if self.busy_polls > 0 {
                        self.busy_polls -= 1;
                        0x03
                    } else {
                        0x00
                    }
                }
                0x35 => 0x00,
                0x03 | 0x0B => self.read_fill,
                _ => 0xFF,
            }
        }

        fn select(&mut self) {
            assert!(self.current.is_none(), "CS asserted twice");
            self.current = Some(Vec::new());
        }

        fn deselect(&mut self) {
            if let Some(frame) = self.current.take() {
                if frame.first() != Some(&0x05) {
                    self.frames.push(frame);
                }
            }
        }
    }

    struct SimSpi(Rc<RefCell<SimState>>);

    impl Transfer<u8> for SimSpi {
        type Error = Infallible;

        fn transfer<'w>(&mut self, words: &'w mut [u8]) -> Result<&'w [u8], Infallible> {
            let mut chip = self.0.borrow_mut();
            for word in words.iter_mut() {
                *word = chip.exchange(*word);
            }
            Ok(words)
        }
    }

    struct SimPin(Rc<RefCell<SimState>>);

    impl OutputPin for SimPin {
        type Error = Infallible;

        fn set_low(&mut self) -> Result<(), Infallible> {
            self.0.borrow_mut().select();
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.0.borrow_mut().deselect();
            Ok(())
        }
    }

    fn flash(jedec: [u8; 3]) -> (Rc<RefCell<SimState>>, Flash<SimSpi, SimPin>) {
        let state = SimState::new(jedec);
        let f = Flash::init(SimSpi(state.clone()), SimPin(state.clone())).unwrap();
        (state, f)
    }

    #[test]
    fn capacity_table() {
        assert_eq!(capacity_bytes(0x40, 0x14), 1024 * 1024);
        assert_eq!(capacity_bytes(0x40, 0x18), 16 * 1024 * 1024);
        assert_eq!(capacity_bytes(0x70, 0x18), 16 * 1024 * 1024);
        assert_eq!(capacity_bytes(0x40, 0x15), 0);
        assert_eq!(capacity_bytes(0xFF, 0xFF), 0);
    }

    #[test]
    fn init_reads_identification_into_params() {
        let (state, f) = flash([0xC2, 0x40, 0x18]);
        assert_eq!(f.params().manufacturer_id, 0xC2);
        assert_eq!(f.params().memory_type, 0x40);
        assert_eq!(f.params().capacity, 0x18);
        assert_eq!(f.jedec_id(), 0xC24018);
        let chip = state.borrow();
        assert_eq!(chip.frames[0], [Opcode::ReadJedecId as u8, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn identifies_1mib_chip() {
        let (_, f) = flash([0xEF, 0x40, 0x14]);
        assert_eq!(f.size(), 1024 * 1024);
        assert_eq!(f.addressing(), Addressing::ThreeByte);
    }

    #[test]
    fn identifies_16mib_chips() {
        let (_, f) = flash([0xEF, 0x40, 0x18]);
        assert_eq!(f.size(), 16 * 1024 * 1024);
        // 24 bits of address cover exactly 16 MiB.
        assert_eq!(f.addressing(), Addressing::ThreeByte);

        let (_, f) = flash([0xEF, 0x70, 0x18]);
        assert_eq!(f.size(), 16 * 1024 * 1024);
    }

    #[test]
    fn unknown_chip_reports_zero_size() {
        let (_, f) = flash([0xFF, 0xFF, 0xFF]);
        assert_eq!(f.size(), 0);
        assert_eq!(f.pages(), 0);
        assert_eq!(f.sectors(), 0);
        assert_eq!(f.blocks(), 0);
        assert_eq!(f.addressing(), Addressing::TwoByte);
    }

    #[test]
    fn geometry_counts_derive_from_size() {
        let (_, f) = flash([0xEF, 0x40, 0x14]);
        assert_eq!(f.page_size(), 256);
        assert_eq!(f.pages(), 4096);
        assert_eq!(f.sectors(), 256);
        assert_eq!(f.blocks(), 16);

        let (_, f) = flash([0xEF, 0x40, 0x18]);
        assert_eq!(f.pages(), 65536);
        assert_eq!(f.sectors(), 4096);
        assert_eq!(f.blocks(), 256);
    }

    #[test]
    fn is_ready_checks_busy_and_latch_bits() {
        let (state, mut f) = flash([0xEF, 0x40, 0x14]);
        state.borrow_mut().busy_polls = 1;
        assert!(!f.is_ready().unwrap());
        assert!(f.is_ready().unwrap());
    }

    #[test]
    fn wait_until_ready_consumes_polls() {
        let (state, mut f) = flash([0xEF, 0x40, 0x14]);
        state.borrow_mut().busy_polls = 3;
        f.wait_until_ready().unwrap();
        assert_eq!(state.borrow().polls, 4); // three busy reads plus the clear one
    }

    #[test]
    fn wait_until_ready_times_out() {
        let (state, mut f) = flash([0xEF, 0x40, 0x14]);
        state.borrow_mut().busy_polls = u32::MAX;
        match f.wait_until_ready() {
            Err(Error::Timeout) => {}
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(state.borrow().polls, READY_POLL_LIMIT);
    }

    #[test]
    fn erase_sector_sequences_write_enable_then_command() {
        let (state, mut f) = flash([0xEF, 0x40, 0x14]);
        state.borrow_mut().frames.clear();
        f.erase_sector(5).unwrap();
        let chip = state.borrow();
        assert_eq!(chip.frames.len(), 2);
        assert_eq!(chip.frames[0], [Opcode::WriteEnable as u8]);
        // 5 * 4096 = 0x005000
        assert_eq!(chip.frames[1], [Opcode::SectorErase as u8, 0x00, 0x50, 0x00]);
    }

    #[test]
    fn erase_issues_nothing_after_timeout() {
        let (state, mut f) = flash([0xEF, 0x40, 0x14]);
        state.borrow_mut().frames.clear();
        state.borrow_mut().busy_polls = u32::MAX;
        assert!(f.erase_sector(0).is_err());
        assert!(state.borrow().frames.is_empty());
    }

    #[test]
    fn erase_block_and_chip_framing() {
        let (state, mut f) = flash([0xEF, 0x40, 0x14]);
        state.borrow_mut().frames.clear();
        f.erase_block(3).unwrap();
        f.erase_chip().unwrap();
        let chip = state.borrow();
        // 3 * 65536 = 0x030000
        assert_eq!(chip.frames[1], [Opcode::BlockErase as u8, 0x03, 0x00, 0x00]);
        assert_eq!(chip.frames[2], [Opcode::WriteEnable as u8]);
        assert_eq!(chip.frames[3], [Opcode::ChipErase as u8]);
    }

    #[test]
    fn read_page_aligns_down() {
        let (state, mut f) = flash([0xEF, 0x40, 0x14]);
        state.borrow_mut().read_fill = 0x5A;
        state.borrow_mut().frames.clear();
        let aligned = f.read_page(0x1234).unwrap();
        assert_eq!(aligned, 0x1200);
        {
            let chip = state.borrow();
            let frame = chip.frames.last().unwrap();
            assert_eq!(frame[..4], [Opcode::Read as u8, 0x00, 0x12, 0x00]);
            assert_eq!(frame.len(), 4 + PAGE_SIZE as usize);
        }
        assert!(f.page_buffer().iter().all(|&b| b == 0x5A));
    }

    #[test]
    fn write_page_aligns_down_and_brackets_with_latch() {
        let (state, mut f) = flash([0xEF, 0x40, 0x14]);
        for (i, byte) in f.page_buffer().iter_mut().enumerate() {
            *byte = i as u8;
        }
        state.borrow_mut().frames.clear();
        let aligned = f.write_page(0xABCD).unwrap();
        assert_eq!(aligned, 0xAB00);
        let chip = state.borrow();
        assert_eq!(chip.frames.len(), 3);
        assert_eq!(chip.frames[0], [Opcode::WriteEnable as u8]);
        let program = &chip.frames[1];
        assert_eq!(program[..4], [Opcode::PageProg as u8, 0x00, 0xAB, 0x00]);
        assert_eq!(program.len(), 4 + PAGE_SIZE as usize);
        assert_eq!(program[4], 0);
        assert_eq!(program[7], 3);
        assert_eq!(chip.frames[2], [Opcode::WriteDisable as u8]);
    }

    #[test]
    fn fast_read_adds_dummy_byte() {
        let (state, mut f) = flash([0xEF, 0x40, 0x14]);
        let mut buf = [0; 8];
        state.borrow_mut().frames.clear();
        f.read(0x40, &mut buf).unwrap();
        {
            let chip = state.borrow();
            let frame = chip.frames.last().unwrap();
            assert_eq!(frame[0], Opcode::Read as u8);
            assert_eq!(frame.len(), 1 + 3 + buf.len());
        }
        f.configure(|params| params.supports_fast_read = true);
        f.read(0x40, &mut buf).unwrap();
        let chip = state.borrow();
        let frame = chip.frames.last().unwrap();
        assert_eq!(frame[0], Opcode::FastRead as u8);
        assert_eq!(frame.len(), 1 + 3 + 1 + buf.len());
    }

    #[test]
    fn write_status_sets_latch_first() {
        let (state, mut f) = flash([0xEF, 0x40, 0x14]);
        state.borrow_mut().frames.clear();
        f.write_status(0x02).unwrap();
        let chip = state.borrow();
        assert_eq!(chip.frames[0], [Opcode::WriteEnable as u8]);
        assert_eq!(chip.frames[1], [Opcode::WriteStatus as u8, 0x02]);
    }

    #[test]
    fn end_to_end_identification_scenario() {
        let (_, f) = flash([0xEF, 0x40, 0x14]);
        assert_eq!(f.size(), 1_048_576);
        assert_eq!(f.page_size(), 256);
        assert_eq!(f.sectors(), 256);
    }
}
