use log::{error, info, warn};

use structopt::StructOpt;

use linux_embedded_hal::sysfs_gpio::Direction;
use linux_embedded_hal::{spidev, spidev::SpiModeFlags, Pin as Pindev, Spidev};

use simplelog::{LevelFilter, TermLogger, TerminalMode};

use ihex::{Reader, Record};

use spi_nor::series25::{Flash, PAGE_SIZE};
use spi_nor::{BlockDevice, Read};

#[derive(Debug, PartialEq, StructOpt)]
struct Options {
    #[structopt(subcommand)]
    operation: Operations,

    /// SPI device
    #[structopt(long, default_value = "/dev/spidev0.0", env = "SPI_DEV")]
    spi_dev: String,

    /// SPI baud rate
    #[structopt(long, default_value = "1000000", env = "SPI_BAUD")]
    spi_baud: u32,

    /// Chip Select (output) pin
    #[structopt(long, default_value = "8", env = "CS_PIN")]
    cs_pin: u64,

    /// Configure log level
    #[structopt(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: LevelFilter,
}

#[derive(Debug, PartialEq, StructOpt)]
pub enum Operations {
    /// Print identification and geometry of the attached chip
    Info,
    /// Read data from the device
    Read {
        /// Flash address for read start in hex
        #[structopt(parse(try_from_str = parse_hex))]
        address: u32,

        /// Length of flash read in bytes
        #[structopt()]
        length: u32,
    },
    /// Program data through the page buffer (the target must be erased)
    Write {
        /// Flash address for write start in hex
        #[structopt(parse(try_from_str = parse_hex))]
        address: u32,

        /// Data to write in hexadecimal
        #[structopt(long)]
        data: HexData,
    },
    /// Erase a run of 4 KiB sectors
    EraseSectors {
        /// Index of the first sector to erase
        sector: u32,

        /// Number of sectors to erase
        #[structopt(long, default_value = "1")]
        count: u32,
    },
    /// Dump flash into a hex file
    Dump {
        /// Flash address for read start in hex
        #[structopt(parse(try_from_str = parse_hex))]
        address: u32,

        /// Length of flash read in bytes
        #[structopt()]
        length: u32,

        /// Output ihex file
        #[structopt(long, default_value = "dump.ihex")]
        file: String,
    },
    /// Load flash from a hex file
    Load {
        /// Input ihex file
        file: String,
    },
    /// Erase all data on the device
    EraseAll,
}

#[derive(Debug, PartialEq)]
pub struct HexData(Vec<u8>);

impl std::str::FromStr for HexData {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        hex::decode(s).map(HexData)
    }
}

fn parse_hex(s: &str) -> Result<u32, std::num::ParseIntError> {
    u32::from_str_radix(s, 16)
}

/// Programs `data` at `addr` by read/patch/write of each touched page.
fn program(flash: &mut Flash<Spidev, Pindev>, mut addr: u32, data: &[u8]) {
    let mut offset = 0;
    while offset < data.len() {
        let page = flash.read_page(addr).unwrap();
        let start = (addr - page) as usize;
        let len = (PAGE_SIZE as usize - start).min(data.len() - offset);
        flash.page_buffer()[start..start + len].copy_from_slice(&data[offset..offset + len]);
        flash.write_page(page).unwrap();
        offset += len;
        addr += len as u32;
    }
}

fn main() -> Result<(), Box<dyn std::error::Error + 'static>> {
    // Load options
    let opts = Options::from_args();

    // Setup logging
    TermLogger::init(
        opts.log_level,
        simplelog::Config::default(),
        TerminalMode::Mixed,
    )
    .unwrap();

    // Connect and configure GPIO pin
    let cs_pin = Pindev::new(opts.cs_pin);

    cs_pin.export().unwrap();
    cs_pin.set_direction(Direction::Out).unwrap();

    // Connect and configure SPI device
    let mut spi = Spidev::open(opts.spi_dev).unwrap();

    let mut spi_config = spidev::SpidevOptions::new();
    spi_config.mode(SpiModeFlags::SPI_MODE_0 | SpiModeFlags::SPI_NO_CS);
    spi_config.max_speed_hz(opts.spi_baud);
    spi.configure(&spi_config).unwrap();

    // Instantiate SPI flash
    let mut flash = match Flash::init(spi, cs_pin) {
        Ok(f) => f,
        Err(e) => {
            error!("Error initialising flash: {:?}", e);
            return Ok(());
        }
    };

    info!("Flash ID: 0x{:06x}", flash.jedec_id());
    if flash.size() == 0 {
        warn!("Chip not in the capacity table, size and erase commands will be meaningless");
    }

    // Perform the requested operation
    match &opts.operation {
        Operations::Info => {
            info!("Size: {} bytes", flash.size());
            info!(
                "Geometry: {} pages of {} bytes, {} sectors, {} blocks",
                flash.pages(),
                flash.page_size(),
                flash.sectors(),
                flash.blocks()
            );
            info!("Status: {:?}", flash.read_status().unwrap());
        }
        Operations::Read { address, length } => {
            info!("Reading {} bytes from address 0x{:08x}", length, address);

            let mut buff = vec![0u8; *length as usize];
            flash.read(*address, &mut buff).unwrap();

            info!("Read: {:02x?}", buff);
        }
        Operations::Write { address, data } => {
            info!("Writing {} bytes to address 0x{:08x}", data.0.len(), address);

            program(&mut flash, *address, &data.0);

            info!("Write complete");
        }
        Operations::EraseSectors { sector, count } => {
            info!("Erasing {} sector(s) starting at index {}", count, sector);

            for i in 0..*count {
                flash.erase_sector(sector + i).unwrap();
            }

            info!("Sector erase complete");
        }
        Operations::EraseAll => {
            info!("Erasing the whole chip");

            flash.erase_chip().unwrap();

            info!("Full erase complete");
        }
        Operations::Dump {
            address,
            length,
            file,
        } => {
            info!(
                "Reading {} bytes from address 0x{:08x} to file {}",
                length, address, &file
            );

            let mut buff = vec![0u8; *length as usize];
            flash.read(*address, &mut buff).unwrap();

            let mut records = Vec::new();
            for (c, chunk) in buff.chunks(32).enumerate() {
                records.push(Record::Data {
                    offset: (*address as usize + c * 32) as u16,
                    value: chunk.to_vec(),
                });
            }
            records.push(Record::EndOfFile);

            let data = ihex::create_object_file_representation(&records).unwrap();

            std::fs::write(file, data).unwrap();

            info!("Dump complete");
        }
        Operations::Load { file } => {
            info!("Loading file {}", file);

            let data = String::from_utf8(std::fs::read(&file).unwrap()).unwrap();

            let reader = Reader::new(&data);

            for record in reader {
                match record {
                    Ok(Record::Data { offset, value }) => {
                        info!("Writing {} bytes at address 0x{:08x}", value.len(), offset);
                        program(&mut flash, u32::from(offset), &value);
                    }
                    Ok(Record::EndOfFile) => (),
                    Err(e) => {
                        error!("Reader error: {:?}", e);
                        return Ok(());
                    }
                    _ => {
                        error!("Unrecognised record: {:?}", record);
                        return Ok(());
                    }
                }
            }

            info!("Load complete");
        }
    }

    Ok(())
}
