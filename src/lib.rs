// Copyright 2020, 2021 Adam Greig
// Licensed under the Apache-2.0 and MIT licenses.

//! qspi-flash
//!
//! This crate drives external QSPI NOR flash memories: it identifies which of
//! a fixed catalog of parts is attached, brings it into a known state, and
//! provides reading, programming, and erasing.

#![cfg_attr(not(feature = "std"), no_std)]

use core::time::Duration;
#[cfg(feature = "std")]
use indicatif::{ProgressBar, ProgressStyle};

pub mod devices;
pub mod id;
pub mod sreg;


pub use devices::{FlashDevice, QuadEnableWrite, DEVICES};
pub use id::JedecId;
pub use sreg::{StatusRegister1, StatusRegister2};

/// Page program size used for every supported part.
pub const PAGE_SIZE: u32 = 256;

/// Size of the region erased by `erase_sector()`.
pub const SECTOR_SIZE: u32 = 4096;

/// Size of the region erased by `erase_block()`.
pub const BLOCK_SIZE: u32 = 64 * 1024;

/// Time the part needs to come out of a software reset.
const RESET_DELAY: Duration = Duration::from_micros(30);

#[cfg(feature = "std")]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Unsupported flash device: {id}.")]
    UnsupportedDevice { id: JedecId },
    #[error("Flash device has not been initialized.")]
    NotInitialized,
    #[error("Address out of range for memory: 0x{address:08X}.")]
    InvalidAddress { address: u32 },
    #[error("Flash still busy after {polls} status polls.")]
    BusyTimeout { polls: u32 },

    #[error(transparent)]
    Access(#[from] anyhow::Error),
}
#[cfg(not(feature = "std"))]
#[derive(Debug)]
pub enum Error<E> {
    UnsupportedDevice { id: JedecId },
    NotInitialized,
    InvalidAddress { address: u32 },
    BusyTimeout { polls: u32 },

    Access(E),
}

#[cfg(feature = "std")]
pub type Result<T> = std::result::Result<T, Error>;
#[cfg(not(feature = "std"))]
pub type Result<T> = core::result::Result<T, Error<()>>;

#[cfg(feature = "std")]
pub type AnyhowResult<T> = anyhow::Result<T>;
#[cfg(not(feature = "std"))]
pub type AnyhowResult<T> = Result<T>;

/// Trait for objects which provide access to a QSPI bus with flash attached.
///
/// Providers handle clocking, chip select, and the QSPI peripheral itself;
/// this crate only decides which commands to send and in what order.
pub trait QspiTransport {
    /// Bring up the QSPI peripheral.
    fn begin(&mut self) -> AnyhowResult<()>;

    /// Send `opcode`, then clock in `response.len()` bytes.
    fn read_command(&mut self, opcode: u8, response: &mut [u8]) -> AnyhowResult<()>;

    /// Send `opcode` followed by `data`.
    fn write_command(&mut self, opcode: u8, data: &[u8]) -> AnyhowResult<()>;

    /// Send `opcode` with no data.
    fn run_command(&mut self, opcode: u8) -> AnyhowResult<()> {
        // Default implementation is a write with no data.
        self.write_command(opcode, &[])
    }

    /// Read flash contents starting at `address` into `data`.
    fn read_memory(&mut self, address: u32, data: &mut [u8]) -> AnyhowResult<()>;

    /// Program `data` starting at `address`.
    ///
    /// Implementations are responsible for setting the write enable latch
    /// and for keeping each page program within a page.
    fn write_memory(&mut self, address: u32, data: &[u8]) -> AnyhowResult<()>;

    /// Erase the sector containing `address`.
    fn erase_sector(&mut self, address: u32) -> AnyhowResult<()>;

    fn sleep(&mut self, dur: Duration);
}

/// QSPI Flash.
///
/// This struct identifies and configures a flash part from a catalog of
/// known devices, then provides access to its contents.
///
/// Every busy-wait polls the status registers until the part reports idle.
/// By default there is no limit on the number of polls, so a missing or
/// unresponsive part blocks forever; use `set_poll_limit()` to bound them.
pub struct QspiFlash<'a, T: QspiTransport> {
    transport: &'a mut T,

    /// Parts which `initialize()` will recognise.
    catalog: &'static [FlashDevice],

    /// Set once `initialize()` has identified the attached part.
    device: Option<&'static FlashDevice>,

    /// Address following the most recent buffer transfer.
    current_address: u32,

    /// Total data memory capacity in bytes, 0 until initialized.
    total_size: u32,

    /// Page size in bytes, 0 until initialized.
    page_size: u32,

    /// Number of pages, 0 until initialized.
    page_count: u32,

    /// Maximum number of status polls in a single busy-wait.
    poll_limit: Option<u32>,
}

impl<'a, T: QspiTransport> QspiFlash<'a, T> {
    #[cfg(feature = "std")]
    const DATA_PROGRESS_TPL: &'static str =
        " {msg} [{bar:40}] {bytes}/{total_bytes} ({bytes_per_sec}; {eta_precise})";
    #[cfg(feature = "std")]
    const DATA_PROGRESS_CHARS: &'static str = "=> ";

    /// Create a new QspiFlash using the given transport and the default device catalog.
    pub fn new(transport: &'a mut T) -> Self {
        Self::with_catalog(transport, &DEVICES)
    }

    /// Create a new QspiFlash which recognises only the parts in `catalog`.
    pub fn with_catalog(transport: &'a mut T, catalog: &'static [FlashDevice]) -> Self {
        QspiFlash {
            transport,
            catalog,
            device: None,
            current_address: 0,
            total_size: 0,
            page_size: 0,
            page_count: 0,
            poll_limit: None,
        }
    }

    /// Get the identified device, if `initialize()` has succeeded.
    pub fn device(&self) -> Option<&'static FlashDevice> {
        self.device
    }

    pub fn is_initialized(&self) -> bool {
        self.device.is_some()
    }

    /// Get the total memory capacity in bytes, or 0 before initialization.
    pub fn total_size(&self) -> u32 {
        self.total_size
    }

    /// Get the page program size in bytes, or 0 before initialization.
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Get the number of pages, or 0 before initialization.
    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Get the address following the most recent successful read or write.
    pub fn current_address(&self) -> u32 {
        self.current_address
    }

    /// Get the maximum number of status polls per busy-wait, if set.
    pub fn poll_limit(&self) -> Option<u32> {
        self.poll_limit
    }

    /// Bound the number of status polls per busy-wait.
    ///
    /// When a wait exceeds the limit, `Error::BusyTimeout` is returned.
    /// `None` restores the default of waiting indefinitely.
    pub fn set_poll_limit(&mut self, limit: Option<u32>) {
        self.poll_limit = limit;
    }

    /// Identify the attached flash and bring it into a known state.
    ///
    /// The JEDEC ID is looked up in the catalog; if no entry matches,
    /// `Error::UnsupportedDevice` is returned and no further commands are
    /// sent. Otherwise any in-progress or suspended operation is waited out,
    /// the part is reset, quad mode is enabled and sector protection cleared
    /// where the part requires it, and the write enable latch is cleared.
    ///
    /// Geometry is only recorded once every step has succeeded.
    /// Calling this again after success returns the known device without
    /// touching the bus.
    pub fn initialize(&mut self) -> Result<&'static FlashDevice> {
        if let Some(device) = self.device {
            log::debug!("Flash already initialized as {}", device.name);
            return Ok(device);
        }

        log::debug!("Initializing QSPI flash");
        self.transport.begin()?;

        let id = self.read_id()?;
        let device = match devices::find(self.catalog, &id) {
            Some(device) => device,
            None => {
                if id.is_blank() {
                    log::error!("No flash device detected, read ID {:06X}", id.to_u32());
                } else {
                    log::error!("Unsupported flash device: {}", id);
                }
                return Err(Error::UnsupportedDevice { id });
            }
        };
        log::debug!("Found {} ({} bytes)", device.name, device.total_size);

        // We don't know what state the flash is in, so wait for any
        // remaining writes to finish before resetting it.
        self.wait_while_busy()?;
        self.wait_while_suspended()?;
        self.reset()?;

        if let Some(write) = device.quad_enable_write() {
            self.enable_quad(device, write)?;
        }

        if device.has_sector_protection {
            self.clear_sector_protection()?;
        }

        // The flash keeps its write enable latch over a microcontroller-only reset.
        self.write_disable()?;
        self.wait_while_busy()?;

        self.device = Some(device);
        self.current_address = 0;
        self.page_size = PAGE_SIZE;
        self.total_size = device.total_size;
        self.page_count = self.total_size / PAGE_SIZE;
        log::debug!("Flash ready: {} pages of {} bytes", self.page_count, self.page_size);

        Ok(device)
    }

    /// Reset the attached flash.
    ///
    /// Sends EnableReset 0x66 followed by Reset 0x99, then sleeps for the
    /// reset recovery time, since status cannot be polled during reset.
    pub fn reset(&mut self) -> Result<()> {
        log::debug!("Resetting flash");
        self.command(Command::EnableReset)?;
        self.command(Command::Reset)?;
        self.transport.sleep(RESET_DELAY);
        Ok(())
    }

    /// Read the 3-byte JEDEC ID.
    ///
    /// This does not require the flash to be initialized, and always
    /// re-reads the ID from the flash.
    pub fn read_id(&mut self) -> Result<JedecId> {
        let mut data = [0u8; 3];
        self.read(Command::ReadJEDECID, &mut data)?;
        let id = JedecId::from_bytes(data);
        log::debug!("Read ID: {:?}", id);
        Ok(id)
    }

    /// Read the JEDEC ID packed as `manufacturer << 16 | memory type << 8 | capacity`.
    pub fn read_jedec_id(&mut self) -> Result<u32> {
        self.read_id().map(|id| id.to_u32())
    }

    /// Read the manufacturer ID and device ID.
    ///
    /// The device ID is the low byte of the JEDEC ID, i.e. the capacity code.
    pub fn read_manufacturer_and_device_id(&mut self) -> Result<(u8, u8)> {
        let jedec_id = self.read_jedec_id()?;
        Ok(((jedec_id >> 16) as u8, (jedec_id & 0xFF) as u8))
    }

    /// Read status register 1.
    pub fn read_status1(&mut self) -> Result<StatusRegister1> {
        let mut data = [0u8; 1];
        self.read(Command::ReadStatusRegister1, &mut data)?;
        Ok(StatusRegister1(data[0]))
    }

    /// Read status register 2.
    ///
    /// Parts with `single_status_byte` may not implement this register.
    pub fn read_status2(&mut self) -> Result<StatusRegister2> {
        let mut data = [0u8; 1];
        self.read(Command::ReadStatusRegister2, &mut data)?;
        Ok(StatusRegister2(data[0]))
    }

    /// Send the WriteEnable command, setting the WEL in the status register.
    ///
    /// The flash silently ignores program, erase, and status register
    /// writes unless this immediately precedes them.
    pub fn write_enable(&mut self) -> Result<()> {
        self.command(Command::WriteEnable)
    }

    /// Send the WriteDisable command, clearing the WEL in the status register.
    pub fn write_disable(&mut self) -> Result<()> {
        self.command(Command::WriteDisable)
    }

    /// Check if the device is currently busy performing an operation.
    pub fn is_busy(&mut self) -> Result<bool> {
        self.read_status1().map(|status| status.get_busy())
    }

    /// Check if an erase or program operation is suspended.
    pub fn is_suspended(&mut self) -> Result<bool> {
        self.read_status2().map(|status| status.get_suspended())
    }

    /// Wait until the device stops being busy.
    pub fn wait_while_busy(&mut self) -> Result<()> {
        self.poll_while(|flash| flash.is_busy())
    }

    /// Wait until no operation is suspended.
    pub fn wait_while_suspended(&mut self) -> Result<()> {
        self.poll_while(|flash| flash.is_suspended())
    }

    /// Read `data.len()` bytes from the flash starting at `address`.
    ///
    /// Returns the number of bytes read.
    pub fn read_buffer(&mut self, address: u32, data: &mut [u8]) -> Result<usize> {
        self.check_address_length(address, data.len())?;
        if data.is_empty() {
            return Ok(0);
        }
        log::trace!("Reading {} bytes from 0x{:08X}", data.len(), address);
        self.transport.read_memory(address, data)?;
        self.current_address = address + data.len() as u32;
        Ok(data.len())
    }

    /// Read `data.len()` bytes from the flash starting at `address`.
    ///
    /// This method is similar to `read_buffer()`, except it calls the provided
    /// callback function at regular intervals with the number of bytes read so far.
    ///
    /// While `read_buffer()` performs a single transfer, this method performs
    /// up to 128 separate transfers to allow progress to be reported.
    pub fn read_buffer_cb<F: Fn(usize)>(&mut self, address: u32, data: &mut [u8], cb: F)
        -> Result<usize>
    {
        self.check_address_length(address, data.len())?;
        let chunk_size = usize::max(1024, data.len() / 128);
        let mut total = 0;
        cb(0);
        for chunk in data.chunks_mut(chunk_size) {
            total += self.read_buffer(address + total as u32, chunk)?;
            cb(total);
        }
        Ok(total)
    }

    /// Read `data.len()` bytes from the flash starting at `address`.
    ///
    /// This method is similar to `read_buffer_cb()`, except it renders a
    /// progress bar to the terminal during the read.
    #[cfg(feature = "std")]
    pub fn read_progress(&mut self, address: u32, data: &mut [u8]) -> Result<usize> {
        let pb = ProgressBar::new(data.len() as u64).with_style(ProgressStyle::default_bar()
            .template(Self::DATA_PROGRESS_TPL).progress_chars(Self::DATA_PROGRESS_CHARS));
        pb.set_message("Reading");
        let result = self.read_buffer_cb(address, data, |n| pb.set_position(n as u64));
        pb.finish();
        result
    }

    /// Program `data` to the flash starting at `address`.
    ///
    /// The data is handed to the transport in a single transfer; this does
    /// *not* erase the flash beforehand or split the data into pages.
    ///
    /// Returns the number of bytes written.
    pub fn write_buffer(&mut self, address: u32, data: &[u8]) -> Result<usize> {
        self.check_address_length(address, data.len())?;
        if data.is_empty() {
            return Ok(0);
        }
        log::trace!("Writing {} bytes to 0x{:08X}", data.len(), address);
        self.transport.write_memory(address, data)?;
        self.current_address = address + data.len() as u32;
        Ok(data.len())
    }

    /// Read a single byte.
    pub fn read8(&mut self, address: u32) -> Result<u8> {
        let mut data = [0u8; 1];
        self.read_buffer(address, &mut data)?;
        Ok(data[0])
    }

    /// Read a little-endian u16.
    pub fn read16(&mut self, address: u32) -> Result<u16> {
        let mut data = [0u8; 2];
        self.read_buffer(address, &mut data)?;
        Ok(u16::from_le_bytes(data))
    }

    /// Read a little-endian u32.
    pub fn read32(&mut self, address: u32) -> Result<u32> {
        let mut data = [0u8; 4];
        self.read_buffer(address, &mut data)?;
        Ok(u32::from_le_bytes(data))
    }

    /// Erase entire flash chip.
    ///
    /// Returns only after erase operation is complete, which may take
    /// many seconds.
    pub fn chip_erase(&mut self) -> Result<()> {
        self.check_initialized()?;
        log::debug!("Erasing entire chip");
        self.write_enable()?;
        self.command(Command::ChipErase)?;
        self.wait_while_busy()
    }

    /// Erase entire flash chip.
    ///
    /// This method is identical to `chip_erase()`, except it draws a spinner
    /// to the terminal during the erase operation.
    #[cfg(feature = "std")]
    pub fn chip_erase_progress(&mut self) -> Result<()> {
        self.check_initialized()?;
        let pb = ProgressBar::new_spinner();
        pb.set_message("Erasing");
        self.write_enable()?;
        self.command(Command::ChipErase)?;
        let result = self.poll_while(|flash| {
            pb.tick();
            flash.is_busy()
        });
        pb.finish();
        result
    }

    /// Erase the 4kB sector `sector`.
    ///
    /// The erase itself is carried out by the transport; this method sets
    /// the write enable latch beforehand and waits for completion afterwards.
    pub fn erase_sector(&mut self, sector: u32) -> Result<()> {
        let address = self.erase_address(sector, SECTOR_SIZE)?;
        log::trace!("Erasing sector {} at 0x{:08X}", sector, address);
        self.write_enable()?;
        self.transport.erase_sector(address)?;
        self.wait_while_busy()
    }

    /// Erase the 64kB block `block`.
    pub fn erase_block(&mut self, block: u32) -> Result<()> {
        let address = self.erase_address(block, BLOCK_SIZE)?;
        log::trace!("Erasing block {} at 0x{:08X}", block, address);
        self.write_enable()?;
        self.write(Command::BlockErase64, &address.to_be_bytes()[1..])?;
        self.wait_while_busy()
    }

    /// Set the quad enable bit, unless it is already set.
    fn enable_quad(&mut self, device: &FlashDevice, write: QuadEnableWrite) -> Result<()> {
        let mask = device.quad_enable_bit_mask;
        let enabled = if device.single_status_byte {
            self.read_status1()?.has_bits(mask)
        } else {
            self.read_status2()?.has_bits(mask)
        };
        if enabled {
            log::debug!("Quad mode already enabled");
            return Ok(());
        }

        log::debug!("Enabling quad mode using {:?} status write, mask {:02X}", write, mask);
        let image = QuadEnableWrite::status_image(mask);
        let command = match write {
            QuadEnableWrite::Split => Command::WriteStatusRegister2,
            QuadEnableWrite::SingleByte | QuadEnableWrite::Combined => Command::WriteStatusRegister1,
        };
        self.write_enable()?;
        self.write(command, write.payload(&image))
    }

    /// Clear all block protection bits in status register 1.
    fn clear_sector_protection(&mut self) -> Result<()> {
        log::debug!("Clearing sector protection");
        self.write_enable()?;
        self.write(Command::WriteStatusRegister1, &[0x00])
    }

    /// Poll until `pending` reports false, or the poll limit is reached.
    fn poll_while<F>(&mut self, mut pending: F) -> Result<()>
        where F: FnMut(&mut Self) -> Result<bool>
    {
        let mut polls = 0;
        while pending(self)? {
            polls += 1;
            if let Some(limit) = self.poll_limit {
                if polls >= limit {
                    log::error!("Flash did not become ready after {} polls", polls);
                    return Err(Error::BusyTimeout { polls });
                }
            }
        }
        log::trace!("Flash ready after {} polls", polls);
        Ok(())
    }

    /// Sends `command` and fills `data` with the response.
    fn read<C: Into<u8>>(&mut self, command: C, data: &mut [u8]) -> Result<()> {
        let opcode = command.into();
        self.transport.read_command(opcode, data)?;
        log::trace!("QSPI read 0x{:02X}: {:02X?}", opcode, data);
        Ok(())
    }

    /// Sends `command` and `data` to the flash memory.
    fn write<C: Into<u8>>(&mut self, command: C, data: &[u8]) -> Result<()> {
        let opcode = command.into();
        log::trace!("QSPI write 0x{:02X}: {:02X?}", opcode, data);
        self.transport.write_command(opcode, data)?;
        Ok(())
    }

    /// Sends `command` with no data.
    fn command<C: Into<u8>>(&mut self, command: C) -> Result<()> {
        let opcode = command.into();
        log::trace!("QSPI command 0x{:02X}", opcode);
        self.transport.run_command(opcode)?;
        Ok(())
    }

    fn check_initialized(&self) -> Result<&'static FlashDevice> {
        match self.device {
            Some(device) => Ok(device),
            None => {
                log::warn!("Flash used before successful initialization");
                Err(Error::NotInitialized)
            }
        }
    }

    /// Checks the flash is initialized and that `length` bytes starting
    /// at `address` lie within it.
    fn check_address_length(&self, address: u32, length: usize) -> Result<()> {
        self.check_initialized()?;
        log::trace!("Checking address={:08X} length={}", address, length);
        let end = address as u64 + length as u64;
        if address >= self.total_size || end > self.total_size as u64 {
            log::error!("Operation would exceed flash capacity");
            let address = if address >= self.total_size { address } else { self.total_size };
            Err(Error::InvalidAddress { address })
        } else {
            Ok(())
        }
    }

    /// Base address of erase unit `n` of `size` bytes, if within the flash.
    fn erase_address(&self, n: u32, size: u32) -> Result<u32> {
        self.check_initialized()?;
        match n.checked_mul(size) {
            Some(address) if address < self.total_size => Ok(address),
            _ => {
                log::error!("Erase unit {} of {} bytes is beyond flash capacity", n, size);
                Err(Error::InvalidAddress { address: n.wrapping_mul(size) })
            }
        }
    }
}

/// QSPI flash command opcodes used by this driver.
///
/// These are common to all parts in the catalog.
#[derive(Copy, Clone, Debug, num_enum::IntoPrimitive)]
#[repr(u8)]
enum Command {
    WriteEnable = 0x06,
    WriteDisable = 0x04,
    ReadStatusRegister1 = 0x05,
    ReadStatusRegister2 = 0x35,
    WriteStatusRegister1 = 0x01,
    WriteStatusRegister2 = 0x31,
    ReadJEDECID = 0x9F,
    EnableReset = 0x66,
    Reset = 0x99,
    ChipErase = 0xC7,
    BlockErase64 = 0xD8,
}
