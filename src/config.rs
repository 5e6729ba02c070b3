//! Persistent device configuration, read and written through the bootloader.

use crate::address::BusAddress;
use crate::bus::{Bootloader, BusProxy};
use crate::consts;
use crate::error::{Error, Result};
use log::{debug, trace};

/// Size of the persistent config record and where its bus-address byte sits.
///
/// The record layout belongs to the base firmware; only the address byte is
/// interpreted here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigLayout {
    size: usize,
    address_offset: usize,
}

impl ConfigLayout {
    /// Creates a layout, checking the address byte falls inside the record.
    pub fn new(size: usize, address_offset: usize) -> Result<Self> {
        if address_offset >= size {
            return Err(Error::ArgumentOutOfRange(format!(
                "address offset {} outside config record of {} bytes",
                address_offset, size
            )));
        }
        Ok(Self {
            size,
            address_offset,
        })
    }

    /// Record size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Byte offset of the bus address within the record.
    pub fn address_offset(&self) -> usize {
        self.address_offset
    }
}

impl Default for ConfigLayout {
    fn default() -> Self {
        Self {
            size: consts::CONFIG_RECORD_SIZE,
            address_offset: consts::CONFIG_ADDRESS_OFFSET,
        }
    }
}

/// A copy of the board's persistent configuration record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    layout: ConfigLayout,
    bytes: Vec<u8>,
}

impl DeviceConfig {
    /// Interprets raw EEPROM bytes as a record. Extra trailing bytes are ignored.
    pub fn from_bytes(layout: ConfigLayout, bytes: &[u8]) -> Result<Self> {
        if bytes.len() < layout.size {
            return Err(Error::ConfigRead {
                expected: layout.size,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            layout,
            bytes: bytes[..layout.size].to_vec(),
        })
    }

    /// Raw address byte as stored. May be outside the 7-bit range on a blank EEPROM.
    pub fn bus_address(&self) -> u8 {
        self.bytes[self.layout.address_offset]
    }

    /// Returns a copy of this record with only the bus address changed.
    pub fn with_bus_address(&self, address: BusAddress) -> DeviceConfig {
        let mut config = self.clone();
        config.bytes[self.layout.address_offset] = address.value();
        config
    }

    pub fn layout(&self) -> ConfigLayout {
        self.layout
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Read/write access to the config record.
///
/// Only handed out by a held [`RecoverySession`](crate::recovery::RecoverySession):
/// a write outside recovery has no way to be made safe.
pub struct ConfigStore<'a> {
    bus: &'a mut dyn BusProxy,
    bootloader: &'a mut dyn Bootloader,
    layout: ConfigLayout,
}

impl<'a> ConfigStore<'a> {
    pub(crate) fn new(
        bus: &'a mut dyn BusProxy,
        bootloader: &'a mut dyn Bootloader,
        layout: ConfigLayout,
    ) -> Self {
        Self {
            bus,
            bootloader,
            layout,
        }
    }

    /// Reads the full record from offset 0.
    pub fn read(&mut self) -> Result<DeviceConfig> {
        let bytes = self.bootloader.read_persistent(
            &mut *self.bus,
            consts::CONFIG_RECORD_OFFSET,
            self.layout.size,
        )?;
        trace!("Config record: {:02X?}", bytes);
        let config = DeviceConfig::from_bytes(self.layout, &bytes)?;
        debug!(
            "Read config record ({} bytes), stored bus address 0x{:02X}",
            self.layout.size,
            config.bus_address()
        );
        Ok(config)
    }

    /// Writes the full record back to offset 0. No partial-write recovery.
    pub fn write(&mut self, config: &DeviceConfig) -> Result<()> {
        let offset = consts::CONFIG_RECORD_OFFSET;
        debug!(
            "Writing config record ({} bytes), bus address 0x{:02X}",
            config.as_bytes().len(),
            config.bus_address()
        );
        self.bootloader
            .write_persistent(&mut *self.bus, offset, config.as_bytes())
            .map_err(|e| Error::ConfigWrite {
                offset,
                source: Box::new(e),
            })
    }

    /// Reads the record, changes the bus address, and writes it back.
    pub fn update_bus_address(&mut self, address: BusAddress) -> Result<DeviceConfig> {
        let config = self.read()?.with_bus_address(address);
        self.write(&config)?;
        Ok(config)
    }
}
