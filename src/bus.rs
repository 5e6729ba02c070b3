//! Collaborator interfaces: the command bus and the TWI bootloader.
//!
//! The driver owns exactly one [`BusProxy`] and lends it to the
//! [`Bootloader`] for each call, so both talk over the same transport
//! without any internal locking.

use crate::address::BusAddress;
use crate::error::Result;
use log::trace;

/// Request/response access to the shared command bus.
///
/// Implementations report "nothing answered" (NACK, timeout, dead bus) as
/// an `Err`. A device that answers without a payload yields `Ok(None)`.
pub trait BusProxy {
    /// Writes `bytes` to `address` without reading anything back.
    fn write(&mut self, address: BusAddress, bytes: &[u8]) -> Result<()>;

    /// Writes `bytes` to `address` and collects the device's length-prefixed response.
    fn send(&mut self, address: BusAddress, bytes: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Reads `len` raw bytes from `address`, with no length prefix.
    ///
    /// Used for the emulated port registers, which answer with the bare
    /// register byte.
    fn read(&mut self, address: BusAddress, len: usize) -> Result<Vec<u8>>;

    /// Lists the addresses currently acknowledging on the bus.
    fn scan(&mut self) -> Result<Vec<BusAddress>>;
}

impl<T: BusProxy + ?Sized> BusProxy for &mut T {
    fn write(&mut self, address: BusAddress, bytes: &[u8]) -> Result<()> {
        (**self).write(address, bytes)
    }

    fn send(&mut self, address: BusAddress, bytes: &[u8]) -> Result<Option<Vec<u8>>> {
        (**self).send(address, bytes)
    }

    fn read(&mut self, address: BusAddress, len: usize) -> Result<Vec<u8>> {
        (**self).read(address, len)
    }

    fn scan(&mut self) -> Result<Vec<BusAddress>> {
        (**self).scan()
    }
}

/// The board's TWI bootloader, reached at its own fixed address.
///
/// Only meaningful while the board is held in recovery; see
/// [`RecoverySession`](crate::recovery::RecoverySession).
pub trait Bootloader {
    /// Address the bootloader listens on (usually [`BusAddress::BOOTLOADER_DEFAULT`]).
    fn address(&self) -> BusAddress;

    /// Reads `size` bytes of persistent memory starting at `offset`.
    fn read_persistent(
        &mut self,
        bus: &mut dyn BusProxy,
        offset: u16,
        size: usize,
    ) -> Result<Vec<u8>>;

    /// Writes `bytes` to persistent memory starting at `offset`.
    fn write_persistent(&mut self, bus: &mut dyn BusProxy, offset: u16, bytes: &[u8])
        -> Result<()>;

    /// Cancels the bootloader's countdown to starting the application.
    fn abort_boot_timeout(&mut self, bus: &mut dyn BusProxy) -> Result<()>;

    /// Leaves the bootloader and starts the application image.
    fn start_application(&mut self, bus: &mut dyn BusProxy) -> Result<()>;
}

/// Serialization buffer for one board command: `[command, payload...]`.
#[derive(Debug, Clone, Default)]
pub struct CommandBuffer {
    payload: Vec<u8>,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one byte to the payload.
    pub fn serialize_u8(&mut self, value: u8) -> &mut Self {
        self.payload.push(value);
        self
    }

    /// Appends bytes to the payload.
    pub fn serialize_bytes(&mut self, values: &[u8]) -> &mut Self {
        self.payload.extend_from_slice(values);
        self
    }

    /// Number of payload bytes queued.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Builds the wire message for `command`, leaving the buffer empty.
    pub fn take_message(&mut self, command: u8) -> Vec<u8> {
        let mut message = Vec::with_capacity(1 + self.payload.len());
        message.push(command);
        message.append(&mut self.payload);
        trace!("Command 0x{:02X} message: {:02X?}", command, message);
        message
    }
}
