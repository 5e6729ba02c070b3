//! Strongly-typed bus address and board geometry.

use crate::consts;
use crate::error::{Error, Result};
use std::fmt;

/// A 7-bit address on the command bus (0x00 - 0x7F).
/// Use `BusAddress::new(addr)` to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BusAddress(u8);

impl BusAddress {
    /// Creates an address, checking validity (0-127).
    pub fn new(addr: u8) -> Result<Self> {
        if addr <= 0x7F {
            Ok(BusAddress(addr))
        } else {
            Err(Error::ArgumentOutOfRange(format!(
                "bus address 0x{:02X} is not a 7-bit address (0-127)",
                addr
            )))
        }
    }

    /// Address the board answers to after a configuration reset.
    pub const FACTORY_DEFAULT: BusAddress = BusAddress(consts::FACTORY_BUS_ADDRESS);

    /// Default address of the TWI bootloader.
    pub const BOOTLOADER_DEFAULT: BusAddress = BusAddress(consts::DEFAULT_BOOTLOADER_ADDRESS);

    /// Returns the raw 7-bit value.
    #[inline]
    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for BusAddress {
    type Error = Error;

    fn try_from(addr: u8) -> Result<Self> {
        BusAddress::new(addr)
    }
}

impl fmt::Display for BusAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

/// Number of 8-bit shift registers fitted to a board. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShiftRegisterCount(u8);

impl ShiftRegisterCount {
    /// Creates a register count, rejecting zero.
    pub fn new(count: u8) -> Result<Self> {
        if count == 0 {
            return Err(Error::ArgumentOutOfRange(
                "shift register count must be positive".to_string(),
            ));
        }
        Ok(ShiftRegisterCount(count))
    }

    /// Number of shift registers, which is also the wire frame length.
    #[inline]
    pub fn get(&self) -> u8 {
        self.0
    }

    /// Number of logical channels (`registers * 8`).
    #[inline]
    pub fn channel_count(&self) -> usize {
        self.0 as usize * consts::CHANNELS_PER_REGISTER
    }
}

impl Default for ShiftRegisterCount {
    fn default() -> Self {
        ShiftRegisterCount(consts::DEFAULT_SHIFT_REGISTER_COUNT)
    }
}

impl fmt::Display for ShiftRegisterCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
