//! Scripted collaborators for exercising the driver without hardware.
#![allow(dead_code)]

use hv_switching_board::{Bootloader, BusAddress, BusProxy, Error, Result, Sleeper};
use std::cell::Cell;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn addr(raw: u8) -> BusAddress {
    BusAddress::new(raw).unwrap()
}

/// Bus whose scans report each scripted address from a given scan onwards.
///
/// Length-prefixed responses are scripted per command byte. Port register
/// commands (0x08..0x18, optionally with the auto-increment bit) behave like
/// the board firmware: writes update `registers` and every access answers
/// with one bare register byte, collected through `read`.
#[derive(Default)]
pub struct MockBus {
    /// `(address, first scan it answers on)`, scans counted from 1.
    pub appearances: Vec<(BusAddress, u32)>,
    pub responses: HashMap<u8, VecDeque<Result<Option<Vec<u8>>>>>,
    pub writes: Vec<(BusAddress, Vec<u8>)>,
    pub sends: Vec<(BusAddress, Vec<u8>)>,
    pub reads: Vec<(BusAddress, usize)>,
    /// Raw (active-low) output port registers.
    pub registers: Vec<u8>,
    /// Bytes waiting to be collected by the next `read`.
    pub pending: Vec<u8>,
    pub scans: u32,
    pub fail_writes: bool,
}

impl MockBus {
    /// A bus with a stock 5-register board whose channels are all off.
    pub fn new() -> Self {
        Self {
            registers: vec![0xFF; 5],
            ..Self::default()
        }
    }

    pub fn appearing_at(mut self, address: BusAddress, scan: u32) -> Self {
        self.appearances.push((address, scan));
        self
    }

    /// Queues the response to the next `send` of `command`.
    pub fn respond(mut self, command: u8, response: Result<Option<Vec<u8>>>) -> Self {
        self.responses.entry(command).or_default().push_back(response);
        self
    }

    pub fn with_registers(mut self, registers: &[u8]) -> Self {
        self.registers = registers.to_vec();
        self
    }

    fn access_register(&mut self, message: &[u8]) -> bool {
        let (command, payload) = match message.split_first() {
            Some(split) => split,
            None => return false,
        };
        let register = command & 0x3F;
        if !(0x08..0x18).contains(&register) {
            return false;
        }
        let port = (register - 0x08) as usize;
        // Registers past the fitted ones do not answer.
        if port + payload.len().max(1) > self.registers.len() {
            self.pending.clear();
            return true;
        }
        self.pending = match payload {
            [] => vec![self.registers[port]],
            bytes => {
                self.registers[port..port + bytes.len()].copy_from_slice(bytes);
                vec![self.registers[port + bytes.len() - 1]]
            }
        };
        true
    }
}

impl BusProxy for MockBus {
    fn write(&mut self, address: BusAddress, bytes: &[u8]) -> Result<()> {
        if self.fail_writes {
            return Err(Error::I2cNack { address });
        }
        self.writes.push((address, bytes.to_vec()));
        if !self.access_register(bytes) {
            self.pending.clear();
        }
        Ok(())
    }

    fn send(&mut self, address: BusAddress, bytes: &[u8]) -> Result<Option<Vec<u8>>> {
        self.sends.push((address, bytes.to_vec()));
        bytes
            .first()
            .and_then(|command| self.responses.get_mut(command))
            .and_then(|queue| queue.pop_front())
            .unwrap_or(Ok(None))
    }

    fn read(&mut self, address: BusAddress, len: usize) -> Result<Vec<u8>> {
        self.reads.push((address, len));
        let len = len.min(self.pending.len());
        Ok(self.pending.drain(..len).collect())
    }

    fn scan(&mut self) -> Result<Vec<BusAddress>> {
        self.scans += 1;
        Ok(self
            .appearances
            .iter()
            .filter(|(_, from)| *from <= self.scans)
            .map(|(address, _)| *address)
            .collect())
    }
}

/// Bootloader backed by an in-memory EEPROM that records its calls in order.
pub struct MockBootloader {
    pub address: BusAddress,
    pub eeprom: Vec<u8>,
    pub calls: Vec<&'static str>,
    /// Serve only this many bytes from reads.
    pub short_read: Option<usize>,
    pub fail_write: bool,
}

impl MockBootloader {
    /// A bootloader at 0x29 whose 28-byte record stores `stored_address` at offset 10.
    pub fn new(stored_address: u8) -> Self {
        let mut eeprom: Vec<u8> = (0..32).map(|i| 0xA0 ^ i).collect();
        eeprom[10] = stored_address;
        Self {
            address: BusAddress::BOOTLOADER_DEFAULT,
            eeprom,
            calls: Vec::new(),
            short_read: None,
            fail_write: false,
        }
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.iter().filter(|c| **c == call).count()
    }
}

impl Bootloader for MockBootloader {
    fn address(&self) -> BusAddress {
        self.address
    }

    fn read_persistent(
        &mut self,
        _bus: &mut dyn BusProxy,
        offset: u16,
        size: usize,
    ) -> Result<Vec<u8>> {
        self.calls.push("read");
        let start = offset as usize;
        let len = self.short_read.unwrap_or(size).min(size);
        Ok(self.eeprom[start..start + len].to_vec())
    }

    fn write_persistent(&mut self, _bus: &mut dyn BusProxy, offset: u16, bytes: &[u8]) -> Result<()> {
        self.calls.push("write");
        if self.fail_write {
            return Err(Error::Transport("EEPROM write rejected".to_string()));
        }
        let start = offset as usize;
        self.eeprom[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn abort_boot_timeout(&mut self, _bus: &mut dyn BusProxy) -> Result<()> {
        self.calls.push("abort");
        Ok(())
    }

    fn start_application(&mut self, _bus: &mut dyn BusProxy) -> Result<()> {
        self.calls.push("start");
        Ok(())
    }
}

/// Records sleeps instead of blocking.
#[derive(Default)]
pub struct CountingSleeper {
    pub sleeps: Cell<u32>,
    pub total: Cell<Duration>,
}

impl Sleeper for CountingSleeper {
    fn sleep(&self, duration: Duration) {
        self.sleeps.set(self.sleeps.get() + 1);
        self.total.set(self.total.get() + duration);
    }
}
