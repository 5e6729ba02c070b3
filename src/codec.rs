//! Conversion between logical channel states and the active-low wire frame.
//!
//! Channel `i` lives in byte `i / 8`, bit `i % 8`. Bytes are ordered by
//! register index ascending. On the wire every byte is the complement of the
//! packed logical bits, so an inactive channel drives its bit high.

use crate::address::ShiftRegisterCount;
use crate::consts::CHANNELS_PER_REGISTER;
use crate::error::{Error, Result};

/// Packs and unpacks channel states for a board of a given geometry. No I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelStateCodec {
    registers: ShiftRegisterCount,
}

impl ChannelStateCodec {
    pub fn new(registers: ShiftRegisterCount) -> Self {
        Self { registers }
    }

    /// Number of shift registers (bytes per frame).
    pub fn register_count(&self) -> ShiftRegisterCount {
        self.registers
    }

    /// Number of channels a state vector must hold.
    pub fn channel_count(&self) -> usize {
        self.registers.channel_count()
    }

    /// Encodes a channel-state vector into its wire frame.
    ///
    /// Returns `Error::InvalidLength` unless `state.len()` equals the channel count.
    pub fn encode(&self, state: &[bool]) -> Result<Vec<u8>> {
        let expected = self.channel_count();
        if state.len() != expected {
            return Err(Error::InvalidLength {
                expected,
                actual: state.len(),
            });
        }
        Ok(state
            .chunks_exact(CHANNELS_PER_REGISTER)
            .map(|chunk| !pack_bits(chunk))
            .collect())
    }

    /// Decodes a wire frame back into the channel-state vector.
    ///
    /// Returns `Error::InvalidFrameLength` unless the frame holds one byte per register.
    pub fn decode(&self, frame: &[u8]) -> Result<Vec<bool>> {
        let expected = self.registers.get() as usize;
        if frame.len() != expected {
            return Err(Error::InvalidFrameLength {
                expected,
                actual: frame.len(),
            });
        }
        Ok(frame.iter().flat_map(|&byte| unpack_byte(byte)).collect())
    }
}

/// Packs up to 8 logical states, channel 0 in bit 0. Not inverted.
fn pack_bits(bits: &[bool]) -> u8 {
    bits.iter()
        .enumerate()
        .fold(0u8, |acc, (k, &on)| acc | ((on as u8) << k))
}

/// Encodes the 8 channels of a single register into its wire byte.
pub(crate) fn encode_register(states: &[bool; CHANNELS_PER_REGISTER]) -> u8 {
    !pack_bits(states)
}

/// Decodes a single wire byte into its 8 channel states.
pub(crate) fn unpack_byte(byte: u8) -> [bool; CHANNELS_PER_REGISTER] {
    std::array::from_fn(|k| byte & (1 << k) == 0)
}
