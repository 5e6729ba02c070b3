//! # hv-switching-board
//!
//! A Rust crate for driving high-voltage switching boards: I²C-attached
//! output boards built from a chain of 8-bit shift registers, with a
//! persistent configuration record and a TWI bootloader for field recovery.
//!
//! ## Features
//!
//! *   Channel control:
//!     *   All channels at once (`set_channel_states`, `get_channel_states`).
//!     *   Single shift registers and register ranges (`set_port_states`, `port_states`, `set_port_range`).
//!     *   Single channels (`set_channel`).
//! *   Geometry discovery (`get_shift_register_count`, `detect_shift_register_count`).
//! *   Bus address changes through the bootloader (`set_bus_address`, `set_bus_address_verified`).
//! *   Factory reset (`reset_config`).
//! *   A reboot-into-recovery handshake with an injectable sleeper and a `CancelToken`.
//! *   A ready-made transport over XR2280x USB-HID I²C bridges (`hid` feature, on by default).
//!
//! ## Wire Format
//!
//! Channel `i` is bit `i % 8` of register `i / 8`. Registers go out in
//! ascending order and every byte is **active-low**: the complement of the
//! logical states. A stock board has 5 registers (40 channels).
//!
//! ```
//! use hv_switching_board::{ChannelStateCodec, ShiftRegisterCount};
//!
//! let codec = ChannelStateCodec::new(ShiftRegisterCount::default());
//! let mut state = vec![false; 40];
//! state[8] = true;
//! assert_eq!(codec.encode(&state)?, vec![0xFF, 0xFE, 0xFF, 0xFF, 0xFF]);
//! # Ok::<(), hv_switching_board::Error>(())
//! ```
//!
//! ## Basic Usage
//!
//! ```no_run
//! use hidapi::HidApi;
//! use hv_switching_board::{hid::Xr2280xBus, BusAddress, Result, SwitchingBoard};
//!
//! fn main() -> Result<()> {
//!     let hid_api = HidApi::new()?;
//!     let bus = Xr2280xBus::open_first(&hid_api)?;
//!     bus.set_speed_khz(100)?;
//!
//!     let mut board = SwitchingBoard::new(bus, BusAddress::new(10)?);
//!     board.detect_shift_register_count()?;
//!
//!     let mut state = vec![false; board.channel_count()];
//!     state[0] = true;
//!     board.set_channel_states(&state)?;
//!     assert_eq!(board.get_channel_states()?, state);
//!     Ok(())
//! }
//! ```
//!
//! ## Changing the Bus Address
//!
//! The address lives in the persistent config record, which is only
//! writable through the bootloader. `set_bus_address` reboots the board,
//! waits for the bootloader to appear at its own address (0x29 by default),
//! stops its boot countdown, rewrites the record and restarts the
//! application. The bootloader itself is a collaborator you supply through
//! the [`Bootloader`] trait.
//!
//! **Warning:** `set_bus_address` adopts the new address before the board
//! has finished restarting. Use `set_bus_address_verified` to wait until the
//! board answers at the new address.

mod address;
mod board;
mod bus;
mod codec;
mod config;
mod consts;
mod error;
#[cfg(feature = "hid")]
pub mod hid;
pub mod recovery;

pub use address::{BusAddress, ShiftRegisterCount};
pub use board::{BoardOptions, SwitchingBoard};
pub use bus::{Bootloader, BusProxy, CommandBuffer};
pub use codec::ChannelStateCodec;
pub use config::{ConfigLayout, ConfigStore, DeviceConfig};
pub use error::{Error, Result};
pub use recovery::{
    CancelToken, RecoveryController, RecoveryOptions, RecoverySession, RecoveryState, Sleeper,
    ThreadSleeper,
};

/// Protocol constants for callers implementing their own transports or bootloaders.
pub mod protocol {
    pub use crate::consts::{
        CMD_GET_SHIFT_REGISTER_COUNT, CMD_GET_STATE_OF_ALL_CHANNELS, CMD_REBOOT,
        CMD_RESET_CONFIG, CMD_SET_STATE_OF_ALL_CHANNELS, DEFAULT_BOOTLOADER_ADDRESS,
        DEFAULT_SHIFT_REGISTER_COUNT, FACTORY_BUS_ADDRESS,
    };
    /// Emulated output-port register commands.
    pub mod port {
        pub use crate::consts::port::{AUTO_INCREMENT, MAX_PORTS, OUTPUT_PORT_REGISTER};
    }
    #[cfg(feature = "hid")]
    pub use crate::consts::xr2280x::{EXAR_VID, I2C_PID as XR2280X_I2C_PID};
}
