//! Internal constants: command bytes, protocol defaults and bridge registers.

use std::time::Duration;

// --- Switching board command bytes ---
/// Write all channel states (payload: one active-low byte per shift register).
pub const CMD_SET_STATE_OF_ALL_CHANNELS: u8 = 0xA0;
/// Read all channel states (response: one active-low byte per shift register).
pub const CMD_GET_STATE_OF_ALL_CHANNELS: u8 = 0xA1;
/// Reboot the board; the bootloader comes up at its own address.
pub const CMD_REBOOT: u8 = 0xA2;
/// Restore the factory configuration (resets the bus address).
pub const CMD_RESET_CONFIG: u8 = 0xA3;
/// Query the number of shift registers fitted (absent on older firmware).
pub const CMD_GET_SHIFT_REGISTER_COUNT: u8 = 0xA6;

// Emulated PCA9505 output-port registers: 0x08 + port.
pub mod port {
    pub const OUTPUT_PORT_REGISTER: u8 = 0x08;
    /// Registers above 0x17 belong to the emulated config-IO block.
    pub const MAX_PORTS: u8 = 16;
    /// Set on the command byte to write consecutive registers in one transfer.
    pub const AUTO_INCREMENT: u8 = 1 << 7;
}

// --- Defaults ---
/// Bus address the board answers to after `reset_config`.
pub const FACTORY_BUS_ADDRESS: u8 = 10;
/// Bus address of the TWI bootloader.
pub const DEFAULT_BOOTLOADER_ADDRESS: u8 = 0x29;
/// Shift registers on a stock board, also reported for firmware lacking the count query.
pub const DEFAULT_SHIFT_REGISTER_COUNT: u8 = 5;
pub const CHANNELS_PER_REGISTER: usize = 8;

pub const RECOVERY_POLL_INTERVAL: Duration = Duration::from_millis(5);
pub const RECOVERY_MAX_ATTEMPTS: u32 = 2000;

// Persistent config record (layout owned by the base firmware).
pub const CONFIG_RECORD_OFFSET: u16 = 0;
pub const CONFIG_RECORD_SIZE: usize = 28;
pub const CONFIG_ADDRESS_OFFSET: usize = 10;

// --- XR2280x USB-HID I2C bridge ---
#[cfg(feature = "hid")]
pub mod xr2280x {
    /// Exar Corporation vendor ID.
    pub const EXAR_VID: u16 = 0x04E2;
    /// Product ID of the I2C HID interface (common for XR22800/1/2/4).
    pub const I2C_PID: u16 = 0x1100;

    pub const REPORT_ID_WRITE_HID_REGISTER: u8 = 0x3C;

    pub const REG_SCL_LOW: u16 = 0x0341;
    pub const REG_SCL_HIGH: u16 = 0x0342;

    /// SCL timing is counted in cycles of the bridge's 60 MHz core clock.
    pub const CORE_CLOCK_KHZ: u32 = 60_000;
    pub const MAX_SPEED_KHZ: u32 = 400;
    /// Minimum (low, high) SCL cycles: 4.2 us / 4.0 us in standard mode.
    pub const STANDARD_MODE_MIN_SCL_CYCLES: (u32, u32) = (252, 240);
    /// Minimum (low, high) SCL cycles: 1.3 us / 0.6 us in fast mode.
    pub const FAST_MODE_MIN_SCL_CYCLES: (u32, u32) = (78, 36);

    pub const REPORT_MAX_DATA_SIZE: usize = 32;
    // Flags(1) + WrSize(1) + RdSize(1) + SlaveAddr(1) + Data(32)
    pub const OUT_REPORT_WRITE_BUF_SIZE: usize = 36;
    // Flags(1) + WrSize(1) + RdSize(1) + Reserved(1) + Data(32)
    pub const IN_REPORT_READ_BUF_SIZE: usize = 36;

    pub const DEFAULT_TIMEOUT_MS: i32 = 500;
    pub const SCAN_TIMEOUT_MS: i32 = 25;
    pub const SCAN_FIRST_ADDRESS: u8 = 0x08;
    pub const SCAN_LAST_ADDRESS: u8 = 0x77;

    pub mod out_flags {
        pub const START_BIT: u8 = 1 << 0;
        pub const STOP_BIT: u8 = 1 << 1;
    }

    pub mod in_flags {
        pub const REQUEST_ERROR: u8 = 1 << 0;
        pub const NAK_RECEIVED: u8 = 1 << 1;
        pub const ARBITRATION_LOST: u8 = 1 << 2;
        pub const TIMEOUT: u8 = 1 << 3;
    }
}
