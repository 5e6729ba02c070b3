use crate::address::BusAddress;
use thiserror::Error;

/// Errors that can occur when driving a switching board.
///
/// Every failure is scoped to the operation that returned it; nothing in
/// this crate retries on its own.
#[derive(Error, Debug)]
pub enum Error {
    /// Channel-state vector does not match the board geometry.
    #[error("Channel state has {actual} entries, expected {expected} (shift registers x 8)")]
    InvalidLength {
        /// Required number of channels.
        expected: usize,
        /// Number of channels supplied.
        actual: usize,
    },
    /// Wire frame does not hold one byte per shift register.
    #[error("Wire frame has {actual} bytes, expected {expected}")]
    InvalidFrameLength {
        /// Number of shift registers.
        expected: usize,
        /// Bytes supplied.
        actual: usize,
    },
    /// The board answered a command with fewer bytes than the command returns.
    #[error("Short response to command 0x{command:02X}: expected {expected} bytes, got {actual}")]
    ShortResponse {
        /// Command byte that was sent.
        command: u8,
        /// Bytes required.
        expected: usize,
        /// Bytes received (0 when the response was absent).
        actual: usize,
    },
    /// Bootloader returned less than a full configuration record.
    #[error("Config read returned {actual} bytes, record is {expected} bytes")]
    ConfigRead {
        /// Record size.
        expected: usize,
        /// Bytes returned by the bootloader.
        actual: usize,
    },
    /// Bootloader rejected the configuration write. Device config is indeterminate.
    #[error("Config write at offset {offset} failed: {source}")]
    ConfigWrite {
        /// EEPROM offset of the write.
        offset: u16,
        /// Failure reported by the bootloader.
        #[source]
        source: Box<Error>,
    },
    /// The bootloader never showed up on the bus after the reboot command.
    #[error(
        "Bootloader did not appear at {address} after {attempts} scans; the board was not held in recovery"
    )]
    RecoveryTimeout {
        /// Bootloader address that was polled for.
        address: BusAddress,
        /// Number of scans performed.
        attempts: u32,
    },
    /// A recovery or address confirmation wait was cancelled through its `CancelToken`.
    #[error("Bus wait cancelled after {attempts} scans")]
    RecoveryCancelled {
        /// Scans performed by the wait that was cancelled.
        attempts: u32,
    },
    /// The shift-register count query failed on the bus, as opposed to being
    /// unsupported by older firmware.
    #[error("Shift register count query to {address} got no answer: {source}")]
    DegradedQuery {
        /// Board address queried.
        address: BusAddress,
        /// Underlying transport failure.
        #[source]
        source: Box<Error>,
    },
    /// After an address change the board never answered at its new address.
    #[error("Board did not answer at new address {address} after {attempts} scans")]
    AddressNotConfirmed {
        /// Address that was written to the board configuration.
        address: BusAddress,
        /// Number of scans performed.
        attempts: u32,
    },
    /// Function argument is outside the valid range.
    #[error("Argument out of range: {0}")]
    ArgumentOutOfRange(String),
    /// Output port index beyond the fitted shift registers.
    #[error("Port {port} out of range (board has {count} shift registers)")]
    PortOutOfRange {
        /// Requested port.
        port: u8,
        /// Number of shift registers.
        count: u8,
    },
    /// Channel index beyond the board's channel count.
    #[error("Channel {channel} out of range (board has {count} channels)")]
    ChannelOutOfRange {
        /// Requested channel.
        channel: usize,
        /// Number of channels.
        count: usize,
    },
    /// Failure reported by a caller-supplied transport.
    #[error("Transport error: {0}")]
    Transport(String),
    /// Error from the underlying HID API layer.
    #[cfg(feature = "hid")]
    #[error("HID API error: {0}")]
    Hid(#[from] hidapi::HidError),
    /// General I/O error during device communication.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Invalid or malformed HID report received from the bridge.
    #[error("Invalid HID report received or unexpected size ({0} bytes)")]
    InvalidReport(usize),
    /// Nothing acknowledged at the address.
    #[error("No device acknowledged at I2C address {address} (NACK)")]
    I2cNack {
        /// Address that was not acknowledged.
        address: BusAddress,
    },
    /// I2C arbitration lost to another master.
    #[error("I2C arbitration lost while addressing {address}")]
    I2cArbitrationLost {
        /// Address being accessed.
        address: BusAddress,
    },
    /// The bridge timed out on the bus (stuck bus or unpowered device).
    #[error("I2C timeout at address {address}: device did not respond within timeout period")]
    I2cTimeout {
        /// Address being accessed.
        address: BusAddress,
    },
    /// The bridge firmware rejected the transfer parameters.
    #[error("I2C request error at address {address}: invalid parameters sent to bridge")]
    I2cRequestError {
        /// Address being accessed.
        address: BusAddress,
    },
    /// The bridge reported an undocumented status.
    #[error("I2C unknown error at address {address} (status: 0x{flags:02X})")]
    I2cUnknownError {
        /// Address being accessed.
        address: BusAddress,
        /// Raw status flags from the bridge.
        flags: u8,
    },
    /// Requested transfer exceeds the bridge's report size.
    #[error("Requested operation size is too large (max {max}, got {actual})")]
    OperationTooLarge {
        /// Maximum allowed size.
        max: usize,
        /// Size requested.
        actual: usize,
    },
}

/// Result type alias for switching board operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for errors meaning "nothing answered at that address".
    pub fn is_no_response(&self) -> bool {
        matches!(self, Error::I2cNack { .. } | Error::I2cTimeout { .. })
    }
}
