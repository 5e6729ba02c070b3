//! [`BusProxy`] over a MaxLinear/Exar XR2280x USB-HID I2C bridge.
//!
//! Most board responses use the base firmware's framing: after a command the
//! host reads one length byte, then that many payload bytes. The emulated
//! port registers skip the prefix and are read with [`BusProxy::read`].

use crate::address::BusAddress;
use crate::bus::BusProxy;
use crate::consts::xr2280x as consts;
use crate::error::{Error, Result};
use hidapi::{HidApi, HidDevice};
use log::{debug, trace, warn};
use std::ffi::CStr;

/// The I2C interface of an XR2280x bridge, used as the board's command bus.
/// **Note:** Not thread-safe; one bus handle per bridge.
pub struct Xr2280xBus {
    device: HidDevice,
    timeout_ms: i32,
}

impl std::fmt::Debug for Xr2280xBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Xr2280xBus")
            .field("timeout_ms", &self.timeout_ms)
            .finish_non_exhaustive()
    }
}

impl Xr2280xBus {
    /// Opens the first bridge with the default Exar VID and I2C PID.
    /// **Warning:** Ambiguous if multiple bridges are connected.
    pub fn open_first(hid_api: &HidApi) -> Result<Self> {
        Self::open_by_vid_pid(hid_api, consts::EXAR_VID, consts::I2C_PID)
    }

    /// Opens a bridge by Vendor ID and Product ID.
    pub fn open_by_vid_pid(hid_api: &HidApi, vid: u16, pid: u16) -> Result<Self> {
        let device = hid_api.open(vid, pid)?;
        debug!("Opened XR2280x I2C bridge: VID={:04X}, PID={:04X}", vid, pid);
        Ok(Self::from_device(device))
    }

    /// Opens a bridge by its platform-specific HID path.
    pub fn open_by_path(hid_api: &HidApi, path: &CStr) -> Result<Self> {
        let device = hid_api.open_path(path)?;
        debug!("Opened XR2280x I2C bridge at {:?}", path);
        Ok(Self::from_device(device))
    }

    /// Wraps an already opened I2C HID interface.
    pub fn from_device(device: HidDevice) -> Self {
        Self {
            device,
            timeout_ms: consts::DEFAULT_TIMEOUT_MS,
        }
    }

    /// Sets the response timeout used for board commands.
    pub fn set_timeout_ms(&mut self, timeout_ms: i32) {
        self.timeout_ms = timeout_ms;
    }

    /// Sets the I2C bus speed (approximated). Max supported is 400 kHz.
    pub fn set_speed_khz(&self, speed_khz: u32) -> Result<()> {
        let (scl_low, scl_high) = scl_cycles(speed_khz)?;
        debug!(
            "Setting I2C speed ~{}kHz: SCL_LOW=0x{:04X}, SCL_HIGH=0x{:04X}",
            speed_khz, scl_low, scl_high
        );
        self.write_hid_register(consts::REG_SCL_LOW, scl_low)?;
        self.write_hid_register(consts::REG_SCL_HIGH, scl_high)
    }

    fn write_hid_register(&self, reg_addr: u16, value: u16) -> Result<()> {
        let [reg_lo, reg_hi] = reg_addr.to_le_bytes();
        let [val_lo, val_hi] = value.to_le_bytes();
        let buf = [
            consts::REPORT_ID_WRITE_HID_REGISTER,
            reg_lo,
            reg_hi,
            val_lo,
            val_hi,
        ];
        trace!("Write Reg {:04X} = {:04X}: {:02X?}", reg_addr, value, buf);
        self.device.send_feature_report(&buf)?;
        Ok(())
    }

    // One START..STOP transaction: optional write, then optional read.
    fn transfer(
        &self,
        address: BusAddress,
        write_data: &[u8],
        read_buffer: Option<&mut [u8]>,
        timeout_ms: i32,
    ) -> Result<()> {
        let write_len = write_data.len();
        let read_len = read_buffer.as_ref().map_or(0, |b| b.len());
        for len in [write_len, read_len] {
            if len > consts::REPORT_MAX_DATA_SIZE {
                return Err(Error::OperationTooLarge {
                    max: consts::REPORT_MAX_DATA_SIZE,
                    actual: len,
                });
            }
        }

        let mut out_buf = [0u8; consts::OUT_REPORT_WRITE_BUF_SIZE];
        out_buf[0] = consts::out_flags::START_BIT | consts::out_flags::STOP_BIT;
        out_buf[1] = write_len as u8;
        out_buf[2] = read_len as u8;
        // 7-bit address in bits 7:1, R/W bit filled in by the bridge
        out_buf[3] = address.value() << 1;
        out_buf[4..4 + write_len].copy_from_slice(write_data);
        trace!(
            "I2C transfer to {}: write {:02X?}, read {} bytes",
            address,
            write_data,
            read_len
        );

        let written = self.device.write(&out_buf)?;
        if written != out_buf.len() {
            warn!("Partial write: sent {} of {} bytes", written, out_buf.len());
            return Err(Error::Io(std::io::Error::other("Partial HID write")));
        }

        let mut in_buf = [0u8; consts::IN_REPORT_READ_BUF_SIZE];
        let received = self.device.read_timeout(&mut in_buf, timeout_ms)?;
        if received < 4 {
            return Err(Error::InvalidReport(received));
        }
        let status = in_buf[0];
        if status & consts::in_flags::REQUEST_ERROR != 0 {
            return Err(Error::I2cRequestError { address });
        }
        if status & consts::in_flags::NAK_RECEIVED != 0 {
            return Err(Error::I2cNack { address });
        }
        if status & consts::in_flags::ARBITRATION_LOST != 0 {
            return Err(Error::I2cArbitrationLost { address });
        }
        if status & consts::in_flags::TIMEOUT != 0 {
            return Err(Error::I2cTimeout { address });
        }
        if status & 0x0F != 0 {
            return Err(Error::I2cUnknownError {
                address,
                flags: status,
            });
        }

        if let Some(read_buf) = read_buffer {
            let reported = in_buf[2] as usize;
            if reported != read_len {
                warn!("I2C read length mismatch: expected {}, got {}", read_len, reported);
            }
            let actual = reported.min(read_len).min(received - 4);
            read_buf[..actual].copy_from_slice(&in_buf[4..4 + actual]);
        }
        Ok(())
    }
}

/// Splits one SCL period at `speed_khz` into (low, high) core-clock cycles,
/// padded to the I2C minimums for the speed class.
fn scl_cycles(speed_khz: u32) -> Result<(u16, u16)> {
    if speed_khz == 0 || speed_khz > consts::MAX_SPEED_KHZ {
        return Err(Error::ArgumentOutOfRange(format!(
            "I2C speed {} kHz out of range (1-{})",
            speed_khz,
            consts::MAX_SPEED_KHZ
        )));
    }
    let period = consts::CORE_CLOCK_KHZ / speed_khz;
    let (min_low, min_high) = if speed_khz <= 100 {
        consts::STANDARD_MODE_MIN_SCL_CYCLES
    } else {
        consts::FAST_MODE_MIN_SCL_CYCLES
    };
    // period <= 60_000, so both halves fit in u16
    let low = (period / 2).max(min_low) as u16;
    let high = (period - period / 2).max(min_high) as u16;
    Ok((low, high))
}

impl BusProxy for Xr2280xBus {
    fn write(&mut self, address: BusAddress, bytes: &[u8]) -> Result<()> {
        self.transfer(address, bytes, None, self.timeout_ms)
    }

    fn send(&mut self, address: BusAddress, bytes: &[u8]) -> Result<Option<Vec<u8>>> {
        self.transfer(address, bytes, None, self.timeout_ms)?;

        let length = self.read(address, 1)?[0];
        if length == 0 {
            return Ok(None);
        }
        self.read(address, length as usize).map(Some)
    }

    fn read(&mut self, address: BusAddress, len: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; len];
        self.transfer(address, &[], Some(&mut buffer), self.timeout_ms)?;
        Ok(buffer)
    }

    fn scan(&mut self) -> Result<Vec<BusAddress>> {
        let mut found = Vec::new();
        for raw in consts::SCAN_FIRST_ADDRESS..=consts::SCAN_LAST_ADDRESS {
            let address = BusAddress::new(raw)?;
            match self.transfer(address, &[], None, consts::SCAN_TIMEOUT_MS) {
                Ok(()) => found.push(address),
                Err(e) if e.is_no_response() => {}
                Err(e) => debug!("Error scanning address {}: {}", address, e),
            }
        }
        trace!("Scan found {:?}", found);
        Ok(found)
    }
}
