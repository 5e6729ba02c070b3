//! The switching board driver: command dispatch and address-change orchestration.

use crate::address::{BusAddress, ShiftRegisterCount};
use crate::bus::{Bootloader, BusProxy, CommandBuffer};
use crate::codec::{self, ChannelStateCodec};
use crate::config::{ConfigLayout, DeviceConfig};
use crate::consts::{self, CHANNELS_PER_REGISTER};
use crate::error::{Error, Result};
use crate::recovery::{
    CancelToken, RecoveryController, RecoveryOptions, RecoverySession, Sleeper, ThreadSleeper,
};
use log::{debug, trace, warn};

/// Per-board settings. `Default` matches a stock 40-channel board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoardOptions {
    /// Shift registers fitted; sets the channel count and frame length.
    pub shift_register_count: ShiftRegisterCount,
    /// Poll budget for the reboot-into-recovery handshake.
    pub recovery: RecoveryOptions,
    /// Layout of the persistent config record.
    pub config_layout: ConfigLayout,
}

/// A handle to one high-voltage switching board on a command bus.
///
/// All operations block the calling thread until done. The handle assumes it
/// is the only user of `bus`; share a bus between boards by serializing calls.
#[derive(Debug)]
pub struct SwitchingBoard<B: BusProxy, S: Sleeper = ThreadSleeper> {
    bus: B,
    address: BusAddress,
    codec: ChannelStateCodec,
    options: BoardOptions,
    sleeper: S,
}

impl<B: BusProxy> SwitchingBoard<B, ThreadSleeper> {
    /// Creates a driver for a stock board at `address`.
    pub fn new(bus: B, address: BusAddress) -> Self {
        Self::with_options(bus, address, BoardOptions::default())
    }

    pub fn with_options(bus: B, address: BusAddress, options: BoardOptions) -> Self {
        Self::with_sleeper(bus, address, options, ThreadSleeper)
    }
}

impl<B: BusProxy, S: Sleeper> SwitchingBoard<B, S> {
    /// Creates a driver that waits between recovery polls with `sleeper`.
    pub fn with_sleeper(bus: B, address: BusAddress, options: BoardOptions, sleeper: S) -> Self {
        Self {
            bus,
            address,
            codec: ChannelStateCodec::new(options.shift_register_count),
            options,
            sleeper,
        }
    }

    // --- Info ---
    /// Address this handle currently sends commands to.
    pub fn address(&self) -> BusAddress {
        self.address
    }

    pub fn options(&self) -> BoardOptions {
        self.options
    }

    pub fn shift_register_count(&self) -> ShiftRegisterCount {
        self.options.shift_register_count
    }

    pub fn channel_count(&self) -> usize {
        self.codec.channel_count()
    }

    /// Changes the geometry used to encode and decode channel states.
    pub fn set_shift_register_count(&mut self, count: ShiftRegisterCount) {
        self.options.shift_register_count = count;
        self.codec = ChannelStateCodec::new(count);
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn into_bus(self) -> B {
        self.bus
    }

    fn send_command(&mut self, command: u8, buffer: &mut CommandBuffer) -> Result<Option<Vec<u8>>> {
        let message = buffer.take_message(command);
        let response = self.bus.send(self.address, &message)?;
        trace!(
            "Response to 0x{:02X} from {}: {:02X?}",
            command,
            self.address,
            response
        );
        Ok(response)
    }

    // Port registers answer with the bare register byte, no length prefix.
    fn register_command(&mut self, command: u8, buffer: &mut CommandBuffer) -> Result<u8> {
        let message = buffer.take_message(command);
        self.bus.write(self.address, &message)?;
        let response = self.bus.read(self.address, 1)?;
        trace!(
            "Register 0x{:02X} on {} reads {:02X?}",
            command,
            self.address,
            response
        );
        response.first().copied().ok_or(Error::ShortResponse {
            command,
            expected: 1,
            actual: 0,
        })
    }

    // --- Channel states ---
    /// Sets every channel at once. `state` must hold `shift registers * 8` entries.
    pub fn set_channel_states(&mut self, state: &[bool]) -> Result<()> {
        let frame = self.codec.encode(state)?;
        let mut buffer = CommandBuffer::new();
        for byte in &frame {
            buffer.serialize_u8(*byte);
        }
        debug!(
            "Setting {} channel states on {}: frame {:02X?}",
            state.len(),
            self.address,
            frame
        );
        self.send_command(consts::CMD_SET_STATE_OF_ALL_CHANNELS, &mut buffer)?;
        Ok(())
    }

    /// Reads back every channel state.
    pub fn get_channel_states(&mut self) -> Result<Vec<bool>> {
        let command = consts::CMD_GET_STATE_OF_ALL_CHANNELS;
        let expected = self.options.shift_register_count.get() as usize;
        let response = self
            .send_command(command, &mut CommandBuffer::new())?
            .unwrap_or_default();
        if response.len() < expected {
            return Err(Error::ShortResponse {
                command,
                expected,
                actual: response.len(),
            });
        }
        if response.len() > expected {
            warn!(
                "Ignoring {} extra bytes in channel state response",
                response.len() - expected
            );
        }
        self.codec.decode(&response[..expected])
    }

    // --- Output port registers ---
    fn check_port(&self, port: u8) -> Result<()> {
        let count = self.options.shift_register_count.get();
        if port >= count || port >= consts::port::MAX_PORTS {
            return Err(Error::PortOutOfRange { port, count });
        }
        Ok(())
    }

    /// Sets the 8 channels of a single shift register.
    pub fn set_port_states(&mut self, port: u8, states: &[bool; CHANNELS_PER_REGISTER]) -> Result<()> {
        self.check_port(port)?;
        let byte = codec::encode_register(states);
        debug!("Setting port {} on {} to 0x{:02X}", port, self.address, byte);
        let mut buffer = CommandBuffer::new();
        buffer.serialize_u8(byte);
        let echo = self.register_command(consts::port::OUTPUT_PORT_REGISTER + port, &mut buffer)?;
        if echo != byte {
            warn!(
                "Port {} on {} reads back 0x{:02X} after writing 0x{:02X}",
                port, self.address, echo, byte
            );
        }
        Ok(())
    }

    /// Reads the 8 channels of a single shift register.
    pub fn port_states(&mut self, port: u8) -> Result<[bool; CHANNELS_PER_REGISTER]> {
        self.check_port(port)?;
        let command = consts::port::OUTPUT_PORT_REGISTER + port;
        let byte = self.register_command(command, &mut CommandBuffer::new())?;
        Ok(codec::unpack_byte(byte))
    }

    /// Sets consecutive shift registers starting at `start_port` in one transfer.
    ///
    /// `states` must cover whole registers and end within the board.
    pub fn set_port_range(&mut self, start_port: u8, states: &[bool]) -> Result<()> {
        if states.is_empty() || states.len() % CHANNELS_PER_REGISTER != 0 {
            return Err(Error::ArgumentOutOfRange(format!(
                "port range needs a non-zero multiple of {} states, got {}",
                CHANNELS_PER_REGISTER,
                states.len()
            )));
        }
        self.check_port(start_port)?;
        let ports = states.len() / CHANNELS_PER_REGISTER;
        let last_port = u8::try_from(start_port as usize + ports - 1).map_err(|_| {
            Error::PortOutOfRange {
                port: u8::MAX,
                count: self.options.shift_register_count.get(),
            }
        })?;
        self.check_port(last_port)?;

        let mut buffer = CommandBuffer::new();
        for chunk in states.chunks_exact(CHANNELS_PER_REGISTER) {
            let mut register = [false; CHANNELS_PER_REGISTER];
            register.copy_from_slice(chunk);
            buffer.serialize_u8(codec::encode_register(&register));
        }
        debug!(
            "Setting ports {}..={} on {}",
            start_port, last_port, self.address
        );
        let command = (consts::port::OUTPUT_PORT_REGISTER + start_port) | consts::port::AUTO_INCREMENT;
        // The board echoes the last register written.
        self.register_command(command, &mut buffer)?;
        Ok(())
    }

    /// Switches one channel, leaving the others in its register untouched.
    pub fn set_channel(&mut self, channel: usize, on: bool) -> Result<()> {
        let count = self.channel_count();
        if channel >= count {
            return Err(Error::ChannelOutOfRange { channel, count });
        }
        // channel < count <= 255 * 8, so the port fits in a u8
        let port = (channel / CHANNELS_PER_REGISTER) as u8;
        let mut states = self.port_states(port)?;
        states[channel % CHANNELS_PER_REGISTER] = on;
        self.set_port_states(port, &states)
    }

    // --- Geometry ---
    /// Asks the board how many shift registers it has.
    ///
    /// Firmware older than the query answers without a payload; that case
    /// falls back to 5 with a warning. A bus that does not answer at all is
    /// reported as `Error::DegradedQuery` instead of being papered over.
    pub fn get_shift_register_count(&mut self) -> Result<u8> {
        let address = self.address;
        match self.send_command(consts::CMD_GET_SHIFT_REGISTER_COUNT, &mut CommandBuffer::new()) {
            Ok(Some(bytes)) if !bytes.is_empty() => Ok(bytes[0]),
            Ok(_) => {
                warn!(
                    "Board at {} did not report a shift register count (older firmware?); assuming {}",
                    address,
                    consts::DEFAULT_SHIFT_REGISTER_COUNT
                );
                Ok(consts::DEFAULT_SHIFT_REGISTER_COUNT)
            }
            Err(e) => Err(Error::DegradedQuery {
                address,
                source: Box::new(e),
            }),
        }
    }

    /// Queries the shift register count and adopts it for later channel operations.
    pub fn detect_shift_register_count(&mut self) -> Result<ShiftRegisterCount> {
        let count = ShiftRegisterCount::new(self.get_shift_register_count()?)?;
        if count != self.options.shift_register_count {
            debug!(
                "Board at {} reports {} shift registers (was {})",
                self.address, count, self.options.shift_register_count
            );
        }
        self.set_shift_register_count(count);
        Ok(count)
    }

    // --- Configuration ---
    /// Restores the factory configuration. The board then answers at address 10.
    pub fn reset_config(&mut self) -> Result<()> {
        debug!("Resetting config of board at {}", self.address);
        self.bus.write(self.address, &[consts::CMD_RESET_CONFIG])?;
        self.address = BusAddress::FACTORY_DEFAULT;
        Ok(())
    }

    /// Reboots the board and holds it in its bootloader.
    ///
    /// The returned session borrows the bus; call `resume` on it when done.
    pub fn reboot_recovery<'a>(
        &'a mut self,
        bootloader: &'a mut dyn Bootloader,
    ) -> Result<RecoverySession<'a>> {
        self.reboot_recovery_with_cancel(bootloader, &CancelToken::new())
    }

    /// Like [`reboot_recovery`](Self::reboot_recovery), abandoning the wait when `cancel` fires.
    pub fn reboot_recovery_with_cancel<'a>(
        &'a mut self,
        bootloader: &'a mut dyn Bootloader,
        cancel: &CancelToken,
    ) -> Result<RecoverySession<'a>> {
        let mut controller = RecoveryController::new(self.options.recovery);
        controller.reboot(&mut self.bus, bootloader, self.address, &self.sleeper, cancel)
    }

    /// Reads the persistent config record. **Reboots** the board.
    pub fn read_config(&mut self, bootloader: &mut dyn Bootloader) -> Result<DeviceConfig> {
        let layout = self.options.config_layout;
        let mut session = self.reboot_recovery(bootloader)?;
        let config = session.config_store(layout).read()?;
        session.resume()?;
        Ok(config)
    }

    /// Changes the board's bus address in its persistent config. **Reboots** the board.
    ///
    /// This handle switches to the new address before the application is
    /// restarted, so a command sent right after this returns may reach the
    /// board before it is listening again. Use
    /// [`set_bus_address_verified`](Self::set_bus_address_verified) to wait for it.
    ///
    /// The bootloader's own address is rejected before the board is rebooted.
    pub fn set_bus_address(
        &mut self,
        bootloader: &mut dyn Bootloader,
        address: BusAddress,
    ) -> Result<()> {
        self.set_bus_address_with_cancel(bootloader, address, &CancelToken::new())
    }

    /// Like [`set_bus_address`](Self::set_bus_address), abandoning the recovery wait when `cancel` fires.
    pub fn set_bus_address_with_cancel(
        &mut self,
        bootloader: &mut dyn Bootloader,
        address: BusAddress,
        cancel: &CancelToken,
    ) -> Result<()> {
        check_new_address(bootloader, address)?;
        debug!("Changing bus address {} -> {}", self.address, address);
        let layout = self.options.config_layout;
        let mut controller = RecoveryController::new(self.options.recovery);
        let mut session =
            controller.reboot(&mut self.bus, bootloader, self.address, &self.sleeper, cancel)?;
        session.config_store(layout).update_bus_address(address)?;
        self.address = address;
        session.resume()
    }

    /// Changes the bus address and only adopts it once the board answers there.
    ///
    /// After restarting the application, scans the bus with the recovery poll
    /// budget. Fails with `Error::AddressNotConfirmed` if the board never shows
    /// up; this handle then keeps its previous address.
    pub fn set_bus_address_verified(
        &mut self,
        bootloader: &mut dyn Bootloader,
        address: BusAddress,
    ) -> Result<()> {
        self.set_bus_address_verified_with_cancel(bootloader, address, &CancelToken::new())
    }

    /// Like [`set_bus_address_verified`](Self::set_bus_address_verified),
    /// abandoning either wait when `cancel` fires.
    ///
    /// Cancelling after the application was restarted leaves the new address
    /// in the board's config while this handle keeps the old one.
    pub fn set_bus_address_verified_with_cancel(
        &mut self,
        bootloader: &mut dyn Bootloader,
        address: BusAddress,
        cancel: &CancelToken,
    ) -> Result<()> {
        check_new_address(bootloader, address)?;
        debug!("Changing bus address {} -> {} (verified)", self.address, address);
        let layout = self.options.config_layout;
        let mut controller = RecoveryController::new(self.options.recovery);
        let mut session =
            controller.reboot(&mut self.bus, bootloader, self.address, &self.sleeper, cancel)?;
        session.config_store(layout).update_bus_address(address)?;
        session.resume()?;

        self.wait_for_address(address, cancel)?;
        self.address = address;
        Ok(())
    }

    fn wait_for_address(&mut self, address: BusAddress, cancel: &CancelToken) -> Result<()> {
        let options = self.options.recovery;
        for attempt in 1..=options.max_attempts() {
            if cancel.is_cancelled() {
                warn!("Gave up waiting for board at {} after {} scans", address, attempt - 1);
                return Err(Error::RecoveryCancelled {
                    attempts: attempt - 1,
                });
            }
            if self.bus.scan()?.contains(&address) {
                debug!("Board answered at {} (scan {})", address, attempt);
                return Ok(());
            }
            if attempt < options.max_attempts() {
                self.sleeper.sleep(options.poll_interval());
            }
        }
        Err(Error::AddressNotConfirmed {
            address,
            attempts: options.max_attempts(),
        })
    }
}

// The bootloader answers at its own address after every reboot, so a board
// configured there could never be told apart from it.
fn check_new_address(bootloader: &dyn Bootloader, address: BusAddress) -> Result<()> {
    if address == bootloader.address() {
        return Err(Error::ArgumentOutOfRange(format!(
            "bus address {} is reserved for the bootloader",
            address
        )));
    }
    Ok(())
}
