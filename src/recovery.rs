//! Reboot-into-recovery handshake.
//!
//! After the reboot command the board starts its bootloader at a separate
//! address. The bootloader starts the application again by itself unless the
//! host cancels its countdown in time, so the controller polls the bus for the
//! bootloader and calls `abort_boot_timeout` as soon as it appears:
//!
//! ```text
//! Idle -> RequestedReboot -> Polling -> Recovered -> Held -> ResumedApplication
//!                                    \-> TimedOut
//!                                    \-> Cancelled
//! ```

use crate::address::BusAddress;
use crate::bus::{Bootloader, BusProxy};
use crate::config::{ConfigLayout, ConfigStore};
use crate::consts;
use crate::error::{Error, Result};
use log::{debug, trace, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Blocking delay between polls. Swap in a fake for deterministic tests.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

impl<T: Sleeper + ?Sized> Sleeper for &T {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Sleeps the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Cancels an in-flight recovery handshake from another thread.
///
/// The token is checked before every bus scan.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Poll budget for the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryOptions {
    poll_interval: Duration,
    max_attempts: u32,
}

impl RecoveryOptions {
    /// Creates a poll budget of `max_attempts` scans spaced `poll_interval` apart.
    pub fn new(poll_interval: Duration, max_attempts: u32) -> Result<Self> {
        if max_attempts == 0 {
            return Err(Error::ArgumentOutOfRange(
                "recovery needs at least one scan attempt".to_string(),
            ));
        }
        Ok(Self {
            poll_interval,
            max_attempts,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Approximate wall-clock ceiling of the poll loop.
    pub fn timeout(&self) -> Duration {
        self.poll_interval * self.max_attempts
    }
}

impl Default for RecoveryOptions {
    fn default() -> Self {
        Self {
            poll_interval: consts::RECOVERY_POLL_INTERVAL,
            max_attempts: consts::RECOVERY_MAX_ATTEMPTS,
        }
    }
}

/// Progress of one handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    Idle,
    RequestedReboot,
    Polling,
    /// Bootloader seen on the bus; boot timeout not yet aborted.
    Recovered,
    TimedOut,
    Cancelled,
    /// Boot timeout aborted; the bootloader waits for the host.
    Held,
    ResumedApplication,
}

/// Drives a board from its application into a held bootloader.
#[derive(Debug)]
pub struct RecoveryController {
    options: RecoveryOptions,
    state: RecoveryState,
}

impl RecoveryController {
    pub fn new(options: RecoveryOptions) -> Self {
        Self {
            options,
            state: RecoveryState::Idle,
        }
    }

    /// State reached by the last handshake.
    pub fn state(&self) -> RecoveryState {
        self.state
    }

    pub fn options(&self) -> RecoveryOptions {
        self.options
    }

    fn transition(&mut self, next: RecoveryState) {
        trace!("Recovery state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Reboots the board at `address` and holds it in its bootloader.
    ///
    /// Blocks for up to [`RecoveryOptions::timeout`]. Fails with
    /// `Error::RecoveryTimeout` if the bootloader never appears, or
    /// `Error::RecoveryCancelled` if `cancel` fires first.
    pub fn reboot<'a>(
        &mut self,
        bus: &'a mut dyn BusProxy,
        bootloader: &'a mut dyn Bootloader,
        address: BusAddress,
        sleeper: &dyn Sleeper,
        cancel: &CancelToken,
    ) -> Result<RecoverySession<'a>> {
        self.transition(RecoveryState::Idle);
        let target = bootloader.address();

        debug!("Requesting reboot of board at {}", address);
        bus.write(address, &[consts::CMD_REBOOT])?;
        self.transition(RecoveryState::RequestedReboot);

        self.transition(RecoveryState::Polling);
        let max_attempts = self.options.max_attempts;
        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                self.transition(RecoveryState::Cancelled);
                return Err(Error::RecoveryCancelled {
                    attempts: attempt - 1,
                });
            }
            if bus.scan()?.contains(&target) {
                debug!("Found bootloader at {} (scan {})", target, attempt);
                self.transition(RecoveryState::Recovered);
                bootloader.abort_boot_timeout(&mut *bus)?;
                debug!("Aborted boot timeout to stay in bootloader");
                self.transition(RecoveryState::Held);
                return Ok(RecoverySession {
                    bus,
                    bootloader,
                    attempts: attempt,
                    state: RecoveryState::Held,
                });
            }
            if attempt < max_attempts {
                sleeper.sleep(self.options.poll_interval);
            }
        }

        self.transition(RecoveryState::TimedOut);
        warn!(
            "Bootloader did not appear at {} within {} scans",
            target, max_attempts
        );
        Err(Error::RecoveryTimeout {
            address: target,
            attempts: max_attempts,
        })
    }
}

/// A board held in its bootloader.
///
/// Config access is only available through a session. Call [`resume`](Self::resume)
/// to start the application again; dropping the session leaves the board in
/// the bootloader.
pub struct RecoverySession<'a> {
    bus: &'a mut dyn BusProxy,
    bootloader: &'a mut dyn Bootloader,
    attempts: u32,
    state: RecoveryState,
}

impl<'a> RecoverySession<'a> {
    pub fn state(&self) -> RecoveryState {
        self.state
    }

    /// Number of scans it took to find the bootloader.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn bootloader_address(&self) -> BusAddress {
        self.bootloader.address()
    }

    /// Config record access through the held bootloader.
    pub fn config_store(&mut self, layout: ConfigLayout) -> ConfigStore<'_> {
        ConfigStore::new(&mut *self.bus, &mut *self.bootloader, layout)
    }

    /// Starts the application image, ending the session.
    pub fn resume(mut self) -> Result<()> {
        self.bootloader.start_application(&mut *self.bus)?;
        debug!("Started application from bootloader");
        self.state = RecoveryState::ResumedApplication;
        Ok(())
    }
}

impl Drop for RecoverySession<'_> {
    fn drop(&mut self) {
        if self.state == RecoveryState::Held {
            warn!(
                "Recovery session dropped while held; board stays in bootloader at {}",
                self.bootloader.address()
            );
        }
    }
}
