//! Helpers for end-to-end scenarios: a KP2B keypad wired to a chip, plus polling utilities.
#![forbid(unsafe_code)]

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use attiny_core::{ConfigError, Mcu, McuBuilder};
use attiny_keypad::HallKeypad;

/// A chip with a [`HallKeypad`] attached and a subscription to its LEDs.
pub struct Bench {
    pub keypad: Arc<HallKeypad>,
    pub leds: Receiver<u16>,
    pub mcu: Mcu,
}

impl Bench {
    pub fn new() -> Result<Self, ConfigError> {
        Self::with(|builder| builder)
    }

    /// `customize` binds vectors or swaps the clock before the chip is built.
    pub fn with(customize: impl FnOnce(McuBuilder) -> McuBuilder) -> Result<Self, ConfigError> {
        let keypad = Arc::new(HallKeypad::new());
        Self::on(keypad, customize)
    }

    /// Wires an existing keypad to a fresh chip.
    pub fn on(
        keypad: Arc<HallKeypad>,
        customize: impl FnOnce(McuBuilder) -> McuBuilder,
    ) -> Result<Self, ConfigError> {
        let leds = keypad.subscribe();
        let mcu = customize(Mcu::builder().peripheral(keypad.clone())).build()?;
        Ok(Self { keypad, leds, mcu })
    }

    /// Waits for the lit-LED mask to become `expected`, skipping intermediate states.
    pub fn wait_for_leds(&self, expected: u16, timeout: Duration) -> bool {
        if self.keypad.leds() == expected {
            return true;
        }
        let deadline = Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.leds.recv_timeout(left) {
                Ok(mask) if mask == expected => return true,
                Ok(_) => {}
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return false,
            }
        }
    }

    /// Drops any LED changes already published.
    pub fn drain_leds(&self) -> Vec<u16> {
        self.leds.try_iter().collect()
    }
}

/// Polls `cond` every millisecond until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(1));
    }
}
