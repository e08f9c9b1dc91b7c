// Shared test helpers (integration tests compile as separate crates, so put
// common code in a submodule to avoid it becoming its own test target).
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use attiny_core::{ManualClock, Mcu, Peripheral, RegisterAddress};

/// Records every output notification and answers input reads from a fixed table.
#[derive(Default)]
pub struct RecordingPeripheral {
    changes: Mutex<Vec<(RegisterAddress, u8)>>,
    inputs: Mutex<Vec<(RegisterAddress, u8)>>,
}

impl RecordingPeripheral {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn changes(&self) -> Vec<(RegisterAddress, u8)> {
        self.changes.lock().unwrap().clone()
    }

    pub fn drive_input(&self, pin: RegisterAddress, value: u8) {
        self.inputs.lock().unwrap().push((pin, value));
    }
}

impl Peripheral for RecordingPeripheral {
    fn port_changed(&self, port: RegisterAddress, value: u8) {
        self.changes.lock().unwrap().push((port, value));
    }

    fn port_value(&self, pin: RegisterAddress) -> u8 {
        self.inputs
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(p, _)| *p == pin)
            .map_or(0, |(_, v)| *v)
    }
}

/// An MCU whose counter reads follow `clock` and whose port writes go to `peripheral`.
pub fn mcu_with(clock: &ManualClock, peripheral: &Arc<RecordingPeripheral>) -> Mcu {
    Mcu::builder()
        .clock(Arc::new(clock.clone()))
        .peripheral(peripheral.clone())
        .build()
        .unwrap()
}

/// Polls `cond` until it holds or `timeout` passes.
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
