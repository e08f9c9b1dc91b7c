//! The chip model: the register file and the side effects of writing it.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::clock::decode_clkpr;
use crate::config::ChipConfig;
use crate::error::ChipError;
use crate::fault::FaultLog;
use crate::peripheral::Peripheral;
use crate::regs::{Port, RegisterAddress, TimerId, TimerIrq, REGISTER_FILE_LEN};
use crate::timer::{start_engine, EngineContext, TimerCore, TimerEngine, TimerSnapshot};

/// Read-modify-write operation applied to a register.
///
/// Arithmetic wraps like the 8-bit hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegOp {
    Assign(u8),
    Or(u8),
    And(u8),
    Xor(u8),
    Add(u8),
    Sub(u8),
    Inc,
    Dec,
}

impl RegOp {
    pub fn apply(self, current: u8) -> u8 {
        match self {
            RegOp::Assign(v) => v,
            RegOp::Or(v) => current | v,
            RegOp::And(v) => current & v,
            RegOp::Xor(v) => current ^ v,
            RegOp::Add(v) => current.wrapping_add(v),
            RegOp::Sub(v) => current.wrapping_sub(v),
            RegOp::Inc => current.wrapping_add(1),
            RegOp::Dec => current.wrapping_sub(1),
        }
    }
}

pub(crate) struct Chip {
    regs: [u8; REGISTER_FILE_LEN],
    base_clock_hz: u32,
    clock_hz: u32,
    timers: [Option<Arc<dyn TimerEngine>>; 2],
    /// Last direction-masked value sent to the peripheral, per port.
    driven: [u8; 3],
    peripheral: Option<Arc<dyn Peripheral>>,
    floating: StdRng,
    faults: Arc<FaultLog>,
    engines: EngineContext,
    powered: bool,
}

impl Chip {
    pub fn new(config: &ChipConfig, engines: EngineContext) -> Self {
        Self {
            regs: [0; REGISTER_FILE_LEN],
            base_clock_hz: config.base_clock_hz,
            clock_hz: config.power_on_clock_hz(),
            timers: [None, None],
            driven: [0; 3],
            peripheral: None,
            floating: StdRng::seed_from_u64(config.floating_seed),
            faults: Arc::clone(&engines.faults),
            engines,
            powered: true,
        }
    }

    pub fn clock_hz(&self) -> u32 {
        self.clock_hz
    }

    pub fn set_peripheral(&mut self, peripheral: Option<Arc<dyn Peripheral>>) {
        self.peripheral = peripheral;
    }

    /// The stored byte, without delegating to peripherals or timers.
    pub fn stored(&self, reg: RegisterAddress) -> u8 {
        self.regs[reg.index()]
    }

    /// Stores a byte with no side effects.
    pub fn store(&mut self, reg: RegisterAddress, value: u8) {
        self.regs[reg.index()] = value;
    }

    fn timer(&self, id: TimerId) -> Option<&Arc<dyn TimerEngine>> {
        self.timers[id.slot()].as_ref()
    }

    fn live_timers(&self) -> impl Iterator<Item = &Arc<dyn TimerEngine>> {
        self.timers.iter().flatten()
    }

    /// Value a read-modify-write starts from.
    ///
    /// Live timer registers come from the engine; a Timer1 low half latches its high half
    /// into TEMP exactly as a firmware read would.
    fn current(&self, reg: RegisterAddress) -> u8 {
        if reg == RegisterAddress::Tifr {
            return self.pending_flags().bits();
        }
        match reg.timer().and_then(|id| self.timer(id)) {
            Some(timer) => timer.get(reg),
            None => self.stored(reg),
        }
    }

    fn pending_flags(&self) -> TimerIrq {
        self.live_timers()
            .fold(TimerIrq::empty(), |acc, t| acc | t.flags())
    }

    /// Applies `op` and runs the register's side effects if the value changed.
    ///
    /// Timer1's 16-bit halves and `TIFR` skip the change filter: the low byte is a commit
    /// strobe and `TIFR` is write-one-to-clear.
    pub fn set(&mut self, reg: RegisterAddress, op: RegOp) {
        if reg.is_wide_half() || reg == RegisterAddress::Tifr {
            // A plain store must not read first: reading a low half reloads TEMP.
            let value = match op {
                RegOp::Assign(value) => value,
                op => op.apply(self.current(reg)),
            };
            self.dispatch(reg, value);
            return;
        }
        let old = self.current(reg);
        let value = op.apply(old);
        if value == old {
            return;
        }
        self.store(reg, value);
        self.dispatch(reg, value);
    }

    fn dispatch(&mut self, reg: RegisterAddress, value: u8) {
        if let Some(port) = reg.port() {
            if reg == port.data() {
                self.drive_port(port);
            }
            return;
        }
        if let Some(id) = reg.timer() {
            if value != 0 {
                self.ensure_timer(id);
            }
            if let Some(timer) = self.timer(id) {
                timer.set(reg, value);
            }
            return;
        }
        match reg {
            RegisterAddress::Clkpr => self.set_clock_prescale(value),
            RegisterAddress::Timsk => {
                for id in TimerId::ALL {
                    if value & id.interrupt_bits().bits() != 0 {
                        self.ensure_timer(id);
                    }
                }
                for timer in self.live_timers() {
                    timer.set(reg, value);
                }
            }
            RegisterAddress::Tifr => {
                for timer in self.live_timers() {
                    timer.set(reg, value);
                }
            }
            _ => {}
        }
    }

    fn drive_port(&mut self, port: Port) {
        let masked = self.stored(port.data()) & self.stored(port.direction());
        if self.driven[port.slot()] == masked {
            return;
        }
        self.driven[port.slot()] = masked;
        if let Some(peripheral) = &self.peripheral {
            tracing::trace!(port = %port.data(), value = masked, "port output changed");
            peripheral.port_changed(port.data(), masked);
        }
    }

    fn set_clock_prescale(&mut self, value: u8) {
        match decode_clkpr(self.base_clock_hz, value) {
            Ok(None) => {}
            Ok(Some(hz)) => {
                tracing::debug!(hz, "system clock changed");
                self.clock_hz = hz;
                for timer in self.live_timers() {
                    timer.set_system_clock(hz);
                    timer.recompute_period();
                }
            }
            Err(fault) => self.faults.record(fault),
        }
    }

    fn ensure_timer(&mut self, id: TimerId) {
        if !self.powered || self.timers[id.slot()].is_some() {
            return;
        }
        tracing::debug!(timer = %id, hz = self.clock_hz, "starting timer engine");
        let core = TimerCore::new(id, self.regs, self.clock_hz, self.engines.clone());
        self.timers[id.slot()] = Some(start_engine(id, core));
    }

    pub fn get(&mut self, reg: RegisterAddress) -> u8 {
        if let Some(port) = reg.port() {
            if reg == port.input() {
                return match &self.peripheral {
                    Some(peripheral) => peripheral.port_value(reg),
                    None => self.floating.gen(),
                };
            }
            return self.stored(reg);
        }
        if reg == RegisterAddress::Tifr {
            return self.pending_flags().bits();
        }
        match reg.timer().and_then(|id| self.timer(id)) {
            Some(timer) => timer.get(reg),
            None => self.stored(reg),
        }
    }

    /// Raw I/O-space write; unknown addresses are recorded and ignored.
    pub fn write_io(&mut self, addr: u8, value: u8) {
        match RegisterAddress::from_u8(addr) {
            Some(reg) => self.set(reg, RegOp::Assign(value)),
            None => self.faults.record(ChipError::UnknownRegister(addr)),
        }
    }

    pub fn read_io(&mut self, addr: u8) -> u8 {
        match RegisterAddress::from_u8(addr) {
            Some(reg) => self.get(reg),
            None => {
                self.faults.record(ChipError::UnknownRegister(addr));
                0
            }
        }
    }

    pub fn timer_snapshot(&self, id: TimerId) -> Option<TimerSnapshot> {
        self.timer(id).map(|t| t.snapshot())
    }

    pub fn power_off(&mut self) {
        self.powered = false;
        for timer in self.timers.iter_mut().filter_map(Option::take) {
            timer.shutdown();
        }
    }
}

impl Drop for Chip {
    fn drop(&mut self) {
        self.power_off();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_ops_wrap() {
        assert_eq!(RegOp::Inc.apply(0xFF), 0);
        assert_eq!(RegOp::Dec.apply(0), 0xFF);
        assert_eq!(RegOp::Add(0x10).apply(0xF8), 0x08);
        assert_eq!(RegOp::Sub(3).apply(1), 0xFE);
    }

    #[test]
    fn bitwise_ops() {
        assert_eq!(RegOp::Or(0x0F).apply(0xA0), 0xAF);
        assert_eq!(RegOp::And(!0x01).apply(0xFF), 0xFE);
        assert_eq!(RegOp::Xor(0xFF).apply(0x0F), 0xF0);
        assert_eq!(RegOp::Assign(7).apply(0x55), 7);
    }
}
