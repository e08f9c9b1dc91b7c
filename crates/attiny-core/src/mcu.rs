//! The firmware-facing handle to one emulated chip.

use std::fmt;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::chip::{Chip, RegOp};
use crate::clock::{Clock, StdClock};
use crate::config::ChipConfig;
use crate::eeprom::Eeprom;
use crate::error::{ChipError, ConfigError, Result};
use crate::fault::FaultLog;
use crate::peripheral::Peripheral;
use crate::proxy::{Reg, Reg16};
use crate::regs::{sreg, RegisterAddress, TimerId, WidePair};
use crate::sched::Scheduler;
use crate::timer::{EngineContext, InterruptSink, TimerSnapshot};
use crate::vectors::{Vector, VectorBinding, VectorTable};

struct Shared {
    chip: Mutex<Chip>,
    sched: Arc<Scheduler>,
    faults: Arc<FaultLog>,
    vectors: VectorTable,
    eeprom: Mutex<Eeprom>,
    config: ChipConfig,
}

impl Drop for Shared {
    fn drop(&mut self) {
        // Releases engines parked in `int_start`; the chip's own drop then stops them.
        self.sched.halt();
    }
}

impl InterruptSink for Shared {
    fn is_bound(&self, vector: Vector) -> bool {
        self.vectors.is_bound(vector)
    }

    fn invoke(self: Arc<Self>, vector: Vector) {
        let handler = match self.vectors.binding(vector) {
            VectorBinding::Handler(handler) => Arc::clone(handler),
            VectorBinding::Unbound => return,
        };
        handler(&Mcu { shared: self });
    }
}

/// A cheaply clonable handle to one emulated ATtiny2313.
///
/// Register accesses made by the registered main context block while an interrupt handler is
/// running, so firmware never observes a handler and its main loop interleaving.
#[derive(Clone)]
pub struct Mcu {
    shared: Arc<Shared>,
}

impl fmt::Debug for Mcu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mcu")
            .field("config", &self.shared.config)
            .field("vectors", &self.shared.vectors)
            .field("sched", &self.shared.sched)
            .finish_non_exhaustive()
    }
}

/// Builds an [`Mcu`]. The vector table is frozen by [`McuBuilder::build`].
#[derive(Default)]
pub struct McuBuilder {
    config: ChipConfig,
    vectors: VectorTable,
    peripheral: Option<Arc<dyn Peripheral>>,
    clock: Option<Arc<dyn Clock>>,
}

impl McuBuilder {
    pub fn config(mut self, config: ChipConfig) -> Self {
        self.config = config;
        self
    }

    pub fn vectors(mut self, vectors: VectorTable) -> Self {
        self.vectors = vectors;
        self
    }

    pub fn bind<F>(mut self, vector: Vector, handler: F) -> Self
    where
        F: Fn(&Mcu) + Send + Sync + 'static,
    {
        self.vectors.bind(vector, handler);
        self
    }

    pub fn peripheral(mut self, peripheral: Arc<dyn Peripheral>) -> Self {
        self.peripheral = Some(peripheral);
        self
    }

    /// Time source for counter reconstruction. Defaults to [`StdClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> std::result::Result<Mcu, ConfigError> {
        self.config.validate()?;
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(StdClock::new()) as Arc<dyn Clock>);
        let sched = Arc::new(Scheduler::new());
        let faults = Arc::new(FaultLog::new());
        let config = self.config;
        let vectors = self.vectors;
        let peripheral = self.peripheral;

        let shared = Arc::new_cyclic(|weak: &Weak<Shared>| {
            let sink: Weak<dyn InterruptSink> = weak.clone();
            let ctx = EngineContext {
                clock,
                sched: Arc::clone(&sched),
                sink,
                faults: Arc::clone(&faults),
            };
            let mut chip = Chip::new(&config, ctx);
            chip.set_peripheral(peripheral);
            Shared {
                chip: Mutex::new(chip),
                sched,
                faults,
                vectors,
                eeprom: Mutex::new(Eeprom::new()),
                config,
            }
        });
        tracing::debug!(
            hz = shared.config.power_on_clock_hz(),
            "ATtiny2313 powered on"
        );
        Ok(Mcu { shared })
    }
}

impl Mcu {
    pub fn builder() -> McuBuilder {
        McuBuilder::default()
    }

    /// A chip with the default configuration and the given interrupt handlers.
    pub fn new(vectors: VectorTable) -> std::result::Result<Self, ConfigError> {
        Self::builder().vectors(vectors).build()
    }

    fn chip(&self) -> MutexGuard<'_, Chip> {
        self.shared
            .chip
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &ChipConfig {
        &self.shared.config
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.shared.sched
    }

    fn sreg(&self, chip: &Chip) -> u8 {
        let stored = chip.stored(RegisterAddress::Sreg) & !sreg::I;
        if self.shared.sched.interrupts_enabled() {
            stored | sreg::I
        } else {
            stored
        }
    }

    pub fn get(&self, reg: RegisterAddress) -> u8 {
        self.shared.sched.main_checkpoint();
        let mut chip = self.chip();
        if reg == RegisterAddress::Sreg {
            return self.sreg(&chip);
        }
        chip.get(reg)
    }

    pub fn apply(&self, reg: RegisterAddress, op: RegOp) {
        self.shared.sched.main_checkpoint();
        if reg == RegisterAddress::Sreg {
            self.apply_sreg(op);
            return;
        }
        self.chip().set(reg, op);
    }

    /// `SREG.I` lives in the scheduler; the other bits are plain storage.
    fn apply_sreg(&self, op: RegOp) {
        let stored = self.chip().stored(RegisterAddress::Sreg) & !sreg::I;
        let mut value = stored;
        self.shared.sched.update_interrupts(|enabled| {
            let current = if enabled { stored | sreg::I } else { stored };
            value = op.apply(current);
            value & sreg::I != 0
        });
        self.chip().store(RegisterAddress::Sreg, value & !sreg::I);
    }

    pub fn write(&self, reg: RegisterAddress, value: u8) {
        self.apply(reg, RegOp::Assign(value));
    }

    /// Reads an I/O-space address. Unknown addresses read 0 and are recorded as faults.
    pub fn read_io(&self, addr: u8) -> u8 {
        match RegisterAddress::from_u8(addr) {
            Some(reg) => self.get(reg),
            None => self.chip().read_io(addr),
        }
    }

    pub fn write_io(&self, addr: u8, value: u8) {
        match RegisterAddress::from_u8(addr) {
            Some(reg) => self.write(reg, value),
            None => self.chip().write_io(addr, value),
        }
    }

    pub fn reg(&self, reg: RegisterAddress) -> Reg {
        Reg::new(self.clone(), reg)
    }

    pub fn reg16(&self, pair: WidePair) -> Reg16 {
        Reg16::new(self.clone(), pair)
    }

    pub fn sei(&self) {
        self.apply(RegisterAddress::Sreg, RegOp::Or(sreg::I));
    }

    pub fn cli(&self) {
        self.apply(RegisterAddress::Sreg, RegOp::And(!sreg::I));
    }

    pub fn delay_ms(&self, ms: u64) {
        self.delay(Duration::from_millis(ms));
    }

    pub fn delay_us(&self, us: u64) {
        self.delay(Duration::from_micros(us));
    }

    /// Host sleep. The main context gives up the running slot for the duration; a handler
    /// keeps it, like a busy-wait inside an ISR.
    pub fn delay(&self, duration: Duration) {
        let sched = &self.shared.sched;
        if sched.is_main_thread() {
            sched.main_stop();
            thread::sleep(duration);
            sched.main_start();
        } else {
            thread::sleep(duration);
        }
    }

    /// The `sleep` instruction: waits until an interrupt handler has run.
    pub fn sleep_until_interrupt(&self) {
        let sched = &self.shared.sched;
        if sched.is_main_thread() {
            sched.main_sleep();
        } else {
            tracing::debug!("sleep_until_interrupt outside the main context ignored");
        }
    }

    /// Runs `main` on the calling thread as the firmware main context.
    pub fn run_main<R>(&self, main: impl FnOnce(&Mcu) -> R) -> R {
        let sched = &self.shared.sched;
        sched.register_main_thread();
        sched.main_start();
        let result = main(self);
        sched.main_stop();
        result
    }

    /// Runs `main` as the firmware main context on a new thread.
    pub fn spawn_main<R, F>(&self, main: F) -> io::Result<JoinHandle<R>>
    where
        F: FnOnce(&Mcu) -> R + Send + 'static,
        R: Send + 'static,
    {
        let mcu = self.clone();
        thread::Builder::new()
            .name("attiny-main".into())
            .spawn(move || mcu.run_main(main))
    }

    pub fn set_peripheral(&self, peripheral: Option<Arc<dyn Peripheral>>) {
        self.chip().set_peripheral(peripheral);
    }

    pub fn clock_hz(&self) -> u32 {
        self.chip().clock_hz()
    }

    pub fn timer_snapshot(&self, id: TimerId) -> Option<TimerSnapshot> {
        self.chip().timer_snapshot(id)
    }

    /// Drains the configuration faults recorded since the last call.
    pub fn take_faults(&self) -> Vec<ChipError> {
        self.shared.faults.take()
    }

    pub fn eeprom_read_byte(&self, addr: u16) -> Result<u8> {
        self.eeprom().read_byte(addr)
    }

    pub fn eeprom_write_byte(&self, addr: u16, value: u8) -> Result<()> {
        self.eeprom().write_byte(addr, value)
    }

    pub fn eeprom_read_word(&self, addr: u16) -> Result<u16> {
        self.eeprom().read_word(addr)
    }

    pub fn eeprom_write_word(&self, addr: u16, value: u16) -> Result<()> {
        self.eeprom().write_word(addr, value)
    }

    /// Direct access to the EEPROM contents, e.g. to load or save an image.
    pub fn eeprom(&self) -> MutexGuard<'_, Eeprom> {
        self.shared
            .eeprom
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Stops every timer engine and releases every context blocked in the scheduler.
    pub fn power_off(&self) {
        tracing::debug!("ATtiny2313 powering off");
        self.shared.sched.halt();
        self.chip().power_off();
    }

    pub fn is_powered(&self) -> bool {
        !self.shared.sched.is_halted()
    }
}
