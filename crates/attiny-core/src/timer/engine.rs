use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::{Duration, Instant};

use crate::clock::{ns_to_ticks, ticks_to_duration, Clock};
use crate::error::ChipError;
use crate::fault::FaultLog;
use crate::regs::{RegisterAddress, TimerId, TimerIrq, REGISTER_FILE_LEN};
use crate::sched::Scheduler;
use crate::vectors::Vector;

use super::{Schedule, TimerSnapshot};

/// Where a timer engine delivers its interrupts.
pub trait InterruptSink: Send + Sync {
    fn is_bound(&self, vector: Vector) -> bool;

    /// Runs the handler bound to `vector`. The caller already holds the interrupt slot.
    fn invoke(self: Arc<Self>, vector: Vector);
}

/// Everything an engine needs from the chip, captured when the engine is created.
#[derive(Clone)]
pub(crate) struct EngineContext {
    pub clock: Arc<dyn Clock>,
    pub sched: Arc<Scheduler>,
    pub sink: Weak<dyn InterruptSink>,
    pub faults: Arc<FaultLog>,
}

#[derive(Debug)]
pub(crate) struct CoreState {
    /// The timer's view of the I/O space, seeded from the chip when the engine starts.
    pub regs: [u8; REGISTER_FILE_LEN],
    /// Timer1's shared high-byte latch.
    pub temp: u8,
    pub system_clock_hz: u32,
    pub schedule: Option<Schedule>,
    pub flags: TimerIrq,
    /// Host time at which the counter was last zero, while running.
    anchor_ns: Option<u64>,
    /// Counter value while stopped.
    held_count: u32,
    /// Faults raised by the current configuration, already recorded.
    reported: Vec<ChipError>,
    reconfigurations: u64,
    shutdown: bool,
}

impl CoreState {
    pub fn reg(&self, reg: RegisterAddress) -> u8 {
        self.regs[reg.index()]
    }

    pub fn store(&mut self, reg: RegisterAddress, value: u8) {
        self.regs[reg.index()] = value;
    }

    fn enabled(&self, flag: TimerIrq) -> bool {
        TimerIrq::from_bits_truncate(self.reg(RegisterAddress::Timsk)).contains(flag)
    }
}

/// State and thread shared by both timer widths.
pub struct TimerCore {
    id: TimerId,
    state: Mutex<CoreState>,
    cond: Condvar,
    clock: Arc<dyn Clock>,
    sched: Arc<Scheduler>,
    sink: Weak<dyn InterruptSink>,
    faults: Arc<FaultLog>,
}

impl fmt::Debug for TimerCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerCore")
            .field("id", &self.id)
            .field("state", &*self.lock())
            .finish_non_exhaustive()
    }
}

impl TimerCore {
    pub(crate) fn new(
        id: TimerId,
        regs: [u8; REGISTER_FILE_LEN],
        system_clock_hz: u32,
        ctx: EngineContext,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            state: Mutex::new(CoreState {
                regs,
                temp: 0,
                system_clock_hz,
                schedule: None,
                flags: TimerIrq::empty(),
                anchor_ns: None,
                held_count: 0,
                reported: Vec::new(),
                reconfigurations: 0,
                shutdown: false,
            }),
            cond: Condvar::new(),
            clock: ctx.clock,
            sched: ctx.sched,
            sink: ctx.sink,
            faults: ctx.faults,
        })
    }

    pub fn id(&self) -> TimerId {
        self.id
    }

    fn lock(&self) -> MutexGuard<'_, CoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut CoreState) -> R) -> R {
        f(&mut self.lock())
    }

    /// Records the faults of a recomputed configuration, skipping those it already had.
    pub(crate) fn report(&self, faults: Vec<ChipError>) {
        let fresh: Vec<ChipError> = {
            let mut state = self.lock();
            let fresh = faults
                .iter()
                .filter(|fault| !state.reported.contains(fault))
                .cloned()
                .collect();
            state.reported = faults;
            fresh
        };
        for fault in fresh {
            self.faults.record(fault);
        }
    }

    /// Write-one-to-clear, restricted to this timer's bits.
    pub(crate) fn clear_flags(&self, value: u8) {
        let bits = TimerIrq::from_bits_truncate(value) & self.id.interrupt_bits();
        self.lock().flags.remove(bits);
    }

    pub(crate) fn flags(&self) -> TimerIrq {
        self.lock().flags
    }

    /// Installs a new cycle description. Unchanged schedules are ignored.
    pub(crate) fn install(&self, schedule: Option<Schedule>) {
        let mut state = self.lock();
        if state.schedule == schedule {
            return;
        }
        if schedule.is_none() {
            state.held_count = self.counter_locked(&state);
            state.anchor_ns = None;
        }
        tracing::debug!(
            timer = %self.id,
            period = ?schedule.as_ref().map(|s| s.period(state.system_clock_hz)),
            "timer reconfigured"
        );
        state.schedule = schedule;
        state.reconfigurations += 1;
        self.cond.notify_all();
    }

    fn counter_locked(&self, state: &CoreState) -> u32 {
        match (&state.schedule, state.anchor_ns) {
            (Some(schedule), Some(anchor)) if schedule.top > 0 => {
                let elapsed = self.clock.now_ns().saturating_sub(anchor);
                let ticks = ns_to_ticks(elapsed, schedule.prescale, state.system_clock_hz);
                (ticks % u64::from(schedule.top)) as u32
            }
            _ => state.held_count,
        }
    }

    /// Reconstructed `TCNTn`.
    pub(crate) fn counter(&self) -> u32 {
        let state = self.lock();
        self.counter_locked(&state)
    }

    /// Re-anchors the reconstructed counter so it reads `value` now.
    pub(crate) fn set_counter(&self, value: u32) {
        let mut state = self.lock();
        match (&state.schedule, state.anchor_ns) {
            (Some(schedule), Some(_)) => {
                let back = ticks_to_duration(
                    u64::from(value),
                    schedule.prescale,
                    state.system_clock_hz,
                );
                let back_ns = u64::try_from(back.as_nanos()).unwrap_or(u64::MAX);
                state.anchor_ns = Some(self.clock.now_ns().saturating_sub(back_ns));
            }
            _ => state.held_count = value,
        }
    }

    pub(crate) fn set_system_clock(&self, hz: u32) {
        let mut state = self.lock();
        if state.system_clock_hz != hz {
            tracing::debug!(timer = %self.id, hz, "timer clock changed");
            state.system_clock_hz = hz;
        }
    }

    pub(crate) fn snapshot(&self) -> TimerSnapshot {
        let state = self.lock();
        TimerSnapshot {
            id: self.id,
            system_clock_hz: state.system_clock_hz,
            period: state
                .schedule
                .as_ref()
                .map(|s| s.period(state.system_clock_hz)),
            schedule: state.schedule.clone(),
            flags: state.flags,
            reconfigurations: state.reconfigurations,
        }
    }

    pub(crate) fn shutdown(&self) {
        self.lock().shutdown = true;
        self.cond.notify_all();
    }

    pub(crate) fn spawn(core: Arc<Self>) {
        let name = format!("attiny-{}", core.id);
        let id = core.id;
        if let Err(err) = thread::Builder::new().name(name).spawn(move || core.run()) {
            tracing::error!(timer = %id, %err, "failed to start timer thread");
        }
    }

    fn run(&self) {
        tracing::debug!(timer = %self.id, "timer engine started");
        'cycles: while let Some(steps) = self.next_cycle() {
            for (delay, vector) in steps {
                if !self.sleep(delay) {
                    break 'cycles;
                }
                if let Some(vector) = vector {
                    if !self.fire(vector) {
                        break 'cycles;
                    }
                }
            }
        }
        tracing::debug!(timer = %self.id, "timer engine stopped");
    }

    /// Blocks while the timer is stopped, then lays out the next cycle as
    /// `(sleep before, event)` steps.
    fn next_cycle(&self) -> Option<Vec<(Duration, Option<Vector>)>> {
        let mut state = self.lock();
        loop {
            if state.shutdown {
                return None;
            }
            let hz = state.system_clock_hz;
            if let Some(schedule) = state.schedule.as_ref().filter(|_| hz > 0) {
                let mut steps = Vec::with_capacity(schedule.matches.len() + 1);
                let mut at = 0u32;
                for m in &schedule.matches {
                    let delta = u64::from(m.tick.saturating_sub(at));
                    steps.push((ticks_to_duration(delta, schedule.prescale, hz), Some(m.vector)));
                    at = m.tick;
                }
                if at < schedule.top {
                    let rest = u64::from(schedule.top - at);
                    steps.push((ticks_to_duration(rest, schedule.prescale, hz), None));
                }
                state.anchor_ns = Some(self.clock.now_ns());
                return Some(steps);
            }
            state = self
                .cond
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Sleeps for `delay` unless shut down first. Reconfiguration does not cut it short.
    fn sleep(&self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        let mut state = self.lock();
        loop {
            if state.shutdown {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            state = self
                .cond
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Raises `vector`'s flag and, if enabled and bound, runs its handler as an interrupt
    /// context. Returns `false` once the engine should exit.
    fn fire(&self, vector: Vector) -> bool {
        let flag = vector.flag();
        {
            let mut state = self.lock();
            if state.shutdown {
                return false;
            }
            if state.schedule.is_none() {
                return true;
            }
            state.flags.insert(flag);
            if !state.enabled(flag) {
                return true;
            }
        }

        // Holds no strong reference to the chip while waiting for SREG.I.
        match self.sink.upgrade() {
            Some(sink) if sink.is_bound(vector) => {}
            Some(_) => return true,
            None => return false,
        }
        if !self.sched.int_start() {
            return false;
        }
        let Some(sink) = self.sink.upgrade() else {
            self.sched.int_stop();
            return false;
        };

        // Firmware may have cleared the flag or masked the source while SREG.I was clear.
        let pending = {
            let mut state = self.lock();
            let pending = state.flags.contains(flag) && state.enabled(flag);
            if pending {
                state.flags.remove(flag);
            }
            pending
        };
        if pending {
            tracing::trace!(timer = %self.id, %vector, "entering interrupt vector");
            sink.invoke(vector);
        }
        self.sched.int_stop();
        true
    }
}
