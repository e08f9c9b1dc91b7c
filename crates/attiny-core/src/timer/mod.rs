//! Timer/Counter engines.
//!
//! Each live timer owns a host thread that sleeps for the wall-clock length of one counter
//! cycle (derived from the system clock, the prescaler and TOP), raises the `TIFR` flags of
//! the matches that fall inside the cycle and enters the bound interrupt vector through the
//! [`Scheduler`](crate::sched::Scheduler).
//!
//! The counter itself is never incremented: `TCNTn` reads are reconstructed from the time
//! elapsed since the cycle started. Register writes rebuild the cycle description, but a
//! sleep that is already in progress finishes with the old timing; the new schedule applies
//! from the next cycle.

mod engine;
mod timer0;
mod timer1;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub(crate) use engine::EngineContext;
pub use engine::{InterruptSink, TimerCore};
pub use timer0::Timer0;
pub use timer1::Timer1;

use crate::clock::ticks_to_duration;
use crate::regs::{RegisterAddress, TimerId, TimerIrq};
use crate::vectors::Vector;

/// One hardware timer as seen by the chip.
pub trait TimerEngine: Send + Sync + fmt::Debug {
    fn id(&self) -> TimerId;

    /// Register write routed from the chip. `TIMSK`/`TIFR` writes carry every timer's bits.
    fn set(&self, reg: RegisterAddress, value: u8);

    fn get(&self, reg: RegisterAddress) -> u8;

    /// This timer's pending `TIFR` bits.
    fn flags(&self) -> TimerIrq;

    fn set_system_clock(&self, hz: u32);

    /// Rebuilds the cycle description from the current register values.
    fn recompute_period(&self);

    fn snapshot(&self) -> TimerSnapshot;

    /// Stops the engine thread after its current sleep.
    fn shutdown(&self);
}

/// A flag raised `tick` timer ticks into each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub tick: u32,
    pub vector: Vector,
}

/// One counter cycle: the counter runs from 0 to `top` ticks, then starts over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub prescale: u32,
    pub top: u32,
    /// Sorted by `tick`; the last entry is at `top`.
    pub matches: Vec<Match>,
}

impl Schedule {
    pub(crate) fn new(prescale: u32, top: u32, mut matches: Vec<Match>) -> Self {
        matches.sort_by_key(|m| m.tick);
        Self {
            prescale,
            top,
            matches,
        }
    }

    pub fn period(&self, system_hz: u32) -> Duration {
        ticks_to_duration(u64::from(self.top), self.prescale, system_hz)
    }
}

/// Observable state of a timer engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub id: TimerId,
    pub system_clock_hz: u32,
    pub schedule: Option<Schedule>,
    /// Wall-clock length of one cycle, `None` while the timer is stopped.
    pub period: Option<Duration>,
    pub flags: TimerIrq,
    /// Times the effective schedule changed.
    pub reconfigurations: u64,
}

/// Creates the engine for `id` and starts its thread.
pub(crate) fn start_engine(id: TimerId, core: Arc<TimerCore>) -> Arc<dyn TimerEngine> {
    let engine: Arc<dyn TimerEngine> = match id {
        TimerId::Timer0 => Arc::new(Timer0::new(Arc::clone(&core))),
        TimerId::Timer1 => Arc::new(Timer1::new(Arc::clone(&core))),
    };
    engine.recompute_period();
    TimerCore::spawn(core);
    engine
}
