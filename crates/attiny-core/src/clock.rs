//! Host time sources and clock-divider arithmetic.
//!
//! Timer engines always *sleep* in real host time. Counter reads are reconstructed from a
//! [`Clock`], which tests can replace with a [`ManualClock`] to make them deterministic.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::ChipError;
use crate::regs::{clkpr, TimerId};

/// Monotonic nanoseconds since an arbitrary origin.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now_ns(&self) -> u64;
}

#[derive(Debug, Clone, Copy)]
pub struct StdClock {
    origin: Instant,
}

impl StdClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for StdClock {
    fn now_ns(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ns: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance_ns(&self, ns: u64) {
        self.now_ns.fetch_add(ns, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.advance_ns(u64::try_from(by.as_nanos()).unwrap_or(u64::MAX));
    }

    pub fn set_ns(&self, ns: u64) {
        self.now_ns.store(ns, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ns(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst)
    }
}

/// Largest `CLKPS` selector the hardware accepts (`/256`).
pub const MAX_CLKPS: u8 = 8;

/// Decodes a `CLKPR` write.
///
/// Returns `Ok(None)` for a write that only arms the change-enable bit, `Ok(Some(hz))` for a
/// rate change and an error for a selector outside `0..=8`.
pub fn decode_clkpr(base_hz: u32, value: u8) -> Result<Option<u32>, ChipError> {
    if value & clkpr::CLKPCE != 0 {
        return Ok(None);
    }
    let selector = value & clkpr::CLKPS_MASK;
    if selector > MAX_CLKPS {
        return Err(ChipError::InvalidClockPrescale(selector));
    }
    Ok(Some(base_hz >> selector))
}

/// Prescaler used by a timer clock-select field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSelect {
    Stopped,
    Div(u32),
}

/// Decodes the `CSx[2:0]` field shared by both timers.
///
/// External clock sources (6 and 7) cannot be emulated; they fall back to `/1024`.
pub fn decode_clock_select(timer: TimerId, cs: u8) -> (ClockSelect, Option<ChipError>) {
    match cs & 0x07 {
        0 => (ClockSelect::Stopped, None),
        1 => (ClockSelect::Div(1), None),
        2 => (ClockSelect::Div(8), None),
        3 => (ClockSelect::Div(64), None),
        4 => (ClockSelect::Div(256), None),
        5 => (ClockSelect::Div(1024), None),
        select => (
            ClockSelect::Div(1024),
            Some(ChipError::UnsupportedClockSource { timer, select }),
        ),
    }
}

/// Duration of `ticks` timer ticks at `system_hz / prescale`, rounded up to whole nanoseconds.
pub fn ticks_to_duration(ticks: u64, prescale: u32, system_hz: u32) -> Duration {
    if system_hz == 0 {
        return Duration::ZERO;
    }
    let numer = u128::from(ticks) * u128::from(prescale) * 1_000_000_000u128;
    let denom = u128::from(system_hz);
    let ns = (numer + denom - 1) / denom;
    Duration::from_nanos(u64::try_from(ns).unwrap_or(u64::MAX))
}

/// Whole timer ticks elapsed in `elapsed_ns`.
pub fn ns_to_ticks(elapsed_ns: u64, prescale: u32, system_hz: u32) -> u64 {
    if prescale == 0 {
        return 0;
    }
    let ticks = u128::from(elapsed_ns) * u128::from(system_hz)
        / (u128::from(prescale) * 1_000_000_000u128);
    u64::try_from(ticks).unwrap_or(u64::MAX)
}
