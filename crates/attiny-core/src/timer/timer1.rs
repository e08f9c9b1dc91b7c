use std::sync::Arc;

use crate::clock::{decode_clock_select, ClockSelect};
use crate::error::ChipError;
use crate::regs::{
    tccr1, RegisterAddress, TimerId, TimerIrq, WidePair, CS_MASK, ICR1, OCR1A, OCR1B, TCNT1,
};
use crate::vectors::Vector;

use super::engine::CoreState;
use super::{Match, Schedule, TimerCore, TimerEngine, TimerSnapshot};

const NORMAL: u8 = 0;
const CTC_OCR1A: u8 = 4;
const CTC_ICR1: u8 = 12;
const OVERFLOW_TOP: u32 = 1 << 16;

/// Timer/Counter1, 16 bits wide.
///
/// The four 16-bit registers share one `TEMP` latch: writing a high byte only loads `TEMP`,
/// writing the low byte commits `TEMP:low` in one step. Reading a low byte latches the high
/// byte into `TEMP`, which a following high-byte read returns.
#[derive(Debug)]
pub struct Timer1 {
    core: Arc<TimerCore>,
}

impl Timer1 {
    pub fn new(core: Arc<TimerCore>) -> Self {
        Self { core }
    }
}

/// `WGM1[3:0]`, spread over `TCCR1A` and `TCCR1B`.
pub fn waveform_mode(tccr1a: u8, tccr1b: u8) -> u8 {
    ((tccr1b & (tccr1::WGM13 | tccr1::WGM12)) >> 1) | (tccr1a & (tccr1::WGM11 | tccr1::WGM10))
}

/// Cycle description for the given Timer1 register values, plus any configuration faults.
pub fn compute_schedule(
    tccr1a: u8,
    tccr1b: u8,
    ocr1a: u16,
    ocr1b: u16,
    icr1: u16,
) -> (Option<Schedule>, Vec<ChipError>) {
    let mut faults = Vec::new();
    let (select, fault) = decode_clock_select(TimerId::Timer1, tccr1b & CS_MASK);
    faults.extend(fault);
    let ClockSelect::Div(prescale) = select else {
        return (None, faults);
    };

    let mode = match waveform_mode(tccr1a, tccr1b) {
        mode @ (NORMAL | CTC_OCR1A | CTC_ICR1) => mode,
        mode => {
            faults.push(ChipError::UnsupportedWaveform {
                timer: TimerId::Timer1,
                mode,
            });
            CTC_OCR1A
        }
    };

    let (ocr1a, ocr1b, icr1) = (u32::from(ocr1a), u32::from(ocr1b), u32::from(icr1));
    let compare = |tick: u32, vector: Vector, top: u32| {
        (tick != 0 && tick < top).then_some(Match { tick, vector })
    };

    let schedule = match mode {
        NORMAL => {
            let matches = [
                Some(Match {
                    tick: OVERFLOW_TOP,
                    vector: Vector::Timer1Ovf,
                }),
                compare(ocr1a, Vector::Timer1CompA, OVERFLOW_TOP),
                compare(ocr1b, Vector::Timer1CompB, OVERFLOW_TOP),
            ];
            Some(Schedule::new(
                prescale,
                OVERFLOW_TOP,
                matches.into_iter().flatten().collect(),
            ))
        }
        CTC_ICR1 if icr1 != 0 => {
            let matches = [
                Some(Match {
                    tick: icr1,
                    vector: Vector::Timer1Capt,
                }),
                compare(ocr1a, Vector::Timer1CompA, icr1),
                compare(ocr1b, Vector::Timer1CompB, icr1),
            ];
            Some(Schedule::new(
                prescale,
                icr1,
                matches.into_iter().flatten().collect(),
            ))
        }
        CTC_OCR1A if ocr1a != 0 => {
            let matches = [
                Some(Match {
                    tick: ocr1a,
                    vector: Vector::Timer1CompA,
                }),
                compare(ocr1b, Vector::Timer1CompB, ocr1a),
            ];
            Some(Schedule::new(
                prescale,
                ocr1a,
                matches.into_iter().flatten().collect(),
            ))
        }
        _ => None,
    };
    (schedule, faults)
}

fn wide_pair(reg: RegisterAddress) -> Option<WidePair> {
    [TCNT1, OCR1A, OCR1B, ICR1]
        .into_iter()
        .find(|pair| pair.low == reg || pair.high == reg)
}

fn stored_wide(state: &CoreState, pair: WidePair) -> u16 {
    u16::from_le_bytes([state.reg(pair.low), state.reg(pair.high)])
}

impl Timer1 {
    fn commit_wide(&self, pair: WidePair, low: u8) {
        let changed = self.core.with_state(|s| {
            let value = u16::from_le_bytes([low, s.temp]);
            let old = stored_wide(s, pair);
            s.store(pair.low, low);
            s.store(pair.high, s.temp);
            old != value
        });
        if pair == TCNT1 {
            let value = self.core.with_state(|s| stored_wide(s, pair));
            self.core.set_counter(u32::from(value));
        } else if changed {
            self.recompute_period();
        }
    }

    fn read_wide_low(&self, pair: WidePair) -> u8 {
        let value = if pair == TCNT1 {
            self.core.counter() as u16
        } else {
            self.core.with_state(|s| stored_wide(s, pair))
        };
        let [low, high] = value.to_le_bytes();
        self.core.with_state(|s| s.temp = high);
        low
    }
}

impl TimerEngine for Timer1 {
    fn id(&self) -> TimerId {
        TimerId::Timer1
    }

    fn set(&self, reg: RegisterAddress, value: u8) {
        if let Some(pair) = wide_pair(reg) {
            if reg == pair.high {
                self.core.with_state(|s| s.temp = value);
            } else {
                self.commit_wide(pair, value);
            }
            return;
        }
        match reg {
            RegisterAddress::Tifr => self.core.clear_flags(value),
            RegisterAddress::Timsk | RegisterAddress::Tccr1c => {
                self.core.with_state(|s| s.store(reg, value))
            }
            RegisterAddress::Tccr1a | RegisterAddress::Tccr1b => {
                self.core.with_state(|s| s.store(reg, value));
                self.recompute_period();
            }
            other => tracing::debug!(%other, "register not handled by timer1"),
        }
    }

    fn get(&self, reg: RegisterAddress) -> u8 {
        if let Some(pair) = wide_pair(reg) {
            return if reg == pair.high {
                self.core.with_state(|s| s.temp)
            } else {
                self.read_wide_low(pair)
            };
        }
        match reg {
            RegisterAddress::Tifr => (self.core.flags() & TimerIrq::TIMER1).bits(),
            other => self.core.with_state(|s| s.reg(other)),
        }
    }

    fn flags(&self) -> TimerIrq {
        self.core.flags() & TimerIrq::TIMER1
    }

    fn set_system_clock(&self, hz: u32) {
        self.core.set_system_clock(hz);
    }

    fn recompute_period(&self) {
        let (schedule, faults) = self.core.with_state(|s| {
            compute_schedule(
                s.reg(RegisterAddress::Tccr1a),
                s.reg(RegisterAddress::Tccr1b),
                stored_wide(s, OCR1A),
                stored_wide(s, OCR1B),
                stored_wide(s, ICR1),
            )
        });
        self.core.report(faults);
        self.core.install(schedule);
    }

    fn snapshot(&self) -> TimerSnapshot {
        self.core.snapshot()
    }

    fn shutdown(&self) {
        self.core.shutdown();
    }
}
