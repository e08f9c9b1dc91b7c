use std::sync::Arc;

use crate::clock::{decode_clock_select, ClockSelect};
use crate::error::ChipError;
use crate::regs::{tccr0, RegisterAddress, TimerId, TimerIrq, CS_MASK};
use crate::vectors::Vector;

use super::{Match, Schedule, TimerCore, TimerEngine, TimerSnapshot};

const NORMAL: u8 = 0;
const CTC: u8 = 2;
const OVERFLOW_TOP: u32 = 256;

/// Timer/Counter0, 8 bits wide.
#[derive(Debug)]
pub struct Timer0 {
    core: Arc<TimerCore>,
}

impl Timer0 {
    pub fn new(core: Arc<TimerCore>) -> Self {
        Self { core }
    }
}

/// `WGM0[2:0]`, spread over `TCCR0A` and `TCCR0B`.
pub fn waveform_mode(tccr0a: u8, tccr0b: u8) -> u8 {
    ((tccr0b & tccr0::WGM02) >> 1) | (tccr0a & (tccr0::WGM01 | tccr0::WGM00))
}

/// Cycle description for the given Timer0 register values, plus any configuration faults.
pub fn compute_schedule(
    tccr0a: u8,
    tccr0b: u8,
    ocr0a: u8,
    ocr0b: u8,
) -> (Option<Schedule>, Vec<ChipError>) {
    let mut faults = Vec::new();
    let (select, fault) = decode_clock_select(TimerId::Timer0, tccr0b & CS_MASK);
    faults.extend(fault);
    let ClockSelect::Div(prescale) = select else {
        return (None, faults);
    };

    let mode = match waveform_mode(tccr0a, tccr0b) {
        mode @ (NORMAL | CTC) => mode,
        mode => {
            faults.push(ChipError::UnsupportedWaveform {
                timer: TimerId::Timer0,
                mode,
            });
            CTC
        }
    };

    let (ocr0a, ocr0b) = (u32::from(ocr0a), u32::from(ocr0b));
    let schedule = if mode == NORMAL {
        let mut matches = vec![Match {
            tick: OVERFLOW_TOP,
            vector: Vector::Timer0Ovf,
        }];
        if ocr0a != 0 {
            matches.push(Match {
                tick: ocr0a,
                vector: Vector::Timer0CompA,
            });
        }
        if ocr0b != 0 {
            matches.push(Match {
                tick: ocr0b,
                vector: Vector::Timer0CompB,
            });
        }
        Some(Schedule::new(prescale, OVERFLOW_TOP, matches))
    } else if ocr0a == 0 {
        None
    } else {
        let mut matches = vec![Match {
            tick: ocr0a,
            vector: Vector::Timer0CompA,
        }];
        if ocr0b != 0 && ocr0b < ocr0a {
            matches.push(Match {
                tick: ocr0b,
                vector: Vector::Timer0CompB,
            });
        }
        Some(Schedule::new(prescale, ocr0a, matches))
    };
    (schedule, faults)
}

impl TimerEngine for Timer0 {
    fn id(&self) -> TimerId {
        TimerId::Timer0
    }

    fn set(&self, reg: RegisterAddress, value: u8) {
        match reg {
            RegisterAddress::Tifr => self.core.clear_flags(value),
            RegisterAddress::Timsk => self.core.with_state(|s| s.store(reg, value)),
            RegisterAddress::Tcnt0 => {
                self.core.with_state(|s| s.store(reg, value));
                self.core.set_counter(u32::from(value));
            }
            RegisterAddress::Tccr0a
            | RegisterAddress::Tccr0b
            | RegisterAddress::Ocr0a
            | RegisterAddress::Ocr0b => {
                self.core.with_state(|s| s.store(reg, value));
                self.recompute_period();
            }
            other => tracing::debug!(%other, "register not handled by timer0"),
        }
    }

    fn get(&self, reg: RegisterAddress) -> u8 {
        match reg {
            RegisterAddress::Tcnt0 => self.core.counter() as u8,
            RegisterAddress::Tifr => (self.core.flags() & TimerIrq::TIMER0).bits(),
            other => self.core.with_state(|s| s.reg(other)),
        }
    }

    fn flags(&self) -> TimerIrq {
        self.core.flags() & TimerIrq::TIMER0
    }

    fn set_system_clock(&self, hz: u32) {
        self.core.set_system_clock(hz);
    }

    fn recompute_period(&self) {
        let (schedule, faults) = self.core.with_state(|s| {
            compute_schedule(
                s.reg(RegisterAddress::Tccr0a),
                s.reg(RegisterAddress::Tccr0b),
                s.reg(RegisterAddress::Ocr0a),
                s.reg(RegisterAddress::Ocr0b),
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
