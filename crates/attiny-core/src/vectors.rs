//! Interrupt vector table.
//!
//! Firmware registers its `ISR(...)` bodies here before the MCU is built; the table is frozen
//! afterwards. A vector without a handler is simply never invoked.

use std::fmt;
use std::sync::Arc;

use crate::error::ChipError;
use crate::mcu::Mcu;
use crate::regs::{TimerId, TimerIrq};

/// The timer interrupt vectors of the ATtiny2313.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Vector {
    Timer1Capt,
    Timer1CompA,
    Timer1CompB,
    Timer1Ovf,
    Timer0Ovf,
    Timer0CompA,
    Timer0CompB,
}

impl Vector {
    pub const ALL: [Vector; 7] = [
        Vector::Timer1Capt,
        Vector::Timer1CompA,
        Vector::Timer1CompB,
        Vector::Timer1Ovf,
        Vector::Timer0Ovf,
        Vector::Timer0CompA,
        Vector::Timer0CompB,
    ];

    /// avr-libc vector name.
    pub const fn name(self) -> &'static str {
        match self {
            Vector::Timer1Capt => "TIMER1_CAPT_vect",
            Vector::Timer1CompA => "TIMER1_COMPA_vect",
            Vector::Timer1CompB => "TIMER1_COMPB_vect",
            Vector::Timer1Ovf => "TIMER1_OVF_vect",
            Vector::Timer0Ovf => "TIMER0_OVF_vect",
            Vector::Timer0CompA => "TIMER0_COMPA_vect",
            Vector::Timer0CompB => "TIMER0_COMPB_vect",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|v| v.name() == name)
    }

    pub const fn timer(self) -> TimerId {
        match self {
            Vector::Timer1Capt | Vector::Timer1CompA | Vector::Timer1CompB | Vector::Timer1Ovf => {
                TimerId::Timer1
            }
            Vector::Timer0Ovf | Vector::Timer0CompA | Vector::Timer0CompB => TimerId::Timer0,
        }
    }

    /// The `TIFR` flag raised by this event, which is also its `TIMSK` enable bit.
    pub const fn flag(self) -> TimerIrq {
        match self {
            Vector::Timer1Capt => TimerIrq::ICF1,
            Vector::Timer1CompA => TimerIrq::OCF1A,
            Vector::Timer1CompB => TimerIrq::OCF1B,
            Vector::Timer1Ovf => TimerIrq::TOV1,
            Vector::Timer0Ovf => TimerIrq::TOV0,
            Vector::Timer0CompA => TimerIrq::OCF0A,
            Vector::Timer0CompB => TimerIrq::OCF0B,
        }
    }

    const fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub type Handler = Arc<dyn Fn(&Mcu) + Send + Sync>;

#[derive(Clone, Default)]
pub enum VectorBinding {
    #[default]
    Unbound,
    Handler(Handler),
}

impl VectorBinding {
    pub fn is_bound(&self) -> bool {
        matches!(self, VectorBinding::Handler(_))
    }
}

impl fmt::Debug for VectorBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VectorBinding::Unbound => f.write_str("Unbound"),
            VectorBinding::Handler(_) => f.write_str("Handler(..)"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct VectorTable {
    bindings: [VectorBinding; Vector::ALL.len()],
}

impl VectorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind<F>(&mut self, vector: Vector, handler: F) -> &mut Self
    where
        F: Fn(&Mcu) + Send + Sync + 'static,
    {
        self.bindings[vector.slot()] = VectorBinding::Handler(Arc::new(handler));
        self
    }

    /// Binds by avr-libc name (`"TIMER0_COMPA_vect"`).
    pub fn bind_named<F>(&mut self, name: &str, handler: F) -> Result<&mut Self, ChipError>
    where
        F: Fn(&Mcu) + Send + Sync + 'static,
    {
        let vector =
            Vector::from_name(name).ok_or_else(|| ChipError::UnknownVector(name.to_owned()))?;
        Ok(self.bind(vector, handler))
    }

    pub fn unbind(&mut self, vector: Vector) -> &mut Self {
        self.bindings[vector.slot()] = VectorBinding::Unbound;
        self
    }

    pub fn binding(&self, vector: Vector) -> &VectorBinding {
        &self.bindings[vector.slot()]
    }

    pub fn is_bound(&self, vector: Vector) -> bool {
        self.binding(vector).is_bound()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_follow_avr_libc_convention() {
        for vector in Vector::ALL {
            assert_eq!(Vector::from_name(vector.name()), Some(vector));
            assert!(vector.timer().interrupt_bits().contains(vector.flag()));
        }
        assert_eq!(Vector::from_name("INT0_vect"), None);
    }

    #[test]
    fn unknown_names_are_rejected() {
        let mut table = VectorTable::new();
        let err = table.bind_named("TIMER2_COMPA_vect", |_| {}).unwrap_err();
        assert_eq!(err, ChipError::UnknownVector("TIMER2_COMPA_vect".into()));
    }

    #[test]
    fn bindings_start_unbound() {
        let mut table = VectorTable::new();
        assert!(Vector::ALL.iter().all(|v| !table.is_bound(*v)));

        table.bind_named("TIMER0_COMPA_vect", |_| {}).unwrap();
        assert!(table.is_bound(Vector::Timer0CompA));
        table.unbind(Vector::Timer0CompA);
        assert!(!table.is_bound(Vector::Timer0CompA));
    }
}
