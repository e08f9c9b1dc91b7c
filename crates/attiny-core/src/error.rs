use thiserror::Error;

use crate::regs::TimerId;

pub type Result<T> = std::result::Result<T, ChipError>;

/// Conditions the chip reports instead of failing.
///
/// None of these stop emulation: the chip logs them, substitutes a safe default and records
/// them in its fault log (see [`crate::Mcu::take_faults`]).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChipError {
    #[error("unknown I/O register {0:#04x}")]
    UnknownRegister(u8),

    #[error("invalid CLKPR prescale selector {0} (valid range is 0..=8)")]
    InvalidClockPrescale(u8),

    #[error("{timer}: waveform generation mode {mode} not implemented, using CTC")]
    UnsupportedWaveform { timer: TimerId, mode: u8 },

    #[error("{timer}: clock select {select} not implemented, using clk/1024")]
    UnsupportedClockSource { timer: TimerId, select: u8 },

    #[error("unknown interrupt vector {0:?}")]
    UnknownVector(String),

    #[error("EEPROM address {addr:#06x} out of range (size {size} bytes)")]
    EepromOutOfRange { addr: u16, size: usize },
}

/// Invalid [`crate::ChipConfig`] values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("base clock must be non-zero")]
    ZeroBaseClock,

    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },
}
