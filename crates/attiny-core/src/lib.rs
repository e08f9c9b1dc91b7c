//! ATtiny2313 peripheral emulation for firmware compiled to run on the host.
//!
//! Firmware talks to an [`Mcu`]: it reads and writes I/O registers, enables interrupts and
//! delays. Register writes drive the attached [`Peripheral`] and the timer engines, which run
//! as host threads and call the firmware's interrupt handlers from a [`VectorTable`] at the
//! wall-clock rate the timer registers describe. A [`Scheduler`] keeps the main program and
//! the handlers from ever running at the same time.
#![forbid(unsafe_code)]

pub mod chip;
pub mod clock;
pub mod config;
pub mod eeprom;
pub mod error;
pub mod fault;
pub mod mcu;
pub mod peripheral;
pub mod proxy;
pub mod regs;
pub mod sched;
pub mod timer;
pub mod vectors;

pub use chip::RegOp;
pub use clock::{Clock, ManualClock, StdClock};
pub use config::ChipConfig;
pub use eeprom::{Eeprom, EEPROM_SIZE};
pub use error::{ChipError, ConfigError, Result};
pub use mcu::{Mcu, McuBuilder};
pub use peripheral::Peripheral;
pub use proxy::{Reg, Reg16};
pub use regs::{bv, Port, RegisterAddress, TimerId, TimerIrq, WidePair};
pub use sched::Scheduler;
pub use timer::{Schedule, TimerSnapshot};
pub use vectors::{Vector, VectorBinding, VectorTable};
