//! Demo firmware. Each program is a `main` for the chip plus the interrupt handlers it needs.
//!
//! Every program polls [`Mcu::is_powered`] so it returns once the chip is powered off.

use attiny_core::{Mcu, McuBuilder};
use clap::ValueEnum;

mod blinky;
mod echo;
mod ticker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Program {
    /// Delay-driven LED chaser, then a blink pattern.
    Blinky,
    /// Timer1 compare interrupt counting in binary on the LEDs.
    Ticker,
    /// Buttons light their LEDs; holding buttons 0 and 4 switches to toggle mode.
    Echo,
}

impl Program {
    /// Binds the program's interrupt handlers.
    pub fn configure(self, builder: McuBuilder) -> McuBuilder {
        match self {
            Program::Ticker => ticker::configure(builder),
            Program::Blinky | Program::Echo => builder,
        }
    }

    pub fn run(self, mcu: &Mcu) {
        tracing::info!(program = ?self, "firmware started");
        match self {
            Program::Blinky => blinky::main(mcu),
            Program::Ticker => ticker::main(mcu),
            Program::Echo => echo::main(mcu),
        }
        tracing::info!(program = ?self, "firmware stopped");
    }
}
