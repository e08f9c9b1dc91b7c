//! Hall Research KP2B keypad board, as seen from the ATtiny2313 ports.
//!
//! The board shares PORTB as an 8-bit bus between two LED latches and two button latches:
//!
//! - `PD2` / `PD3` high: LED latch A / B captures PORTB into LEDs 0..8 / 8..16. LEDs are
//!   wired to VCC, so a 0 bit lights the LED.
//! - `PD4` / `PD5` low: button latch A / B drives buttons 0..8 / 8..10 onto PINB. A pressed
//!   button reads as 0.
//!
//! The speaker on `PD1`/`PD6` is not modelled.
#![forbid(unsafe_code)]

pub mod firmware;

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, MutexGuard, PoisonError};

use attiny_core::{bv, Peripheral, RegisterAddress};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const BUTTON_COUNT: usize = 10;
pub const LED_COUNT: usize = 16;

/// Every button bit.
pub const BUTTON_MASK: u16 = (1 << BUTTON_COUNT) - 1;

/// PORTD pin assignments.
pub mod pins {
    use attiny_core::regs::pin;

    pub const SPEAKER_A: u8 = pin::P1;
    pub const LED_A_WRITE_LATCH: u8 = pin::P2;
    pub const LED_B_WRITE_LATCH: u8 = pin::P3;
    pub const SW_A_READ_OUTPUTENABLE: u8 = pin::P4;
    pub const SW_B_READ_OUTPUTENABLE: u8 = pin::P5;
    pub const SPEAKER_B: u8 = pin::P6;
}

/// Bit for button `index` in a [`HallKeypad::buttons_changed`] mask.
pub const fn button(index: usize) -> u16 {
    1 << index
}

#[derive(Debug)]
struct Board {
    port_d: u8,
    port_b: u8,
    /// Latch outputs; a 0 bit is a lit LED.
    led_latch: u16,
    /// Button latch inputs; a 0 bit is a pressed button.
    button_latch: u16,
    floating: StdRng,
    subscribers: Vec<Sender<u16>>,
}

impl Board {
    fn lit(&self) -> u16 {
        !self.led_latch
    }

    fn relatch_leds(&mut self) {
        let mut latch = self.led_latch;
        if self.port_d & bv(pins::LED_A_WRITE_LATCH) != 0 {
            latch = (latch & 0xFF00) | u16::from(self.port_b);
        }
        if self.port_d & bv(pins::LED_B_WRITE_LATCH) != 0 {
            latch = (latch & 0x00FF) | (u16::from(self.port_b) << 8);
        }
        if latch == self.led_latch {
            return;
        }
        self.led_latch = latch;
        let lit = self.lit();
        tracing::trace!(leds = lit, "LEDs changed");
        self.subscribers.retain(|tx| tx.send(lit).is_ok());
    }

    fn read_buttons(&mut self) -> u8 {
        let enabled = !self.port_d;
        let a = enabled & bv(pins::SW_A_READ_OUTPUTENABLE) != 0;
        let b = enabled & bv(pins::SW_B_READ_OUTPUTENABLE) != 0;
        if !a && !b {
            tracing::warn!("PINB read with no button latch enabled");
            return self.floating.gen();
        }
        let [low, high] = self.button_latch.to_le_bytes();
        let mut value = 0;
        if a {
            value = low;
        }
        if b {
            value |= high;
        }
        value
    }
}

/// The KP2B board. Safe to share between the chip and a UI thread.
#[derive(Debug)]
pub struct HallKeypad {
    board: Mutex<Board>,
}

impl Default for HallKeypad {
    fn default() -> Self {
        Self::new()
    }
}

impl HallKeypad {
    pub fn new() -> Self {
        Self::with_seed(0x2313)
    }

    /// `seed` drives the values read back from an undriven bus.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            board: Mutex::new(Board {
                port_d: 0,
                port_b: 0,
                led_latch: 0xFFFF,
                button_latch: 0xFFFF,
                floating: StdRng::seed_from_u64(seed),
                subscribers: Vec::new(),
            }),
        }
    }

    fn board(&self) -> MutexGuard<'_, Board> {
        self.board.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// New button state, 1 = pressed. Bits above [`BUTTON_COUNT`] are ignored.
    pub fn buttons_changed(&self, pressed: u16) {
        let pressed = pressed & BUTTON_MASK;
        tracing::trace!(buttons = pressed, "buttons changed");
        self.board().button_latch = !pressed;
    }

    /// Currently pressed buttons, 1 = pressed.
    pub fn pressed(&self) -> u16 {
        !self.board().button_latch & BUTTON_MASK
    }

    /// Currently lit LEDs, 1 = lit.
    pub fn leds(&self) -> u16 {
        self.board().lit()
    }

    pub fn is_lit(&self, led: usize) -> bool {
        led < LED_COUNT && self.leds() & (1 << led) != 0
    }

    /// Receives the lit-LED mask every time it changes.
    pub fn subscribe(&self) -> Receiver<u16> {
        let (tx, rx) = mpsc::channel();
        self.board().subscribers.push(tx);
        rx
    }
}

impl Peripheral for HallKeypad {
    fn port_changed(&self, port: RegisterAddress, value: u8) {
        let mut board = self.board();
        match port {
            RegisterAddress::Portd => board.port_d = value,
            RegisterAddress::Portb => board.port_b = value,
            other => {
                tracing::debug!(port = %other, value, "write to a port the keypad does not use");
                return;
            }
        }
        board.relatch_leds();
    }

    fn port_value(&self, pin: RegisterAddress) -> u8 {
        let mut board = self.board();
        match pin {
            RegisterAddress::Pind => board.port_d,
            RegisterAddress::Pinb => board.read_buttons(),
            _ => board.floating.gen(),
        }
    }
}
