//! Built-in firmware for the `attiny-run` binary.
#![forbid(unsafe_code)]

pub mod programs;

pub use programs::Program;

use attiny_keypad::LED_COUNT;

/// One line per LED state: `*` lit, `.` dark, LED 0 first, a gap between the two latches.
pub fn render_leds(mask: u16) -> String {
    let mut line = String::with_capacity(LED_COUNT + 1);
    for led in 0..LED_COUNT {
        if led == LED_COUNT / 2 {
            line.push(' ');
        }
        line.push(if mask & (1 << led) != 0 { '*' } else { '.' });
    }
    line
}
