use attiny_core::Mcu;
use attiny_keypad::{firmware, BUTTON_COUNT};

const CHASE_ROUNDS: usize = 5;
const CHASE_STEP_MS: u64 = 100;
const BLINKS: usize = 3;
const BLINK_MS: u64 = 500;
const ALTERNATE_MS: u64 = 1000;
const ALTERNATE: u16 = 0xAAAA;

/// Shows `leds` for `hold_ms`; false once the chip is off.
fn show(mcu: &Mcu, leds: u16, hold_ms: u64) -> bool {
    firmware::write_leds(mcu, leds);
    mcu.delay_ms(hold_ms);
    mcu.is_powered()
}

pub(super) fn main(mcu: &Mcu) {
    firmware::init_ports(mcu);

    for _ in 0..CHASE_ROUNDS {
        for led in 0..BUTTON_COUNT {
            if !show(mcu, 1 << led, CHASE_STEP_MS) {
                return;
            }
        }
    }

    for _ in 0..BLINKS {
        if !show(mcu, 0x0000, BLINK_MS) || !show(mcu, 0xFFFF, BLINK_MS) {
            return;
        }
    }

    tracing::debug!("blinky: alternating");
    let mut pattern = ALTERNATE;
    while show(mcu, pattern, ALTERNATE_MS) {
        pattern = !pattern;
    }
}
