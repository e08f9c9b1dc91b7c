use attiny_core::Mcu;
use attiny_keypad::{button, firmware};

/// Holding exactly these buttons leaves momentary mode.
const TOGGLE_CHORD: u16 = button(0) | button(4);
const DEBOUNCE_MS: u64 = 10;

pub(super) fn main(mcu: &Mcu) {
    firmware::init_ports(mcu);

    let mut held = 0;
    while held != TOGGLE_CHORD {
        if !mcu.is_powered() {
            return;
        }
        held = firmware::read_buttons(mcu);
        firmware::write_leds(mcu, held);
    }

    tracing::debug!("echo: toggle mode");
    let mut leds = 0;
    while mcu.is_powered() {
        let now = firmware::read_buttons_debounced(mcu, DEBOUNCE_MS);
        // Newly pressed buttons flip their LED.
        leds ^= (held ^ now) & now;
        firmware::write_leds(mcu, leds);
        held = now;
    }
}
