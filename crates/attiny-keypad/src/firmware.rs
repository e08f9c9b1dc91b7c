//! The firmware side of the KP2B bus: the routines a program running on the chip uses to
//! drive the latches. Everything here goes through [`Mcu`] registers only.

use attiny_core::{bv, Mcu, RegisterAddress};

use crate::{pins, BUTTON_MASK};

/// Settle time between enabling a button latch and sampling PINB.
const BUS_SETTLE_MS: u64 = 1;

/// PORTB as a high-impedance input, PD2..PD5 as outputs with both button latches disabled.
pub fn init_ports(mcu: &Mcu) {
    mcu.write(RegisterAddress::Ddrb, 0);
    mcu.write(RegisterAddress::Portb, 0);
    mcu.write(
        RegisterAddress::Ddrd,
        bv(pins::LED_A_WRITE_LATCH)
            | bv(pins::LED_B_WRITE_LATCH)
            | bv(pins::SW_A_READ_OUTPUTENABLE)
            | bv(pins::SW_B_READ_OUTPUTENABLE),
    );
    mcu.write(RegisterAddress::Portd, 0);
    let portd = mcu.reg(RegisterAddress::Portd);
    portd.set_bits(bv(pins::SW_A_READ_OUTPUTENABLE));
    portd.set_bits(bv(pins::SW_B_READ_OUTPUTENABLE));
}

/// Latches `values` (1 = lit) into the LEDs and leaves PORTB high-impedance.
pub fn write_leds(mcu: &Mcu, values: u16) {
    let [low, high] = (!values).to_le_bytes();
    let portd = mcu.reg(RegisterAddress::Portd);

    mcu.write(RegisterAddress::Ddrb, 0xFF);
    mcu.write(RegisterAddress::Portb, low);
    portd.set_bits(bv(pins::LED_A_WRITE_LATCH));
    portd.clear_bits(bv(pins::LED_A_WRITE_LATCH));
    mcu.write(RegisterAddress::Portb, high);
    portd.set_bits(bv(pins::LED_B_WRITE_LATCH));
    portd.clear_bits(bv(pins::LED_B_WRITE_LATCH));
    mcu.write(RegisterAddress::Portb, 0);

    mcu.write(RegisterAddress::Ddrb, 0);
    mcu.write(RegisterAddress::Portb, 0);
}

/// Samples both button latches. Returns 1 = pressed, buttons 0..10 only.
pub fn read_buttons(mcu: &Mcu) -> u16 {
    mcu.write(RegisterAddress::Ddrb, 0);
    mcu.write(RegisterAddress::Portb, 0);
    let portd = mcu.reg(RegisterAddress::Portd);

    portd.clear_bits(bv(pins::SW_A_READ_OUTPUTENABLE));
    mcu.delay_ms(BUS_SETTLE_MS);
    let low = mcu.get(RegisterAddress::Pinb);
    portd.set_bits(bv(pins::SW_A_READ_OUTPUTENABLE));

    portd.clear_bits(bv(pins::SW_B_READ_OUTPUTENABLE));
    mcu.delay_ms(BUS_SETTLE_MS);
    let high = mcu.get(RegisterAddress::Pinb);
    portd.set_bits(bv(pins::SW_B_READ_OUTPUTENABLE));

    !u16::from_le_bytes([low, high]) & BUTTON_MASK
}

/// Reads the buttons twice `gap_ms` apart and keeps only those held at both samples.
pub fn read_buttons_debounced(mcu: &Mcu, gap_ms: u64) -> u16 {
    let first = read_buttons(mcu);
    mcu.delay_ms(gap_ms);
    first & read_buttons(mcu)
}
