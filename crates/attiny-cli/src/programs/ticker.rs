use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use attiny_core::regs::{tccr1, OCR1A};
use attiny_core::{Mcu, McuBuilder, RegisterAddress, TimerIrq, Vector};
use attiny_keypad::{firmware, BUTTON_MASK};

/// 250 ms at clk/8 with the chip at its 1 MHz power-on clock.
pub(super) const TICK_TOP: u16 = 31_250;

pub(super) fn configure(builder: McuBuilder) -> McuBuilder {
    let ticks = Arc::new(AtomicU16::new(0));
    builder.bind(Vector::Timer1CompA, move |mcu| {
        let count = ticks.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        firmware::write_leds(mcu, count & BUTTON_MASK);
    })
}

pub(super) fn main(mcu: &Mcu) {
    firmware::init_ports(mcu);

    mcu.write(RegisterAddress::Tccr1a, 0);
    mcu.reg16(OCR1A).write(TICK_TOP);
    mcu.write(RegisterAddress::Tccr1b, tccr1::WGM12 | tccr1::CS11);
    mcu.write(RegisterAddress::Timsk, TimerIrq::OCF1A.bits());
    mcu.sei();

    while mcu.is_powered() {
        mcu.sleep_until_interrupt();
    }
}
