//! Named register handles for firmware code.
//!
//! `PORTB |= _BV(PB3)` becomes `portb.set_bits(bv(3))`; every call goes through the chip.

use crate::chip::RegOp;
use crate::mcu::Mcu;
use crate::regs::{bv, RegisterAddress, WidePair};

/// One 8-bit I/O register.
#[derive(Debug, Clone)]
pub struct Reg {
    mcu: Mcu,
    addr: RegisterAddress,
}

impl Reg {
    pub(crate) fn new(mcu: Mcu, addr: RegisterAddress) -> Self {
        Self { mcu, addr }
    }

    pub fn addr(&self) -> RegisterAddress {
        self.addr
    }

    pub fn get(&self) -> u8 {
        self.mcu.get(self.addr)
    }

    pub fn apply(&self, op: RegOp) {
        self.mcu.apply(self.addr, op);
    }

    pub fn write(&self, value: u8) {
        self.apply(RegOp::Assign(value));
    }

    pub fn or_with(&self, value: u8) {
        self.apply(RegOp::Or(value));
    }

    pub fn and_with(&self, value: u8) {
        self.apply(RegOp::And(value));
    }

    pub fn xor_with(&self, value: u8) {
        self.apply(RegOp::Xor(value));
    }

    pub fn add(&self, value: u8) {
        self.apply(RegOp::Add(value));
    }

    pub fn sub(&self, value: u8) {
        self.apply(RegOp::Sub(value));
    }

    pub fn inc(&self) {
        self.apply(RegOp::Inc);
    }

    pub fn dec(&self) {
        self.apply(RegOp::Dec);
    }

    pub fn set_bits(&self, mask: u8) {
        self.or_with(mask);
    }

    pub fn clear_bits(&self, mask: u8) {
        self.and_with(!mask);
    }

    pub fn toggle_bits(&self, mask: u8) {
        self.xor_with(mask);
    }

    pub fn bit_is_set(&self, bit: u8) -> bool {
        self.get() & bv(bit) != 0
    }
}

/// A Timer1 16-bit register, accessed in the order the `TEMP` latch requires.
#[derive(Debug, Clone)]
pub struct Reg16 {
    mcu: Mcu,
    pair: WidePair,
}

impl Reg16 {
    pub(crate) fn new(mcu: Mcu, pair: WidePair) -> Self {
        Self { mcu, pair }
    }

    pub fn pair(&self) -> WidePair {
        self.pair
    }

    /// Low byte first, which latches the high byte.
    pub fn get(&self) -> u16 {
        let low = self.mcu.get(self.pair.low);
        let high = self.mcu.get(self.pair.high);
        u16::from_le_bytes([low, high])
    }

    /// High byte first; the low byte commits both.
    pub fn write(&self, value: u16) {
        let [low, high] = value.to_le_bytes();
        self.mcu.write(self.pair.high, high);
        self.mcu.write(self.pair.low, low);
    }
}
