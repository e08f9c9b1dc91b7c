//! ATtiny2313 I/O register map.
//!
//! Addresses are I/O-space offsets (the values `in`/`out` use), not data-space addresses.

use bitflags::bitflags;

/// Size of the emulated I/O space; `SREG` is the last register.
pub const REGISTER_FILE_LEN: usize = 0x40;

/// A named location in the I/O space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum RegisterAddress {
    Wdtcsr = 0x21,
    Tccr1c = 0x22,
    Icr1l = 0x24,
    Icr1h = 0x25,
    Clkpr = 0x26,
    Ocr1bl = 0x28,
    Ocr1bh = 0x29,
    Ocr1al = 0x2A,
    Ocr1ah = 0x2B,
    Tcnt1l = 0x2C,
    Tcnt1h = 0x2D,
    Tccr1b = 0x2E,
    Tccr1a = 0x2F,
    Tccr0a = 0x30,
    Tcnt0 = 0x32,
    Tccr0b = 0x33,
    Mcusr = 0x34,
    Ocr0a = 0x36,
    Tifr = 0x38,
    Timsk = 0x39,
    Ocr0b = 0x3C,
    Pind = 0x10,
    Ddrd = 0x11,
    Portd = 0x12,
    Pinb = 0x16,
    Ddrb = 0x17,
    Portb = 0x18,
    Pina = 0x19,
    Ddra = 0x1A,
    Porta = 0x1B,
    Sreg = 0x3F,
}

impl RegisterAddress {
    pub const ALL: [RegisterAddress; 31] = [
        Self::Pind,
        Self::Ddrd,
        Self::Portd,
        Self::Pinb,
        Self::Ddrb,
        Self::Portb,
        Self::Pina,
        Self::Ddra,
        Self::Porta,
        Self::Wdtcsr,
        Self::Tccr1c,
        Self::Icr1l,
        Self::Icr1h,
        Self::Clkpr,
        Self::Ocr1bl,
        Self::Ocr1bh,
        Self::Ocr1al,
        Self::Ocr1ah,
        Self::Tcnt1l,
        Self::Tcnt1h,
        Self::Tccr1b,
        Self::Tccr1a,
        Self::Tccr0a,
        Self::Tcnt0,
        Self::Tccr0b,
        Self::Mcusr,
        Self::Ocr0a,
        Self::Tifr,
        Self::Timsk,
        Self::Ocr0b,
        Self::Sreg,
    ];

    pub fn from_u8(addr: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|reg| reg.addr() == addr)
    }

    #[inline]
    pub const fn addr(self) -> u8 {
        self as u8
    }

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Datasheet mnemonic.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Pind => "PIND",
            Self::Ddrd => "DDRD",
            Self::Portd => "PORTD",
            Self::Pinb => "PINB",
            Self::Ddrb => "DDRB",
            Self::Portb => "PORTB",
            Self::Pina => "PINA",
            Self::Ddra => "DDRA",
            Self::Porta => "PORTA",
            Self::Wdtcsr => "WDTCSR",
            Self::Tccr1c => "TCCR1C",
            Self::Icr1l => "ICR1L",
            Self::Icr1h => "ICR1H",
            Self::Clkpr => "CLKPR",
            Self::Ocr1bl => "OCR1BL",
            Self::Ocr1bh => "OCR1BH",
            Self::Ocr1al => "OCR1AL",
            Self::Ocr1ah => "OCR1AH",
            Self::Tcnt1l => "TCNT1L",
            Self::Tcnt1h => "TCNT1H",
            Self::Tccr1b => "TCCR1B",
            Self::Tccr1a => "TCCR1A",
            Self::Tccr0a => "TCCR0A",
            Self::Tcnt0 => "TCNT0",
            Self::Tccr0b => "TCCR0B",
            Self::Mcusr => "MCUSR",
            Self::Ocr0a => "OCR0A",
            Self::Tifr => "TIFR",
            Self::Timsk => "TIMSK",
            Self::Ocr0b => "OCR0B",
            Self::Sreg => "SREG",
        }
    }

    /// The port this register belongs to, if it is a PORTx/DDRx/PINx register.
    pub const fn port(self) -> Option<Port> {
        match self {
            Self::Pina | Self::Ddra | Self::Porta => Some(Port::A),
            Self::Pinb | Self::Ddrb | Self::Portb => Some(Port::B),
            Self::Pind | Self::Ddrd | Self::Portd => Some(Port::D),
            _ => None,
        }
    }

    /// Which timer owns this register. `TIMSK`/`TIFR` are shared and return `None`.
    pub const fn timer(self) -> Option<TimerId> {
        match self {
            Self::Tccr0a | Self::Tccr0b | Self::Tcnt0 | Self::Ocr0a | Self::Ocr0b => {
                Some(TimerId::Timer0)
            }
            Self::Tccr1a
            | Self::Tccr1b
            | Self::Tccr1c
            | Self::Tcnt1l
            | Self::Tcnt1h
            | Self::Ocr1al
            | Self::Ocr1ah
            | Self::Ocr1bl
            | Self::Ocr1bh
            | Self::Icr1l
            | Self::Icr1h => Some(TimerId::Timer1),
            _ => None,
        }
    }

    /// True for either byte of a 16-bit Timer1 register.
    pub const fn is_wide_half(self) -> bool {
        matches!(
            self,
            Self::Tcnt1l
                | Self::Tcnt1h
                | Self::Ocr1al
                | Self::Ocr1ah
                | Self::Ocr1bl
                | Self::Ocr1bh
                | Self::Icr1l
                | Self::Icr1h
        )
    }
}

impl std::fmt::Display for RegisterAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A 16-bit register made of two adjacent byte registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WidePair {
    pub low: RegisterAddress,
    pub high: RegisterAddress,
}

pub const TCNT1: WidePair = WidePair {
    low: RegisterAddress::Tcnt1l,
    high: RegisterAddress::Tcnt1h,
};
pub const OCR1A: WidePair = WidePair {
    low: RegisterAddress::Ocr1al,
    high: RegisterAddress::Ocr1ah,
};
pub const OCR1B: WidePair = WidePair {
    low: RegisterAddress::Ocr1bl,
    high: RegisterAddress::Ocr1bh,
};
pub const ICR1: WidePair = WidePair {
    low: RegisterAddress::Icr1l,
    high: RegisterAddress::Icr1h,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Port {
    A,
    B,
    D,
}

impl Port {
    pub const ALL: [Port; 3] = [Port::A, Port::B, Port::D];

    pub const fn data(self) -> RegisterAddress {
        match self {
            Port::A => RegisterAddress::Porta,
            Port::B => RegisterAddress::Portb,
            Port::D => RegisterAddress::Portd,
        }
    }

    pub const fn direction(self) -> RegisterAddress {
        match self {
            Port::A => RegisterAddress::Ddra,
            Port::B => RegisterAddress::Ddrb,
            Port::D => RegisterAddress::Ddrd,
        }
    }

    pub const fn input(self) -> RegisterAddress {
        match self {
            Port::A => RegisterAddress::Pina,
            Port::B => RegisterAddress::Pinb,
            Port::D => RegisterAddress::Pind,
        }
    }

    pub(crate) const fn slot(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerId {
    Timer0,
    Timer1,
}

impl TimerId {
    pub const ALL: [TimerId; 2] = [TimerId::Timer0, TimerId::Timer1];

    /// The `TIMSK`/`TIFR` bits owned by this timer.
    pub const fn interrupt_bits(self) -> TimerIrq {
        match self {
            TimerId::Timer0 => TimerIrq::TIMER0,
            TimerId::Timer1 => TimerIrq::TIMER1,
        }
    }

    pub(crate) const fn slot(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for TimerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimerId::Timer0 => f.write_str("timer0"),
            TimerId::Timer1 => f.write_str("timer1"),
        }
    }
}

bitflags! {
    /// `TIMSK` enable bits and `TIFR` flag bits share one layout.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TimerIrq: u8 {
        const OCF0A = 1 << 0;
        const TOV0 = 1 << 1;
        const OCF0B = 1 << 2;
        const ICF1 = 1 << 3;
        const OCF1B = 1 << 5;
        const OCF1A = 1 << 6;
        const TOV1 = 1 << 7;

        const TIMER0 = Self::OCF0A.bits() | Self::TOV0.bits() | Self::OCF0B.bits();
        const TIMER1 = Self::ICF1.bits() | Self::OCF1B.bits() | Self::OCF1A.bits() | Self::TOV1.bits();
    }
}

/// `SREG` bits.
pub mod sreg {
    pub const I: u8 = 1 << 7;
}

/// `CLKPR` bits.
pub mod clkpr {
    pub const CLKPCE: u8 = 1 << 7;
    pub const CLKPS_MASK: u8 = 0x0F;
}

/// `TCCR0A`/`TCCR0B` bits.
pub mod tccr0 {
    pub const WGM00: u8 = 1 << 0;
    pub const WGM01: u8 = 1 << 1;
    pub const WGM02: u8 = 1 << 3;
    pub const CS00: u8 = 1 << 0;
    pub const CS01: u8 = 1 << 1;
    pub const CS02: u8 = 1 << 2;
}

/// `TCCR1A`/`TCCR1B` bits.
pub mod tccr1 {
    pub const WGM10: u8 = 1 << 0;
    pub const WGM11: u8 = 1 << 1;
    pub const WGM12: u8 = 1 << 3;
    pub const WGM13: u8 = 1 << 4;
    pub const CS10: u8 = 1 << 0;
    pub const CS11: u8 = 1 << 1;
    pub const CS12: u8 = 1 << 2;
}

/// Clock-select field shared by `TCCR0B` and `TCCR1B`.
pub const CS_MASK: u8 = 0x07;

/// Pin numbers within a port.
pub mod pin {
    pub const P0: u8 = 0;
    pub const P1: u8 = 1;
    pub const P2: u8 = 2;
    pub const P3: u8 = 3;
    pub const P4: u8 = 4;
    pub const P5: u8 = 5;
    pub const P6: u8 = 6;
    pub const P7: u8 = 7;
}

/// `_BV(bit)`.
#[inline]
pub const fn bv(bit: u8) -> u8 {
    1 << bit
}
