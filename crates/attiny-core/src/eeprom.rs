use crate::error::{ChipError, Result};

/// EEPROM size of the ATtiny2313.
pub const EEPROM_SIZE: usize = 128;

/// Value of an erased cell.
pub const ERASED: u8 = 0xFF;

/// Non-volatile byte store. Reads and writes are plain byte accesses with no timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eeprom {
    cells: [u8; EEPROM_SIZE],
}

impl Default for Eeprom {
    fn default() -> Self {
        Self {
            cells: [ERASED; EEPROM_SIZE],
        }
    }
}

impl Eeprom {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from a saved image; missing trailing bytes read as erased.
    pub fn from_image(image: &[u8]) -> Self {
        let mut eeprom = Self::default();
        let len = image.len().min(EEPROM_SIZE);
        eeprom.cells[..len].copy_from_slice(&image[..len]);
        eeprom
    }

    fn check(addr: u16, width: usize) -> Result<usize> {
        let start = usize::from(addr);
        if start + width > EEPROM_SIZE {
            return Err(ChipError::EepromOutOfRange {
                addr,
                size: EEPROM_SIZE,
            });
        }
        Ok(start)
    }

    pub fn read_byte(&self, addr: u16) -> Result<u8> {
        let i = Self::check(addr, 1)?;
        Ok(self.cells[i])
    }

    pub fn write_byte(&mut self, addr: u16, value: u8) -> Result<()> {
        let i = Self::check(addr, 1)?;
        self.cells[i] = value;
        Ok(())
    }

    /// Little-endian, like avr-libc's `eeprom_read_word`.
    pub fn read_word(&self, addr: u16) -> Result<u16> {
        let i = Self::check(addr, 2)?;
        Ok(u16::from_le_bytes([self.cells[i], self.cells[i + 1]]))
    }

    pub fn write_word(&mut self, addr: u16, value: u16) -> Result<()> {
        let i = Self::check(addr, 2)?;
        self.cells[i..i + 2].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    pub fn erase(&mut self) {
        self.cells.fill(ERASED);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.cells
    }
}
