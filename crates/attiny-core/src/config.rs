use std::env;

use crate::error::ConfigError;

/// Internal RC oscillator frequency.
pub const DEFAULT_BASE_CLOCK_HZ: u32 = 8_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipConfig {
    /// Oscillator frequency before the `CLKPR` divider.
    pub base_clock_hz: u32,
    /// Models the CKDIV8 fuse: the chip powers on running at `base_clock_hz / 8`.
    pub ckdiv8: bool,
    /// Seed for the values read back from undriven input pins.
    pub floating_seed: u64,
}

impl Default for ChipConfig {
    fn default() -> Self {
        Self {
            base_clock_hz: DEFAULT_BASE_CLOCK_HZ,
            ckdiv8: true,
            floating_seed: 0x2313,
        }
    }
}

impl ChipConfig {
    /// Reads overrides from `ATTINY_BASE_CLOCK_HZ`, `ATTINY_CKDIV8` and `ATTINY_FLOATING_SEED`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(hz) = read_env("ATTINY_BASE_CLOCK_HZ", |v| v.parse::<u32>().ok())? {
            config.base_clock_hz = hz;
        }
        if let Some(ckdiv8) = read_env("ATTINY_CKDIV8", parse_bool)? {
            config.ckdiv8 = ckdiv8;
        }
        if let Some(seed) = read_env("ATTINY_FLOATING_SEED", |v| v.parse::<u64>().ok())? {
            config.floating_seed = seed;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_clock_hz == 0 {
            return Err(ConfigError::ZeroBaseClock);
        }
        Ok(())
    }

    /// Effective CPU clock right after reset.
    pub fn power_on_clock_hz(&self) -> u32 {
        if self.ckdiv8 {
            self.base_clock_hz >> 3
        } else {
            self.base_clock_hz
        }
    }
}

fn read_env<T>(
    var: &'static str,
    parse: impl FnOnce(&str) -> Option<T>,
) -> Result<Option<T>, ConfigError> {
    let Ok(raw) = env::var(var) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    parse(trimmed)
        .map(Some)
        .ok_or(ConfigError::InvalidEnv { var, value: raw })
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
