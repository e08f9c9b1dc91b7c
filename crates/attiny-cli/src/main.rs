#![forbid(unsafe_code)]

use std::io::{self, Write};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use attiny_cli::{render_leds, Program};
use attiny_core::{ChipConfig, Mcu};
use attiny_keypad::{HallKeypad, BUTTON_MASK};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(about = "Runs built-in ATtiny2313 firmware against an emulated KP2B keypad")]
struct Args {
    /// Firmware to run.
    #[arg(value_enum, env = "ATTINY_PROGRAM", default_value_t = Program::Blinky)]
    program: Program,

    /// Power the chip off after N milliseconds of host time.
    #[arg(long, env = "ATTINY_RUN_MS", default_value_t = 5_000)]
    run_ms: u64,

    /// Oscillator frequency before the CLKPR divider.
    #[arg(long, env = "ATTINY_BASE_CLOCK_HZ")]
    base_clock_hz: Option<u32>,

    /// Power on at the full oscillator frequency (CKDIV8 fuse unprogrammed).
    #[arg(long, env = "ATTINY_NO_CKDIV8")]
    no_ckdiv8: bool,

    /// Buttons held from power-on, as a bitmask (1 = pressed, e.g. `0x11`).
    #[arg(long, env = "ATTINY_PRESS", value_parser = parse_mask, default_value = "0")]
    press: u16,

    /// `tracing` filter directives. Overrides `RUST_LOG`.
    #[arg(long, env = "ATTINY_LOG")]
    log_level: Option<String>,
}

fn parse_mask(raw: &str) -> Result<u16, String> {
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => raw.parse(),
    };
    parsed.map_err(|e| format!("{raw:?} is not a button mask: {e}"))
}

fn init_tracing(directives: Option<&str>) -> Result<()> {
    let filter = match directives {
        Some(directives) => EnvFilter::try_new(directives)
            .with_context(|| format!("invalid --log-level {directives:?}"))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
    Ok(())
}

fn chip_config(args: &Args) -> Result<ChipConfig> {
    let mut config = ChipConfig::from_env().context("reading ATTINY_* environment")?;
    if let Some(hz) = args.base_clock_hz {
        config.base_clock_hz = hz;
    }
    if args.no_ckdiv8 {
        config.ckdiv8 = false;
    }
    Ok(config)
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_level.as_deref())?;
    let config = chip_config(&args)?;

    let keypad = Arc::new(HallKeypad::with_seed(config.floating_seed));
    if args.press & !BUTTON_MASK != 0 {
        tracing::warn!(press = args.press, "ignoring bits above the 10 buttons");
    }
    keypad.buttons_changed(args.press);
    let leds = keypad.subscribe();

    let mcu = args
        .program
        .configure(Mcu::builder().config(config).peripheral(keypad.clone()))
        .build()
        .context("invalid chip configuration")?;
    let program = args.program;
    let firmware = mcu
        .spawn_main(move |mcu| program.run(mcu))
        .context("failed to start the firmware thread")?;

    let deadline = Instant::now() + Duration::from_millis(args.run_ms);
    let mut out = io::stdout().lock();
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        match leds.recv_timeout(left) {
            Ok(mask) => writeln!(out, "{}", render_leds(mask)).context("writing to stdout")?,
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
        }
    }
    out.flush().context("writing to stdout")?;

    mcu.power_off();
    firmware
        .join()
        .map_err(|_| anyhow!("firmware thread panicked"))?;

    let faults = mcu.take_faults();
    tracing::info!(faults = faults.len(), "powered off");
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn arguments_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn every_option_has_an_env_fallback() {
        let command = Args::command();
        let missing: Vec<_> = command
            .get_arguments()
            .filter(|arg| arg.get_id() != "help")
            .filter(|arg| arg.get_env().is_none())
            .map(|arg| arg.get_id().to_string())
            .collect();
        assert!(missing.is_empty(), "no env fallback for {missing:?}");
    }

    #[test]
    fn parses_hex_and_decimal_masks() {
        assert_eq!(parse_mask("0x11"), Ok(0x11));
        assert_eq!(parse_mask("17"), Ok(17));
        assert!(parse_mask("0xZZ").is_err());
    }
}
