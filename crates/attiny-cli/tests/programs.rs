use std::process::Command;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use attiny_cli::Program;
use attiny_core::{Mcu, TimerId};
use attiny_keypad::{button, HallKeypad};

struct Running {
    keypad: Arc<HallKeypad>,
    leds: Receiver<u16>,
    mcu: Mcu,
    firmware: JoinHandle<()>,
}

impl Running {
    fn boot(program: Program) -> Self {
        let keypad = Arc::new(HallKeypad::new());
        let leds = keypad.subscribe();
        let mcu = program
            .configure(Mcu::builder().peripheral(keypad.clone()))
            .build()
            .unwrap();
        let firmware = mcu.spawn_main(move |mcu| program.run(mcu)).unwrap();
        Self {
            keypad,
            leds,
            mcu,
            firmware,
        }
    }

    fn next_leds(&self) -> u16 {
        self.leds
            .recv_timeout(Duration::from_secs(2))
            .expect("no LED change within 2s")
    }

    fn stop(self) {
        self.mcu.power_off();
        self.firmware.join().unwrap();
    }
}

#[test]
fn blinky_chases_one_led_at_a_time() {
    let run = Running::boot(Program::Blinky);
    assert_eq!(run.next_leds(), 0x0001);
    assert_eq!(run.next_leds(), 0x0002);
    assert_eq!(run.next_leds(), 0x0004);
    run.stop();
}

#[test]
fn ticker_counts_timer1_compare_interrupts() {
    let run = Running::boot(Program::Ticker);
    assert_eq!(run.next_leds(), 1);
    assert_eq!(run.next_leds(), 2);

    let snapshot = run.mcu.timer_snapshot(TimerId::Timer1).unwrap();
    assert_eq!(snapshot.period, Some(Duration::from_millis(250)));
    assert!(run.mcu.take_faults().is_empty());
    run.stop();
}

#[test]
fn echo_mirrors_held_buttons() {
    let run = Running::boot(Program::Echo);
    run.keypad.buttons_changed(button(2));
    assert_eq!(run.next_leds(), button(2));
    run.keypad.buttons_changed(0);
    assert_eq!(run.next_leds(), 0);
    run.stop();
}

#[test]
fn echo_toggles_after_the_chord() {
    let run = Running::boot(Program::Echo);
    run.keypad.buttons_changed(button(0) | button(4));
    assert_eq!(run.next_leds(), button(0) | button(4));
    run.keypad.buttons_changed(0);

    // The chord is not a fresh press in toggle mode; the LEDs go dark first.
    assert_eq!(run.next_leds(), 0);
    run.keypad.buttons_changed(button(7));
    assert_eq!(run.next_leds(), button(7));
    run.keypad.buttons_changed(0);
    std::thread::sleep(Duration::from_millis(100));
    assert!(run.keypad.is_lit(7), "released button keeps its LED on");
    run.stop();
}

#[test]
fn binary_prints_led_changes_and_exits() {
    let output = Command::new(env!("CARGO_BIN_EXE_attiny-run"))
        .args(["blinky", "--run-ms", "350", "--log-level", "warn"])
        .output()
        .expect("failed to run attiny-run");
    assert!(
        output.status.success(),
        "stderr:\n{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().next(), Some("*....... ........"));
}

#[test]
fn binary_rejects_a_bad_button_mask() {
    let output = Command::new(env!("CARGO_BIN_EXE_attiny-run"))
        .args(["echo", "--press", "buttons"])
        .output()
        .expect("failed to run attiny-run");
    assert!(!output.status.success());
}
