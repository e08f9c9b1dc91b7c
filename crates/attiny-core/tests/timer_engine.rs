mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use attiny_core::clock::ticks_to_duration;
use attiny_core::regs::{clkpr, sreg, tccr0, tccr1, ICR1, OCR1A, OCR1B, TCNT1};
use attiny_core::{
    ChipError, ManualClock, Mcu, RegisterAddress, TimerId, TimerIrq, Vector, VectorTable,
};
use proptest::prelude::*;

use common::{mcu_with, wait_until, RecordingPeripheral};

fn manual_mcu() -> (ManualClock, Mcu) {
    let clock = ManualClock::new();
    clock.set_ns(1_000_000_000);
    let mcu = mcu_with(&clock, &RecordingPeripheral::new());
    (clock, mcu)
}

/// Timer0 in CTC mode with OCR0A = `top` and clk/8.
fn start_ctc0(mcu: &Mcu, top: u8) {
    mcu.write(RegisterAddress::Tccr0a, tccr0::WGM01);
    mcu.write(RegisterAddress::Ocr0a, top);
    mcu.write(RegisterAddress::Tccr0b, tccr0::CS01);
}

#[test]
fn ctc_compare_every_800us_at_one_megahertz() {
    let stamps = Arc::new(Mutex::new(Vec::new()));
    let mut vectors = VectorTable::new();
    {
        let stamps = Arc::clone(&stamps);
        vectors.bind(Vector::Timer0CompA, move |_| {
            stamps.lock().unwrap().push(Instant::now());
        });
    }
    let mcu = Mcu::new(vectors).unwrap();
    start_ctc0(&mcu, 100);

    let snapshot = mcu.timer_snapshot(TimerId::Timer0).unwrap();
    assert_eq!(snapshot.period, Some(Duration::from_micros(800)));
    assert_eq!(snapshot.schedule.as_ref().map(|s| s.prescale), Some(8));

    let started = Instant::now();
    mcu.write(RegisterAddress::Timsk, TimerIrq::OCF0A.bits());
    mcu.sei();

    assert!(wait_until(Duration::from_secs(2), || {
        stamps.lock().unwrap().len() >= 10
    }));
    let elapsed = started.elapsed();
    mcu.power_off();

    let stamps = stamps.lock().unwrap();
    // Each cycle sleeps at least one period, so the handler can never run faster.
    let max_calls = (elapsed.as_micros() / 800 + 1) as usize;
    assert!(stamps.len() <= max_calls, "{} calls in {elapsed:?}", stamps.len());
    for pair in stamps.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_micros(700));
    }
}

#[test]
fn handler_runs_with_interrupts_disabled_and_reti_restores_them() {
    let observed = Arc::new(Mutex::new(Vec::new()));
    let mut vectors = VectorTable::new();
    {
        let observed = Arc::clone(&observed);
        vectors.bind(Vector::Timer0CompA, move |mcu| {
            let status = mcu.get(RegisterAddress::Sreg);
            observed
                .lock()
                .unwrap()
                .push((status, mcu.scheduler().running()));
        });
    }
    let mcu = Mcu::new(vectors).unwrap();
    mcu.run_main(|mcu| {
        start_ctc0(mcu, 50);
        mcu.write(RegisterAddress::Timsk, TimerIrq::OCF0A.bits());
        mcu.sei();

        assert!(wait_until(Duration::from_secs(2), || {
            observed.lock().unwrap().len() >= 3
        }));
        mcu.cli();
        let calls = observed.lock().unwrap().len();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(observed.lock().unwrap().len(), calls, "cli masks the vector");
        assert_eq!(mcu.get(RegisterAddress::Sreg) & sreg::I, 0);
    });
    mcu.power_off();

    for (status, running) in observed.lock().unwrap().iter() {
        assert_eq!(status & sreg::I, 0);
        assert_eq!(*running, 1);
    }
}

#[test]
fn flags_are_raised_without_a_bound_handler() {
    let mcu = Mcu::new(VectorTable::new()).unwrap();
    start_ctc0(&mcu, 10);
    mcu.write(RegisterAddress::Timsk, TimerIrq::OCF0A.bits());
    mcu.sei();

    assert!(wait_until(Duration::from_secs(1), || {
        mcu.get(RegisterAddress::Tifr) & TimerIrq::OCF0A.bits() != 0
    }));
    assert_eq!(mcu.scheduler().completions(), 0);
    mcu.power_off();
}

#[test]
fn masked_source_keeps_its_flag_pending() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut vectors = VectorTable::new();
    {
        let calls = Arc::clone(&calls);
        vectors.bind(Vector::Timer0CompA, move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
        });
    }
    let mcu = Mcu::new(vectors).unwrap();
    mcu.sei();
    start_ctc0(&mcu, 10);

    assert!(wait_until(Duration::from_secs(1), || {
        mcu.timer_snapshot(TimerId::Timer0)
            .is_some_and(|s| s.flags.contains(TimerIrq::OCF0A))
    }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    mcu.power_off();
}

#[test]
fn tifr_write_clears_only_the_written_flags() {
    let mcu = Mcu::new(VectorTable::new()).unwrap();
    start_ctc0(&mcu, 10);
    assert!(wait_until(Duration::from_secs(1), || {
        mcu.get(RegisterAddress::Tifr) & TimerIrq::OCF0A.bits() != 0
    }));
    // Stopped, so nothing raises the flag again.
    mcu.write(RegisterAddress::Tccr0b, 0);

    mcu.write(RegisterAddress::Tifr, TimerIrq::TOV0.bits());
    assert_eq!(mcu.get(RegisterAddress::Tifr), TimerIrq::OCF0A.bits());
    mcu.write(RegisterAddress::Tifr, TimerIrq::OCF0A.bits());
    assert_eq!(mcu.get(RegisterAddress::Tifr), 0);
    mcu.power_off();
}

/// A chip whose COMPA handler counts calls, with Timer0 running, the source enabled and
/// `SREG.I` clear. Returns once the engine has raised the flag and is waiting to enter.
fn compare_a_waiting_for_sei() -> (Arc<AtomicUsize>, Mcu) {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut vectors = VectorTable::new();
    {
        let calls = Arc::clone(&calls);
        vectors.bind(Vector::Timer0CompA, move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
        });
    }
    let mcu = Mcu::new(vectors).unwrap();
    mcu.write(RegisterAddress::Timsk, TimerIrq::OCF0A.bits());
    start_ctc0(&mcu, 10);
    assert!(wait_until(Duration::from_secs(1), || {
        mcu.get(RegisterAddress::Tifr) & TimerIrq::OCF0A.bits() != 0
    }));
    mcu.write(RegisterAddress::Tccr0b, 0);
    (calls, mcu)
}

#[test]
fn flag_cleared_before_sei_skips_the_handler() {
    let (calls, mcu) = compare_a_waiting_for_sei();
    mcu.write(RegisterAddress::Tifr, TimerIrq::OCF0A.bits());
    mcu.sei();

    assert!(wait_until(Duration::from_secs(1), || {
        mcu.scheduler().completions() >= 1
    }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(mcu.scheduler().interrupts_enabled());
    mcu.power_off();
}

#[test]
fn source_masked_before_sei_skips_the_handler() {
    let (calls, mcu) = compare_a_waiting_for_sei();
    mcu.write(RegisterAddress::Timsk, 0);
    mcu.sei();

    assert!(wait_until(Duration::from_secs(1), || {
        mcu.scheduler().completions() >= 1
    }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    // Masking does not clear the pending flag.
    assert_eq!(mcu.get(RegisterAddress::Tifr), TimerIrq::OCF0A.bits());
    mcu.power_off();
}

#[test]
fn dropping_every_handle_releases_a_waiting_engine() {
    let handler_state = Arc::new(());
    let mut vectors = VectorTable::new();
    {
        let handler_state = Arc::clone(&handler_state);
        vectors.bind(Vector::Timer0CompA, move |_| {
            let _ = &handler_state;
        });
    }
    let mcu = Mcu::new(vectors).unwrap();
    start_ctc0(&mcu, 10);
    mcu.write(RegisterAddress::Timsk, TimerIrq::OCF0A.bits());
    // Never `sei`: the engine parks waiting for SREG.I.
    thread::sleep(Duration::from_millis(50));
    assert_eq!(Arc::strong_count(&handler_state), 2);

    drop(mcu);
    assert!(
        wait_until(Duration::from_secs(1), || Arc::strong_count(&handler_state) == 1),
        "the vector table outlived every Mcu handle"
    );
}

#[test]
fn a_faulty_mode_is_reported_once_per_change() {
    let (_clock, mcu) = manual_mcu();
    mcu.write(RegisterAddress::Tccr0a, tccr0::WGM00);
    mcu.write(RegisterAddress::Tccr0b, tccr0::CS01);
    mcu.write(RegisterAddress::Ocr0a, 100);
    mcu.write(RegisterAddress::Ocr0a, 50);
    mcu.write(RegisterAddress::Ocr0b, 20);
    assert_eq!(
        mcu.take_faults(),
        vec![ChipError::UnsupportedWaveform {
            timer: TimerId::Timer0,
            mode: 1
        }]
    );

    mcu.write(RegisterAddress::Tccr0a, tccr0::WGM00 | tccr0::WGM01);
    mcu.write(RegisterAddress::Ocr0a, 60);
    assert_eq!(
        mcu.take_faults(),
        vec![ChipError::UnsupportedWaveform {
            timer: TimerId::Timer0,
            mode: 3
        }]
    );

    // Back to CTC and then into the faulty mode again reports it afresh.
    mcu.write(RegisterAddress::Tccr0a, tccr0::WGM01);
    mcu.write(RegisterAddress::Tccr0a, tccr0::WGM00);
    assert_eq!(mcu.take_faults().len(), 1);
    mcu.power_off();
}

#[test]
fn invalid_clock_prescale_keeps_the_frequency() {
    let (_clock, mcu) = manual_mcu();
    assert_eq!(mcu.clock_hz(), 1_000_000);

    mcu.write(RegisterAddress::Clkpr, clkpr::CLKPCE);
    assert_eq!(mcu.clock_hz(), 1_000_000, "change enable alone is not a rate change");
    mcu.write(RegisterAddress::Clkpr, 9);

    assert_eq!(mcu.clock_hz(), 1_000_000);
    assert_eq!(mcu.take_faults(), vec![ChipError::InvalidClockPrescale(9)]);
    assert_eq!(mcu.get(RegisterAddress::Clkpr), 9);
}

#[test]
fn unsupported_waveform_is_recorded_and_treated_as_ctc() {
    let (_clock, mcu) = manual_mcu();
    // Phase-correct PWM.
    mcu.write(RegisterAddress::Tccr0a, tccr0::WGM00);
    mcu.write(RegisterAddress::Ocr0a, 100);
    mcu.write(RegisterAddress::Tccr0b, tccr0::CS01);

    let snapshot = mcu.timer_snapshot(TimerId::Timer0).unwrap();
    assert_eq!(snapshot.period, Some(Duration::from_micros(800)));
    assert!(mcu.take_faults().contains(&ChipError::UnsupportedWaveform {
        timer: TimerId::Timer0,
        mode: 1
    }));
    mcu.power_off();
}

#[test]
fn external_clock_source_falls_back_to_div_1024() {
    let (_clock, mcu) = manual_mcu();
    mcu.write(RegisterAddress::Tccr1b, tccr1::WGM12 | 0x06);
    mcu.reg16(OCR1A).write(1_000);

    let snapshot = mcu.timer_snapshot(TimerId::Timer1).unwrap();
    assert_eq!(snapshot.schedule.as_ref().map(|s| s.prescale), Some(1024));
    assert!(mcu.take_faults().contains(&ChipError::UnsupportedClockSource {
        timer: TimerId::Timer1,
        select: 6
    }));
    mcu.power_off();
}

#[test]
fn counter_is_reconstructed_from_elapsed_time() {
    let (clock, mcu) = manual_mcu();
    // clk/1024 at 1 MHz: one tick every 1.024 ms, a cycle of 255 ticks lasts ~261 ms.
    mcu.write(RegisterAddress::Tccr0a, tccr0::WGM01);
    mcu.write(RegisterAddress::Ocr0a, 255);
    mcu.write(RegisterAddress::Tccr0b, tccr0::CS02 | tccr0::CS00);
    thread::sleep(Duration::from_millis(20));

    clock.advance(Duration::from_micros(1_024 * 10));
    assert_eq!(mcu.get(RegisterAddress::Tcnt0), 10);

    mcu.write(RegisterAddress::Tcnt0, 100);
    assert_eq!(mcu.get(RegisterAddress::Tcnt0), 100);
    clock.advance(Duration::from_micros(1_024 * 5));
    assert_eq!(mcu.get(RegisterAddress::Tcnt0), 105);

    // Stopping the clock source freezes the counter.
    mcu.write(RegisterAddress::Tccr0b, 0);
    clock.advance(Duration::from_millis(50));
    assert_eq!(mcu.get(RegisterAddress::Tcnt0), 105);
    mcu.power_off();
}

#[test]
fn timer1_ctc_on_icr1_uses_capture_vector_period() {
    let (_clock, mcu) = manual_mcu();
    mcu.write(RegisterAddress::Tccr1a, 0);
    mcu.reg16(ICR1).write(2_000);
    mcu.write(
        RegisterAddress::Tccr1b,
        tccr1::WGM13 | tccr1::WGM12 | tccr1::CS11,
    );

    let snapshot = mcu.timer_snapshot(TimerId::Timer1).unwrap();
    let schedule = snapshot.schedule.unwrap();
    assert_eq!(schedule.top, 2_000);
    assert_eq!(schedule.matches.last().map(|m| m.vector), Some(Vector::Timer1Capt));
    assert_eq!(snapshot.period, Some(Duration::from_millis(16)));
    mcu.power_off();
}

#[test]
fn committing_an_unchanged_wide_value_does_not_reconfigure() {
    let (_clock, mcu) = manual_mcu();
    mcu.write(RegisterAddress::Tccr1b, tccr1::WGM12 | tccr1::CS10);
    mcu.reg16(OCR1A).write(0x1234);
    let before = mcu.timer_snapshot(TimerId::Timer1).unwrap().reconfigurations;

    mcu.reg16(OCR1A).write(0x1234);
    assert_eq!(
        mcu.timer_snapshot(TimerId::Timer1).unwrap().reconfigurations,
        before
    );

    // The high byte alone only loads TEMP.
    mcu.write(RegisterAddress::Ocr1ah, 0x22);
    assert_eq!(mcu.reg16(OCR1A).get(), 0x1234);
    mcu.power_off();
}

#[test]
fn low_byte_read_latches_the_high_byte() {
    let (clock, mcu) = manual_mcu();
    // clk/1 at 1 MHz, normal mode: the counter advances one tick per microsecond.
    mcu.write(RegisterAddress::Tccr1b, tccr1::CS10);
    thread::sleep(Duration::from_millis(20));
    mcu.reg16(TCNT1).write(0x01FF);

    let low = mcu.get(RegisterAddress::Tcnt1l);
    clock.advance(Duration::from_micros(1));
    let high = mcu.get(RegisterAddress::Tcnt1h);
    assert_eq!((low, high), (0xFF, 0x01));
    assert_eq!(mcu.reg16(TCNT1).get(), 0x0200);
    mcu.power_off();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn wide_registers_round_trip(
        pair in proptest::sample::select(vec![TCNT1, OCR1A, OCR1B, ICR1]),
        value in any::<u16>(),
    ) {
        let (_clock, mcu) = manual_mcu();
        let reg = mcu.reg16(pair);
        reg.write(value);
        prop_assert_eq!(reg.get(), value);
    }

    #[test]
    fn clock_prescale_scales_timer_periods(selector in 0u8..=8) {
        let (_clock, mcu) = manual_mcu();
        mcu.write(RegisterAddress::Tccr0a, tccr0::WGM01);
        mcu.write(RegisterAddress::Ocr0a, 200);
        mcu.write(RegisterAddress::Tccr0b, tccr0::CS02 | tccr0::CS00);

        mcu.write(RegisterAddress::Clkpr, clkpr::CLKPCE);
        mcu.write(RegisterAddress::Clkpr, selector);

        let hz = 8_000_000u32 >> selector;
        prop_assert_eq!(mcu.clock_hz(), hz);
        let snapshot = mcu.timer_snapshot(TimerId::Timer0).unwrap();
        prop_assert_eq!(snapshot.system_clock_hz, hz);
        prop_assert_eq!(snapshot.period, Some(ticks_to_duration(200, 1024, hz)));
        // The period is inversely proportional to the clock.
        let period_ns = snapshot.period.unwrap().as_nanos();
        let expected_ns = 200u128 * 1024 * 1_000_000_000 / u128::from(hz);
        prop_assert!(period_ns.abs_diff(expected_ns) <= 1);
        mcu.power_off();
    }
}
