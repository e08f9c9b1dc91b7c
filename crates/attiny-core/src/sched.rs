//! Turn-taking between the firmware main program and interrupt handlers.
//!
//! A single-core AVR only ever executes one context at a time: the main program, or one
//! interrupt vector (interrupts are disabled on vector entry). Here every context is a host
//! thread, so the [`Scheduler`] hands out a single logical running slot:
//!
//! - The main context holds the slot between [`Scheduler::main_start`] and
//!   [`Scheduler::main_stop`]. It gives the slot up around host delays so timer interrupts can
//!   run while it waits.
//! - An interrupt context waits for the global interrupt flag, clears it and takes the slot. If
//!   the main context is holding the slot at that moment it is *preempted*: it keeps its claim,
//!   but its next register access ([`Scheduler::main_checkpoint`]) blocks until the handler
//!   returns. This is instruction-boundary preemption, approximated at register accesses.
//!
//! The internal lock is only held to check and update the token, never across a sleep.
//!
//! Not modelled: the hardware guarantees that `sei` followed by `sleep` cannot lose an
//! interrupt that fires between the two instructions. [`Scheduler::main_sleep`] can miss an
//! interrupt that completes before it starts waiting.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

#[derive(Debug, Default)]
struct Token {
    /// Contexts currently executing (0 or 1 unless a handler re-enables interrupts).
    running: u32,
    /// Global interrupt enable, mirrored as `SREG.I`.
    irq_enabled: bool,
    /// The main context holds a claim on the slot (it may be preempted).
    main_claimed: bool,
    /// The main context's claim is suspended by a running interrupt handler.
    main_preempted: bool,
    /// Interrupt handlers currently executing.
    handlers: u32,
    /// Completed handler count, used as the wake signal for `main_sleep`.
    completions: u64,
    main_thread: Option<ThreadId>,
    halted: bool,
}

impl Token {
    fn main_may_run(&self) -> bool {
        self.halted || self.running == 0 || self.irq_enabled
    }

    fn claim_main(&mut self) {
        self.main_claimed = true;
        if self.handlers > 0 {
            self.main_preempted = true;
        } else {
            self.running += 1;
        }
    }

    fn release_main(&mut self) {
        if self.main_claimed && !self.main_preempted {
            self.running = self.running.saturating_sub(1);
        }
        self.main_claimed = false;
        self.main_preempted = false;
    }
}

/// The concurrency controller shared by the main context and every timer engine.
#[derive(Debug, Default)]
pub struct Scheduler {
    token: Mutex<Token>,
    cond: Condvar,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Token> {
        self.token.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, Token>) -> MutexGuard<'a, Token> {
        self.cond
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Marks the calling thread as the firmware main context.
    pub fn register_main_thread(&self) {
        self.lock().main_thread = Some(thread::current().id());
    }

    pub fn is_main_thread(&self) -> bool {
        self.lock().main_thread == Some(thread::current().id())
    }

    /// Blocks while another context runs with interrupts disabled, then claims the slot.
    pub fn main_start(&self) {
        let mut token = self.lock();
        while !token.main_may_run() {
            token = self.wait(token);
        }
        token.claim_main();
    }

    /// Releases the main context's slot and wakes every waiter.
    pub fn main_stop(&self) {
        let mut token = self.lock();
        token.release_main();
        self.cond.notify_all();
    }

    /// `sleep` instruction: release the slot, wait for an interrupt handler to complete, then
    /// reclaim the slot.
    pub fn main_sleep(&self) {
        let mut token = self.lock();
        token.release_main();
        self.cond.notify_all();

        let seen = token.completions;
        while token.completions == seen && !token.halted {
            token = self.wait(token);
        }

        while !token.main_may_run() {
            token = self.wait(token);
        }
        token.claim_main();
    }

    /// Blocks the main context while an interrupt handler has preempted it.
    ///
    /// Returns immediately for threads that are not the registered main context.
    pub fn main_checkpoint(&self) {
        let mut token = self.lock();
        if token.main_thread != Some(thread::current().id()) {
            return;
        }
        while token.main_preempted && !token.halted {
            token = self.wait(token);
        }
    }

    /// Vector entry: waits for `SREG.I`, clears it and takes the slot.
    ///
    /// Returns `false` without taking the slot once the scheduler has been halted.
    pub fn int_start(&self) -> bool {
        let mut token = self.lock();
        while !token.irq_enabled && !token.halted {
            token = self.wait(token);
        }
        if token.halted {
            return false;
        }
        token.irq_enabled = false;
        if token.main_claimed && !token.main_preempted {
            token.main_preempted = true;
            token.running = token.running.saturating_sub(1);
        }
        token.handlers += 1;
        token.running += 1;
        true
    }

    /// `reti`: re-enables interrupts, releases the slot and wakes every waiter.
    pub fn int_stop(&self) {
        let mut token = self.lock();
        token.irq_enabled = true;
        token.handlers = token.handlers.saturating_sub(1);
        token.running = token.running.saturating_sub(1);
        if token.handlers == 0 && token.main_preempted {
            token.main_preempted = false;
            token.running += 1;
        }
        token.completions = token.completions.wrapping_add(1);
        self.cond.notify_all();
    }

    /// `sei`/`cli`.
    pub fn enable_interrupts(&self, enable: bool) {
        let mut token = self.lock();
        token.irq_enabled = enable;
        if enable {
            self.cond.notify_all();
        }
    }

    /// Read-modify-write of the global interrupt flag.
    ///
    /// Called from the main context, it first waits out a preempting handler so the update
    /// lands on an instruction boundary rather than inside the handler.
    pub fn update_interrupts(&self, f: impl FnOnce(bool) -> bool) {
        let mut token = self.lock();
        if token.main_thread == Some(thread::current().id()) {
            while token.main_preempted && !token.halted {
                token = self.wait(token);
            }
        }
        let enable = f(token.irq_enabled);
        token.irq_enabled = enable;
        if enable {
            self.cond.notify_all();
        }
    }

    pub fn interrupts_enabled(&self) -> bool {
        self.lock().irq_enabled
    }

    /// Number of contexts currently holding the running slot.
    pub fn running(&self) -> u32 {
        self.lock().running
    }

    /// Total interrupt handlers that have returned.
    pub fn completions(&self) -> u64 {
        self.lock().completions
    }

    /// Releases every waiter for good; pending and future `int_start` calls return `false`.
    pub fn halt(&self) {
        let mut token = self.lock();
        token.halted = true;
        self.cond.notify_all();
    }

    pub fn is_halted(&self) -> bool {
        self.lock().halted
    }
}
