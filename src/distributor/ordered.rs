//! FIFO release gate for ordered and doacross loops.
//!
//! Chunks of an ordered region carry a ticket in hand-out order. A thread
//! holding ticket `n` may enter its ordered section only after ticket `n - 1`
//! has been released.

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
pub struct OrderedGate {
    /// Ticket allowed to proceed
    next: Mutex<u64>,
    turn: Condvar,
}

impl OrderedGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until every ticket before `ticket` has been released.
    pub fn wait_turn(&self, ticket: u64) {
        let mut next = self.next.lock();
        while *next < ticket {
            self.turn.wait(&mut next);
        }
    }

    /// Release `ticket`, letting its successor proceed.
    ///
    /// Releasing a ticket out of turn is ignored.
    pub fn release(&self, ticket: u64) {
        let mut next = self.next.lock();
        if *next == ticket {
            *next += 1;
            self.turn.notify_all();
        }
    }

    /// Ticket currently allowed to proceed.
    pub fn current(&self) -> u64 {
        *self.next.lock()
    }
}
