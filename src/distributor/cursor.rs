//! Shared allocation cursor.
//!
//! On targets with 64-bit atomics the cursor is a single `AtomicU64` and every
//! advance is lock-free. Elsewhere (or when explicitly requested) it falls back
//! to a mutex-guarded counter with identical semantics.

#[cfg(target_has_atomic = "64")]
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Monotonically advancing position in the canonical iteration space (or in
/// the chunk-index space for index-addressed policies).
#[derive(Debug)]
pub enum Cursor {
    #[cfg(target_has_atomic = "64")]
    Atomic(AtomicU64),
    Locked(Mutex<u64>),
}

impl Cursor {
    /// Cursor using the fast path when the platform supports it.
    pub fn new(start: u64) -> Self {
        #[cfg(target_has_atomic = "64")]
        {
            Cursor::Atomic(AtomicU64::new(start))
        }
        #[cfg(not(target_has_atomic = "64"))]
        {
            Cursor::Locked(Mutex::new(start))
        }
    }

    /// Cursor that always takes the mutex path.
    pub fn locked(start: u64) -> Self {
        Cursor::Locked(Mutex::new(start))
    }

    pub fn is_atomic(&self) -> bool {
        !matches!(self, Cursor::Locked(_))
    }

    /// Current position.
    #[inline]
    pub fn load(&self) -> u64 {
        match self {
            #[cfg(target_has_atomic = "64")]
            Cursor::Atomic(pos) => pos.load(Ordering::Acquire),
            Cursor::Locked(pos) => *pos.lock(),
        }
    }

    /// Advance by `n` and return the previous position.
    ///
    /// Callers must ensure the cursor cannot wrap.
    #[inline]
    pub fn fetch_add(&self, n: u64) -> u64 {
        match self {
            #[cfg(target_has_atomic = "64")]
            Cursor::Atomic(pos) => pos.fetch_add(n, Ordering::AcqRel),
            Cursor::Locked(pos) => {
                let mut pos = pos.lock();
                let old = *pos;
                *pos = old.saturating_add(n);
                old
            }
        }
    }

    /// Advance from the current position to `advance(current)`.
    ///
    /// Returns `(old, new)` on success, or `None` as soon as `advance` declines
    /// (no work left). The closure may run several times under contention.
    pub fn claim(&self, advance: impl Fn(u64) -> Option<u64>) -> Option<(u64, u64)> {
        match self {
            #[cfg(target_has_atomic = "64")]
            Cursor::Atomic(pos) => {
                let mut current = pos.load(Ordering::Acquire);
                loop {
                    let next = advance(current)?;
                    match pos.compare_exchange_weak(
                        current,
                        next,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => return Some((current, next)),
                        Err(actual) => current = actual,
                    }
                }
            }
            Cursor::Locked(pos) => {
                let mut pos = pos.lock();
                let old = *pos;
                let next = advance(old)?;
                *pos = next;
                Some((old, next))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_add_both_paths() {
        for cursor in [Cursor::new(0), Cursor::locked(0)] {
            assert_eq!(cursor.fetch_add(5), 0);
            assert_eq!(cursor.fetch_add(3), 5);
            assert_eq!(cursor.load(), 8);
        }
    }

    #[test]
    fn test_claim_stops_when_declined() {
        for cursor in [Cursor::new(0), Cursor::locked(0)] {
            let step = |pos: u64| (pos < 10).then(|| (pos + 4).min(10));
            assert_eq!(cursor.claim(step), Some((0, 4)));
            assert_eq!(cursor.claim(step), Some((4, 8)));
            assert_eq!(cursor.claim(step), Some((8, 10)));
            assert_eq!(cursor.claim(step), None);
            assert_eq!(cursor.load(), 10);
        }
    }

    #[test]
    fn test_locked_is_not_atomic() {
        assert!(!Cursor::locked(0).is_atomic());
    }

    #[test]
    fn test_concurrent_claims_are_disjoint() {
        let cursor = std::sync::Arc::new(Cursor::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cursor = std::sync::Arc::clone(&cursor);
                std::thread::spawn(move || {
                    let mut total = 0;
                    while let Some((old, new)) = cursor.claim(|p| (p < 1000).then_some(p + 1)) {
                        total += new - old;
                    }
                    total
                })
            })
            .collect();
        let total: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 1000);
    }
}
