//! Integration tests for ordered and doacross distribution.
//!
//! Threads pull chunks concurrently, but the ordered sections they run must
//! observe iteration order no matter which thread claimed which chunk.

use std::sync::Arc;
use std::thread;

use bosched::{Distributor, IterationSpace, Policy, Schedule};
use parking_lot::Mutex;

const POLICIES: [Policy; 5] = [
    Policy::Fac2,
    Policy::Fss,
    Policy::Tss,
    Policy::Css,
    Policy::Tape,
];

/// Run `threads` workers; each chunk with an odd ticket skips its ordered
/// section and only passes the turn on.
fn run_ordered(dist: Arc<Distributor>, threads: usize) -> Vec<i64> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let dist = Arc::clone(&dist);
            let seen = Arc::clone(&seen);
            thread::spawn(move || {
                while let Some(chunk) = dist.next() {
                    if chunk.ticket().is_some_and(|t| t % 2 == 1) {
                        dist.complete(&chunk);
                    } else {
                        dist.ordered(&chunk, || seen.lock().extend(chunk.values()));
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    let seen = seen.lock().clone();
    seen
}

/// Ordered sections see ascending iteration values for every policy
#[test]
fn test_ordered_every_policy() {
    for policy in POLICIES {
        let dist = Arc::new(
            Distributor::new(Schedule::adaptive(policy), 0.35, IterationSpace::upto(5000), 6)
                .into_ordered(),
        );
        let seen = run_ordered(dist, 6);
        assert!(!seen.is_empty(), "{policy}");
        assert!(seen.windows(2).all(|w| w[0] < w[1]), "{policy} out of order");
    }
}

/// Descending loops are released in their own iteration order
#[test]
fn test_ordered_descending() {
    let dist = Arc::new(
        Distributor::new(
            Schedule::baseline(Policy::Tss),
            0.5,
            IterationSpace::new(1000, -1000, -4),
            4,
        )
        .into_ordered(),
    );
    let seen = run_ordered(dist, 4);
    assert_eq!(seen.first(), Some(&1000));
    assert!(seen.windows(2).all(|w| w[0] > w[1]));
}

/// Every ticket gets released exactly once, so all threads finish
#[test]
fn test_ordered_with_locked_cursor() {
    let dist = Arc::new(
        Distributor::new(Schedule::adaptive(Policy::Fss), 0.6, IterationSpace::upto(3000), 8)
            .with_locked_cursor()
            .into_ordered(),
    );
    let seen = run_ordered(Arc::clone(&dist), 8);
    assert!(seen.windows(2).all(|w| w[0] < w[1]));
    assert!(dist.next().is_none());
}

/// Doacross nests distribute only the outer dimension, in order
#[test]
fn test_doacross_nest() {
    let dist = Arc::new(Distributor::doacross(
        Schedule::adaptive(Policy::Css),
        0.5,
        &[200, 10],
        4,
    ));
    assert!(dist.is_ordered());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let dist = Arc::clone(&dist);
            let seen = Arc::clone(&seen);
            thread::spawn(move || {
                while let Some(chunk) = dist.next() {
                    dist.ordered(&chunk, || seen.lock().extend(chunk.values()));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(*seen.lock(), (0..200).collect::<Vec<i64>>());
}
