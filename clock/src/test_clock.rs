// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::Clock;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};

struct Waiter {
    deadline: i64,
    tx: oneshot::Sender<()>,
}

struct Inner {
    now: Mutex<i64>,
    waiters: Mutex<Vec<Waiter>>,
    // Observed by block_until so tests can wait for sleepers to park.
    waiter_count: watch::Sender<usize>,
}

/// Deterministic clock advanced explicitly by the test driver.
///
/// Sleeping tasks park on a deadline; [`TestClock::advance`] moves time
/// forward and wakes every sleeper whose deadline has been reached.
/// [`TestClock::block_until`] lets the driver wait for a known number of
/// sleepers before advancing, which removes start-up races from tests.
#[derive(Clone)]
pub struct TestClock {
    inner: Arc<Inner>,
}

impl TestClock {
    pub fn new(start: i64) -> Self {
        let (waiter_count, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                now: Mutex::new(start),
                waiters: Mutex::new(Vec::new()),
                waiter_count,
            }),
        }
    }

    /// Moves the clock forward and wakes every sleeper whose deadline is due.
    pub fn advance(&self, dur: Duration) {
        let now = {
            let mut now = self.inner.now.lock();
            *now += dur.as_secs() as i64;
            *now
        };
        let due = {
            let mut waiters = self.inner.waiters.lock();
            let (due, rest): (Vec<Waiter>, Vec<Waiter>) =
                waiters.drain(..).partition(|w| w.deadline <= now);
            *waiters = rest;
            let _ = self.inner.waiter_count.send(waiters.len());
            due
        };
        for waiter in due {
            let _ = waiter.tx.send(());
        }
    }

    /// Waits until at least `n` tasks are parked on this clock.
    pub async fn block_until(&self, n: usize) {
        let mut rx = self.inner.waiter_count.subscribe();
        loop {
            if *rx.borrow() >= n {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Number of tasks currently parked on this clock.
    pub fn sleepers(&self) -> usize {
        self.inner.waiters.lock().len()
    }
}

#[async_trait]
impl Clock for TestClock {
    fn now(&self) -> i64 {
        *self.inner.now.lock()
    }

    async fn sleep(&self, dur: Duration) {
        let dur = dur.as_secs() as i64;
        if dur <= 0 {
            return;
        }
        let rx = {
            let now = *self.inner.now.lock();
            let mut waiters = self.inner.waiters.lock();
            let (tx, rx) = oneshot::channel();
            waiters.push(Waiter {
                deadline: now + dur,
                tx,
            });
            let _ = self.inner.waiter_count.send(waiters.len());
            rx
        };
        // The sender is dropped without firing only if the clock itself is
        // dropped; treat that as a wake-up so tasks can unwind.
        let _ = rx.await;
    }
}
