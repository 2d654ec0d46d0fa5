// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use lantern_clock::{next_round, Clock};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// One scheduled round, emitted at its scheduled time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundTick {
    pub round: u64,
    /// Unix time at which the round was scheduled.
    pub time: i64,
}

struct Subscriber {
    start_time: i64,
    tx: mpsc::UnboundedSender<RoundTick>,
}

struct Inner {
    clock: Arc<dyn Clock>,
    period: Duration,
    genesis_time: i64,
    subscribers: Mutex<Vec<Subscriber>>,
    stopped: AtomicBool,
}

/// Emits a [`RoundTick`] at every period boundary, aligned to genesis time.
///
/// Subscribers ask for ticks starting at a given time and receive every tick
/// scheduled at or after it, in order. Stopping the ticker ends every
/// subscription; receivers observe the end of their stream.
pub struct Ticker {
    inner: Arc<Inner>,
}

impl Ticker {
    pub fn new(clock: Arc<dyn Clock>, period: Duration, genesis_time: i64) -> Self {
        let inner = Arc::new(Inner {
            clock,
            period,
            genesis_time,
            subscribers: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
        });
        let ticking = inner.clone();
        async_std::task::spawn(async move {
            loop {
                let now = ticking.clock.now();
                let (round, time) = next_round(now, ticking.period, ticking.genesis_time);
                ticking
                    .clock
                    .sleep(Duration::from_secs((time - now) as u64))
                    .await;
                if ticking.stopped.load(Ordering::SeqCst) {
                    return;
                }
                let tick = RoundTick { round, time };
                ticking
                    .subscribers
                    .lock()
                    .retain(|sub| sub.start_time > time || sub.tx.send(tick).is_ok());
            }
        });
        Self { inner }
    }

    /// Subscribes to every tick scheduled at or after `start_time`.
    pub fn channel_at(&self, start_time: i64) -> mpsc::UnboundedReceiver<RoundTick> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .subscribers
            .lock()
            .push(Subscriber { start_time, tx });
        rx
    }

    /// Stops ticking and closes all subscriptions.
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        self.inner.subscribers.lock().clear();
    }
}
