// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Wall-clock abstraction for the beacon protocol.
//!
//! All time-driven components (ticker, DKG timeout, delayed stop) go through
//! the [`Clock`] capability so that tests can drive them deterministically
//! with a [`TestClock`].

mod round;
mod test_clock;

pub use round::*;
pub use test_clock::TestClock;

use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;

/// Source of wall-clock time, with second granularity.
#[async_trait]
pub trait Clock: Send + Sync + 'static {
    /// Current unix timestamp in seconds.
    fn now(&self) -> i64;

    /// Suspends the calling task for the given duration.
    async fn sleep(&self, dur: Duration);
}

/// Production clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> i64 {
        Utc::now().timestamp()
    }

    async fn sleep(&self, dur: Duration) {
        async_std::task::sleep(dur).await;
    }
}
