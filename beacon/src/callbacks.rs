// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::{Beacon, BeaconStore, StoreError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// An observer of newly appended beacons.
pub type BeaconCallback = Arc<dyn Fn(&Beacon) + Send + Sync>;

struct Worker {
    tx: mpsc::UnboundedSender<Beacon>,
}

/// Store decorator that fans every newly inserted beacon out to registered
/// callbacks.
///
/// Each callback runs on its own worker task: delivery is sequential per
/// callback and concurrent across callbacks, so a slow observer cannot
/// block aggregation. Re-registering under the same key replaces the
/// previous callback; a no-op put (round already stored) notifies nobody,
/// which gives each observer at-most-once delivery per round.
pub struct CallbackStore<S> {
    store: Arc<S>,
    workers: Mutex<HashMap<String, Worker>>,
    anonymous: AtomicUsize,
}

impl<S: BeaconStore> CallbackStore<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            workers: Mutex::new(HashMap::new()),
            anonymous: AtomicUsize::new(0),
        }
    }

    /// Registers a callback under a fresh key.
    pub fn add_callback(&self, callback: BeaconCallback) {
        let id = self.anonymous.fetch_add(1, Ordering::SeqCst);
        self.add_callback_with_key(&format!("anonymous-{id}"), callback);
    }

    /// Registers a callback under the caller's key, replacing any previous
    /// callback with the same key.
    pub fn add_callback_with_key(&self, key: &str, callback: BeaconCallback) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Beacon>();
        async_std::task::spawn(async move {
            while let Some(beacon) = rx.recv().await {
                callback(&beacon);
            }
        });
        // Dropping a replaced sender ends the old worker.
        self.workers.lock().insert(key.to_string(), Worker { tx });
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

impl<S: BeaconStore> BeaconStore for CallbackStore<S> {
    fn put(&self, beacon: &Beacon) -> Result<bool, StoreError> {
        // Write and notify under one lock so concurrent writers (aggregation
        // and sync) cannot reorder the fan-out; delivery itself is async.
        let mut workers = self.workers.lock();
        let inserted = self.store.put(beacon)?;
        if inserted {
            workers.retain(|_, worker| worker.tx.send(beacon.clone()).is_ok());
        }
        Ok(inserted)
    }

    fn last(&self) -> Result<Beacon, StoreError> {
        self.store.last()
    }

    fn get(&self, round: u64) -> Result<Option<Beacon>, StoreError> {
        self.store.get(round)
    }

    fn cursor(
        &self,
        from_round: u64,
    ) -> Result<Box<dyn Iterator<Item = Beacon> + Send>, StoreError> {
        self.store.cursor(from_round)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use std::time::Duration;

    fn beacon(round: u64) -> Beacon {
        Beacon {
            round,
            ..Default::default()
        }
    }

    #[async_std::test]
    async fn callbacks_observe_each_round_exactly_once() {
        let callbacks = CallbackStore::new(Arc::new(MemoryStore::new()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        callbacks.add_callback_with_key(
            "observer",
            Arc::new(move |b: &Beacon| {
                let _ = tx.send(b.round);
            }),
        );

        callbacks.put(&beacon(1)).unwrap();
        // A second put of the same round is a no-op and must not notify.
        callbacks.put(&beacon(1)).unwrap();
        callbacks.put(&beacon(2)).unwrap();

        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
        assert!(
            async_std::future::timeout(Duration::from_millis(50), rx.recv())
                .await
                .is_err()
        );
    }

    #[async_std::test]
    async fn keyed_registration_is_idempotent() {
        let callbacks = CallbackStore::new(Arc::new(MemoryStore::new()));
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        callbacks.add_callback_with_key(
            "observer",
            Arc::new(move |b: &Beacon| {
                let _ = tx_a.send(b.round);
            }),
        );
        callbacks.add_callback_with_key(
            "observer",
            Arc::new(move |b: &Beacon| {
                let _ = tx_b.send(b.round);
            }),
        );

        callbacks.put(&beacon(1)).unwrap();
        assert_eq!(rx_b.recv().await, Some(1));
        // The replaced callback is gone.
        assert_eq!(rx_a.recv().await, None);
    }
}
