// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::Beacon;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The chain holds no beacon yet, not even genesis.
    #[error("beacon store is empty")]
    Empty,
    /// Error originating from the backing key-value store.
    #[error("store failure: {0}")]
    Backend(String),
}

/// Persistence interface for the beacon chain.
///
/// Keyed by round with ordered access: lookups are `O(log n)` and a cursor
/// iterates rounds in increasing order.
pub trait BeaconStore: Send + Sync + 'static {
    /// Stores a beacon. Putting a round that already exists is a no-op;
    /// returns whether the beacon was newly inserted.
    fn put(&self, beacon: &Beacon) -> Result<bool, StoreError>;

    /// The highest beacon stored.
    fn last(&self) -> Result<Beacon, StoreError>;

    /// Beacon of the given round, if present.
    fn get(&self, round: u64) -> Result<Option<Beacon>, StoreError>;

    /// All stored beacons from `from_round` (inclusive) upwards, in order.
    fn cursor(&self, from_round: u64) -> Result<Box<dyn Iterator<Item = Beacon> + Send>, StoreError>;
}

/// A thread-safe in-memory chain store.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    db: Arc<RwLock<BTreeMap<u64, Beacon>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BeaconStore for MemoryStore {
    fn put(&self, beacon: &Beacon) -> Result<bool, StoreError> {
        let mut db = self.db.write();
        if db.contains_key(&beacon.round) {
            return Ok(false);
        }
        db.insert(beacon.round, beacon.clone());
        Ok(true)
    }

    fn last(&self) -> Result<Beacon, StoreError> {
        self.db
            .read()
            .values()
            .next_back()
            .cloned()
            .ok_or(StoreError::Empty)
    }

    fn get(&self, round: u64) -> Result<Option<Beacon>, StoreError> {
        Ok(self.db.read().get(&round).cloned())
    }

    fn cursor(
        &self,
        from_round: u64,
    ) -> Result<Box<dyn Iterator<Item = Beacon> + Send>, StoreError> {
        let beacons: Vec<Beacon> = self.db.read().range(from_round..).map(|(_, b)| b.clone()).collect();
        Ok(Box::new(beacons.into_iter()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beacon(round: u64) -> Beacon {
        Beacon {
            round,
            previous_round: round.saturating_sub(1),
            previous_sig: vec![round as u8],
            signature: vec![round as u8 + 1],
        }
    }

    #[test]
    fn put_is_idempotent_per_round() {
        let store = MemoryStore::new();
        assert_eq!(store.put(&beacon(1)), Ok(true));
        let mut conflicting = beacon(1);
        conflicting.signature = vec![0xde, 0xad];
        assert_eq!(store.put(&conflicting), Ok(false));
        // The first write wins.
        assert_eq!(store.get(1).unwrap().unwrap(), beacon(1));
    }

    #[test]
    fn last_returns_highest_round() {
        let store = MemoryStore::new();
        assert_eq!(store.last(), Err(StoreError::Empty));
        store.put(&beacon(2)).unwrap();
        store.put(&beacon(1)).unwrap();
        assert_eq!(store.last().unwrap().round, 2);
    }

    #[test]
    fn cursor_iterates_in_order() {
        let store = MemoryStore::new();
        for round in [3, 1, 2, 5] {
            store.put(&beacon(round)).unwrap();
        }
        let rounds: Vec<u64> = store.cursor(2).unwrap().map(|b| b.round).collect();
        assert_eq!(rounds, vec![2, 3, 5]);
    }
}
