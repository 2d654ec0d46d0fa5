// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The beacon round engine: a time-driven loop that signs each round with
//! the node's share of the distributed key, aggregates partial signatures
//! from peers into chained threshold beacons, and catches up from the
//! network when the local chain falls behind.

pub mod beacon;
mod callbacks;
mod chain;
mod errors;
mod handler;
mod safe;
mod store;
mod sync;
mod ticker;

pub use beacon::{round_message, Beacon};
pub use callbacks::{BeaconCallback, CallbackStore};
pub use chain::ChainStore;
pub use errors::BeaconError;
pub use handler::{Config, Handler};
pub use safe::{CryptoInfo, CryptoSafe};
pub use store::{BeaconStore, MemoryStore, StoreError};
pub use ticker::{RoundTick, Ticker};
