// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::StoreError;
use lantern_crypto::CryptoError;
use thiserror::Error;

/// Beacon handler error.
#[derive(Debug, Error)]
pub enum BeaconError {
    /// Construction-time misconfiguration; the handler refuses to start.
    #[error("beacon: invalid configuration: {0}")]
    ConfigInvalid(&'static str),
    /// `start` was called after the chain's genesis time.
    #[error("beacon: genesis time already passed, call catchup")]
    GenesisPassed,
    /// A partial for a round later than the current one.
    #[error("out-of-round beacon request: round {round} instead of {current}")]
    OutOfRound { round: u64, current: u64 },
    /// A partial whose previous round does not precede its round.
    #[error("invalid previous round: {previous} vs round {round}")]
    InvalidPreviousRound { round: u64, previous: u64 },
    /// No crypto info covers the requested round.
    #[error("no crypto info for round {0}")]
    NoInfoForRound(u64),
    /// The partial signature does not verify.
    #[error("invalid partial signature: {0}")]
    InvalidPartial(CryptoError),
    /// The group transition time does not fall on a round boundary.
    #[error("transition time is not a round boundary: expected {expected}, got {got}")]
    InvalidTransitionTime { expected: i64, got: i64 },
    /// `stop_at` with a time that is not in the future.
    #[error("cannot stop in the past or present")]
    StopTimeNotFuture,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}
