// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Key material of a beacon network: long-term node identities and
//! keypairs, the group description shared by all members, and the
//! distributed key share a node holds after a successful DKG.

mod group;
mod identity;
mod share;

pub use group::{minimum_threshold, DistPublic, Group};
pub use identity::{Identity, Pair};
pub use share::Share;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid address `{0}`: expected host:port")]
    InvalidAddress(String),
    #[error("invalid threshold: {0} vs minimum {1}")]
    InvalidThreshold(u32, u32),
    #[error("genesis time is zero")]
    ZeroGenesisTime,
    #[error("period is zero")]
    ZeroPeriod,
    #[error(transparent)]
    Crypto(#[from] lantern_crypto::CryptoError),
}
