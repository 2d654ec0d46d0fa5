// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use lantern_net::BeaconPacket;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One link of the beacon chain.
///
/// Round 0 is the genesis beacon: its signature is the group's genesis seed
/// and it has no previous entry. Every later round carries the threshold
/// signature over [`round_message`] of the round and the previous signature,
/// which chains the sequence together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beacon {
    pub round: u64,
    pub previous_round: u64,
    #[serde(with = "serde_bytes")]
    pub previous_sig: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub signature: Vec<u8>,
}

impl Beacon {
    /// The genesis beacon of a chain seeded with the given bytes.
    pub fn genesis(seed: Vec<u8>) -> Self {
        Self {
            round: 0,
            previous_round: 0,
            previous_sig: Vec::new(),
            signature: seed,
        }
    }

    /// The public randomness of this round: the hash of the signature.
    pub fn randomness(&self) -> Vec<u8> {
        Sha256::digest(&self.signature).to_vec()
    }
}

/// The message signed for a round: `H(round || previous_sig)`.
pub fn round_message(round: u64, previous_sig: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(round.to_be_bytes());
    hasher.update(previous_sig);
    hasher.finalize().to_vec()
}

impl From<&Beacon> for BeaconPacket {
    fn from(b: &Beacon) -> Self {
        Self {
            round: b.round,
            previous_round: b.previous_round,
            previous_sig: b.previous_sig.clone(),
            signature: b.signature.clone(),
        }
    }
}

impl From<BeaconPacket> for Beacon {
    fn from(p: BeaconPacket) -> Self {
        Self {
            round: p.round,
            previous_round: p.previous_round,
            previous_sig: p.previous_sig,
            signature: p.signature,
        }
    }
}
