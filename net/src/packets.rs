// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use serde::{Deserialize, Serialize};

/// One signer's contribution to a beacon round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialBeaconPacket {
    pub round: u64,
    pub previous_round: u64,
    #[serde(with = "serde_bytes")]
    pub previous_sig: Vec<u8>,
    /// Partial signature, prefixed with the signer's index.
    #[serde(with = "serde_bytes")]
    pub partial_sig: Vec<u8>,
}

/// A completed beacon as exchanged during chain sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconPacket {
    pub round: u64,
    pub previous_round: u64,
    #[serde(with = "serde_bytes")]
    pub previous_sig: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub signature: Vec<u8>,
}

/// Asks a peer to stream its chain from the given round, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    pub from_round: u64,
}

/// A group member on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityPacket {
    pub address: String,
    #[serde(with = "serde_bytes")]
    pub key: Vec<u8>,
    pub tls: bool,
}

/// The full group description on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupPacket {
    pub nodes: Vec<IdentityPacket>,
    pub threshold: u32,
    pub period_seconds: u32,
    pub genesis_time: u64,
    pub transition_time: u64,
    #[serde(with = "serde_bytes")]
    pub genesis_seed: Vec<u8>,
    /// Coefficients of the distributed public key, compressed G1.
    pub dist_key: Vec<Vec<u8>>,
}

/// An encrypted VSS share: ephemeral DH key, dealer signature, secretbox
/// nonce and ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedShare {
    #[serde(with = "serde_bytes")]
    pub dh_key: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub signature: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub nonce: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub cipher: Vec<u8>,
}

/// One recipient's entry in a deal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealShare {
    pub share_index: u32,
    pub encrypted: EncryptedShare,
}

/// A dealer's contribution to the DKG: public commitments plus the
/// encrypted shares addressed to each recipient it is sent to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deal {
    pub dealer_index: u32,
    /// Commitments to the dealer's secret polynomial, compressed G1.
    pub commits: Vec<Vec<u8>>,
    pub shares: Vec<DealShare>,
    #[serde(with = "serde_bytes")]
    pub session_id: Vec<u8>,
}

/// A share holder's verdict on one dealer's deal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub dealer_index: u32,
    pub share_index: u32,
    pub approved: bool,
    #[serde(with = "serde_bytes")]
    pub session_id: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub signature: Vec<u8>,
}

/// A dealer's answer to a complaint: the disputed share in the clear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Justification {
    pub dealer_index: u32,
    pub share_index: u32,
    #[serde(with = "serde_bytes")]
    pub share: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub session_id: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub signature: Vec<u8>,
}

/// The DKG packet union; exactly one variant per packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DkgPacket {
    Deal(Deal),
    Response(Response),
    Justification(Justification),
}
