// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use lantern_crypto::CryptoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DkgError {
    /// Construction-time misconfiguration.
    #[error("dkg: invalid configuration: {0}")]
    ConfigInvalid(&'static str),
    /// A response arrived before its dealer's deal; the caller buffers it.
    #[error("dkg: response received before the dealer's deal")]
    NoDealBeforeResponse,
    #[error("dkg: session id mismatch")]
    SessionMismatch,
    #[error("dkg: unknown dealer index {0}")]
    UnknownDealer(u32),
    #[error("dkg: unknown share holder index {0}")]
    UnknownShareHolder(u32),
    #[error("dkg: deal from dealer {0} already processed")]
    DuplicateDeal(u32),
    #[error("dkg: this node holds no share in the new group")]
    NotAShareHolder,
    #[error("dkg: this node is not a dealer")]
    NotADealer,
    #[error("dkg: deals already issued")]
    DealsAlreadyIssued,
    #[error("dkg: invalid packet signature")]
    InvalidSignature,
    /// Fatal: more deal sends failed than the protocol tolerates.
    #[error("dkg: error sending deals to {failed}/{total} nodes (threshold {threshold})")]
    DealSendFailures {
        failed: usize,
        total: usize,
        threshold: u32,
    },
    /// The share or qualified group was requested before certification.
    #[error("dkg: protocol not finished")]
    NotFinished,
    #[error("dkg: only {0} qualified deals, {1} required")]
    NotEnoughQualified(usize, usize),
    #[error("dkg: missing decrypted share from qualified dealer {0}")]
    MissingDealerShare(u32),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}
