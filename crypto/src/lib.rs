// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! BLS12-381 primitives for the randomness beacon: secret/public
//! polynomials, plain and threshold BLS signatures, and the DH share-box
//! used to encrypt verifiable-secret-sharing deals.
//!
//! Long-term and distributed public keys live in G1, signatures in G2,
//! matching the classic drand chain parameters.

pub mod bls;
pub mod poly;
pub mod sharebox;
pub mod tbls;

pub use blstrs::{G1Affine, G1Projective, G2Affine, G2Projective, Scalar};

use thiserror::Error;

/// Domain separation tag for hashing messages onto G2.
pub const DST_G2: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_NUL_";

/// Compressed sizes of the encodings used on the wire.
pub const G1_SIZE: usize = 48;
pub const G2_SIZE: usize = 96;
pub const SCALAR_SIZE: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid point encoding")]
    InvalidPoint,
    #[error("invalid scalar encoding")]
    InvalidScalar,
    #[error("signature share is truncated")]
    TruncatedShare,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("not enough shares: {0} given, {1} required")]
    NotEnoughShares(usize, usize),
    #[error("duplicate share index {0}")]
    DuplicateShare(u32),
    #[error("share decryption failed")]
    DecryptionFailed,
    #[error("polynomial degrees do not match")]
    DegreeMismatch,
}

/// Decodes a compressed G1 point.
pub fn g1_from_bytes(bytes: &[u8]) -> Result<G1Projective, CryptoError> {
    let bytes: &[u8; G1_SIZE] = bytes.try_into().map_err(|_| CryptoError::InvalidPoint)?;
    Option::from(G1Affine::from_compressed(bytes))
        .map(|p: G1Affine| p.into())
        .ok_or(CryptoError::InvalidPoint)
}

/// Encodes a G1 point in compressed form.
pub fn g1_to_bytes(point: &G1Projective) -> Vec<u8> {
    use group::Curve;
    point.to_affine().to_compressed().to_vec()
}

/// Decodes a compressed G2 point.
pub fn g2_from_bytes(bytes: &[u8]) -> Result<G2Projective, CryptoError> {
    let bytes: &[u8; G2_SIZE] = bytes.try_into().map_err(|_| CryptoError::InvalidPoint)?;
    Option::from(G2Affine::from_compressed(bytes))
        .map(|p: G2Affine| p.into())
        .ok_or(CryptoError::InvalidPoint)
}

/// Encodes a G2 point in compressed form.
pub fn g2_to_bytes(point: &G2Projective) -> Vec<u8> {
    use group::Curve;
    point.to_affine().to_compressed().to_vec()
}

/// Decodes a big-endian scalar.
pub fn scalar_from_bytes(bytes: &[u8]) -> Result<Scalar, CryptoError> {
    let bytes: &[u8; SCALAR_SIZE] = bytes.try_into().map_err(|_| CryptoError::InvalidScalar)?;
    Option::from(Scalar::from_bytes_be(bytes)).ok_or(CryptoError::InvalidScalar)
}

/// Encodes a scalar in big-endian form.
pub fn scalar_to_bytes(scalar: &Scalar) -> Vec<u8> {
    scalar.to_bytes_be().to_vec()
}
