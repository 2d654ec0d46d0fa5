// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Threshold BLS signatures on top of Shamir-shared keys.
//!
//! A partial signature is the signer's share evaluated over the message,
//! prefixed with the signer's index as two big-endian bytes so that the
//! aggregator can place it in the Lagrange interpolation. Any `threshold`
//! valid partials recover the unique group signature, which verifies against
//! the distributed public key like a plain BLS signature.

use crate::bls;
use crate::poly::{lagrange_basis, PriShare, PubPoly};
use crate::{g2_from_bytes, g2_to_bytes, CryptoError, G2Projective};
use group::Group;

/// Length of the index prefix of a partial signature.
pub const INDEX_SIZE: usize = 2;

/// Signs the message with one share of the distributed key.
pub fn sign_partial(share: &PriShare, msg: &[u8]) -> Vec<u8> {
    let sig = bls::sign(&share.value, msg);
    let mut out = Vec::with_capacity(INDEX_SIZE + sig.len());
    out.extend_from_slice(&(share.index as u16).to_be_bytes());
    out.extend_from_slice(&sig);
    out
}

/// Extracts the signer index embedded in a partial signature.
pub fn index_of(partial: &[u8]) -> Result<u32, CryptoError> {
    let prefix: [u8; INDEX_SIZE] = partial
        .get(..INDEX_SIZE)
        .and_then(|b| b.try_into().ok())
        .ok_or(CryptoError::TruncatedShare)?;
    Ok(u32::from(u16::from_be_bytes(prefix)))
}

/// Verifies a partial signature against the public polynomial evaluated at
/// the embedded signer index.
pub fn verify_partial(public: &PubPoly, msg: &[u8], partial: &[u8]) -> Result<(), CryptoError> {
    let index = index_of(partial)?;
    bls::verify(&public.eval(index), msg, &partial[INDEX_SIZE..])
}

/// Recovers the group signature from `threshold` distinct partials.
///
/// Partials are assumed individually verified; the recovered signature
/// should still be checked with [`verify`] before use.
pub fn recover(partials: &[Vec<u8>], threshold: u32) -> Result<Vec<u8>, CryptoError> {
    let mut shares: Vec<(u32, G2Projective)> = Vec::with_capacity(threshold as usize);
    for partial in partials {
        let index = index_of(partial)?;
        if shares.iter().any(|(i, _)| *i == index) {
            continue;
        }
        shares.push((index, g2_from_bytes(&partial[INDEX_SIZE..])?));
        if shares.len() == threshold as usize {
            break;
        }
    }
    if shares.len() < threshold as usize {
        return Err(CryptoError::NotEnoughShares(
            shares.len(),
            threshold as usize,
        ));
    }
    let indices: Vec<u32> = shares.iter().map(|(i, _)| *i).collect();
    let mut sig = G2Projective::identity();
    for (index, point) in &shares {
        sig += point * lagrange_basis(&indices, *index)?;
    }
    Ok(g2_to_bytes(&sig))
}

/// Verifies a recovered signature against the distributed public key.
pub fn verify(public: &crate::G1Projective, msg: &[u8], sig: &[u8]) -> Result<(), CryptoError> {
    bls::verify(public, msg, sig)
}
