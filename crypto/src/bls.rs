// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Plain BLS signatures, used to authenticate DKG packets with the nodes'
//! long-term keys.

use crate::{g2_from_bytes, g2_to_bytes, CryptoError, G1Affine, G1Projective, G2Projective, Scalar};
use blstrs::pairing;
use group::{Curve, Group};

/// Hashes a message onto G2.
pub fn hash_to_g2(msg: &[u8]) -> G2Projective {
    G2Projective::hash_to_curve(msg, crate::DST_G2, &[])
}

/// Signs the message with a long-term secret key.
pub fn sign(secret: &Scalar, msg: &[u8]) -> Vec<u8> {
    g2_to_bytes(&(hash_to_g2(msg) * secret))
}

/// Verifies a signature against a public key in G1.
pub fn verify(public: &G1Projective, msg: &[u8], sig: &[u8]) -> Result<(), CryptoError> {
    let sig = g2_from_bytes(sig)?;
    let hashed = hash_to_g2(msg).to_affine();
    let g1: G1Affine = G1Projective::generator().to_affine();
    if pairing(&public.to_affine(), &hashed) != pairing(&g1, &sig.to_affine()) {
        return Err(CryptoError::InvalidSignature);
    }
    Ok(())
}

/// Derives the G1 public key of a secret scalar.
pub fn public_key(secret: &Scalar) -> G1Projective {
    G1Projective::generator() * secret
}

#[cfg(test)]
mod tests {
    use super::*;
    use ff::Field;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn sign_and_verify() {
        let mut rng = StdRng::seed_from_u64(11);
        let secret = Scalar::random(&mut rng);
        let public = public_key(&secret);
        let sig = sign(&secret, b"hello world");
        verify(&public, b"hello world", &sig).unwrap();
        assert_eq!(
            verify(&public, b"hello there", &sig),
            Err(CryptoError::InvalidSignature)
        );
        let other = public_key(&Scalar::random(&mut rng));
        assert_eq!(
            verify(&other, b"hello world", &sig),
            Err(CryptoError::InvalidSignature)
        );
    }
}
