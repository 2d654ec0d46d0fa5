// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Authenticated encryption of VSS deal shares.
//!
//! A share is sealed to a recipient's long-term G1 key with an ephemeral
//! Diffie-Hellman exchange: the symmetric key is the hash of the shared
//! point, the payload is boxed with XSalsa20-Poly1305. Only the holder of
//! the recipient secret can recompute the shared point and open the box.

use crate::{g1_from_bytes, g1_to_bytes, CryptoError, G1Projective, Scalar};
use crypto_secretbox::aead::{Aead, KeyInit};
use crypto_secretbox::{Key, Nonce, XSalsa20Poly1305};
use ff::Field;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Nonce length of the secretbox construction.
pub const NONCE_SIZE: usize = 24;

/// An encrypted share: ephemeral DH public key, nonce and ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareBox {
    pub dh_key: Vec<u8>,
    pub nonce: Vec<u8>,
    pub cipher: Vec<u8>,
}

fn symmetric_key(shared: &G1Projective) -> Key {
    let digest = Sha256::digest(g1_to_bytes(shared));
    Key::clone_from_slice(&digest)
}

/// Seals a payload to the recipient's public key.
pub fn seal<R: RngCore>(
    rng: &mut R,
    recipient: &G1Projective,
    payload: &[u8],
) -> Result<ShareBox, CryptoError> {
    let ephemeral = Scalar::random(&mut *rng);
    let dh_public = crate::bls::public_key(&ephemeral);
    let key = symmetric_key(&(recipient * ephemeral));

    let mut nonce = [0u8; NONCE_SIZE];
    rng.fill_bytes(&mut nonce);
    let cipher = XSalsa20Poly1305::new(&key)
        .encrypt(Nonce::from_slice(&nonce), payload)
        .map_err(|_| CryptoError::DecryptionFailed)?;

    Ok(ShareBox {
        dh_key: g1_to_bytes(&dh_public),
        nonce: nonce.to_vec(),
        cipher,
    })
}

/// Opens a sealed share with the recipient's secret key.
pub fn open(secret: &Scalar, boxed: &ShareBox) -> Result<Vec<u8>, CryptoError> {
    let dh_public = g1_from_bytes(&boxed.dh_key)?;
    let key = symmetric_key(&(dh_public * secret));
    if boxed.nonce.len() != NONCE_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }
    XSalsa20Poly1305::new(&key)
        .decrypt(Nonce::from_slice(&boxed.nonce), boxed.cipher.as_slice())
        .map_err(|_| CryptoError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn seal_and_open() {
        let mut rng = StdRng::seed_from_u64(5);
        let secret = Scalar::random(&mut rng);
        let public = crate::bls::public_key(&secret);

        let boxed = seal(&mut rng, &public, b"the share").unwrap();
        assert_eq!(open(&secret, &boxed).unwrap(), b"the share");
    }

    #[test]
    fn wrong_recipient_cannot_open() {
        let mut rng = StdRng::seed_from_u64(6);
        let secret = Scalar::random(&mut rng);
        let public = crate::bls::public_key(&secret);
        let other = Scalar::random(&mut rng);

        let boxed = seal(&mut rng, &public, b"the share").unwrap();
        assert_eq!(open(&other, &boxed), Err(CryptoError::DecryptionFailed));
    }

    #[test]
    fn tampered_cipher_is_rejected() {
        let mut rng = StdRng::seed_from_u64(7);
        let secret = Scalar::random(&mut rng);
        let public = crate::bls::public_key(&secret);

        let mut boxed = seal(&mut rng, &public, b"the share").unwrap();
        boxed.cipher[0] ^= 0xff;
        assert_eq!(open(&secret, &boxed), Err(CryptoError::DecryptionFailed));
    }
}
