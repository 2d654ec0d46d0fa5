// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::KeyError;
use lantern_crypto::{bls, G1Projective, Scalar};
use rand::RngCore;
use std::fmt;

/// Information about a participant in the beacon network.
///
/// Two identities are equal when their public keys are equal; the address is
/// only how the node is reached.
#[derive(Debug, Clone)]
pub struct Identity {
    address: String,
    key: G1Projective,
    tls: bool,
}

impl Identity {
    pub fn new(address: impl Into<String>, key: G1Projective, tls: bool) -> Result<Self, KeyError> {
        let address = address.into();
        validate_address(&address)?;
        Ok(Self { address, key, tls })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn public_key(&self) -> &G1Projective {
        &self.key
    }

    pub fn is_tls(&self) -> bool {
        self.tls
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Identity {}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)
    }
}

/// Addresses must be `host:port` with a numeric port.
fn validate_address(address: &str) -> Result<(), KeyError> {
    let err = || KeyError::InvalidAddress(address.to_string());
    let (host, port) = address.rsplit_once(':').ok_or_else(err)?;
    if host.is_empty() || port.parse::<u16>().is_err() {
        return Err(err());
    }
    Ok(())
}

/// A long-term keypair bound to a network identity.
#[derive(Debug, Clone)]
pub struct Pair {
    private: Scalar,
    public: Identity,
}

impl Pair {
    /// Generates a fresh keypair for the given address.
    pub fn generate<R: RngCore>(
        rng: &mut R,
        address: impl Into<String>,
        tls: bool,
    ) -> Result<Self, KeyError> {
        use ff::Field;
        let private = Scalar::random(rng);
        let public = Identity::new(address, bls::public_key(&private), tls)?;
        Ok(Self { private, public })
    }

    pub fn public(&self) -> &Identity {
        &self.public
    }

    pub fn private(&self) -> &Scalar {
        &self.private
    }

    /// Signs with the long-term key.
    pub fn sign(&self, msg: &[u8]) -> Vec<u8> {
        bls::sign(&self.private, msg)
    }
}
