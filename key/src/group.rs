// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::{Identity, KeyError};
use lantern_crypto::poly::PubPoly;
use lantern_crypto::{g1_to_bytes, G1Projective};
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Coefficients of the distributed public key.
///
/// The constant coefficient is the key the chain's threshold signatures
/// verify against; the full polynomial verifies individual partials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistPublic {
    pub coefficients: Vec<G1Projective>,
}

impl DistPublic {
    pub fn key(&self) -> &G1Projective {
        &self.coefficients[0]
    }

    pub fn pub_poly(&self) -> PubPoly {
        PubPoly::from_commits(self.coefficients.clone())
    }
}

/// Minimum threshold tolerated for a group of `n` nodes: more than half of
/// the group must sign.
pub fn minimum_threshold(n: usize) -> u32 {
    (n as u32) / 2 + 1
}

/// The working group of a beacon network: the ordered set of member
/// identities plus the chain parameters all members agree on.
///
/// A node's index is its position in `nodes`; it is stable for the lifetime
/// of the group.
#[derive(Debug, Clone)]
pub struct Group {
    nodes: Vec<Identity>,
    pub threshold: u32,
    /// Time between two beacon rounds.
    pub period: Duration,
    /// Unix time at which round 1 is scheduled.
    pub genesis_time: i64,
    /// Unix time at which this (reshared) group takes over signing duties.
    /// Zero for a group running since genesis.
    pub transition_time: i64,
    genesis_seed: Vec<u8>,
    /// Distributed public key, present once a DKG has completed.
    pub public_key: Option<DistPublic>,
}

impl Group {
    pub fn new(
        nodes: Vec<Identity>,
        threshold: u32,
        period: Duration,
        genesis_time: i64,
    ) -> Result<Self, KeyError> {
        let min = minimum_threshold(nodes.len());
        if threshold < min || threshold as usize > nodes.len() {
            return Err(KeyError::InvalidThreshold(threshold, min));
        }
        if genesis_time == 0 {
            return Err(KeyError::ZeroGenesisTime);
        }
        if period.as_secs() == 0 {
            return Err(KeyError::ZeroPeriod);
        }
        Ok(Self {
            nodes,
            threshold,
            period,
            genesis_time,
            transition_time: 0,
            genesis_seed: Vec::new(),
            public_key: None,
        })
    }

    pub fn nodes(&self) -> &[Identity] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: u32) -> Option<&Identity> {
        self.nodes.get(index as usize)
    }

    /// Index of the given identity in the group, by public key.
    pub fn index(&self, id: &Identity) -> Option<u32> {
        self.nodes.iter().position(|n| n == id).map(|i| i as u32)
    }

    pub fn contains(&self, id: &Identity) -> bool {
        self.index(id).is_some()
    }

    /// Public keys of the members, in group order.
    pub fn points(&self) -> Vec<G1Projective> {
        self.nodes.iter().map(|n| *n.public_key()).collect()
    }

    /// Overrides the genesis seed. Reshared groups inherit the seed of the
    /// chain they continue.
    pub fn set_genesis_seed(&mut self, seed: Vec<u8>) {
        self.genesis_seed = seed;
    }

    /// The seed signed into the round-0 beacon. Derived from the group
    /// description when not explicitly inherited.
    pub fn genesis_seed(&self) -> Vec<u8> {
        if !self.genesis_seed.is_empty() {
            return self.genesis_seed.clone();
        }
        let mut hasher = Sha256::new();
        for node in &self.nodes {
            hasher.update(node.address().as_bytes());
            hasher.update(g1_to_bytes(node.public_key()));
        }
        hasher.update(self.threshold.to_be_bytes());
        hasher.update(self.genesis_time.to_be_bytes());
        hasher.finalize().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Pair;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn identities(n: usize) -> Vec<Identity> {
        let mut rng = StdRng::seed_from_u64(4);
        (0..n)
            .map(|i| {
                Pair::generate(&mut rng, format!("127.0.0.1:{}", 9000 + i), false)
                    .unwrap()
                    .public()
                    .clone()
            })
            .collect()
    }

    #[test]
    fn indices_follow_node_order() {
        let ids = identities(4);
        let group = Group::new(ids.clone(), 3, Duration::from_secs(2), 100).unwrap();
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(group.index(id), Some(i as u32));
        }
    }

    #[test]
    fn group_validation() {
        let ids = identities(4);
        assert!(matches!(
            Group::new(ids.clone(), 1, Duration::from_secs(2), 100),
            Err(KeyError::InvalidThreshold(1, 3))
        ));
        // Exactly half the group is still below the minimum.
        assert!(matches!(
            Group::new(ids.clone(), 2, Duration::from_secs(2), 100),
            Err(KeyError::InvalidThreshold(2, 3))
        ));
        assert!(Group::new(ids.clone(), 3, Duration::from_secs(2), 100).is_ok());
        assert!(matches!(
            Group::new(ids.clone(), 3, Duration::from_secs(2), 0),
            Err(KeyError::ZeroGenesisTime)
        ));
        assert!(matches!(
            Group::new(ids, 3, Duration::from_secs(0), 100),
            Err(KeyError::ZeroPeriod)
        ));
    }

    #[test]
    fn genesis_seed_is_stable() {
        let ids = identities(3);
        let group = Group::new(ids, 2, Duration::from_secs(2), 100).unwrap();
        assert_eq!(group.genesis_seed(), group.genesis_seed());
        assert_eq!(group.genesis_seed().len(), 32);

        let mut inherited = group.clone();
        inherited.set_genesis_seed(vec![1, 2, 3]);
        assert_eq!(inherited.genesis_seed(), vec![1, 2, 3]);
    }
}
