// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Conversions between wire packets and the key-material domain types,
//! with the validation a node performs on anything received from a peer.

use crate::{GroupPacket, IdentityPacket, NetworkError};
use lantern_crypto::{g1_from_bytes, g1_to_bytes};
use lantern_key::{DistPublic, Group, Identity};
use std::time::Duration;

impl TryFrom<&IdentityPacket> for Identity {
    type Error = NetworkError;

    fn try_from(packet: &IdentityPacket) -> Result<Self, Self::Error> {
        let key = g1_from_bytes(&packet.key)
            .map_err(|e| NetworkError::InvalidPacket(e.to_string()))?;
        Identity::new(packet.address.clone(), key, packet.tls)
            .map_err(|e| NetworkError::InvalidPacket(e.to_string()))
    }
}

impl From<&Identity> for IdentityPacket {
    fn from(id: &Identity) -> Self {
        Self {
            address: id.address().to_string(),
            key: g1_to_bytes(id.public_key()),
            tls: id.is_tls(),
        }
    }
}

impl TryFrom<&GroupPacket> for Group {
    type Error = NetworkError;

    fn try_from(packet: &GroupPacket) -> Result<Self, Self::Error> {
        let nodes = packet
            .nodes
            .iter()
            .map(Identity::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let mut group = Group::new(
            nodes,
            packet.threshold,
            Duration::from_secs(u64::from(packet.period_seconds)),
            packet.genesis_time as i64,
        )
        .map_err(|e| NetworkError::InvalidPacket(e.to_string()))?;
        group.transition_time = packet.transition_time as i64;
        if !packet.genesis_seed.is_empty() {
            group.set_genesis_seed(packet.genesis_seed.clone());
        }
        if !packet.dist_key.is_empty() {
            let coefficients = packet
                .dist_key
                .iter()
                .map(|c| g1_from_bytes(c))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| NetworkError::InvalidPacket(e.to_string()))?;
            group.public_key = Some(DistPublic { coefficients });
        }
        Ok(group)
    }
}

impl From<&Group> for GroupPacket {
    fn from(group: &Group) -> Self {
        Self {
            nodes: group.nodes().iter().map(IdentityPacket::from).collect(),
            threshold: group.threshold,
            period_seconds: group.period.as_secs() as u32,
            genesis_time: group.genesis_time as u64,
            transition_time: group.transition_time as u64,
            genesis_seed: group.genesis_seed(),
            dist_key: group
                .public_key
                .as_ref()
                .map(|pk| pk.coefficients.iter().map(g1_to_bytes).collect())
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lantern_key::Pair;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn group_packet_round_trip() {
        let mut rng = StdRng::seed_from_u64(9);
        let nodes: Vec<Identity> = (0..3)
            .map(|i| {
                Pair::generate(&mut rng, format!("127.0.0.1:{}", 7000 + i), false)
                    .unwrap()
                    .public()
                    .clone()
            })
            .collect();
        let group = Group::new(nodes, 2, Duration::from_secs(30), 1_600_000_000).unwrap();

        let packet = GroupPacket::from(&group);
        let back = Group::try_from(&packet).unwrap();
        assert_eq!(back.nodes(), group.nodes());
        assert_eq!(back.threshold, group.threshold);
        assert_eq!(back.period, group.period);
        assert_eq!(back.genesis_time, group.genesis_time);
        assert_eq!(back.genesis_seed(), group.genesis_seed());
    }

    #[test]
    fn invalid_threshold_is_rejected() {
        let mut rng = StdRng::seed_from_u64(10);
        let nodes: Vec<IdentityPacket> = (0..4)
            .map(|i| {
                IdentityPacket::from(
                    Pair::generate(&mut rng, format!("127.0.0.1:{}", 7000 + i), false)
                        .unwrap()
                        .public(),
                )
            })
            .collect();
        let packet = GroupPacket {
            nodes,
            threshold: 1,
            period_seconds: 30,
            genesis_time: 1_600_000_000,
            transition_time: 0,
            genesis_seed: vec![],
            dist_key: vec![],
        };
        assert!(Group::try_from(&packet).is_err());
    }
}
