// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::BeaconError;
use lantern_clock::next_round;
use lantern_crypto::poly::PubPoly;
use lantern_key::{Group, Identity, Share};
use parking_lot::Mutex;
use std::sync::Arc;

/// The cryptographic material applicable from a given round onwards.
///
/// Never mutated after insertion; during a resharing the infos of the old
/// and the new group coexist and [`CryptoSafe::get_info`] resolves which one
/// applies to a round.
#[derive(Clone)]
pub struct CryptoInfo {
    pub group: Arc<Group>,
    /// Absent when this node has no share under the group (e.g. the info of
    /// a previous group registered only to verify old rounds).
    pub share: Option<Share>,
    pub pub_poly: PubPoly,
    /// Our index in the group, when we are a member.
    pub index: Option<u32>,
    /// First round this info applies to.
    pub start_at_round: u64,
    pub id: Identity,
}

/// Ordered history of [`CryptoInfo`] records, newest applicable first.
#[derive(Default)]
pub struct CryptoSafe {
    infos: Mutex<Vec<Arc<CryptoInfo>>>,
}

impl CryptoSafe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the share and group material taking effect at the group's
    /// transition round (or at genesis when the group never transitioned).
    pub fn set_info(
        &self,
        share: Option<Share>,
        id: &Identity,
        group: &Arc<Group>,
    ) -> Result<(), BeaconError> {
        let public = group
            .public_key
            .as_ref()
            .ok_or(BeaconError::ConfigInvalid("group has no distributed key"))?;
        let start_at_round = if group.transition_time != 0 {
            let (round, _) = next_round(group.transition_time, group.period, group.genesis_time);
            round - 1
        } else {
            0
        };
        let info = Arc::new(CryptoInfo {
            pub_poly: public.pub_poly(),
            index: group.index(id),
            share,
            group: group.clone(),
            start_at_round,
            id: id.clone(),
        });
        let mut infos = self.infos.lock();
        infos.push(info);
        // Highest starting round first, so lookup takes the most recent
        // applicable info.
        infos.sort_by(|a, b| b.start_at_round.cmp(&a.start_at_round));
        Ok(())
    }

    /// The info applicable to the given round.
    pub fn get_info(&self, round: u64) -> Result<Arc<CryptoInfo>, BeaconError> {
        self.infos
            .lock()
            .iter()
            .find(|info| round >= info.start_at_round)
            .cloned()
            .ok_or(BeaconError::NoInfoForRound(round))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lantern_crypto::poly::PriPoly;
    use lantern_key::{DistPublic, Pair};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::time::Duration;

    fn make_group(rng: &mut StdRng, transition_time: i64) -> (Pair, Arc<Group>) {
        let pairs: Vec<Pair> = (0..3)
            .map(|i| Pair::generate(rng, format!("127.0.0.1:{}", 8000 + i), false).unwrap())
            .collect();
        let nodes = pairs.iter().map(|p| p.public().clone()).collect();
        let mut group = Group::new(nodes, 2, Duration::from_secs(2), 1_000).unwrap();
        group.transition_time = transition_time;
        group.public_key = Some(DistPublic {
            coefficients: PriPoly::random(2, rng).commit().commits().to_vec(),
        });
        (pairs.into_iter().next().unwrap(), Arc::new(group))
    }

    #[test]
    fn lookup_selects_most_recent_applicable_info() {
        let mut rng = StdRng::seed_from_u64(21);
        let safe = CryptoSafe::new();
        let (pair, genesis_group) = make_group(&mut rng, 0);
        // Transition at 1_008: rounds from 5 on belong to the new group.
        let (_, reshared_group) = make_group(&mut rng, 1_008);

        safe.set_info(None, pair.public(), &genesis_group).unwrap();
        safe.set_info(None, pair.public(), &reshared_group).unwrap();

        assert_eq!(safe.get_info(0).unwrap().start_at_round, 0);
        assert_eq!(safe.get_info(4).unwrap().start_at_round, 0);
        assert_eq!(safe.get_info(5).unwrap().start_at_round, 5);
        assert_eq!(safe.get_info(50).unwrap().start_at_round, 5);
    }

    #[test]
    fn missing_distributed_key_is_refused() {
        let mut rng = StdRng::seed_from_u64(22);
        let (pair, group) = make_group(&mut rng, 0);
        let mut bare = (*group).clone();
        bare.public_key = None;
        let safe = CryptoSafe::new();
        assert!(matches!(
            safe.set_info(None, pair.public(), &Arc::new(bare)),
            Err(BeaconError::ConfigInvalid(_))
        ));
    }
}
