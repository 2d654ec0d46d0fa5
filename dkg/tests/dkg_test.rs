// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use async_trait::async_trait;
use lantern_clock::TestClock;
use lantern_crypto::poly::{PriPoly, PriShare};
use lantern_crypto::{bls, G1Projective};
use lantern_dkg::{Config, Handler, Outcome};
use lantern_key::{DistPublic, Group, Pair, Share};
use lantern_net::{
    BeaconStream, DkgPacket, LocalClient, LocalNetwork, NetworkError, PartialBeaconPacket,
    ProtocolService, SyncRequest,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;

const RECV_TIMEOUT: Duration = Duration::from_secs(10);

/// Routes inbound DKG packets to the handler; this node serves no beacons.
struct DkgService {
    handler: Arc<Handler>,
}

#[async_trait]
impl ProtocolService for DkgService {
    async fn partial_beacon(
        &self,
        _from: &str,
        _packet: PartialBeaconPacket,
    ) -> Result<(), NetworkError> {
        Err(NetworkError::Remote("no beacon running".into()))
    }

    async fn sync_chain(&self, _request: SyncRequest) -> Result<BeaconStream, NetworkError> {
        Err(NetworkError::Remote("no beacon running".into()))
    }

    async fn dkg_packet(&self, from: &str, packet: DkgPacket) -> Result<(), NetworkError> {
        self.handler.process(from, packet).await;
        Ok(())
    }
}

fn make_pairs(rng: &mut StdRng, n: usize, base_port: u16) -> Vec<Pair> {
    let _ = pretty_env_logger::try_init();
    (0..n)
        .map(|i| {
            Pair::generate(rng, format!("127.0.0.1:{}", base_port + i as u16), false).unwrap()
        })
        .collect()
}

fn make_group(pairs: &[Pair], threshold: u32) -> Arc<Group> {
    Arc::new(
        Group::new(
            pairs.iter().map(|p| p.public().clone()).collect(),
            threshold,
            Duration::from_secs(2),
            1_000,
        )
        .unwrap(),
    )
}

fn spawn_handler(
    net: &LocalNetwork,
    conf: Config,
) -> (Arc<Handler>, Outcome) {
    let address = conf.pair.public().address().to_string();
    let client = Arc::new(LocalClient::new(net.clone(), address.clone()));
    let (handler, outcome) = Handler::new(client, conf).unwrap();
    net.register(
        &address,
        Arc::new(DkgService {
            handler: handler.clone(),
        }),
    );
    (handler, outcome)
}

async fn recv_share(outcome: &mut Outcome) -> Share {
    async_std::future::timeout(RECV_TIMEOUT, outcome.shares.recv())
        .await
        .expect("timed out waiting for a share")
        .expect("share channel closed")
}

#[async_std::test]
async fn fresh_dkg_produces_matching_shares() {
    let mut rng = StdRng::seed_from_u64(51);
    let clock = TestClock::new(0);
    let pairs = make_pairs(&mut rng, 5, 10_000);
    let group = make_group(&pairs, 3);
    let net = LocalNetwork::new();

    let mut handlers = Vec::new();
    let mut outcomes = Vec::new();
    for pair in &pairs {
        let (handler, outcome) = spawn_handler(
            &net,
            Config {
                pair: pair.clone(),
                new_nodes: group.clone(),
                old_nodes: None,
                share: None,
                timeout: Duration::from_secs(60),
                entropy: None,
                clock: Arc::new(clock.clone()),
            },
        );
        handlers.push(handler);
        outcomes.push(outcome);
    }
    for handler in &handlers {
        handler.start();
    }

    let mut shares = Vec::new();
    for outcome in &mut outcomes {
        shares.push(recv_share(outcome).await);
    }
    for share in &shares[1..] {
        assert_eq!(share.commits, shares[0].commits);
    }
    // Fully certified: everyone qualifies.
    for handler in &handlers {
        assert_eq!(handler.qualified_group().unwrap().len(), 5);
    }
    // The shares belong to the committed distributed key.
    let pri_shares: Vec<PriShare> = shares.iter().map(|s| s.pri_share.clone()).collect();
    let secret = lantern_crypto::poly::recover_secret(&pri_shares, 3).unwrap();
    assert_eq!(&bls::public_key(&secret), shares[0].public_key());
}

#[async_std::test]
async fn silent_dealer_leads_to_threshold_certification() {
    let mut rng = StdRng::seed_from_u64(52);
    let clock = TestClock::new(0);
    let pairs = make_pairs(&mut rng, 4, 10_100);
    let group = make_group(&pairs, 3);
    let net = LocalNetwork::new();

    // Node 3 refuses to participate: never registered, never started.
    let mut handlers = Vec::new();
    let mut outcomes = Vec::new();
    for pair in &pairs[..3] {
        let (handler, outcome) = spawn_handler(
            &net,
            Config {
                pair: pair.clone(),
                new_nodes: group.clone(),
                old_nodes: None,
                share: None,
                timeout: Duration::from_secs(60),
                entropy: None,
                clock: Arc::new(clock.clone()),
            },
        );
        handlers.push(handler);
        outcomes.push(outcome);
    }
    for handler in &handlers {
        handler.start();
    }

    // The three live nodes exchange deals and responses but cannot fully
    // certify; their timers are armed.
    clock.block_until(3).await;
    clock.advance(Duration::from_secs(60));

    let mut shares = Vec::new();
    for outcome in &mut outcomes {
        shares.push(recv_share(outcome).await);
    }
    for share in &shares[1..] {
        assert_eq!(share.commits, shares[0].commits);
    }
    for handler in &handlers {
        let qualified = handler.qualified_group().unwrap();
        assert_eq!(qualified.len(), 3);
        for (node, pair) in qualified.nodes().iter().zip(&pairs[..3]) {
            assert_eq!(node, pair.public());
        }
    }
}

#[async_std::test]
async fn resharing_hands_over_the_key_and_signals_leavers() {
    let mut rng = StdRng::seed_from_u64(53);
    let clock = TestClock::new(0);

    // The old group's key comes from a trusted dealer for test brevity.
    let old_pairs = make_pairs(&mut rng, 4, 10_200);
    let poly = PriPoly::random(3, &mut rng);
    let commits: Vec<G1Projective> = poly.commit().commits().to_vec();
    let old_shares: Vec<Share> = (0..4)
        .map(|i| Share::new(commits.clone(), poly.eval(i)))
        .collect();
    let mut old_group = (*make_group(&old_pairs, 3)).clone();
    old_group.public_key = Some(DistPublic {
        coefficients: commits.clone(),
    });
    let old_group = Arc::new(old_group);

    // Node 3 leaves; two fresh nodes join.
    let joining = make_pairs(&mut rng, 2, 10_300);
    let mut new_pairs: Vec<Pair> = old_pairs[..3].to_vec();
    new_pairs.extend(joining);
    let new_group = make_group(&new_pairs, 3);

    let net = LocalNetwork::new();
    let mut handlers = Vec::new();
    let mut outcomes = Vec::new();
    for (i, pair) in old_pairs.iter().enumerate() {
        let (handler, outcome) = spawn_handler(
            &net,
            Config {
                pair: pair.clone(),
                new_nodes: new_group.clone(),
                old_nodes: Some(old_group.clone()),
                share: Some(old_shares[i].clone()),
                timeout: Duration::from_secs(60),
                entropy: None,
                clock: Arc::new(clock.clone()),
            },
        );
        handlers.push(handler);
        outcomes.push(outcome);
    }
    for pair in &new_pairs[3..] {
        let (handler, outcome) = spawn_handler(
            &net,
            Config {
                pair: pair.clone(),
                new_nodes: new_group.clone(),
                old_nodes: Some(old_group.clone()),
                share: None,
                timeout: Duration::from_secs(60),
                entropy: None,
                clock: Arc::new(clock.clone()),
            },
        );
        handlers.push(handler);
        outcomes.push(outcome);
    }
    for handler in &handlers {
        handler.start();
    }

    // Share holders: old nodes 0..3 and the two joiners.
    let mut shares = Vec::new();
    for outcome in outcomes.iter_mut().take(3) {
        shares.push(recv_share(outcome).await);
    }
    for outcome in outcomes.iter_mut().skip(4) {
        shares.push(recv_share(outcome).await);
    }
    // The leaver is told the protocol finished without it.
    let exited = async_std::future::timeout(RECV_TIMEOUT, outcomes[3].exits.recv())
        .await
        .expect("timed out waiting for the leaver exit");
    assert_eq!(exited, Some(()));

    // The distributed public key survived the resharing.
    for share in &shares {
        assert_eq!(share.public_key(), poly.commit().public_key());
    }
    let pri_shares: Vec<PriShare> = shares.iter().map(|s| s.pri_share.clone()).collect();
    let secret = lantern_crypto::poly::recover_secret(&pri_shares, 3).unwrap();
    assert_eq!(bls::public_key(&secret), *poly.commit().public_key());
}
