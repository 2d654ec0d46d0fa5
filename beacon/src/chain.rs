// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::beacon::round_message;
use crate::{Beacon, BeaconError, BeaconStore, CallbackStore, CryptoSafe, StoreError};
use lantern_crypto::tbls;
use lantern_net::{PartialBeaconPacket, ProtocolClient};
use log::{debug, error, info, warn};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};

/// Capacity of the queue between inbound handlers and the aggregation
/// worker.
const PARTIAL_QUEUE_SIZE: usize = 256;

pub(crate) struct Shared<S> {
    pub(crate) safe: Arc<CryptoSafe>,
    pub(crate) store: Arc<CallbackStore<S>>,
    pub(crate) beacon_tx: broadcast::Sender<Beacon>,
    pub(crate) stopped: AtomicBool,
}

/// Owns the beacon chain: buffers valid partial signatures per round,
/// recovers the threshold signature once enough are gathered, appends the
/// resulting beacon and publishes it.
///
/// All aggregation runs on a single worker task fed through a bounded
/// queue, so intake, recovery, store writes and publication are serialized.
pub struct ChainStore<S> {
    client: Arc<dyn ProtocolClient>,
    shared: Arc<Shared<S>>,
    partial_tx: mpsc::Sender<(String, PartialBeaconPacket)>,
    sync_lock: Mutex<()>,
}

impl<S: BeaconStore> ChainStore<S> {
    pub fn new(
        client: Arc<dyn ProtocolClient>,
        safe: Arc<CryptoSafe>,
        store: Arc<CallbackStore<S>>,
    ) -> Arc<Self> {
        let (beacon_tx, _) = broadcast::channel(64);
        let (partial_tx, partial_rx) = mpsc::channel(PARTIAL_QUEUE_SIZE);
        let shared = Arc::new(Shared {
            safe,
            store,
            beacon_tx,
            stopped: AtomicBool::new(false),
        });
        async_std::task::spawn(aggregation_worker(shared.clone(), partial_rx));
        Arc::new(Self {
            client,
            shared,
            partial_tx,
            sync_lock: Mutex::new(()),
        })
    }

    /// Hands a verified partial to the aggregation worker. Idempotent per
    /// round and signer; partials for rounds other than the next one are
    /// discarded by the worker.
    pub async fn new_valid_partial(&self, source: &str, packet: PartialBeaconPacket) {
        if self
            .partial_tx
            .send((source.to_string(), packet))
            .await
            .is_err()
        {
            warn!("chain: aggregation worker is gone, dropping partial");
        }
    }

    /// The highest beacon of the local chain.
    pub fn last(&self) -> Result<Beacon, StoreError> {
        self.shared.store.last()
    }

    /// Stream of beacons produced by local aggregation (not by sync). The
    /// round loop uses it to race ahead once a lagging network recovers.
    pub fn appended_beacon_no_sync(&self) -> broadcast::Receiver<Beacon> {
        self.shared.beacon_tx.subscribe()
    }

    /// The store all chain writes go through (including callback fan-out).
    pub fn store(&self) -> &Arc<CallbackStore<S>> {
        &self.shared.store
    }

    /// Catches the local chain up from the group's peers. At most one sync
    /// runs at a time; a concurrent call observes the running one and
    /// returns.
    pub async fn run_sync(&self) {
        let _guard = match self.sync_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("sync already in progress");
                return;
            }
        };
        if let Err(e) = crate::sync::sync_from_peers(
            self.client.as_ref(),
            &self.shared.safe,
            self.shared.store.as_ref(),
            &self.shared.stopped,
        )
        .await
        {
            warn!("sync: aborted: {e}");
        }
    }

    /// Cancels any pending sync and stops accepting partials.
    pub fn stop(&self) {
        self.shared.stopped.store(true, Ordering::SeqCst);
    }
}

async fn aggregation_worker<S: BeaconStore>(
    shared: Arc<Shared<S>>,
    mut rx: mpsc::Receiver<(String, PartialBeaconPacket)>,
) {
    // Worker-owned buffers: round -> signer index -> partial signature.
    let mut buffers: BTreeMap<u64, BTreeMap<u32, Vec<u8>>> = BTreeMap::new();
    while let Some((source, packet)) = rx.recv().await {
        if shared.stopped.load(Ordering::SeqCst) {
            return;
        }
        match aggregate(&shared, &mut buffers, &source, packet) {
            Ok(()) => {}
            Err(BeaconError::Store(e)) => {
                error!("chain: fatal store failure in aggregation: {e}");
                return;
            }
            Err(e) => debug!("chain: dropping partial from {source}: {e}"),
        }
    }
}

fn aggregate<S: BeaconStore>(
    shared: &Shared<S>,
    buffers: &mut BTreeMap<u64, BTreeMap<u32, Vec<u8>>>,
    source: &str,
    packet: PartialBeaconPacket,
) -> Result<(), BeaconError> {
    let last = shared.store.last()?;
    let round = packet.round;
    if round != last.round + 1 {
        // Closed round or out-of-round; either way not aggregatable.
        debug!(
            "chain: ignoring partial for round {round} from {source}, expecting {}",
            last.round + 1
        );
        return Ok(());
    }
    if packet.previous_round != last.round || packet.previous_sig != last.signature {
        debug!("chain: partial from {source} does not build on our chain at round {round}");
        return Ok(());
    }
    let info = shared.safe.get_info(round)?;
    let index = tbls::index_of(&packet.partial_sig)?;

    let entry = buffers.entry(round).or_default();
    if entry.contains_key(&index) {
        return Ok(());
    }
    entry.insert(index, packet.partial_sig);
    let threshold = info.group.threshold;
    debug!(
        "chain: round {round} has {}/{threshold} partials",
        entry.len()
    );
    if entry.len() < threshold as usize {
        return Ok(());
    }

    let partials: Vec<Vec<u8>> = entry.values().cloned().collect();
    let msg = round_message(round, &last.signature);
    let signature = tbls::recover(&partials, threshold)?;
    tbls::verify(info.pub_poly.public_key(), &msg, &signature)?;

    let beacon = Beacon {
        round,
        previous_round: last.round,
        previous_sig: last.signature,
        signature,
    };
    append(shared, beacon)?;
    // The round is closed; late partials for it are dropped on arrival.
    buffers.retain(|r, _| *r > round);
    Ok(())
}

fn append<S: BeaconStore>(shared: &Shared<S>, beacon: Beacon) -> Result<(), BeaconError> {
    let inserted = match shared.store.put(&beacon) {
        Ok(inserted) => inserted,
        Err(e) => {
            // One retry before the failure is considered fatal.
            warn!("chain: store put failed, retrying: {e}");
            shared.store.put(&beacon)?
        }
    };
    if !inserted {
        debug!("chain: round {} already stored", beacon.round);
        return Ok(());
    }
    info!(
        "chain: new beacon round {} randomness {}",
        beacon.round,
        hex::encode(&beacon.randomness()[..4])
    );
    // Nobody listening is fine; the loop subscribes when it runs.
    let _ = shared.beacon_tx.send(beacon);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use lantern_crypto::poly::PriPoly;
    use lantern_key::{DistPublic, Group, Pair, Share};
    use lantern_net::LocalNetwork;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::time::Duration;

    const N: usize = 3;
    const THRESHOLD: u32 = 2;

    struct Fixture {
        chain: Arc<ChainStore<MemoryStore>>,
        shares: Vec<Share>,
        genesis: Beacon,
    }

    fn fixture() -> Fixture {
        let mut rng = StdRng::seed_from_u64(33);
        let poly = PriPoly::random(THRESHOLD, &mut rng);
        let commits = poly.commit().commits().to_vec();
        let shares: Vec<Share> = (0..N as u32)
            .map(|i| Share::new(commits.clone(), poly.eval(i)))
            .collect();

        let pairs: Vec<Pair> = (0..N)
            .map(|i| Pair::generate(&mut rng, format!("127.0.0.1:{}", 9100 + i), false).unwrap())
            .collect();
        let mut group = Group::new(
            pairs.iter().map(|p| p.public().clone()).collect(),
            THRESHOLD,
            Duration::from_secs(2),
            1_000,
        )
        .unwrap();
        group.public_key = Some(DistPublic {
            coefficients: commits,
        });
        let group = Arc::new(group);

        let safe = Arc::new(CryptoSafe::new());
        safe.set_info(Some(shares[0].clone()), pairs[0].public(), &group)
            .unwrap();

        let store = Arc::new(MemoryStore::new());
        let genesis = Beacon::genesis(group.genesis_seed());
        store.put(&genesis).unwrap();
        let callbacks = Arc::new(CallbackStore::new(store));
        let client: Arc<dyn ProtocolClient> =
            Arc::new(lantern_net::LocalClient::new(LocalNetwork::new(), "tester:1"));

        Fixture {
            chain: ChainStore::new(client, safe, callbacks),
            shares,
            genesis,
        }
    }

    fn partial(fixture: &Fixture, share: &Share, round: u64, previous: &Beacon) -> PartialBeaconPacket {
        let msg = round_message(round, &previous.signature);
        PartialBeaconPacket {
            round,
            previous_round: previous.round,
            previous_sig: previous.signature.clone(),
            partial_sig: tbls::sign_partial(share.private(), &msg),
        }
    }

    async fn wait_for_round(chain: &ChainStore<MemoryStore>, round: u64) -> Beacon {
        for _ in 0..100 {
            if let Ok(last) = chain.last() {
                if last.round >= round {
                    return last;
                }
            }
            async_std::task::sleep(Duration::from_millis(10)).await;
        }
        panic!("round {round} was never aggregated");
    }

    #[async_std::test]
    async fn threshold_partials_produce_a_beacon() {
        let fixture = fixture();
        let chain = &fixture.chain;
        let mut appended = chain.appended_beacon_no_sync();

        let p0 = partial(&fixture, &fixture.shares[0], 1, &fixture.genesis);
        chain.new_valid_partial("node-0", p0.clone()).await;
        // Same signer again: idempotent, still below threshold.
        chain.new_valid_partial("node-0", p0).await;
        assert_eq!(chain.last().unwrap().round, 0);

        let p1 = partial(&fixture, &fixture.shares[1], 1, &fixture.genesis);
        chain.new_valid_partial("node-1", p1).await;

        let beacon = wait_for_round(chain, 1).await;
        assert_eq!(beacon.previous_sig, fixture.genesis.signature);
        assert_eq!(appended.recv().await.unwrap(), beacon);
    }

    #[async_std::test]
    async fn out_of_round_partials_are_discarded() {
        let fixture = fixture();
        let chain = &fixture.chain;

        // Round 5 is far beyond last+1 and must not buffer.
        let stray = partial(&fixture, &fixture.shares[0], 5, &fixture.genesis);
        chain.new_valid_partial("node-0", stray).await;

        for (i, share) in fixture.shares.iter().enumerate().take(2) {
            let p = partial(&fixture, share, 1, &fixture.genesis);
            chain.new_valid_partial(&format!("node-{i}"), p).await;
        }
        let beacon = wait_for_round(chain, 1).await;
        assert_eq!(beacon.round, 1);

        // A late partial for the closed round changes nothing.
        let late = partial(&fixture, &fixture.shares[2], 1, &fixture.genesis);
        chain.new_valid_partial("node-2", late).await;
        async_std::task::sleep(Duration::from_millis(30)).await;
        assert_eq!(chain.last().unwrap().round, 1);
    }
}
