// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::beacon::round_message;
use crate::callbacks::BeaconCallback;
use crate::{
    Beacon, BeaconError, BeaconStore, CallbackStore, ChainStore, CryptoSafe, RoundTick, Ticker,
};
use futures::FutureExt;
use lantern_clock::{current_round, next_round, Clock};
use lantern_crypto::tbls;
use lantern_key::{Group, Pair, Share};
use lantern_net::{BeaconStream, NetworkError, PartialBeaconPacket, ProtocolClient, SyncRequest};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;

/// Configuration of a beacon handler.
pub struct Config {
    /// The node's long-term keypair; must be a member of `group`.
    pub pair: Pair,
    /// The node's share of the distributed key.
    pub share: Option<Share>,
    pub group: Arc<Group>,
    pub clock: Arc<dyn Clock>,
    /// Optional delay before broadcasting a partial. Present in deployed
    /// configurations but not consulted by the round loop.
    pub wait_before_send: Option<Duration>,
    /// Callback registered at construction time.
    pub callback: Option<BeaconCallback>,
}

#[derive(Default)]
struct LoopState {
    started: bool,
    stopped: bool,
}

/// Drives the threshold-BLS beacon protocol: on every round tick it signs
/// the next round with the local share, broadcasts the partial to the group
/// and hands inbound partials to the [`ChainStore`] for aggregation.
pub struct Handler<S> {
    me: Weak<Self>,
    conf: Config,
    client: Arc<dyn ProtocolClient>,
    safe: Arc<CryptoSafe>,
    chain: Arc<ChainStore<S>>,
    ticker: Arc<Ticker>,
    callbacks: Arc<CallbackStore<S>>,
    addr: String,
    state: Mutex<LoopState>,
    close_tx: watch::Sender<bool>,
    close_rx: watch::Receiver<bool>,
}

impl<S: BeaconStore> Handler<S> {
    /// Builds a handler ready to serve and create randomness, inserting the
    /// genesis beacon into the store.
    pub fn new(
        client: Arc<dyn ProtocolClient>,
        store: S,
        conf: Config,
    ) -> Result<Arc<Self>, BeaconError> {
        let share = conf
            .share
            .clone()
            .ok_or(BeaconError::ConfigInvalid("missing distributed key share"))?;
        if conf.group.index(conf.pair.public()).is_none() {
            return Err(BeaconError::ConfigInvalid(
                "keypair not included in the group",
            ));
        }
        let safe = Arc::new(CryptoSafe::new());
        safe.set_info(Some(share), conf.pair.public(), &conf.group)?;

        let store = Arc::new(store);
        // Genesis block at round 0; round 1 signs over the genesis seed.
        store.put(&Beacon::genesis(conf.group.genesis_seed()))?;
        let callbacks = Arc::new(CallbackStore::new(store));
        if let Some(callback) = conf.callback.clone() {
            callbacks.add_callback(callback);
        }

        let ticker = Arc::new(Ticker::new(
            conf.clock.clone(),
            conf.group.period,
            conf.group.genesis_time,
        ));
        let chain = ChainStore::new(client.clone(), safe.clone(), callbacks.clone());
        let addr = conf.pair.public().address().to_string();
        let (close_tx, close_rx) = watch::channel(false);

        Ok(Arc::new_cyclic(|me| Self {
            me: me.clone(),
            conf,
            client,
            safe,
            chain,
            ticker,
            callbacks,
            addr,
            state: Mutex::new(LoopState::default()),
            close_tx,
            close_rx,
        }))
    }

    /// Runs the beacon protocol from the next scheduled round. Refuses to
    /// start when genesis has already passed; use [`Handler::catchup`] then.
    pub fn start(&self) -> Result<(), BeaconError> {
        info!("beacon: starting at {}", self.addr);
        if self.conf.clock.now() > self.conf.group.genesis_time {
            error!("beacon: genesis time in the past, call catchup");
            return Err(BeaconError::GenesisPassed);
        }
        let (_, time) = self.next_round();
        self.spawn_loop(time);
        Ok(())
    }

    /// Syncs the local chain from peers, then joins the protocol at the
    /// next scheduled round. Called by nodes re-joining a running network.
    pub async fn catchup(&self) {
        self.chain.run_sync().await;
        let (_, time) = self.next_round();
        self.spawn_loop(time);
    }

    /// Keeps syncing from the previous group until the transition time
    /// written in this handler's group, at which point the node starts
    /// signing. Used by nodes that join a network through a resharing.
    pub async fn transition(&self, prev_group: &Arc<Group>) -> Result<(), BeaconError> {
        let target = self.conf.group.transition_time;
        let (round, time) = self.round_boundary(target)?;
        debug!("beacon: transition to new group at round {round}");
        // The previous group's material, share-less: only used to verify
        // the chain we sync before the transition.
        self.safe.set_info(None, self.conf.pair.public(), prev_group)?;
        self.spawn_loop(time);
        self.chain.run_sync().await;
        Ok(())
    }

    /// Registers the reshared group's material; it takes effect at the
    /// round derived from the new group's transition time.
    pub fn transition_new_group(
        &self,
        share: Share,
        new_group: &Arc<Group>,
    ) -> Result<(), BeaconError> {
        let (round, _) = self.round_boundary(new_group.transition_time)?;
        debug!("beacon: new group material active from round {round}");
        self.safe
            .set_info(Some(share), self.conf.pair.public(), new_group)
    }

    /// Handles a partial beacon signature received from a peer.
    pub async fn process_partial_beacon(
        &self,
        from: &str,
        packet: PartialBeaconPacket,
    ) -> Result<(), BeaconError> {
        debug!(
            "beacon: received partial from {from} for round {} (prev {})",
            packet.round, packet.previous_round
        );
        let current = current_round(
            self.conf.clock.now(),
            self.conf.group.period,
            self.conf.group.genesis_time,
        );
        if packet.round > current {
            error!(
                "beacon: future partial from {from}: round {} vs current {current}",
                packet.round
            );
            return Err(BeaconError::OutOfRound {
                round: packet.round,
                current,
            });
        }
        if packet.previous_round != packet.round.wrapping_sub(1) {
            return Err(BeaconError::InvalidPreviousRound {
                round: packet.round,
                previous: packet.previous_round,
            });
        }
        let info = self.safe.get_info(packet.round)?;
        let msg = round_message(packet.round, &packet.previous_sig);
        tbls::verify_partial(&info.pub_poly, &msg, &packet.partial_sig)
            .map_err(BeaconError::InvalidPartial)?;
        let index = tbls::index_of(&packet.partial_sig).map_err(BeaconError::InvalidPartial)?;
        if info.index == Some(index) {
            // Our own partial looped back, or an in-advance packet.
            debug!("beacon: dropping partial carrying our own index {index}");
            return Ok(());
        }
        self.chain.new_valid_partial(from, packet).await;
        Ok(())
    }

    /// Serves a chain sync request from the local store.
    pub fn sync_chain(&self, request: SyncRequest) -> Result<BeaconStream, BeaconError> {
        crate::sync::beacons_from(self.callbacks.as_ref(), request.from_round)
    }

    /// Stops the round loop, the ticker and the chain store. Idempotent.
    pub fn stop(&self) {
        {
            let mut state = self.state.lock();
            if state.stopped {
                return;
            }
            state.stopped = true;
        }
        let _ = self.close_tx.send(true);
        self.chain.stop();
        self.ticker.stop();
        info!("beacon: stopped at {}", self.addr);
    }

    /// Sleeps until the given time on the configured clock, then stops.
    /// Useful when leaving the group at a resharing transition.
    pub async fn stop_at(&self, stop_time: i64) -> Result<(), BeaconError> {
        let now = self.conf.clock.now();
        if stop_time <= now {
            return Err(BeaconError::StopTimeNotFuture);
        }
        let wait = Duration::from_secs((stop_time - now) as u64);
        debug!("beacon: stopping at {stop_time}, sleeping {}s", wait.as_secs());
        self.conf.clock.sleep(wait).await;
        self.stop();
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().started
    }

    pub fn add_callback(&self, callback: BeaconCallback) {
        self.callbacks.add_callback(callback);
    }

    pub fn add_callback_with_key(&self, key: &str, callback: BeaconCallback) {
        self.callbacks.add_callback_with_key(key, callback);
    }

    pub fn chain(&self) -> &Arc<ChainStore<S>> {
        &self.chain
    }

    fn next_round(&self) -> (u64, i64) {
        next_round(
            self.conf.clock.now(),
            self.conf.group.period,
            self.conf.group.genesis_time,
        )
    }

    /// Validates that a transition time falls exactly on a round boundary
    /// and returns the round scheduled at it.
    fn round_boundary(&self, target: i64) -> Result<(u64, i64), BeaconError> {
        let period = self.conf.group.period;
        let (next, next_time) = next_round(target, period, self.conf.group.genesis_time);
        let round = next - 1;
        let time = next_time - period.as_secs() as i64;
        if time != target {
            return Err(BeaconError::InvalidTransitionTime {
                expected: time,
                got: target,
            });
        }
        Ok((round, time))
    }

    /// Subscribes to the event sources synchronously, so that no tick can
    /// fire between scheduling the loop and the loop listening.
    fn spawn_loop(&self, start_time: i64) {
        let handler = match self.me.upgrade() {
            Some(handler) => handler,
            None => return,
        };
        {
            let mut state = self.state.lock();
            if state.started || state.stopped {
                warn!("beacon: round loop already running");
                return;
            }
            state.started = true;
        }
        debug!("beacon: round loop waiting until {start_time}");
        let ticks = self.ticker.channel_at(start_time);
        let appended = self.chain.appended_beacon_no_sync();
        async_std::task::spawn(async move {
            handler.run(ticks, appended).await;
        });
    }

    /// The round loop: a select over the tick stream, locally aggregated
    /// beacons (fast-forward when the network recovers late) and the close
    /// signal.
    async fn run(
        self: Arc<Self>,
        mut ticks: tokio::sync::mpsc::UnboundedReceiver<RoundTick>,
        mut appended: tokio::sync::broadcast::Receiver<Beacon>,
    ) {
        let mut close = self.close_rx.clone();
        let mut current: u64 = 0;
        loop {
            futures::select_biased! {
                tick = ticks.recv().fuse() => {
                    let RoundTick { round, .. } = match tick {
                        Some(tick) => tick,
                        None => return,
                    };
                    current = round;
                    let last = match self.chain.last() {
                        Ok(last) => last,
                        Err(e) => {
                            error!("beacon: loading last beacon: {e}");
                            continue;
                        }
                    };
                    debug!("beacon: new round {round}, last beacon {}", last.round);
                    self.broadcast_next_partial().await;
                    if last.round < current {
                        // A node with a higher chain may exist; if so we
                        // build on its head next round.
                        debug!("beacon: potential catchup at round {round}");
                        let chain = self.chain.clone();
                        async_std::task::spawn(async move { chain.run_sync().await });
                    }
                }
                received = appended.recv().fuse() => {
                    match received {
                        Ok(beacon) if beacon.round < current => {
                            // The network recovered late: hurry to close the
                            // gap by signing the next round immediately.
                            self.broadcast_next_partial().await;
                        }
                        Ok(_) => {}
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!("beacon: loop lagged {skipped} appended beacons");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                    }
                }
                _ = close.changed().fuse() => {
                    debug!("beacon: round loop finished");
                    return;
                }
            }
        }
    }

    /// Signs and broadcasts the partial for the round following our chain
    /// head, and feeds it to the local aggregation.
    async fn broadcast_next_partial(&self) {
        let last = match self.chain.last() {
            Ok(last) => last,
            Err(e) => {
                error!("beacon: loading last beacon: {e}");
                return;
            }
        };
        let round = last.round + 1;
        let info = match self.safe.get_info(round) {
            Ok(info) => info,
            Err(e) => {
                error!("beacon: no info to sign round {round}: {e}");
                return;
            }
        };
        let share = match &info.share {
            Some(share) => share,
            None => {
                warn!("beacon: no share for round {round}, not synced yet?");
                return;
            }
        };
        let msg = round_message(round, &last.signature);
        let partial_sig = tbls::sign_partial(share.private(), &msg);
        debug!(
            "beacon: signing round {round} over sig {}",
            hex::encode(&last.signature[..last.signature.len().min(3)])
        );
        let packet = PartialBeaconPacket {
            round,
            previous_round: last.round,
            previous_sig: last.signature,
            partial_sig,
        };
        // Our own partial goes through aggregation even with no peers up.
        self.chain.new_valid_partial(&self.addr, packet.clone()).await;
        for node in info.group.nodes() {
            if node == &info.id {
                continue;
            }
            let node = node.clone();
            let client = self.client.clone();
            let packet = packet.clone();
            async_std::task::spawn(async move {
                debug!("beacon: sending partial round {round} to {node}");
                if let Err(e) = client.partial_beacon(&node, packet).await {
                    match e {
                        NetworkError::Remote(msg) if msg.contains("out-of-round") => {
                            error!("beacon: {node} replied out-of-round for {round}");
                        }
                        e => error!("beacon: sending partial to {node}: {e}"),
                    }
                }
            });
        }
    }
}
