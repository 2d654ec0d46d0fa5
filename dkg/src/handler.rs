// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::state::{DistKeyGenerator, GeneratorConfig};
use crate::DkgError;
use futures::FutureExt;
use lantern_clock::Clock;
use lantern_key::{DistPublic, Group, Identity, Pair, Share};
use lantern_net::{DkgPacket, NetworkError, ProtocolClient, Response};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Timeout applied when the configuration leaves it unset.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// How a node sends DKG packets out. Any protocol client qualifies.
#[async_trait::async_trait]
pub trait Network: Send + Sync + 'static {
    async fn send(&self, to: &Identity, packet: DkgPacket) -> Result<(), NetworkError>;
}

#[async_trait::async_trait]
impl<T: ProtocolClient> Network for T {
    async fn send(&self, to: &Identity, packet: DkgPacket) -> Result<(), NetworkError> {
        self.dkg_packet(to, packet).await
    }
}

/// Extra entropy mixed into the dealer's polynomial sampling.
pub struct Entropy {
    pub seed: Vec<u8>,
    /// Trust the seed alone instead of mixing in OS randomness.
    pub user_only: bool,
}

/// Configuration of one DKG or resharing execution.
pub struct Config {
    pub pair: Pair,
    /// The group being keyed.
    pub new_nodes: Arc<Group>,
    /// The group holding the current key; present only when resharing.
    pub old_nodes: Option<Arc<Group>>,
    /// Our share of the old key; required of resharing dealers.
    pub share: Option<Share>,
    /// Zero means [`DEFAULT_TIMEOUT`].
    pub timeout: Duration,
    pub entropy: Option<Entropy>,
    pub clock: Arc<dyn Clock>,
}

/// The consumer ends of a running DKG: at most one share (on new-group
/// members), an exit signal (on leavers), and fatal errors.
pub struct Outcome {
    pub shares: mpsc::UnboundedReceiver<Share>,
    pub exits: mpsc::UnboundedReceiver<()>,
    pub errors: mpsc::UnboundedReceiver<DkgError>,
}

struct HandlerState {
    gen: DistKeyGenerator,
    rng: StdRng,
    sent_deals: bool,
    deal_processed: u32,
    resp_processed: u32,
    tmp_responses: HashMap<u32, Vec<Response>>,
    done: bool,
    timed_out: bool,
    timer_launched: bool,
    share: Option<Share>,
}

/// Runs one DKG (fresh or resharing) over an authenticated network.
///
/// All state mutations are serialized under one lock; outbound traffic is
/// collected while the lock is held and sent after it is released.
pub struct Handler {
    me: Weak<Self>,
    net: Arc<dyn Network>,
    pair: Pair,
    new_nodes: Arc<Group>,
    old_nodes: Option<Arc<Group>>,
    timeout: Duration,
    clock: Arc<dyn Clock>,
    new_node: bool,
    old_node: bool,
    should_send_deal: bool,
    state: Mutex<HandlerState>,
    share_tx: mpsc::UnboundedSender<Share>,
    exit_tx: mpsc::UnboundedSender<()>,
    error_tx: mpsc::UnboundedSender<DkgError>,
    timer_cancel: watch::Sender<bool>,
}

impl Handler {
    pub fn new(net: Arc<dyn Network>, conf: Config) -> Result<(Arc<Self>, Outcome), DkgError> {
        let new_node = conf.new_nodes.contains(conf.pair.public());
        let old_node = conf
            .old_nodes
            .as_ref()
            .map(|group| group.contains(conf.pair.public()))
            .unwrap_or(false);
        // Fresh runs are dealt by the new group, resharings by the old one.
        let should_send_deal = if conf.old_nodes.is_some() {
            old_node
        } else {
            new_node
        };

        let gen = DistKeyGenerator::new(GeneratorConfig {
            longterm: *conf.pair.private(),
            new_nodes: conf.new_nodes.points(),
            old_nodes: conf.old_nodes.as_ref().map(|group| group.points()),
            public_coeffs: conf.old_nodes.as_ref().and_then(|group| {
                group
                    .public_key
                    .as_ref()
                    .map(|public| public.coefficients.clone())
            }),
            share: conf.share.as_ref().map(|share| share.pri_share.clone()),
            threshold: conf.new_nodes.threshold,
            old_threshold: conf
                .old_nodes
                .as_ref()
                .map(|group| group.threshold)
                .unwrap_or(0),
        })?;

        let timeout = if conf.timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            conf.timeout
        };
        let (share_tx, shares) = mpsc::unbounded_channel();
        let (exit_tx, exits) = mpsc::unbounded_channel();
        let (error_tx, errors) = mpsc::unbounded_channel();
        let (timer_cancel, _) = watch::channel(false);
        let handler = Arc::new_cyclic(|me| Self {
            me: me.clone(),
            net,
            new_nodes: conf.new_nodes,
            old_nodes: conf.old_nodes,
            timeout,
            clock: conf.clock,
            new_node,
            old_node,
            should_send_deal,
            state: Mutex::new(HandlerState {
                gen,
                rng: seeded_rng(&conf.entropy),
                sent_deals: false,
                deal_processed: 0,
                resp_processed: 0,
                tmp_responses: HashMap::new(),
                done: false,
                timed_out: false,
                timer_launched: false,
                share: None,
            }),
            share_tx,
            exit_tx,
            error_tx,
            timer_cancel,
            pair: conf.pair,
        });
        Ok((
            handler,
            Outcome {
                shares,
                exits,
                errors,
            },
        ))
    }

    /// Kicks the protocol off: dealers send their deals to every new-group
    /// member in parallel.
    pub fn start(&self) {
        {
            let mut state = self.state.lock();
            self.ensure_timer(&mut state);
        }
        if self.should_send_deal {
            if let Some(handler) = self.me.upgrade() {
                async_std::task::spawn(async move { handler.send_deals().await });
            }
        }
    }

    /// Processes an inbound DKG packet. The first packet (or [`start`])
    /// arms the timeout timer.
    pub async fn process(&self, from: &str, packet: DkgPacket) {
        let mut outbound = Vec::new();
        let mut trigger_deals = false;
        {
            let mut state = self.state.lock();
            self.ensure_timer(&mut state);
            match packet {
                DkgPacket::Deal(deal) => {
                    state.deal_processed += 1;
                    let dealer = deal.dealer_index;
                    debug!(
                        "dkg: deal from dealer {dealer} via {from} ({} processed)",
                        state.deal_processed
                    );
                    match state.gen.process_deal(&deal) {
                        Ok(response) => outbound.push(DkgPacket::Response(response)),
                        Err(e) => warn!("dkg: processing deal from {from}: {e}"),
                    }
                    if !state.sent_deals && self.should_send_deal {
                        trigger_deals = true;
                    }
                    if let Some(buffered) = state.tmp_responses.remove(&dealer) {
                        debug!(
                            "dkg: flushing {} buffered responses for dealer {dealer}",
                            buffered.len()
                        );
                        for response in buffered {
                            if let Err(e) = state.gen.process_response(&response) {
                                warn!("dkg: buffered response for dealer {dealer}: {e}");
                            }
                        }
                    }
                }
                DkgPacket::Response(response) => {
                    state.resp_processed += 1;
                    debug!(
                        "dkg: response from holder {} on dealer {} via {from} ({} processed)",
                        response.share_index, response.dealer_index, state.resp_processed
                    );
                    match state.gen.process_response(&response) {
                        Ok(Some(justification)) if self.old_node => {
                            debug!("dkg: broadcasting justification");
                            outbound.push(DkgPacket::Justification(justification));
                        }
                        Ok(_) => {}
                        Err(DkgError::NoDealBeforeResponse) => {
                            debug!(
                                "dkg: buffering response for unknown dealer {}",
                                response.dealer_index
                            );
                            state
                                .tmp_responses
                                .entry(response.dealer_index)
                                .or_default()
                                .push(response);
                        }
                        Err(e) => warn!("dkg: processing response from {from}: {e}"),
                    }
                }
                DkgPacket::Justification(justification) => {
                    if let Err(e) = state.gen.process_justification(&justification) {
                        warn!("dkg: processing justification from {from}: {e}");
                    }
                }
            }
            self.check_certified(&mut state);
        }
        if trigger_deals {
            if let Some(handler) = self.me.upgrade() {
                async_std::task::spawn(async move { handler.send_deals().await });
            }
        }
        for packet in outbound {
            if let Some(handler) = self.me.upgrade() {
                async_std::task::spawn(async move { handler.broadcast(packet).await });
            }
        }
    }

    /// The group that finished the protocol: the qualified subset of the
    /// new group, carrying the reshared distributed key. Only callable once
    /// the share has been delivered.
    pub fn qualified_group(&self) -> Result<Arc<Group>, DkgError> {
        let state = self.state.lock();
        let share = state.share.as_ref().ok_or(DkgError::NotFinished)?;
        let qualified = state.gen.qualified_shares();
        let nodes: Vec<Identity> = qualified
            .iter()
            .filter_map(|index| self.new_nodes.node(*index).cloned())
            .collect();
        info!(
            "dkg: qualified group of {} nodes: {:?}",
            nodes.len(),
            qualified
        );
        let mut group = Group::new(
            nodes,
            self.new_nodes.threshold,
            self.new_nodes.period,
            self.new_nodes.genesis_time,
        )
        .map_err(|_| DkgError::ConfigInvalid("qualified subset below minimum threshold"))?;
        group.transition_time = self.new_nodes.transition_time;
        group.set_genesis_seed(self.new_nodes.genesis_seed());
        group.public_key = Some(DistPublic {
            coefficients: share.commits.clone(),
        });
        Ok(Arc::new(group))
    }

    fn ensure_timer(&self, state: &mut HandlerState) {
        if state.timer_launched {
            return;
        }
        state.timer_launched = true;
        let handler = match self.me.upgrade() {
            Some(handler) => handler,
            None => return,
        };
        let mut cancel = self.timer_cancel.subscribe();
        let clock = self.clock.clone();
        let timeout = self.timeout;
        async_std::task::spawn(async move {
            futures::select_biased! {
                _ = cancel.changed().fuse() => {}
                _ = clock.sleep(timeout).fuse() => {
                    let mut state = handler.state.lock();
                    if state.done {
                        return;
                    }
                    info!("dkg: timeout triggered, accepting threshold certification");
                    state.timed_out = true;
                    state.gen.set_timeout();
                    handler.check_certified(&mut state);
                }
            }
        });
    }

    /// Checks for enough responses and delivers the share (or the exit
    /// signal for nodes leaving the group).
    fn check_certified(&self, state: &mut HandlerState) {
        if state.done {
            return;
        }
        let fully = state.gen.certified();
        if !fully && !(state.gen.threshold_certified() && state.timed_out) {
            return;
        }
        state.done = true;
        let _ = self.timer_cancel.send(true);
        if !self.new_node {
            info!("dkg: certified, leaving the group");
            let _ = self.exit_tx.send(());
            return;
        }
        match state.gen.dist_key_share() {
            Ok(share) => {
                let hash = Sha256::digest(lantern_crypto::scalar_to_bytes(
                    &share.pri_share.value,
                ));
                info!(
                    "dkg: certified {} with share hash {}",
                    if fully { "fully" } else { "threshold" },
                    hex::encode(&hash[..3])
                );
                state.share = Some(share.clone());
                let _ = self.share_tx.send(share);
            }
            Err(e) => {
                error!("dkg: retrieving final share: {e}");
                let _ = self.error_tx.send(e);
            }
        }
    }

    /// Sends our deals to every other member of the new group in parallel.
    /// More failures than the threshold is fatal for the protocol.
    async fn send_deals(self: Arc<Self>) {
        let deals = {
            let mut state = self.state.lock();
            if state.sent_deals {
                return;
            }
            state.sent_deals = true;
            let HandlerState { gen, rng, .. } = &mut *state;
            match gen.deals(rng) {
                Ok(deals) => deals,
                Err(e) => {
                    error!("dkg: generating deals: {e}");
                    let _ = self.error_tx.send(e);
                    return;
                }
            }
        };
        debug!("dkg: sending {} deals", deals.len());
        let sends = deals.into_iter().filter_map(|(recipient, deal)| {
            let node = self.new_nodes.node(recipient)?.clone();
            let net = self.net.clone();
            Some(async move {
                debug!("dkg: sending deal to {node}");
                match net.send(&node, DkgPacket::Deal(deal)).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("dkg: sending deal to {node}: {e}");
                        false
                    }
                }
            })
        });
        let results = futures::future::join_all(sends).await;
        let failed = results.iter().filter(|ok| !**ok).count();
        let threshold = self.new_nodes.threshold;
        if failed > threshold as usize {
            let _ = self.error_tx.send(DkgError::DealSendFailures {
                failed,
                total: self.new_nodes.len(),
                threshold,
            });
            return;
        }
        info!("dkg: deals sent to {} nodes", results.len() - failed);
    }

    /// Broadcasts a response or justification to the union of the new and
    /// old groups, once per public key, never to ourselves.
    async fn broadcast(self: Arc<Self>, packet: DkgPacket) {
        let mut recipients: Vec<Identity> = Vec::new();
        let mut push = |node: &Identity| {
            if node != self.pair.public() && !recipients.contains(node) {
                recipients.push(node.clone());
            }
        };
        for node in self.new_nodes.nodes() {
            push(node);
        }
        if let Some(old) = &self.old_nodes {
            for node in old.nodes() {
                push(node);
            }
        }
        let sends = recipients.into_iter().map(|node| {
            let net = self.net.clone();
            let packet = packet.clone();
            async move {
                if let Err(e) = net.send(&node, packet).await {
                    warn!("dkg: broadcast to {node}: {e}");
                }
            }
        });
        futures::future::join_all(sends).await;
    }
}

fn seeded_rng(entropy: &Option<Entropy>) -> StdRng {
    let mut seed = [0u8; 32];
    match entropy {
        Some(e) if e.user_only => {
            seed.copy_from_slice(&Sha256::digest(&e.seed));
        }
        Some(e) => {
            let mut os = [0u8; 32];
            rand::rngs::OsRng.fill_bytes(&mut os);
            let mut hasher = Sha256::new();
            hasher.update(&e.seed);
            hasher.update(os);
            seed.copy_from_slice(&hasher.finalize());
        }
        None => rand::rngs::OsRng.fill_bytes(&mut seed),
    }
    StdRng::from_seed(seed)
}
