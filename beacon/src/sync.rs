// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Stream-based chain catchup between nodes.
//!
//! The client side walks the group's peers in random order and appends every
//! beacon that extends and verifies against the local chain; a peer serving
//! anything invalid is abandoned for the next one. The server side streams
//! the stored chain from the requested round to the current last.

use crate::beacon::round_message;
use crate::{Beacon, BeaconError, BeaconStore, CryptoSafe};
use futures::StreamExt;
use lantern_crypto::tbls;
use lantern_key::Identity;
use lantern_net::{BeaconPacket, BeaconStream, ProtocolClient, SyncRequest};
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use std::sync::atomic::{AtomicBool, Ordering};

/// Pulls beacons from the group's peers until no peer can extend our chain
/// further. Best effort: per-peer failures are logged, not fatal.
pub(crate) async fn sync_from_peers(
    client: &dyn ProtocolClient,
    safe: &CryptoSafe,
    store: &dyn BeaconStore,
    stopped: &AtomicBool,
) -> Result<(), BeaconError> {
    let mut last = store.last()?;
    let from = last.round + 1;
    let info = safe.get_info(from)?;
    let mut peers: Vec<Identity> = info
        .group
        .nodes()
        .iter()
        .filter(|node| *node != &info.id)
        .cloned()
        .collect();
    peers.shuffle(&mut rand::thread_rng());
    if peers.is_empty() {
        debug!("sync: no peers to sync with");
        return Ok(());
    }
    info!("sync: trying {} peers from round {from}", peers.len());

    'peers: for peer in &peers {
        if stopped.load(Ordering::SeqCst) {
            return Ok(());
        }
        let request = SyncRequest {
            from_round: last.round + 1,
        };
        let mut stream = match client.sync_chain(peer, request).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("sync: peer {peer} unavailable: {e}");
                continue;
            }
        };
        while let Some(packet) = stream.next().await {
            if stopped.load(Ordering::SeqCst) {
                return Ok(());
            }
            let beacon = Beacon::from(packet);
            if beacon.round != last.round + 1
                || beacon.previous_round != last.round
                || beacon.previous_sig != last.signature
            {
                warn!(
                    "sync: peer {peer} sent beacon {} not chaining on round {}",
                    beacon.round, last.round
                );
                continue 'peers;
            }
            let round_info = match safe.get_info(beacon.round) {
                Ok(info) => info,
                Err(e) => {
                    warn!("sync: {e}");
                    continue 'peers;
                }
            };
            let msg = round_message(beacon.round, &beacon.previous_sig);
            if let Err(e) =
                tbls::verify(round_info.pub_poly.public_key(), &msg, &beacon.signature)
            {
                warn!("sync: peer {peer} sent invalid beacon {}: {e}", beacon.round);
                continue 'peers;
            }
            store.put(&beacon)?;
            last = beacon;
        }
    }

    if last.round + 1 == from {
        // Nothing gained; the node retries on the next tick.
        warn!("sync: no peer could extend our chain beyond round {}", last.round);
    } else {
        info!("sync: chain head now at round {}", last.round);
    }
    Ok(())
}

/// Serves a [`SyncRequest`]: the stored chain from `from_round` inclusive,
/// in order, up to the current last beacon.
pub(crate) fn beacons_from(
    store: &dyn BeaconStore,
    from_round: u64,
) -> Result<BeaconStream, BeaconError> {
    let packets: Vec<BeaconPacket> = store
        .cursor(from_round)?
        .map(|beacon| BeaconPacket::from(&beacon))
        .collect();
    Ok(Box::pin(futures::stream::iter(packets)))
}
