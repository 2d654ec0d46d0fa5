// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Wire packets and the transport interfaces of the beacon protocol.
//!
//! The actual transport is pluggable: outbound traffic goes through
//! [`ProtocolClient`], inbound requests are served by a [`ProtocolService`].
//! [`LocalNetwork`] wires the two together in memory and is what the
//! integration tests (and partition simulations) run on.

mod convert;
mod local;
mod packets;

pub use convert::*;
pub use local::{LocalClient, LocalNetwork};
pub use packets::*;

use async_trait::async_trait;
use futures::stream::Stream;
use lantern_key::Identity;
use std::pin::Pin;
use thiserror::Error;

/// Server-streamed chain of beacons answering a [`SyncRequest`].
pub type BeaconStream = Pin<Box<dyn Stream<Item = BeaconPacket> + Send>>;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("peer {0} is not reachable")]
    Unreachable(String),
    #[error("remote error: {0}")]
    Remote(String),
    #[error("invalid packet: {0}")]
    InvalidPacket(String),
}

/// Outbound side of the protocol: the three RPCs a node issues to peers.
#[async_trait]
pub trait ProtocolClient: Send + Sync + 'static {
    /// Pushes a partial beacon signature to a peer. Returns fast on
    /// acceptance; an out-of-round rejection is informational.
    async fn partial_beacon(
        &self,
        to: &Identity,
        packet: PartialBeaconPacket,
    ) -> Result<(), NetworkError>;

    /// Opens a beacon stream from `from_round` (inclusive) up to the peer's
    /// current last beacon.
    async fn sync_chain(
        &self,
        to: &Identity,
        request: SyncRequest,
    ) -> Result<BeaconStream, NetworkError>;

    /// Delivers a DKG packet to a peer.
    async fn dkg_packet(&self, to: &Identity, packet: DkgPacket) -> Result<(), NetworkError>;
}

/// Inbound side of the protocol, implemented by a running node.
#[async_trait]
pub trait ProtocolService: Send + Sync + 'static {
    async fn partial_beacon(
        &self,
        from: &str,
        packet: PartialBeaconPacket,
    ) -> Result<(), NetworkError>;

    async fn sync_chain(&self, request: SyncRequest) -> Result<BeaconStream, NetworkError>;

    async fn dkg_packet(&self, from: &str, packet: DkgPacket) -> Result<(), NetworkError>;
}
