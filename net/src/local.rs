// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::{
    BeaconStream, DkgPacket, NetworkError, PartialBeaconPacket, ProtocolClient, ProtocolService,
    SyncRequest,
};
use async_trait::async_trait;
use lantern_key::Identity;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

struct Peer {
    service: Arc<dyn ProtocolService>,
    online: bool,
}

/// In-memory transport connecting the registered nodes of a test network.
///
/// Each node registers its [`ProtocolService`] under its address; the same
/// [`LocalNetwork`] value is handed to every node as its outbound
/// [`ProtocolClient`]. A node taken offline is cut in both directions, which
/// is how partition scenarios are simulated.
#[derive(Clone, Default)]
pub struct LocalNetwork {
    peers: Arc<RwLock<HashMap<String, Peer>>>,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, address: &str, service: Arc<dyn ProtocolService>) {
        self.peers.write().insert(
            address.to_string(),
            Peer {
                service,
                online: true,
            },
        );
    }

    /// Cuts a node off the network (or reconnects it).
    pub fn set_online(&self, address: &str, online: bool) {
        if let Some(peer) = self.peers.write().get_mut(address) {
            peer.online = online;
        }
    }

    fn reachable(&self, address: &str) -> Result<Arc<dyn ProtocolService>, NetworkError> {
        let peers = self.peers.read();
        match peers.get(address) {
            Some(peer) if peer.online => Ok(peer.service.clone()),
            _ => Err(NetworkError::Unreachable(address.to_string())),
        }
    }

    /// A send is routed only when both endpoints are online; `from` may be
    /// unknown (e.g. a node that never registered a service).
    fn route(
        &self,
        from: &str,
        to: &Identity,
    ) -> Result<Arc<dyn ProtocolService>, NetworkError> {
        let peers = self.peers.read();
        if let Some(sender) = peers.get(from) {
            if !sender.online {
                return Err(NetworkError::Unreachable(from.to_string()));
            }
        }
        drop(peers);
        self.reachable(to.address())
    }
}

/// The client side carries no sender address of its own, so outbound calls
/// pass the recipient through [`LocalNetwork::route`] with the caller
/// unidentified; node handlers use [`LocalClient`] to attach their address.
#[derive(Clone)]
pub struct LocalClient {
    network: LocalNetwork,
    address: String,
}

impl LocalClient {
    pub fn new(network: LocalNetwork, address: impl Into<String>) -> Self {
        Self {
            network,
            address: address.into(),
        }
    }
}

#[async_trait]
impl ProtocolClient for LocalClient {
    async fn partial_beacon(
        &self,
        to: &Identity,
        packet: PartialBeaconPacket,
    ) -> Result<(), NetworkError> {
        let service = self.network.route(&self.address, to)?;
        service.partial_beacon(&self.address, packet).await
    }

    async fn sync_chain(
        &self,
        to: &Identity,
        request: SyncRequest,
    ) -> Result<BeaconStream, NetworkError> {
        let service = self.network.route(&self.address, to)?;
        service.sync_chain(request).await
    }

    async fn dkg_packet(&self, to: &Identity, packet: DkgPacket) -> Result<(), NetworkError> {
        let service = self.network.route(&self.address, to)?;
        service.dkg_packet(&self.address, packet).await
    }
}
