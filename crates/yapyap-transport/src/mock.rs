//! An in-process transport double for exercising the router end to end
//! without a real network fabric.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;

use yapyap_core::PeerId;

use crate::error::{TransportError, TransportResult};
use crate::transport::Transport;

const DUPLEX_BUFFER: usize = 64 * 1024;

/// Shared registry of "listening" peers: each registered peer has a channel
/// that receives the server half of every duplex pair dialed against it.
#[derive(Clone, Default)]
pub struct MockNetwork {
    listeners: Arc<DashMap<PeerId, mpsc::UnboundedSender<DuplexStream>>>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `peer` as reachable, returning the channel its incoming
    /// streams arrive on.
    pub fn listen(&self, peer: PeerId) -> mpsc::UnboundedReceiver<DuplexStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.insert(peer, tx);
        rx
    }

    pub fn unregister(&self, peer: &PeerId) {
        self.listeners.remove(peer);
    }

    pub fn transport(&self) -> MockTransport {
        MockTransport {
            network: self.clone(),
        }
    }
}

/// A [`Transport`] implementation backed by [`MockNetwork`]'s in-memory
/// duplex pairs.
#[derive(Clone)]
pub struct MockTransport {
    network: MockNetwork,
}

impl MockTransport {
    pub fn new(network: MockNetwork) -> Self {
        Self { network }
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Stream = DuplexStream;

    async fn dial_protocol(
        &self,
        target: &PeerId,
        _protocol_id: &str,
    ) -> TransportResult<Self::Stream> {
        let listener = self
            .network
            .listeners
            .get(target)
            .ok_or_else(|| TransportError::Other {
                target: target.to_string(),
                message: "peer unreachable".to_string(),
            })?
            .clone();

        let (client, server) = tokio::io::duplex(DUPLEX_BUFFER);
        listener.send(server).map_err(|_| TransportError::ConnectionReset {
            target: target.to_string(),
        })?;
        Ok(client)
    }

    async fn close(&self, _stream: Self::Stream) -> TransportResult<()> {
        Ok(())
    }

    async fn hang_up(&self, target: &PeerId) -> TransportResult<()> {
        self.network.unregister(target);
        Ok(())
    }
}
