use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::address::Address;
use crate::error::GroupError;

/// Outbound half of the transport boundary.
///
/// Implementations deliver opaque frames produced by the wire codec;
/// ordering and retransmission guarantees are theirs to define. The
/// engine treats a send as fire-and-confirm with a bounded wait, never a
/// delivery guarantee.
#[async_trait]
pub trait GroupTransport: Send + Sync {
    /// Address outbound frames are stamped with.
    fn local(&self) -> &Address;

    /// Delivers one frame to the peer.
    async fn send(&self, to: &Address, frame: Bytes) -> Result<(), GroupError>;
}

/// In-process network connecting engines through channels, in the spirit
/// of a shared-loopback transport: frames still pass through the wire
/// codec, only the sockets are gone. Used by single-process embeddings and
/// the integration tests.
#[derive(Debug, Default)]
pub struct LoopbackNetwork {
    peers: DashMap<Address, mpsc::Sender<Bytes>>,
}

impl LoopbackNetwork {
    /// Creates an empty network.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attaches a node, returning its transport handle and inbound frame
    /// stream. Re-registering an address replaces the previous attachment.
    pub fn register(
        self: &Arc<Self>,
        addr: &Address,
        queue: usize,
    ) -> (Arc<LoopbackTransport>, mpsc::Receiver<Bytes>) {
        let (frames_tx, frames_rx) = mpsc::channel(queue);
        self.peers.insert(addr.clone(), frames_tx);
        let transport = Arc::new(LoopbackTransport {
            local: addr.clone(),
            net: Arc::clone(self),
        });
        (transport, frames_rx)
    }

    /// Detaches a node; frames sent to it afterwards fail with no route.
    pub fn unregister(&self, addr: &Address) {
        self.peers.remove(addr);
    }

    /// Number of attached nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Returns `true` when no nodes are attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

/// Transport handle bound to one loopback peer.
#[derive(Debug)]
pub struct LoopbackTransport {
    local: Address,
    net: Arc<LoopbackNetwork>,
}

#[async_trait]
impl GroupTransport for LoopbackTransport {
    fn local(&self) -> &Address {
        &self.local
    }

    async fn send(&self, to: &Address, frame: Bytes) -> Result<(), GroupError> {
        // Clone the sender out so no map guard is held across the await.
        let Some(peer) = self.net.peers.get(to).map(|entry| entry.value().clone()) else {
            return Err(GroupError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no route to {to}"),
            )));
        };
        peer.send(frame).await.map_err(|_| GroupError::ChannelClosed)
    }
}
