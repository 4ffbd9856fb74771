//! Peer bookkeeping and framed stream I/O.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use ledger_types::Envelope;

use crate::error::{NetworkError, NetworkResult};
use crate::types::{decode_frame, encode_frame, PeerId, MAX_FRAME_LEN};

/// Peer connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Dial or accept in progress, identity not yet confirmed.
    Connecting,
    /// Identified and ready to exchange envelopes.
    Connected,
    /// Torn down.
    Disconnected,
}

/// Everything the node tracks about a cluster peer.
#[derive(Debug, Clone)]
pub struct PeerInfo {
    /// Configured or learned node id.
    pub id: PeerId,
    /// Remote address.
    pub addr: SocketAddr,
    /// Connection state.
    pub state: PeerState,
    /// When the connection was established.
    pub connected_at: Instant,
    /// When the last frame was seen from this peer.
    pub last_message_at: Instant,
    /// Whether this connection was accepted (vs dialed out).
    pub inbound: bool,
}

impl PeerInfo {
    /// Build a fresh, `Connecting` peer record.
    pub fn new(id: PeerId, addr: SocketAddr, inbound: bool) -> Self {
        let now = Instant::now();
        PeerInfo {
            id,
            addr,
            state: PeerState::Connecting,
            connected_at: now,
            last_message_at: now,
            inbound,
        }
    }

    /// Record receipt of a frame.
    pub fn touch(&mut self) {
        self.last_message_at = Instant::now();
    }
}

/// A peer's outbound envelope queue.
pub struct PeerConnection {
    /// The peer this connection reaches.
    pub peer_id: PeerId,
    /// Remote address.
    pub addr: SocketAddr,
    /// Outbound envelope sender; a background writer task drains this.
    pub sender: mpsc::Sender<Envelope>,
}

impl PeerConnection {
    /// Queue an envelope for delivery.
    pub async fn send(&self, envelope: Envelope) -> NetworkResult<()> {
        self.sender
            .send(envelope)
            .await
            .map_err(|_| NetworkError::ChannelClosed)
    }
}

/// Read one length-prefixed frame off a stream (works on a full
/// `TcpStream` or either half of one returned by `into_split`).
pub async fn read_envelope<R: AsyncRead + Unpin>(stream: &mut R) -> NetworkResult<Envelope> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len == 0 || len > MAX_FRAME_LEN {
        return Err(NetworkError::InvalidMessage("invalid frame length".into()));
    }

    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await?;
    decode_frame(&body).ok_or_else(|| NetworkError::InvalidMessage("malformed envelope".into()))
}

/// Write one length-prefixed frame to a stream.
pub async fn write_envelope<W: AsyncWrite + Unpin>(stream: &mut W, envelope: &Envelope) -> NetworkResult<()> {
    let frame = encode_frame(envelope);
    stream.write_all(&frame).await?;
    stream.flush().await?;
    Ok(())
}

/// Registry of known peers and their live connections.
pub struct PeerManager {
    peers: RwLock<HashMap<PeerId, PeerInfo>>,
    connections: RwLock<HashMap<PeerId, Arc<PeerConnection>>>,
}

impl PeerManager {
    /// An empty manager. The spec treats the peer list as append-only, so
    /// there is no capacity bound here (spec §5 "Shared resources").
    pub fn new() -> Self {
        PeerManager {
            peers: RwLock::new(HashMap::new()),
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Record a peer and its connection, replacing any prior connection for
    /// the same id (a reconnect supersedes the old channel).
    pub fn add_peer(&self, info: PeerInfo, conn: Arc<PeerConnection>) {
        let id = info.id.clone();
        self.peers.write().insert(id.clone(), info);
        self.connections.write().insert(id, conn);
    }

    /// Drop a peer's connection, keeping its `PeerInfo` (append-only per
    /// spec §5) but marking it disconnected.
    pub fn disconnect(&self, peer_id: &PeerId) {
        if let Some(peer) = self.peers.write().get_mut(peer_id) {
            peer.state = PeerState::Disconnected;
        }
        self.connections.write().remove(peer_id);
    }

    /// Look up a peer's bookkeeping record.
    pub fn get_peer(&self, peer_id: &PeerId) -> Option<PeerInfo> {
        self.peers.read().get(peer_id).cloned()
    }

    /// Look up a peer's live connection, if any.
    pub fn get_connection(&self, peer_id: &PeerId) -> Option<Arc<PeerConnection>> {
        self.connections.read().get(peer_id).cloned()
    }

    /// Mark a peer as identified and ready.
    pub fn mark_connected(&self, peer_id: &PeerId) {
        if let Some(peer) = self.peers.write().get_mut(peer_id) {
            peer.state = PeerState::Connected;
        }
    }

    /// Update the last-message timestamp for a peer.
    pub fn touch_peer(&self, peer_id: &PeerId) {
        if let Some(peer) = self.peers.write().get_mut(peer_id) {
            peer.touch();
        }
    }

    /// All known peer ids, connected or not.
    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.peers.read().keys().cloned().collect()
    }

    /// Ids of peers with a live connection.
    pub fn connected_peer_ids(&self) -> Vec<PeerId> {
        self.connections.read().keys().cloned().collect()
    }

    /// How many peers are known.
    pub fn peer_count(&self) -> usize {
        self.peers.read().len()
    }

    /// Whether a peer id is already known.
    pub fn has_peer(&self, peer_id: &PeerId) -> bool {
        self.peers.read().contains_key(peer_id)
    }
}

impl Default for PeerManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8000".parse().unwrap()
    }

    fn conn(id: PeerId) -> Arc<PeerConnection> {
        let (tx, _rx) = mpsc::channel(1);
        Arc::new(PeerConnection {
            peer_id: id,
            addr: test_addr(),
            sender: tx,
        })
    }

    #[test]
    fn test_peer_info_creation() {
        let id = PeerId::new("node-1");
        let info = PeerInfo::new(id.clone(), test_addr(), false);
        assert_eq!(info.id, id);
        assert_eq!(info.state, PeerState::Connecting);
        assert!(!info.inbound);
    }

    #[test]
    fn test_peer_manager_add_and_lookup() {
        let manager = PeerManager::new();
        let id = PeerId::new("node-1");
        let info = PeerInfo::new(id.clone(), test_addr(), false);
        manager.add_peer(info, conn(id.clone()));

        assert!(manager.has_peer(&id));
        assert_eq!(manager.peer_count(), 1);
        assert!(manager.get_connection(&id).is_some());
    }

    #[test]
    fn test_disconnect_keeps_peer_info_but_drops_connection() {
        let manager = PeerManager::new();
        let id = PeerId::new("node-1");
        let info = PeerInfo::new(id.clone(), test_addr(), false);
        manager.add_peer(info, conn(id.clone()));

        manager.disconnect(&id);
        assert!(manager.has_peer(&id));
        assert!(manager.get_connection(&id).is_none());
        assert_eq!(manager.get_peer(&id).unwrap().state, PeerState::Disconnected);
    }

    #[test]
    fn test_mark_connected() {
        let manager = PeerManager::new();
        let id = PeerId::new("node-1");
        manager.add_peer(PeerInfo::new(id.clone(), test_addr(), true), conn(id.clone()));
        manager.mark_connected(&id);
        assert_eq!(manager.get_peer(&id).unwrap().state, PeerState::Connected);
    }

    #[test]
    fn test_connected_peer_ids() {
        let manager = PeerManager::new();
        let id1 = PeerId::new("node-1");
        let id2 = PeerId::new("node-2");
        manager.add_peer(PeerInfo::new(id1.clone(), test_addr(), false), conn(id1.clone()));
        manager.add_peer(PeerInfo::new(id2.clone(), test_addr(), false), conn(id2.clone()));
        manager.disconnect(&id2);

        let connected = manager.connected_peer_ids();
        assert_eq!(connected.len(), 1);
        assert_eq!(connected[0], id1);
    }
}
