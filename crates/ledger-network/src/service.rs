//! The network service: dials configured peers, accepts inbound
//! connections, and exposes a single [`NetworkEvent`] stream to the node
//! orchestrator.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use ledger_types::Envelope;

use crate::error::{NetworkError, NetworkResult};
use crate::peer::{read_envelope, write_envelope, PeerConnection, PeerInfo, PeerManager};
use crate::types::PeerId;

/// Network service configuration (spec §6 `id`/`host`/`port`).
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// This node's own id, announced on every outbound connection.
    pub self_id: PeerId,
    /// Local listen address.
    pub listen_addr: SocketAddr,
}

/// Something the node orchestrator needs to react to.
#[derive(Debug, Clone)]
pub enum NetworkEvent {
    /// A peer's connection became ready to exchange envelopes.
    PeerConnected(PeerId),
    /// A peer's connection was torn down.
    PeerDisconnected(PeerId),
    /// An envelope arrived from a peer.
    Message {
        /// Sender.
        from: PeerId,
        /// The envelope.
        envelope: Envelope,
    },
}

/// Owns peer connections and the background accept/dial/read/write tasks.
pub struct NetworkService {
    config: NetworkConfig,
    peers: Arc<PeerManager>,
    event_tx: mpsc::Sender<NetworkEvent>,
    event_rx: Option<mpsc::Receiver<NetworkEvent>>,
    running: Arc<RwLock<bool>>,
}

impl NetworkService {
    /// Build a service around `config`. Call [`Self::start`] to begin
    /// listening.
    pub fn new(config: NetworkConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(1024);
        NetworkService {
            config,
            peers: Arc::new(PeerManager::new()),
            event_tx,
            event_rx: Some(event_rx),
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Take ownership of the event stream. Callable once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<NetworkEvent>> {
        self.event_rx.take()
    }

    /// Whether [`Self::start`] has been called and not [`Self::stop`]ped.
    pub fn is_running(&self) -> bool {
        *self.running.read()
    }

    /// This node's own id.
    pub fn self_id(&self) -> &PeerId {
        &self.config.self_id
    }

    /// Every peer the service knows about, connected or not.
    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.peers.peer_ids()
    }

    /// Peers currently reachable.
    pub fn connected_peer_ids(&self) -> Vec<PeerId> {
        self.peers.connected_peer_ids()
    }

    /// Send an envelope to every connected peer.
    pub async fn broadcast(&self, envelope: Envelope) {
        for peer_id in self.peers.connected_peer_ids() {
            if let Some(conn) = self.peers.get_connection(&peer_id) {
                if let Err(e) = conn.send(envelope.clone()).await {
                    warn!("failed to send to peer {}: {}", peer_id, e);
                }
            }
        }
    }

    /// Send an envelope to one peer. This also serves as the "reply
    /// channel" the orchestrator uses to answer a command (spec §4.4):
    /// replies are just another envelope addressed back to the sender.
    pub async fn send_to(&self, peer_id: &PeerId, envelope: Envelope) -> NetworkResult<()> {
        let conn = self
            .peers
            .get_connection(peer_id)
            .ok_or_else(|| NetworkError::PeerNotFound(peer_id.to_string()))?;
        conn.send(envelope).await
    }

    /// Dial a configured peer (spec §6 `nodes: [{id, url}]`).
    pub async fn connect(&self, addr: SocketAddr) -> NetworkResult<PeerId> {
        let stream = TcpStream::connect(addr).await?;
        self.handle_connection(stream, addr, false).await
    }

    /// Start accepting inbound connections. Idempotent calls are rejected.
    pub async fn start(&self) -> NetworkResult<()> {
        if *self.running.read() {
            return Err(NetworkError::AlreadyRunning);
        }
        *self.running.write() = true;

        let listener = TcpListener::bind(self.config.listen_addr).await?;
        info!("listening on {}", self.config.listen_addr);

        let running = self.running.clone();
        let service = self.clone_handle();
        tokio::spawn(async move {
            while *running.read() {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        debug!("incoming connection from {}", addr);
                        let service = service.clone_handle();
                        tokio::spawn(async move {
                            if let Err(e) = service.handle_connection(stream, addr, true).await {
                                warn!("connection error from {}: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => warn!("accept error: {}", e),
                }
            }
        });

        Ok(())
    }

    /// Stop accepting connections. Existing connections are left to drain.
    pub fn stop(&self) {
        *self.running.write() = false;
    }

    /// Identify the peer (an initial `hello` envelope carrying its id),
    /// register it, and spawn its reader/writer tasks.
    async fn handle_connection(&self, mut stream: TcpStream, addr: SocketAddr, inbound: bool) -> NetworkResult<PeerId> {
        let hello = Envelope::command("hello", serde_json::json!({ "id": self.config.self_id.as_str() }));
        write_envelope(&mut stream, &hello).await?;

        let reply = read_envelope(&mut stream).await?;
        let peer_id = match reply {
            Envelope::Command { command, data } if command == "hello" => data
                .get("id")
                .and_then(|v| v.as_str())
                .map(PeerId::new)
                .ok_or_else(|| NetworkError::Protocol("hello missing id".into()))?,
            _ => return Err(NetworkError::Protocol("expected hello".into())),
        };

        let (tx, mut rx) = mpsc::channel::<Envelope>(256);
        let mut info = PeerInfo::new(peer_id.clone(), addr, inbound);
        info.state = crate::peer::PeerState::Connected;
        let conn = Arc::new(PeerConnection {
            peer_id: peer_id.clone(),
            addr,
            sender: tx,
        });
        self.peers.add_peer(info, conn);

        let _ = self.event_tx.send(NetworkEvent::PeerConnected(peer_id.clone())).await;
        info!("connected to peer {} at {}", peer_id, addr);

        let (mut read_half, mut write_half) = stream.into_split();
        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                let frame = crate::types::encode_frame(&envelope);
                if tokio::io::AsyncWriteExt::write_all(&mut write_half, &frame).await.is_err() {
                    break;
                }
            }
        });

        let peers = self.peers.clone();
        let event_tx = self.event_tx.clone();
        let running = self.running.clone();
        let reader_peer_id = peer_id.clone();
        tokio::spawn(async move {
            loop {
                if !*running.read() {
                    break;
                }
                match crate::peer::read_envelope(&mut read_half).await {
                    Ok(envelope) => {
                        peers.touch_peer(&reader_peer_id);
                        let _ = event_tx
                            .send(NetworkEvent::Message {
                                from: reader_peer_id.clone(),
                                envelope,
                            })
                            .await;
                    }
                    Err(_) => break,
                }
            }
            peers.disconnect(&reader_peer_id);
            let _ = event_tx.send(NetworkEvent::PeerDisconnected(reader_peer_id)).await;
        });

        Ok(peer_id)
    }

    fn clone_handle(&self) -> Self {
        NetworkService {
            config: self.config.clone(),
            peers: self.peers.clone(),
            event_tx: self.event_tx.clone(),
            event_rx: None,
            running: self.running.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU16, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    fn base_port() -> u16 {
        let secs = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
        40000 + ((secs % 20000) as u16)
    }

    static PORT_COUNTER: AtomicU16 = AtomicU16::new(0);

    fn next_port() -> u16 {
        base_port() + PORT_COUNTER.fetch_add(1, Ordering::SeqCst)
    }

    fn test_config(id: &str, port: u16) -> NetworkConfig {
        NetworkConfig {
            self_id: PeerId::new(id),
            listen_addr: format!("127.0.0.1:{}", port).parse().unwrap(),
        }
    }

    #[test]
    fn test_service_creation() {
        let mut service = NetworkService::new(test_config("n1", 30000));
        assert!(!service.is_running());
        assert!(service.take_events().is_some());
    }

    #[tokio::test]
    async fn test_service_start_stop() {
        let service = NetworkService::new(test_config("n1", next_port()));
        service.start().await.unwrap();
        assert!(service.is_running());
        service.stop();
    }

    #[tokio::test]
    async fn test_service_double_start() {
        let service = NetworkService::new(test_config("n1", next_port()));
        service.start().await.unwrap();
        let result = service.start().await;
        assert!(matches!(result, Err(NetworkError::AlreadyRunning)));
        service.stop();
    }

    #[tokio::test]
    async fn test_peer_to_peer_connection_exchanges_hello() {
        let port1 = next_port();
        let port2 = next_port();
        let mut service1 = NetworkService::new(test_config("n1", port1));
        let mut service2 = NetworkService::new(test_config("n2", port2));

        let mut events1 = service1.take_events().unwrap();
        let mut events2 = service2.take_events().unwrap();

        service1.start().await.unwrap();
        service2.start().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let peer_id = service1
            .connect(format!("127.0.0.1:{}", port2).parse().unwrap())
            .await
            .unwrap();
        assert_eq!(peer_id, PeerId::new("n2"));

        let event1 = tokio::time::timeout(std::time::Duration::from_secs(1), events1.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event1, NetworkEvent::PeerConnected(_)));

        let event2 = tokio::time::timeout(std::time::Duration::from_secs(1), events2.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event2, NetworkEvent::PeerConnected(_)));

        service1.stop();
        service2.stop();
    }
}
