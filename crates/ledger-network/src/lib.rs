//! # ledger-network
//!
//! JSON message-passing transport between ledger nodes.
//!
//! This crate provides:
//! - Length-prefixed JSON envelope framing over TCP
//! - Peer bookkeeping, keyed by the configured node id
//! - A single event stream the node orchestrator drains for inbound
//!   envelopes and connect/disconnect notifications

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod peer;
pub mod service;
pub mod types;

pub use error::{NetworkError, NetworkResult};
pub use peer::{PeerConnection, PeerInfo, PeerManager, PeerState};
pub use service::{NetworkConfig, NetworkEvent, NetworkService};
pub use types::{decode_frame, encode_frame, PeerId, MAX_FRAME_LEN};
