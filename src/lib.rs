//! A node running a Whisper-style dark messaging overlay on a Libp2p network layer.
//!
//! [entrypoint::start] brings up the p2p network and returns a [network::Network] handle. Incoming
//! gossip flows through a [messages::MessageGateChain]; the [whisper::Whisper] overlay plugs into
//! that chain with [whisper::Whisper::gate].

mod behaviour;
pub mod config;
pub mod entrypoint;
pub mod error;
pub mod keyfile;
pub mod messages;
pub mod network;
pub mod peer;
pub mod utilities;
pub mod whisper;

pub use config::Config;
pub use entrypoint::start;
pub use error::{Error, Result};
pub use network::{Command, Network};
pub use peer::{NodeInfo, Peer, PeerInfo};

/// Raw Ed25519 public key identifying a peer.
pub type PublicAddress = [u8; 32];
