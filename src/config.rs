use crate::peer::Peer;
use libp2p::identity::Keypair;

/// Configuration that specifies parameters such as network connection, node identification,
/// message buffer sizes and interval.
///
/// For convenience, default values are predefined when calling `new()` or `from_keypair()`
/// as following:
/// - Port number: 8000
/// - Maximum connected peers: 10
/// - Buffer size of send commands: 8
/// - Interval for peer discover: 10 secs
/// - Gossip heartbeat: 1 sec
/// - Maximum message size: 1 MiB
#[derive(Clone)]
pub struct Config {
    /// Keypair used for identification of this network node
    pub(crate) keypair: Keypair,

    /// Port number for TCP connection
    pub port: u16,

    /// Connections from peers beyond this number are dropped
    pub max_peers: usize,

    /// Bootstrap peers for initial connection setup
    pub boot_nodes: Vec<Peer>,

    /// Buffer size of commands initiated from caller
    pub send_command_buffer_size: usize,

    /// Interval in seconds for querying networking to discover peers.
    pub peer_discovery_interval: u64,

    /// Interval in seconds between gossipsub heartbeats.
    pub heartbeat_interval: u64,

    /// Largest gossip message accepted or sent, in bytes.
    pub max_message_size: usize,
}

impl Config {
    /// Create config with an automatically generated keypair.
    pub fn new() -> Self {
        Self::from_keypair(Keypair::generate_ed25519())
    }

    /// Create config with an existing keypair, e.g. one from [crate::keyfile::load_or_generate].
    pub fn from_keypair(keypair: Keypair) -> Self {
        Self {
            keypair,
            port: 8000,
            max_peers: 10,
            boot_nodes: Vec::new(),
            send_command_buffer_size: 8,
            peer_discovery_interval: 10, // secs
            heartbeat_interval: 1,       // secs
            max_message_size: 1024 * 1024,
        }
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    /// Set the port number used for networking
    pub fn set_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// maximum number of connected peers
    pub fn set_max_peers(mut self, max_peers: usize) -> Self {
        self.max_peers = max_peers;
        self
    }

    /// buffer size of commands initiated from caller
    pub fn set_send_command_buffer_size(mut self, send_command_buffer_size: usize) -> Self {
        self.send_command_buffer_size = send_command_buffer_size;
        self
    }

    /// Interval in seconds for querying networking to discover peers.
    pub fn set_peer_discovery_interval(mut self, peer_discovery_interval: u64) -> Self {
        self.peer_discovery_interval = peer_discovery_interval;
        self
    }

    /// Interval in seconds between gossipsub heartbeats.
    pub fn set_heartbeat_interval(mut self, heartbeat_interval: u64) -> Self {
        self.heartbeat_interval = heartbeat_interval;
        self
    }

    /// Largest gossip message in bytes.
    pub fn set_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    /// bootstrap nodes for initial connection
    pub fn set_boot_nodes(mut self, boot_nodes: Vec<Peer>) -> Self {
        self.boot_nodes = boot_nodes;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
