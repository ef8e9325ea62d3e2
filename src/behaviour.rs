use libp2p::{
    gossipsub::{
        ConfigBuilder, Event as GossipEvent, IdentTopic, Message as GossipsubMessage,
        MessageAuthenticity, MessageId, ValidationMode,
    },
    identify::{Behaviour as Identify, Config as IdentifyConfig, Event as IdentifyEvent},
    identity::Keypair,
    kad::{store::MemoryStore, Kademlia, KademliaConfig, KademliaEvent},
    ping::{Behaviour as Ping, Config as PingConfig, Event as PingEvent},
    swarm::NetworkBehaviour,
    Multiaddr, PeerId, StreamProtocol,
};
use std::time::Duration;

use crate::{
    config::Config,
    error::Error,
    messages::{Message, NetworkTopic},
    PublicAddress,
};

pub(crate) const PROTOCOL_VERSION: &str = "/whisper_node/1.0.0";

#[derive(NetworkBehaviour)]
#[behaviour(to_swarm = "PeerNetworkEvent")]
pub(crate) struct PeerNetworkBehaviour {
    kad: Kademlia<MemoryStore>,
    gossip: libp2p::gossipsub::Behaviour,
    identify: Identify,
    ping: Ping,
}

impl PeerNetworkBehaviour {
    pub fn new(id: PublicAddress, config: &Config) -> Result<Self, Error> {
        let local_key: &Keypair = &config.keypair;
        let local_peer_id = local_key.public().to_peer_id();

        // Configure Kad
        let proto_names = vec![StreamProtocol::new(PROTOCOL_VERSION)];
        let kad_config = KademliaConfig::default()
            .set_protocol_names(proto_names)
            .to_owned();
        let mut kad = Kademlia::<MemoryStore>::with_config(
            local_peer_id,
            MemoryStore::new(local_peer_id),
            kad_config,
        );

        kad.set_mode(Some(libp2p::kad::Mode::Server));

        // Configure Identify
        let identify_config =
            IdentifyConfig::new(PROTOCOL_VERSION.to_string(), local_key.public())
                .with_agent_version(format!("whisper-node/{}", env!("CARGO_PKG_VERSION")));
        let identify = Identify::new(identify_config);

        // Configure Gossip. Envelopes carry no author, so identical content is the same message.
        let message_id_fn = |message: &GossipsubMessage| {
            MessageId::from(blake3::hash(&message.data).to_hex().to_string())
        };

        let gossip_config = ConfigBuilder::default()
            .max_transmit_size(config.max_message_size)
            .message_id_fn(message_id_fn)
            .validation_mode(ValidationMode::Anonymous)
            .heartbeat_interval(Duration::from_secs(config.heartbeat_interval))
            .build()
            .map_err(|e| Error::Behaviour(e.to_string()))?;
        let mut gossip =
            libp2p::gossipsub::Behaviour::new(MessageAuthenticity::Anonymous, gossip_config)
                .map_err(|e| Error::Behaviour(e.to_string()))?;
        // subscribe a network topic that uses Base64 encoded public address of this network peer as topic.
        gossip.subscribe(&NetworkTopic::from(id).into())?;

        // Configure Ping
        let ping = Ping::new(PingConfig::new());

        Ok(Self {
            gossip,
            kad,
            identify,
            ping,
        })
    }

    /// Add address to DHT
    pub fn add_address(&mut self, peer: &PeerId, address: Multiaddr) {
        self.kad.add_address(peer, address);
    }

    /// Remove a peer from DHT
    pub fn remove_peer(&mut self, peer: &PeerId) {
        self.kad.remove_peer(peer);
    }

    /// Query the network with random PeerId so as to discover
    /// peers in the network.
    pub fn random_walk(&mut self) {
        self.kad.get_closest_peers(PeerId::random());
    }

    /// Subscribes libp2p::gossipsub::PeerNetworkBehaviour topics
    pub fn subscribe(&mut self, topics: Vec<NetworkTopic>) -> Result<(), Error> {
        for topic in topics {
            self.gossip.subscribe(&topic.into())?;
        }

        Ok(())
    }

    /// Sends Message to peer with specific public address
    pub fn send_to(
        &mut self,
        address: PublicAddress,
        msg: Message,
    ) -> Result<MessageId, libp2p::gossipsub::PublishError> {
        let topic: IdentTopic = NetworkTopic::from(address).into();
        self.gossip.publish(topic, msg)
    }

    /// Broadcasts Messages to peers with specific topic
    pub fn broadcast(
        &mut self,
        topic: IdentTopic,
        msg: Message,
    ) -> Result<MessageId, libp2p::gossipsub::PublishError> {
        self.gossip.publish(topic, msg)
    }

    /// Check if the GossipsubMessage belongs to subscribed message topics
    pub fn is_subscribed(&self, message: &GossipsubMessage) -> bool {
        self.gossip.topics().any(|topic| message.topic.eq(topic))
    }
}

pub(crate) enum PeerNetworkEvent {
    Kad(KademliaEvent),
    Gossip(GossipEvent),
    Ping(PingEvent),
    Identify(IdentifyEvent),
}

impl From<GossipEvent> for PeerNetworkEvent {
    fn from(event: GossipEvent) -> Self {
        Self::Gossip(event)
    }
}

impl From<KademliaEvent> for PeerNetworkEvent {
    fn from(event: KademliaEvent) -> Self {
        Self::Kad(event)
    }
}

impl From<PingEvent> for PeerNetworkEvent {
    fn from(event: PingEvent) -> Self {
        Self::Ping(event)
    }
}

impl From<IdentifyEvent> for PeerNetworkEvent {
    fn from(event: IdentifyEvent) -> Self {
        Self::Identify(event)
    }
}
