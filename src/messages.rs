//! Messages that can be sent using Gossipsub, as well as chainable "gates" to process them on receipt.
//!
//! This module defines four main types:
//! - [Message]: arbitrary data that can be sent over Gossipsub.
//! - [Inbound]: a message received from the network together with the peer that delivered it.
//! - [MessageGateChain]: a chain of [MessageGate]s.
//! - [NetworkTopic]: the pub/sub topic of a message.
//!
//! Message flow starts with a Message received from network. This message is passed as Inbound into
//! chain of [MessageGate]. Each gate checks the message's [NetworkTopic] to decide whether it should be
//! proceed. If the gate is not interested in the topic, the message is directly passed to the next gate. Otherwise,
//! the message is proceeded and then the gate can decide whether the message should be passed to next gate, or
//! terminate this message flow.

use async_trait::async_trait;
use libp2p::{gossipsub::IdentTopic, PeerId};

use crate::PublicAddress;

/// The arbitrary user-defined data that is being transmitted within the network.
pub type Message = Vec<u8>;

/// Inbound encapsulates the message received from the p2p network with the network
/// information such as the delivering peer.
#[derive(Clone, Debug)]
pub struct Inbound {
    /// The peer that handed the message to this node. For messages sent to oneself it is the local peer.
    pub source: PeerId,

    /// Topic the message was published on
    pub topic: NetworkTopicHash,

    /// The message encapsulated
    pub message: Message,
}

/// MessageGate is a message handler to proceed the message. It is used
/// with [MessageGateChain] to pass the message to other gate along the chain,
/// as well as stop passing message to the next gate.
///
/// Macro `async_trait` has to be added for using this trait, Example:
///
/// ```ignore
/// struct MyGate {}
///
/// #[async_trait]
/// impl MessageGate for MyGate {
///     fn topics(&self) -> Vec<NetworkTopic> {
///         vec![NetworkTopic::new("my/topic".to_string())]
///     }
///     async fn can_proceed(&self, topic_hash: &NetworkTopicHash) -> bool {
///         // ... topic filtering
///         true
///     }
///     async fn proceed(&self, inbound: Inbound) -> bool {
///         // ... do something with inbound
///         false // pass the message to next gate
///     }
/// }
/// ```
#[async_trait]
pub trait MessageGate: Send + Sync + 'static {
    /// topics this gate needs the node to be subscribed to
    fn topics(&self) -> Vec<NetworkTopic> {
        Vec::new()
    }

    /// check if the message type can be accepted to be proceed
    async fn can_proceed(&self, topic_hash: &NetworkTopicHash) -> bool;

    /// proceed the message and return true if the chain should be terminated
    async fn proceed(&self, inbound: Inbound) -> bool;
}

/// Chain of MessageGate. It consists of a sequence of message handlers.
/// Each message handler (Gate) implements its own message processing logic. Hence,
/// the chain of gates defines a complete flow of message processing.
///
#[derive(Default)]
pub struct MessageGateChain {
    gates: Vec<Box<dyn MessageGate>>,
}

impl MessageGateChain {
    pub fn new() -> Self {
        Self { gates: Vec::new() }
    }

    /// append a Message Gate at the end of the chain
    pub fn chain(mut self, gate: impl MessageGate) -> Self {
        self.gates.push(Box::new(gate));
        self
    }

    /// topics requested by all gates of the chain
    pub(crate) fn topics(&self) -> Vec<NetworkTopic> {
        self.gates.iter().flat_map(|gate| gate.topics()).collect()
    }

    /// message_in inputs the received message and pass it to the chain of MessageGate
    pub(crate) async fn message_in(&self, inbound: Inbound) {
        for gate in &self.gates {
            if gate.can_proceed(&inbound.topic).await && gate.proceed(inbound.clone()).await {
                break;
            }
        }
    }
}

#[derive(Debug, Clone)]
/// The Topic of the gossipsub message in the network. It basically wraps over [IdentTopic].
pub struct NetworkTopic(IdentTopic);

/// Hash of the Network message topic.
pub type NetworkTopicHash = libp2p::gossipsub::TopicHash;

impl From<NetworkTopic> for IdentTopic {
    fn from(topic: NetworkTopic) -> Self {
        topic.0
    }
}

/// The personal topic of a peer: its Base64 encoded public address.
impl From<PublicAddress> for NetworkTopic {
    fn from(address: PublicAddress) -> Self {
        Self(IdentTopic::new(base64url::encode(address)))
    }
}

impl NetworkTopic {
    pub fn new(topic: String) -> Self {
        NetworkTopic(IdentTopic::new(topic))
    }

    pub fn hash(&self) -> NetworkTopicHash {
        self.0.hash()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    struct CountingGate {
        topic: NetworkTopicHash,
        seen: Arc<AtomicUsize>,
        terminate: bool,
    }

    #[async_trait]
    impl MessageGate for CountingGate {
        async fn can_proceed(&self, topic_hash: &NetworkTopicHash) -> bool {
            *topic_hash == self.topic
        }

        async fn proceed(&self, _inbound: Inbound) -> bool {
            self.seen.fetch_add(1, Ordering::SeqCst);
            self.terminate
        }
    }

    fn inbound(topic: &NetworkTopic) -> Inbound {
        Inbound {
            source: PeerId::random(),
            topic: topic.hash(),
            message: b"hello".to_vec(),
        }
    }

    #[tokio::test]
    async fn chain_skips_gates_of_other_topics() {
        let topic = NetworkTopic::new("a".to_string());
        let other = NetworkTopic::new("b".to_string());
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let chain = MessageGateChain::new()
            .chain(CountingGate {
                topic: other.hash(),
                seen: first.clone(),
                terminate: false,
            })
            .chain(CountingGate {
                topic: topic.hash(),
                seen: second.clone(),
                terminate: false,
            });

        chain.message_in(inbound(&topic)).await;

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn terminating_gate_stops_the_chain() {
        let topic = NetworkTopic::new("a".to_string());
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let chain = MessageGateChain::new()
            .chain(CountingGate {
                topic: topic.hash(),
                seen: first.clone(),
                terminate: true,
            })
            .chain(CountingGate {
                topic: topic.hash(),
                seen: second.clone(),
                terminate: false,
            });

        chain.message_in(inbound(&topic)).await;

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn personal_topic_is_base64_address() {
        let address = [7u8; 32];
        let topic = NetworkTopic::from(address);
        assert_eq!(
            topic.hash(),
            NetworkTopic::new(base64url::encode(address)).hash()
        );
    }
}
