//! Whisper-style dark messaging on top of the gossip network.
//!
//! Every envelope is gossiped to every node on the [BROADCAST_TOPIC] regardless of who can read
//! it. Nodes keep envelopes they have seen in a pool until they expire, so a resent envelope is
//! ignored, and hand each new one to the installed [Filter]s. A filter receives the message when
//! it holds the key that opens it.
//!
//! Direct (p2p) messages skip the broadcast: they are published on the recipient's personal topic
//! and accepted only from peers marked with [Whisper::allow_p2p_messages_from_peer].
//!
//! ```ignore
//! let whisper = Whisper::new(WhisperConfig::default());
//! let network = entrypoint::start(config, MessageGateChain::new().chain(whisper.gate())).await?;
//! whisper.start(&network).await?;
//! let id = whisper.subscribe(Filter::new(key)).await;
//! ```

pub mod envelope;
pub mod filter;
pub mod topic;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use libp2p::PeerId;
use log::{debug, trace, warn};
use tokio::sync::{mpsc, Mutex};

use crate::error::{Error, Result};
use crate::messages::{Inbound, MessageGate, NetworkTopic, NetworkTopicHash};
use crate::network::{Command, Network};
use crate::{utilities, PublicAddress};

pub use envelope::{Envelope, EnvelopeHash, MessageParams, SymKey, DEFAULT_TTL, SYNC_ALLOWANCE};
pub use filter::{Filter, ReceivedMessage};
pub use topic::TopicType;

use filter::Filters;

/// Gossip topic carrying all broadcast envelopes.
pub const BROADCAST_TOPIC: &str = "/whisper/6";

#[derive(Clone, Debug)]
pub struct WhisperConfig {
    /// Largest encoded envelope accepted or posted, in bytes.
    pub max_message_size: usize,

    /// How often expired envelopes are purged from the pool.
    pub expiration_cycle: Duration,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            max_message_size: 1024 * 1024,
            expiration_cycle: Duration::from_secs(1),
        }
    }
}

/// Handle to the overlay. Clones share the same state.
#[derive(Clone)]
pub struct Whisper {
    inner: Arc<Inner>,
}

struct Inner {
    config: WhisperConfig,
    filters: Mutex<Filters>,
    /// hashes of envelopes seen, with their expiry
    pool: Mutex<HashMap<EnvelopeHash, u32>>,
    trusted: Mutex<HashSet<PeerId>>,
    link: Mutex<Option<Link>>,
}

/// What the overlay knows about the network once started.
struct Link {
    sender: mpsc::Sender<Command>,
    personal_topic: NetworkTopicHash,
}

impl Whisper {
    pub fn new(config: WhisperConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                filters: Mutex::new(Filters::default()),
                pool: Mutex::new(HashMap::new()),
                trusted: Mutex::new(HashSet::new()),
                link: Mutex::new(None),
            }),
        }
    }

    /// The gate to chain into [crate::entrypoint::start] so envelopes from the network reach this overlay.
    pub fn gate(&self) -> WhisperGate {
        WhisperGate {
            whisper: self.clone(),
        }
    }

    /// Attach the overlay to a running network and start purging expired envelopes.
    pub async fn start(&self, network: &Network) -> Result<()> {
        let node_info = network.node_info().await?;
        self.inner.trusted.lock().await.insert(node_info.peer_id);
        *self.inner.link.lock().await = Some(Link {
            sender: network.sender(),
            personal_topic: NetworkTopic::from(node_info.public_address).hash(),
        });

        let weak = Arc::downgrade(&self.inner);
        let cycle = self.inner.config.expiration_cycle;
        tokio::spawn(expiration_loop(weak, cycle));
        debug!("Whisper started on {}", node_info.peer_id);
        Ok(())
    }

    /// Install a filter and return its id.
    pub async fn subscribe(&self, filter: Filter) -> String {
        let mut filters = self.inner.filters.lock().await;
        let id = filters.install(filter);
        debug!("Installed filter {} ({} active)", id, filters.len());
        id
    }

    pub async fn unsubscribe(&self, id: &str) -> Result<()> {
        if self.inner.filters.lock().await.uninstall(id) {
            Ok(())
        } else {
            Err(Error::UnknownFilter(id.to_string()))
        }
    }

    /// Drain the messages the filter has received since the last call.
    pub async fn retrieve(&self, id: &str) -> Result<Vec<ReceivedMessage>> {
        self.inner
            .filters
            .lock()
            .await
            .get_mut(id)
            .map(Filter::retrieve)
            .ok_or_else(|| Error::UnknownFilter(id.to_string()))
    }

    /// Accept direct messages from the peer owning `address`.
    pub async fn allow_p2p_messages_from_peer(&self, address: &PublicAddress) -> Result<()> {
        let peer_id = utilities::peer_id(address)?;
        self.inner.trusted.lock().await.insert(peer_id);
        Ok(())
    }

    pub async fn is_trusted(&self, peer_id: &PeerId) -> bool {
        self.inner.trusted.lock().await.contains(peer_id)
    }

    /// Seal a message and broadcast it. Local filters receive it as well. Before [start](Whisper::start)
    /// the envelope only reaches local filters.
    ///
    /// Delivery to the network is best-effort: `Ok` means the envelope was handed to the network
    /// thread, which only logs gossip publish failures such as having no subscribed peers yet.
    pub async fn post(&self, params: MessageParams) -> Result<Envelope> {
        let envelope = Envelope::seal(&params, utilities::now())?;
        let bytes = self.encode_checked(&envelope)?;

        self.add(&envelope, None, false).await;

        let sender = self.sender().await;
        if let Some(sender) = sender {
            sender
                .send(Command::Broadcast(
                    NetworkTopic::new(BROADCAST_TOPIC.to_string()),
                    bytes,
                ))
                .await
                .map_err(|_| Error::NetworkClosed)?;
        }
        Ok(envelope)
    }

    /// Seal a message and send it directly to the peer owning `address`. Best-effort like [post](Whisper::post).
    pub async fn send_p2p(&self, address: PublicAddress, params: MessageParams) -> Result<Envelope> {
        let sender = self.sender().await.ok_or(Error::NotStarted)?;
        let envelope = Envelope::seal(&params, utilities::now())?;
        let bytes = self.encode_checked(&envelope)?;

        sender
            .send(Command::SendTo(address, bytes))
            .await
            .map_err(|_| Error::NetworkClosed)?;
        Ok(envelope)
    }

    async fn sender(&self) -> Option<mpsc::Sender<Command>> {
        self.inner
            .link
            .lock()
            .await
            .as_ref()
            .map(|link| link.sender.clone())
    }

    fn encode_checked(&self, envelope: &Envelope) -> Result<Vec<u8>> {
        let bytes = envelope.encode()?;
        self.check_size(bytes.len())?;
        Ok(bytes)
    }

    fn check_size(&self, size: usize) -> Result<()> {
        let limit = self.inner.config.max_message_size;
        if size > limit {
            return Err(Error::MessageTooLarge { size, limit });
        }
        Ok(())
    }

    /// Process an envelope received from `source`. Broadcast envelopes are checked for expiry;
    /// direct ones must come from a trusted peer.
    pub(crate) async fn receive(&self, source: PeerId, bytes: &[u8], p2p: bool) -> Result<()> {
        self.check_size(bytes.len())?;
        let envelope = Envelope::decode(bytes)?;

        if p2p {
            if !self.is_trusted(&source).await {
                warn!("Dropping direct message from untrusted peer {}", source);
                return Ok(());
            }
        } else {
            envelope.validate(utilities::now())?;
        }

        self.add(&envelope, Some(source), p2p).await;
        Ok(())
    }

    /// Record the envelope and notify the filters. Returns false for an envelope already in the pool.
    async fn add(&self, envelope: &Envelope, source: Option<PeerId>, p2p: bool) -> bool {
        if !p2p {
            let mut pool = self.inner.pool.lock().await;
            let hash = envelope.hash();
            if pool.contains_key(&hash) {
                trace!("Envelope {} already seen", hex::encode(hash));
                return false;
            }
            pool.insert(hash, envelope.expiry);
        }

        let delivered = self
            .inner
            .filters
            .lock()
            .await
            .notify(envelope, source, p2p);
        trace!(
            "Envelope topic={} delivered to {} filter(s)",
            envelope.topic,
            delivered
        );
        true
    }

    async fn personal_topic(&self) -> Option<NetworkTopicHash> {
        self.inner
            .link
            .lock()
            .await
            .as_ref()
            .map(|link| link.personal_topic.clone())
    }
}

impl Inner {
    /// Forget envelopes that expired before `now`.
    async fn expire(&self, now: u32) -> usize {
        let mut pool = self.pool.lock().await;
        let before = pool.len();
        pool.retain(|_, expiry| *expiry >= now);
        before - pool.len()
    }
}

async fn expiration_loop(inner: Weak<Inner>, cycle: Duration) {
    let mut tick = tokio::time::interval(cycle);
    loop {
        tick.tick().await;
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let expired = inner.expire(utilities::now()).await;
        if expired > 0 {
            trace!("Expired {} envelope(s)", expired);
        }
    }
}

/// [MessageGate] feeding broadcast and direct envelopes into a [Whisper].
pub struct WhisperGate {
    whisper: Whisper,
}

#[async_trait]
impl MessageGate for WhisperGate {
    fn topics(&self) -> Vec<NetworkTopic> {
        vec![NetworkTopic::new(BROADCAST_TOPIC.to_string())]
    }

    async fn can_proceed(&self, topic_hash: &NetworkTopicHash) -> bool {
        *topic_hash == NetworkTopic::new(BROADCAST_TOPIC.to_string()).hash()
            || self.whisper.personal_topic().await.as_ref() == Some(topic_hash)
    }

    async fn proceed(&self, inbound: Inbound) -> bool {
        let p2p = inbound.topic != NetworkTopic::new(BROADCAST_TOPIC.to_string()).hash();
        if let Err(e) = self
            .whisper
            .receive(inbound.source, &inbound.message, p2p)
            .await
        {
            debug!("Rejected envelope from {}: {}", inbound.source, e);
        }
        true
    }
}
