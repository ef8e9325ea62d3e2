use std::collections::HashMap;

use libp2p::PeerId;

use super::envelope::{Envelope, EnvelopeHash, SymKey};
use super::topic::TopicType;

/// A decrypted message delivered to a filter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub payload: Vec<u8>,
    pub topic: TopicType,
    /// unix time the envelope was sealed
    pub sent: u32,
    pub ttl: u32,
    pub envelope_hash: EnvelopeHash,
    /// peer that delivered the envelope, None when posted by this node
    pub source: Option<PeerId>,
    /// true if the envelope came as a direct message from a trusted peer
    pub p2p: bool,
}

/// Subscription to envelopes sealed with `key`. Received messages queue in the filter
/// until retrieved.
#[derive(Debug)]
pub struct Filter {
    pub key: SymKey,

    /// accepted topics, empty means any topic
    pub topics: Vec<TopicType>,

    /// accept direct messages from trusted peers
    pub allow_p2p: bool,

    messages: Vec<ReceivedMessage>,
}

impl Filter {
    pub fn new(key: SymKey) -> Self {
        Self {
            key,
            topics: Vec::new(),
            allow_p2p: false,
            messages: Vec::new(),
        }
    }

    pub fn with_topics(mut self, topics: Vec<TopicType>) -> Self {
        self.topics = topics;
        self
    }

    pub fn allow_p2p(mut self, allow_p2p: bool) -> Self {
        self.allow_p2p = allow_p2p;
        self
    }

    /// Whether the envelope is of interest before trying to decrypt it.
    pub(crate) fn accepts(&self, envelope: &Envelope, p2p: bool) -> bool {
        if p2p && !self.allow_p2p {
            return false;
        }
        self.topics.is_empty() || self.topics.contains(&envelope.topic)
    }

    /// Queue the message unless the same envelope is already waiting.
    fn trigger(&mut self, message: ReceivedMessage) {
        if !self
            .messages
            .iter()
            .any(|m| m.envelope_hash == message.envelope_hash)
        {
            self.messages.push(message);
        }
    }

    /// Take every queued message, oldest first.
    pub(crate) fn retrieve(&mut self) -> Vec<ReceivedMessage> {
        std::mem::take(&mut self.messages)
    }
}

/// Installed filters by id.
#[derive(Default)]
pub(crate) struct Filters {
    filters: HashMap<String, Filter>,
}

impl Filters {
    pub fn install(&mut self, filter: Filter) -> String {
        loop {
            let id = hex::encode(rand::random::<[u8; 32]>());
            if !self.filters.contains_key(&id) {
                self.filters.insert(id.clone(), filter);
                return id;
            }
        }
    }

    pub fn uninstall(&mut self, id: &str) -> bool {
        self.filters.remove(id).is_some()
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Filter> {
        self.filters.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Hand the envelope to every filter that accepts it and holds its key.
    /// Returns the number of filters that received the message.
    pub fn notify(&mut self, envelope: &Envelope, source: Option<PeerId>, p2p: bool) -> usize {
        let hash = envelope.hash();
        let mut opened: HashMap<SymKey, Option<Vec<u8>>> = HashMap::new();
        let mut delivered = 0;

        for filter in self.filters.values_mut() {
            if !filter.accepts(envelope, p2p) {
                continue;
            }
            let payload = opened
                .entry(filter.key.clone())
                .or_insert_with(|| envelope.open(&filter.key));
            if let Some(payload) = payload {
                filter.trigger(ReceivedMessage {
                    payload: payload.clone(),
                    topic: envelope.topic,
                    sent: envelope.sent(),
                    ttl: envelope.ttl,
                    envelope_hash: hash,
                    source,
                    p2p,
                });
                delivered += 1;
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::whisper::envelope::MessageParams;

    const NOW: u32 = 1_700_000_000;

    fn envelope(key: &SymKey, topic: &[u8], payload: &str) -> Envelope {
        Envelope::seal(
            &MessageParams::new(TopicType::from_bytes(topic), key.clone(), payload),
            NOW,
        )
        .unwrap()
    }

    #[test]
    fn delivers_to_filters_holding_the_key() {
        let key = SymKey::generate();
        let mut filters = Filters::default();
        let mine = filters.install(Filter::new(key.clone()));
        let other = filters.install(Filter::new(SymKey::generate()));

        assert_eq!(filters.notify(&envelope(&key, b"abcd", "hi"), None, false), 1);

        let received = filters.get_mut(&mine).unwrap().retrieve();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].payload, b"hi");
        assert_eq!(received[0].sent, NOW);
        assert!(filters.get_mut(&other).unwrap().retrieve().is_empty());
    }

    #[test]
    fn topic_selection() {
        let key = SymKey::generate();
        let mut filters = Filters::default();
        let id = filters.install(
            Filter::new(key.clone()).with_topics(vec![TopicType::from_bytes(b"abcd")]),
        );

        filters.notify(&envelope(&key, b"wxyz", "skip"), None, false);
        filters.notify(&envelope(&key, b"abcd", "keep"), None, false);

        let received = filters.get_mut(&id).unwrap().retrieve();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].payload, b"keep");
    }

    #[test]
    fn p2p_messages_need_permission() {
        let key = SymKey::generate();
        let mut filters = Filters::default();
        let closed = filters.install(Filter::new(key.clone()));
        let open = filters.install(Filter::new(key.clone()).allow_p2p(true));
        let source = PeerId::random();

        assert_eq!(filters.notify(&envelope(&key, b"abcd", "p2p"), Some(source), true), 1);

        assert!(filters.get_mut(&closed).unwrap().retrieve().is_empty());
        let received = filters.get_mut(&open).unwrap().retrieve();
        assert_eq!(received[0].source, Some(source));
        assert!(received[0].p2p);
    }

    #[test]
    fn retrieve_drains_and_deduplicates() {
        let key = SymKey::generate();
        let mut filters = Filters::default();
        let id = filters.install(Filter::new(key.clone()));
        let first = envelope(&key, b"abcd", "one");
        let second = envelope(&key, b"abcd", "two");

        filters.notify(&first, None, false);
        filters.notify(&first, None, false);
        filters.notify(&second, None, false);

        let payloads: Vec<_> = filters
            .get_mut(&id)
            .unwrap()
            .retrieve()
            .into_iter()
            .map(|m| m.payload)
            .collect();
        assert_eq!(payloads, vec![b"one".to_vec(), b"two".to_vec()]);
        assert!(filters.get_mut(&id).unwrap().retrieve().is_empty());
    }

    #[test]
    fn uninstall() {
        let mut filters = Filters::default();
        let id = filters.install(Filter::new(SymKey::generate()));
        assert_eq!(filters.len(), 1);
        assert!(filters.uninstall(&id));
        assert!(!filters.uninstall(&id));
        assert!(filters.get_mut(&id).is_none());
    }
}
