use std::fmt;

use serde::{Deserialize, Serialize};

/// Length of a whisper topic in bytes.
pub const TOPIC_LENGTH: usize = 4;

/// Four byte tag attached to every envelope in clear. Filters select envelopes by it
/// before trying to decrypt them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicType(pub [u8; TOPIC_LENGTH]);

impl TopicType {
    /// Build a topic from the leading bytes of `bytes`. Short input is zero padded.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut topic = [0u8; TOPIC_LENGTH];
        let len = bytes.len().min(TOPIC_LENGTH);
        topic[..len].copy_from_slice(&bytes[..len]);
        Self(topic)
    }

    pub fn as_bytes(&self) -> &[u8; TOPIC_LENGTH] {
        &self.0
    }
}

impl From<[u8; TOPIC_LENGTH]> for TopicType {
    fn from(bytes: [u8; TOPIC_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for TopicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}
