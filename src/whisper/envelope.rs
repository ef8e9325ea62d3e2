//! Envelopes: the unit gossiped through the overlay.
//!
//! An [Envelope] carries its topic, timing and AES-256-GCM nonce in clear and the payload
//! encrypted under a [SymKey]. Nodes forward envelopes they cannot open; only holders of the key
//! learn the payload.

use std::fmt;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use serde::{Deserialize, Serialize};

use super::topic::TopicType;
use crate::error::{Error, Result};

/// Envelope lifetime used when [MessageParams] does not set one, in seconds.
pub const DEFAULT_TTL: u32 = 50;

/// Tolerated clock drift between peers, in seconds.
pub const SYNC_ALLOWANCE: u32 = 10;

pub const KEY_LENGTH: usize = 32;
pub const NONCE_LENGTH: usize = 12;

pub type EnvelopeHash = [u8; 32];

/// Symmetric key shared by the sender and the receivers of a message.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SymKey([u8; KEY_LENGTH]);

impl SymKey {
    /// A fresh random key.
    pub fn generate() -> Self {
        Self(rand::random())
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.0
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0))
    }
}

impl TryFrom<&[u8]> for SymKey {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        let key: [u8; KEY_LENGTH] = bytes.try_into().map_err(|_| {
            Error::InvalidKey(format!(
                "symmetric key must be {KEY_LENGTH} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(key))
    }
}

impl fmt::Debug for SymKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymKey").finish_non_exhaustive()
    }
}

/// What to send: a payload for holders of `key`, tagged with `topic`.
#[derive(Clone, Debug)]
pub struct MessageParams {
    pub topic: TopicType,
    pub key: SymKey,
    pub payload: Vec<u8>,
    /// seconds the envelope stays alive in the network
    pub ttl: u32,
}

impl MessageParams {
    pub fn new(topic: TopicType, key: SymKey, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic,
            key,
            payload: payload.into(),
            ttl: DEFAULT_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// unix time in seconds after which the envelope is dropped
    pub expiry: u32,
    pub ttl: u32,
    pub topic: TopicType,
    pub nonce: [u8; NONCE_LENGTH],
    /// encrypted payload
    pub data: Vec<u8>,
}

impl Envelope {
    /// Encrypt the payload of `params` into an envelope sent at `now`.
    pub fn seal(params: &MessageParams, now: u32) -> Result<Self> {
        let nonce: [u8; NONCE_LENGTH] = rand::random();
        let data = params
            .key
            .cipher()
            .encrypt(Nonce::from_slice(&nonce), params.payload.as_slice())
            .map_err(|e| Error::Crypto(format!("AES-256-GCM encryption failed: {e}")))?;

        Ok(Self {
            expiry: now.saturating_add(params.ttl),
            ttl: params.ttl,
            topic: params.topic,
            nonce,
            data,
        })
    }

    /// Decrypt the payload with `key`. None if the envelope was not sealed with it.
    pub fn open(&self, key: &SymKey) -> Option<Vec<u8>> {
        key.cipher()
            .decrypt(Nonce::from_slice(&self.nonce), self.data.as_slice())
            .ok()
    }

    /// unix time at which the envelope was sealed
    pub fn sent(&self) -> u32 {
        self.expiry.saturating_sub(self.ttl)
    }

    /// Identity of the envelope, stable across peers.
    pub fn hash(&self) -> EnvelopeHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.expiry.to_be_bytes());
        hasher.update(&self.ttl.to_be_bytes());
        hasher.update(self.topic.as_bytes());
        hasher.update(&self.nonce);
        hasher.update(&self.data);
        *hasher.finalize().as_bytes()
    }

    /// Check that the envelope is neither expired nor sent from too far in the future.
    pub fn validate(&self, now: u32) -> Result<()> {
        if self.expiry < now {
            return Err(Error::Expired {
                expiry: self.expiry,
                now,
            });
        }
        let sent = self.sent();
        if sent > now.saturating_add(SYNC_ALLOWANCE) {
            return Err(Error::FutureMessage { sent, now });
        }
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u32 = 1_700_000_000;

    fn key() -> SymKey {
        SymKey::try_from(&b"whisperv6 message test.........."[..]).unwrap()
    }

    fn params() -> MessageParams {
        MessageParams::new(TopicType::from_bytes(b"test"), key(), "hello")
    }

    #[test]
    fn sealed_payload_opens_with_the_same_key_only() {
        let envelope = Envelope::seal(&params(), NOW).unwrap();
        assert_ne!(envelope.data, b"hello");
        assert_eq!(envelope.open(&key()).unwrap(), b"hello");
        assert!(envelope.open(&SymKey::generate()).is_none());
    }

    #[test]
    fn tampered_envelope_does_not_open() {
        let mut envelope = Envelope::seal(&params(), NOW).unwrap();
        envelope.data[0] ^= 0xff;
        assert!(envelope.open(&key()).is_none());
    }

    #[test]
    fn timing_fields() {
        let envelope = Envelope::seal(&params().with_ttl(20), NOW).unwrap();
        assert_eq!(envelope.expiry, NOW + 20);
        assert_eq!(envelope.sent(), NOW);
    }

    #[test]
    fn validate_rejects_expired_and_future_envelopes() {
        let envelope = Envelope::seal(&params().with_ttl(20), NOW).unwrap();
        assert!(envelope.validate(NOW).is_ok());
        assert!(envelope.validate(NOW + 20).is_ok());
        assert!(matches!(
            envelope.validate(NOW + 21),
            Err(Error::Expired { .. })
        ));
        assert!(envelope.validate(NOW - SYNC_ALLOWANCE).is_ok());
        assert!(matches!(
            envelope.validate(NOW - SYNC_ALLOWANCE - 1),
            Err(Error::FutureMessage { .. })
        ));
    }

    #[test]
    fn decoded_envelope_keeps_its_hash() {
        let envelope = Envelope::seal(&params(), NOW).unwrap();
        let decoded = Envelope::decode(&envelope.encode().unwrap()).unwrap();
        assert_eq!(decoded, envelope);
        assert_eq!(decoded.hash(), envelope.hash());
    }

    #[test]
    fn same_payload_seals_to_distinct_envelopes() {
        let a = Envelope::seal(&params(), NOW).unwrap();
        let b = Envelope::seal(&params(), NOW).unwrap();
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn garbage_does_not_decode() {
        assert!(matches!(Envelope::decode(&[1, 2, 3]), Err(Error::Codec(_))));
    }

    #[test]
    fn key_length_is_checked() {
        assert!(SymKey::try_from(&b"short"[..]).is_err());
        assert!(!format!("{:?}", key()).contains("whisper"));
    }
}
