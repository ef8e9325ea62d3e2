use thiserror::Error;

/// Errors returned by the network layer and the whisper overlay.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid key file: {0}")]
    KeyFile(String),

    #[error("invalid peer: {0}")]
    InvalidPeer(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("behaviour setup failed: {0}")]
    Behaviour(String),

    #[error("subscription failed: {0}")]
    Subscription(#[from] libp2p::gossipsub::SubscriptionError),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("message of {size} bytes exceeds the limit of {limit} bytes")]
    MessageTooLarge { size: usize, limit: usize },

    #[error("envelope expired at {expiry}, now {now}")]
    Expired { expiry: u32, now: u32 },

    #[error("envelope sent in the future at {sent}, now {now}")]
    FutureMessage { sent: u32, now: u32 },

    #[error("no filter with id {0}")]
    UnknownFilter(String),

    #[error("whisper is not attached to a running network")]
    NotStarted,

    #[error("network task has stopped")]
    NetworkClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
