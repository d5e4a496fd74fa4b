//! Session-level errors.

use thiserror::Error;

pub use crate::state::StateError;

/// Errors surfaced by the gateway session.
#[derive(Debug, Error)]
pub enum Error {
    /// `open` was called on a session with a live gateway socket.
    #[error("websocket already open")]
    WsAlreadyOpen,

    /// A gateway write was attempted without a live socket.
    #[error("no websocket connection exists")]
    WsNotFound,

    /// The configured shard ID is not below the shard count.
    #[error("shard id {shard_id} must be less than shard count {shard_count}")]
    ShardOutOfRange {
        shard_id: u32,
        shard_count: u32,
    },

    /// The gateway answered the dial with something other than Hello.
    #[error("expecting op 10, got op {0} instead")]
    ExpectingHello(u8),

    /// WebSocket transport failure.
    #[error("websocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Zlib decompression of a binary frame failed.
    #[error("zlib error: {0}")]
    Zlib(#[from] std::io::Error),

    /// REST failure.
    #[error(transparent)]
    Rest(#[from] banter_rest::RestError),

    /// Voice failure.
    #[error(transparent)]
    Voice(#[from] banter_voice::VoiceError),

    /// State cache failure.
    #[error(transparent)]
    State(#[from] StateError),
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, Error>;
