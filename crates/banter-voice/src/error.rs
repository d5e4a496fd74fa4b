//! Voice connection errors.

use thiserror::Error;

/// Voice connection errors.
#[derive(Debug, Error)]
pub enum VoiceError {
    /// WebSocket failure on the voice gateway.
    #[error("voice WebSocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// UDP or socket-level failure.
    #[error("voice transport error: {0}")]
    Io(#[from] std::io::Error),

    /// Timed out waiting for the connection to become ready.
    #[error("timeout waiting for voice connection")]
    Timeout,

    /// Timed out waiting for the voice session ID from the gateway.
    #[error("did not receive voice session id in time")]
    NoSessionId,

    /// A voice-server-update arrived without an endpoint.
    #[error("empty voice endpoint")]
    EmptyEndpoint,

    /// The IP discovery response was shorter than the protocol requires.
    #[error("voice packet too small: {len} bytes")]
    PacketTooSmall {
        /// Observed length.
        len: usize,
    },

    /// The voice WebSocket is not open.
    #[error("no voice websocket")]
    NotConnected,

    /// The UDP media socket is already open.
    #[error("udp connection already open")]
    UdpAlreadyOpen,

    /// Media encryption or decryption failed.
    #[error("secretbox {0} failed")]
    Crypto(&'static str),

    /// The owning gateway session rejected a control write.
    #[error("gateway control error: {0}")]
    Control(String),
}

/// Result type for voice operations.
pub type VoiceResult<T> = Result<T, VoiceError>;
