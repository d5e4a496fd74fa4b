//! Voice gateway wire payloads.

use serde::{Deserialize, Serialize};

/// Voice gateway opcodes.
pub mod op {
    pub const IDENTIFY: u8 = 0;
    pub const SELECT_PROTOCOL: u8 = 1;
    pub const READY: u8 = 2;
    pub const HEARTBEAT: u8 = 3;
    pub const SESSION_DESCRIPTION: u8 = 4;
    pub const SPEAKING: u8 = 5;
}

/// Close code the voice server sends on a host-driven disconnect or
/// channel move.
pub const CLOSE_MANUAL_DISCONNECT: u16 = 4014;

/// Op-0 voice identify payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoiceIdentify {
    pub server_id: String,

    pub user_id: String,

    pub session_id: String,

    pub token: String,
}

/// Op-2 ready payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoiceReady {
    pub ssrc: u32,

    #[serde(default)]
    pub ip: String,

    #[serde(default)]
    pub port: u16,

    #[serde(default)]
    pub modes: Vec<String>,

    /// Voice heartbeat period in milliseconds.
    #[serde(default)]
    pub heartbeat_interval: u64,
}

/// Op-4 session description payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDescription {
    pub secret_key: [u8; 32],

    #[serde(default)]
    pub mode: String,
}

/// Op-1 select protocol payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectProtocol {
    pub protocol: String,

    pub data: SelectProtocolData,
}

/// Inner data of the protocol selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectProtocolData {
    pub address: String,

    pub port: u16,

    pub mode: String,
}

/// Op-5 speaking payload, sent and received.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Speaking {
    pub speaking: bool,

    #[serde(default)]
    pub delay: u32,
}

/// Op-5 broadcast from the server about another user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeakingUpdate {
    #[serde(default)]
    pub user_id: String,

    #[serde(default)]
    pub ssrc: u32,

    #[serde(default)]
    pub speaking: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_description_decodes_key_array() {
        let json = serde_json::json!({
            "secret_key": (0u8..32).collect::<Vec<_>>(),
            "mode": "xsalsa20_poly1305"
        });
        let description: SessionDescription = serde_json::from_value(json).unwrap();
        assert_eq!(description.secret_key[31], 31);
        assert_eq!(description.mode, "xsalsa20_poly1305");
    }

    #[test]
    fn ready_decodes() {
        let ready: VoiceReady = serde_json::from_value(serde_json::json!({
            "ssrc": 9,
            "ip": "203.0.113.5",
            "port": 4000,
            "modes": ["xsalsa20_poly1305"],
            "heartbeat_interval": 5500
        }))
        .unwrap();
        assert_eq!(ready.ssrc, 9);
        assert_eq!(ready.heartbeat_interval, 5500);
    }
}
