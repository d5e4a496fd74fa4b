//! Voice connections for the banter Discord client.
//!
//! Each guild gets at most one [`VoiceConnection`]: a voice gateway
//! WebSocket for control and a UDP socket for xsalsa20-poly1305 sealed RTP
//! media. The connection never reaches back into the gateway session
//! directly; the session hands it a [`VoiceControl`] handle for op-4
//! writes and readiness checks.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod connection;
mod error;
pub mod protocol;
pub mod rtp;

pub use connection::*;
pub use error::*;
pub use rtp::Packet;

use async_trait::async_trait;

/// Control surface the owning gateway session exposes to its voice
/// connections.
#[async_trait]
pub trait VoiceControl: Send + Sync + 'static {
    /// Send an op-4 voice state update on the main gateway socket.
    ///
    /// `channel_id` of `None` disconnects from voice in the guild.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::Control`] when the gateway socket is missing
    /// or the write fails.
    async fn send_voice_state(
        &self,
        guild_id: &str,
        channel_id: Option<&str>,
        self_mute: bool,
        self_deaf: bool,
    ) -> VoiceResult<()>;

    /// Whether the gateway session is connected and heartbeating.
    fn session_ready(&self) -> bool;

    /// Drop the voice connection for `guild_id` from the session's map.
    fn forget_connection(&self, guild_id: &str);
}
