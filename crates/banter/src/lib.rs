//! banter, an async Discord API client.
//!
//! The [`Session`] owns one gateway connection and everything attached to
//! it: typed event dispatch with once-handlers and catch-alls, the
//! in-memory state cache advanced before handlers run, the rate-limited
//! REST client, and per-guild voice connections.
//!
//! ```rust,no_run
//! use banter::{Session, MessageCreate};
//!
//! #[tokio::main]
//! async fn main() -> banter::Result<()> {
//!     let session = Session::new("Bot my-token")?;
//!
//!     session.add_handler(|session: Session, message: MessageCreate| async move {
//!         if message.message.content == "!ping" {
//!             let _ = session
//!                 .rest()
//!                 .channel_message_send(
//!                     &message.message.channel_id,
//!                     &banter::MessageSend {
//!                         content: Some("pong".into()),
//!                         ..Default::default()
//!                     },
//!                 )
//!                 .await;
//!         }
//!     });
//!
//!     session.open().await?;
//!     std::future::pending::<()>().await;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod config;
mod error;
mod handler;
mod session;
mod state;

pub use config::{SessionConfig, StateConfig};
pub use error::{Error, Result, StateError};
pub use handler::{HandlerRegistry, HandlerRemover};
pub use session::{Session, VERSION};
pub use state::State;

pub use banter_model::*;
pub use banter_ratelimit::{RateLimitError, RateLimiter};
pub use banter_rest::{RestClient, RestError};
pub use banter_voice::{Packet, VoiceConnection, VoiceError};
pub use banter_webhook::{InteractionVerifier, VerifyError};
