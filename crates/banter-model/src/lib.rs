//! Wire types for the banter Discord client.
//!
//! Everything that crosses the gateway or REST boundary lives here: resource
//! structs, the gateway envelope, the closed [`Event`] sum type with per-name
//! decoding, and the integer-discriminated codecs for message components and
//! interactions.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::struct_excessive_bools)]

mod channel;
mod component;
mod error;
mod event;
mod gateway;
mod guild;
mod interaction;
mod message;
pub mod permissions;
mod presence;
mod user;
mod voice;

pub use channel::*;
pub use component::*;
pub use error::*;
pub use event::*;
pub use gateway::*;
pub use guild::*;
pub use interaction::*;
pub use message::*;
pub use presence::*;
pub use user::*;
pub use voice::*;

pub(crate) mod string_i64 {
    //! Discord serializes 64-bit permission fields as decimal strings.

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &i64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum StringOrInt {
            String(String),
            Int(i64),
        }

        match StringOrInt::deserialize(deserializer)? {
            StringOrInt::String(s) => s.parse().map_err(serde::de::Error::custom),
            StringOrInt::Int(i) => Ok(i),
        }
    }
}
