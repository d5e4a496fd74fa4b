//! Interactions and their tag-dispatched data codec.
//!
//! The `data` field of an interaction parses differently per interaction
//! type. Decoding reads a shallow view carrying `type` and the raw `data`,
//! then decodes `data` into the matching variant. Accessors on the decoded
//! interaction return typed errors instead of panicking on misuse.

use std::collections::HashMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::{Channel, Member, Message, MessageComponent, ModelError, Role, User};

/// Interaction type discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionType(pub u8);

impl InteractionType {
    pub const PING: Self = Self(1);
    pub const APPLICATION_COMMAND: Self = Self(2);
    pub const MESSAGE_COMPONENT: Self = Self(3);
    pub const APPLICATION_COMMAND_AUTOCOMPLETE: Self = Self(4);
    pub const MODAL_SUBMIT: Self = Self(5);
}

/// Application command option type discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOptionType(pub u8);

impl CommandOptionType {
    pub const SUB_COMMAND: Self = Self(1);
    pub const SUB_COMMAND_GROUP: Self = Self(2);
    pub const STRING: Self = Self(3);
    pub const INTEGER: Self = Self(4);
    pub const BOOLEAN: Self = Self(5);
    pub const USER: Self = Self(6);
    pub const CHANNEL: Self = Self(7);
    pub const ROLE: Self = Self(8);
    pub const MENTIONABLE: Self = Self(9);
    pub const NUMBER: Self = Self(10);
    pub const ATTACHMENT: Self = Self(11);
}

/// An inbound interaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Interaction {
    /// Interaction ID.
    pub id: String,

    /// Owning application ID.
    pub application_id: String,

    /// Interaction type.
    pub kind: InteractionType,

    /// Per-type payload; `None` for pings.
    pub data: Option<InteractionData>,

    /// Guild the interaction came from; empty in DMs.
    pub guild_id: String,

    /// Channel the interaction came from.
    pub channel_id: String,

    /// Message the component rode on, for component interactions.
    pub message: Option<Box<Message>>,

    /// Invoking member, in guilds.
    pub member: Option<Box<Member>>,

    /// Invoking user, in DMs.
    pub user: Option<User>,

    /// Invoker's locale.
    pub locale: String,

    /// Continuation token for responding.
    pub token: String,

    /// Always 1.
    pub version: u8,
}

/// Per-type interaction payload.
#[derive(Debug, Clone, PartialEq)]
pub enum InteractionData {
    /// Slash / user / message command invocation.
    ApplicationCommand(CommandData),
    /// Autocomplete keystroke; same shape as a command invocation.
    Autocomplete(CommandData),
    /// Button press or select change.
    MessageComponent(ComponentData),
    /// Modal form submission.
    ModalSubmit(ModalData),
}

impl Interaction {
    /// Command payload of a command or autocomplete interaction.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvariantViolation`] when called on any other
    /// interaction type.
    pub fn command_data(&self) -> Result<&CommandData, ModelError> {
        match &self.data {
            Some(InteractionData::ApplicationCommand(d) | InteractionData::Autocomplete(d)) => {
                Ok(d)
            }
            _ => Err(ModelError::InvariantViolation(format!(
                "command_data called on interaction of type {}",
                self.kind.0
            ))),
        }
    }

    /// Component payload of a message-component interaction.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvariantViolation`] when called on any other
    /// interaction type.
    pub fn component_data(&self) -> Result<&ComponentData, ModelError> {
        match &self.data {
            Some(InteractionData::MessageComponent(d)) => Ok(d),
            _ => Err(ModelError::InvariantViolation(format!(
                "component_data called on interaction of type {}",
                self.kind.0
            ))),
        }
    }

    /// Modal payload of a modal-submit interaction.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvariantViolation`] when called on any other
    /// interaction type.
    pub fn modal_data(&self) -> Result<&ModalData, ModelError> {
        match &self.data {
            Some(InteractionData::ModalSubmit(d)) => Ok(d),
            _ => Err(ModelError::InvariantViolation(format!(
                "modal_data called on interaction of type {}",
                self.kind.0
            ))),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct RawInteraction {
    id: String,
    application_id: String,
    #[serde(rename = "type")]
    kind: InteractionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    guild_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    channel_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<Box<Message>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    member: Option<Box<Member>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user: Option<User>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    locale: String,
    #[serde(default)]
    token: String,
    #[serde(default)]
    version: u8,
}

impl<'de> Deserialize<'de> for Interaction {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = RawInteraction::deserialize(deserializer)?;

        let data = match (&raw.kind, raw.data) {
            (_, None) | (&InteractionType::PING, _) => None,
            (&InteractionType::APPLICATION_COMMAND, Some(d)) => Some(
                InteractionData::ApplicationCommand(
                    serde_json::from_value(d).map_err(D::Error::custom)?,
                ),
            ),
            (&InteractionType::APPLICATION_COMMAND_AUTOCOMPLETE, Some(d)) => {
                Some(InteractionData::Autocomplete(
                    serde_json::from_value(d).map_err(D::Error::custom)?,
                ))
            }
            (&InteractionType::MESSAGE_COMPONENT, Some(d)) => {
                Some(InteractionData::MessageComponent(
                    serde_json::from_value(d).map_err(D::Error::custom)?,
                ))
            }
            (&InteractionType::MODAL_SUBMIT, Some(d)) => Some(InteractionData::ModalSubmit(
                serde_json::from_value(d).map_err(D::Error::custom)?,
            )),
            (&InteractionType(other), Some(_)) => {
                return Err(D::Error::custom(ModelError::UnknownInteractionType(other)));
            }
        };

        Ok(Self {
            id: raw.id,
            application_id: raw.application_id,
            kind: raw.kind,
            data,
            guild_id: raw.guild_id,
            channel_id: raw.channel_id,
            message: raw.message,
            member: raw.member,
            user: raw.user,
            locale: raw.locale,
            token: raw.token,
            version: raw.version,
        })
    }
}

impl Serialize for Interaction {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let data = match &self.data {
            None => None,
            Some(InteractionData::ApplicationCommand(d) | InteractionData::Autocomplete(d)) => {
                Some(serde_json::to_value(d).map_err(serde::ser::Error::custom)?)
            }
            Some(InteractionData::MessageComponent(d)) => {
                Some(serde_json::to_value(d).map_err(serde::ser::Error::custom)?)
            }
            Some(InteractionData::ModalSubmit(d)) => {
                Some(serde_json::to_value(d).map_err(serde::ser::Error::custom)?)
            }
        };

        let raw = RawInteraction {
            id: self.id.clone(),
            application_id: self.application_id.clone(),
            kind: self.kind,
            data,
            guild_id: self.guild_id.clone(),
            channel_id: self.channel_id.clone(),
            message: self.message.clone(),
            member: self.member.clone(),
            user: self.user.clone(),
            locale: self.locale.clone(),
            token: self.token.clone(),
            version: self.version,
        };
        raw.serialize(serializer)
    }
}

/// Entities resolved by the API for command options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedData {
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub users: HashMap<String, User>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub members: HashMap<String, Member>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub roles: HashMap<String, Role>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub channels: HashMap<String, Channel>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub messages: HashMap<String, Message>,
}

/// Application command invocation payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandData {
    pub id: String,

    #[serde(default)]
    pub name: String,

    /// Command type (chat input, user, message).
    #[serde(rename = "type", default)]
    pub command_type: u8,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<ResolvedData>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<CommandDataOption>,

    /// Target of a user or message command.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_id: String,
}

impl CommandData {
    /// Find a top-level option by name.
    #[must_use]
    pub fn option(&self, name: &str) -> Option<&CommandDataOption> {
        self.options.iter().find(|o| o.name == name)
    }
}

/// A supplied command option value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandDataOption {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: CommandOptionType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<CommandDataOption>,

    /// Set on the option currently being typed during autocomplete.
    #[serde(default)]
    pub focused: bool,
}

impl CommandDataOption {
    /// Find a nested option by name.
    #[must_use]
    pub fn option(&self, name: &str) -> Option<&CommandDataOption> {
        self.options.iter().find(|o| o.name == name)
    }

    /// String value of a string option.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvariantViolation`] on any other option type.
    pub fn string_value(&self) -> Result<&str, ModelError> {
        if self.kind != CommandOptionType::STRING {
            return Err(self.wrong_type("string_value"));
        }
        self.value
            .as_ref()
            .and_then(Value::as_str)
            .ok_or_else(|| self.wrong_type("string_value"))
    }

    /// Integer value of an integer option.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvariantViolation`] on any other option type.
    pub fn int_value(&self) -> Result<i64, ModelError> {
        if self.kind != CommandOptionType::INTEGER {
            return Err(self.wrong_type("int_value"));
        }
        self.value
            .as_ref()
            .and_then(Value::as_i64)
            .ok_or_else(|| self.wrong_type("int_value"))
    }

    /// Float value of a number option.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvariantViolation`] on any other option type.
    pub fn float_value(&self) -> Result<f64, ModelError> {
        if self.kind != CommandOptionType::NUMBER {
            return Err(self.wrong_type("float_value"));
        }
        self.value
            .as_ref()
            .and_then(Value::as_f64)
            .ok_or_else(|| self.wrong_type("float_value"))
    }

    /// Boolean value of a boolean option.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvariantViolation`] on any other option type.
    pub fn bool_value(&self) -> Result<bool, ModelError> {
        if self.kind != CommandOptionType::BOOLEAN {
            return Err(self.wrong_type("bool_value"));
        }
        self.value
            .as_ref()
            .and_then(Value::as_bool)
            .ok_or_else(|| self.wrong_type("bool_value"))
    }

    /// Snowflake value of a user, channel, role, or mentionable option.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvariantViolation`] on any other option type.
    pub fn id_value(&self) -> Result<&str, ModelError> {
        match self.kind {
            CommandOptionType::USER
            | CommandOptionType::CHANNEL
            | CommandOptionType::ROLE
            | CommandOptionType::MENTIONABLE
            | CommandOptionType::ATTACHMENT => self
                .value
                .as_ref()
                .and_then(Value::as_str)
                .ok_or_else(|| self.wrong_type("id_value")),
            _ => Err(self.wrong_type("id_value")),
        }
    }

    fn wrong_type(&self, accessor: &str) -> ModelError {
        ModelError::InvariantViolation(format!(
            "{accessor} called on option {:?} of type {}",
            self.name, self.kind.0
        ))
    }
}

/// Message component interaction payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentData {
    #[serde(default)]
    pub custom_id: String,

    #[serde(default)]
    pub component_type: crate::ComponentType,

    /// Chosen values of a select menu.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<ResolvedData>,
}

/// Modal submission payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModalData {
    #[serde(default)]
    pub custom_id: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<MessageComponent>,
}

/// Interaction response type discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionResponseType(pub u8);

impl InteractionResponseType {
    pub const PONG: Self = Self(1);
    pub const CHANNEL_MESSAGE_WITH_SOURCE: Self = Self(4);
    pub const DEFERRED_CHANNEL_MESSAGE_WITH_SOURCE: Self = Self(5);
    pub const DEFERRED_MESSAGE_UPDATE: Self = Self(6);
    pub const UPDATE_MESSAGE: Self = Self(7);
    pub const AUTOCOMPLETE_RESULT: Self = Self(8);
    pub const MODAL: Self = Self(9);
}

/// Outbound interaction response.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InteractionResponse {
    #[serde(rename = "type")]
    pub kind: InteractionResponseType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<InteractionResponseData>,
}

/// Body of an interaction response.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InteractionResponseData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<crate::Embed>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<MessageComponent>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<u64>,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub custom_id: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub title: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command_interaction_json() -> Value {
        serde_json::json!({
            "id": "1001",
            "application_id": "2002",
            "type": 2,
            "token": "tok",
            "version": 1,
            "guild_id": "G",
            "channel_id": "C",
            "data": {
                "id": "3003",
                "name": "greet",
                "type": 1,
                "options": [
                    {"name": "who", "type": 3, "value": "world"},
                    {"name": "count", "type": 4, "value": 3}
                ]
            }
        })
    }

    #[test]
    fn command_interaction_decodes() {
        let interaction: Interaction =
            serde_json::from_value(command_interaction_json()).unwrap();
        assert_eq!(interaction.kind, InteractionType::APPLICATION_COMMAND);

        let data = interaction.command_data().unwrap();
        assert_eq!(data.name, "greet");
        assert_eq!(data.option("who").unwrap().string_value().unwrap(), "world");
        assert_eq!(data.option("count").unwrap().int_value().unwrap(), 3);
    }

    #[test]
    fn decode_reencode_decode_preserves_data() {
        let first: Interaction = serde_json::from_value(command_interaction_json()).unwrap();
        let reencoded = serde_json::to_value(&first).unwrap();
        let second: Interaction = serde_json::from_value(reencoded).unwrap();
        assert_eq!(first.data, second.data);
    }

    #[test]
    fn component_interaction_decodes() {
        let interaction: Interaction = serde_json::from_value(serde_json::json!({
            "id": "1",
            "application_id": "2",
            "type": 3,
            "token": "t",
            "version": 1,
            "data": {"custom_id": "btn-1", "component_type": 2}
        }))
        .unwrap();

        let data = interaction.component_data().unwrap();
        assert_eq!(data.custom_id, "btn-1");
        assert!(interaction.command_data().is_err());
    }

    #[test]
    fn modal_interaction_decodes_components() {
        let interaction: Interaction = serde_json::from_value(serde_json::json!({
            "id": "1",
            "application_id": "2",
            "type": 5,
            "token": "t",
            "version": 1,
            "data": {
                "custom_id": "form",
                "components": [
                    {"type": 1, "components": [
                        {"type": 4, "custom_id": "answer", "label": "A", "style": 1, "value": "hi"}
                    ]}
                ]
            }
        }))
        .unwrap();

        let data = interaction.modal_data().unwrap();
        assert_eq!(data.custom_id, "form");
        assert_eq!(data.components.len(), 1);
    }

    #[test]
    fn wrong_variant_accessor_is_typed_error() {
        let interaction: Interaction = serde_json::from_value(command_interaction_json()).unwrap();
        assert!(matches!(
            interaction.component_data(),
            Err(ModelError::InvariantViolation(_))
        ));
    }

    #[test]
    fn unknown_interaction_type_rejected() {
        let result: Result<Interaction, _> = serde_json::from_value(serde_json::json!({
            "id": "1",
            "application_id": "2",
            "type": 42,
            "token": "t",
            "version": 1,
            "data": {}
        }));
        assert!(result.is_err());
    }

    #[test]
    fn wrong_option_type_accessor_is_typed_error() {
        let interaction: Interaction = serde_json::from_value(command_interaction_json()).unwrap();
        let data = interaction.command_data().unwrap();
        assert!(matches!(
            data.option("who").unwrap().int_value(),
            Err(ModelError::InvariantViolation(_))
        ));
    }
}
