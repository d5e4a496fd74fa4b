//! Message components and their integer-discriminated codec.
//!
//! Components arrive as a polymorphic array discriminated by an integer
//! `type` field. Decoding reads a shallow view carrying only `type`, selects
//! the variant, then decodes the full payload into it; encoding injects the
//! `type` field so callers never have to.

use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::{ChannelType, Emoji, ModelError};

/// Component type discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentType(pub u8);

impl ComponentType {
    pub const ACTION_ROW: Self = Self(1);
    pub const BUTTON: Self = Self(2);
    pub const STRING_SELECT: Self = Self(3);
    pub const TEXT_INPUT: Self = Self(4);
    pub const USER_SELECT: Self = Self(5);
    pub const ROLE_SELECT: Self = Self(6);
    pub const MENTIONABLE_SELECT: Self = Self(7);
    pub const CHANNEL_SELECT: Self = Self(8);
}

/// A message component.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageComponent {
    ActionRow(ActionRow),
    Button(Button),
    SelectMenu(SelectMenu),
    TextInput(TextInput),
}

impl MessageComponent {
    /// The wire discriminator for this component.
    #[must_use]
    pub fn kind(&self) -> ComponentType {
        match self {
            Self::ActionRow(_) => ComponentType::ACTION_ROW,
            Self::Button(_) => ComponentType::BUTTON,
            Self::SelectMenu(m) => m.kind(),
            Self::TextInput(_) => ComponentType::TEXT_INPUT,
        }
    }

    /// Decode a component from a JSON value, dispatching on `type`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownComponentType`] for unrecognized
    /// discriminators and [`ModelError::Json`] for malformed payloads.
    pub fn from_value(value: &Value) -> Result<Self, ModelError> {
        #[derive(Deserialize)]
        struct Discriminator {
            #[serde(rename = "type")]
            kind: ComponentType,
        }

        let disc: Discriminator = serde_json::from_value(value.clone())?;
        match disc.kind {
            ComponentType::ACTION_ROW => {
                Ok(Self::ActionRow(serde_json::from_value(value.clone())?))
            }
            ComponentType::BUTTON => Ok(Self::Button(serde_json::from_value(value.clone())?)),
            ComponentType::STRING_SELECT
            | ComponentType::USER_SELECT
            | ComponentType::ROLE_SELECT
            | ComponentType::MENTIONABLE_SELECT
            | ComponentType::CHANNEL_SELECT => {
                let mut menu: SelectMenu = serde_json::from_value(value.clone())?;
                menu.menu_type = disc.kind;
                Ok(Self::SelectMenu(menu))
            }
            ComponentType::TEXT_INPUT => {
                Ok(Self::TextInput(serde_json::from_value(value.clone())?))
            }
            ComponentType(other) => Err(ModelError::UnknownComponentType(other)),
        }
    }
}

impl Serialize for MessageComponent {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let inner = match self {
            Self::ActionRow(v) => serde_json::to_value(v),
            Self::Button(v) => serde_json::to_value(v),
            Self::SelectMenu(v) => serde_json::to_value(v),
            Self::TextInput(v) => serde_json::to_value(v),
        }
        .map_err(serde::ser::Error::custom)?;

        let Value::Object(fields) = inner else {
            return Err(serde::ser::Error::custom("component must encode as an object"));
        };

        let mut map = serializer.serialize_map(Some(fields.len() + 1))?;
        map.serialize_entry("type", &self.kind())?;
        for (k, v) in &fields {
            if k != "type" {
                map.serialize_entry(k, v)?;
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for MessageComponent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value).map_err(D::Error::custom)
    }
}

/// A row of up to five child components.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionRow {
    #[serde(default)]
    pub components: Vec<MessageComponent>,
}

/// Button style.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonStyle(pub u8);

impl ButtonStyle {
    pub const PRIMARY: Self = Self(1);
    pub const SECONDARY: Self = Self(2);
    pub const SUCCESS: Self = Self(3);
    pub const DANGER: Self = Self(4);
    pub const LINK: Self = Self(5);
}

/// A clickable button.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Button {
    #[serde(default)]
    pub label: String,

    #[serde(default)]
    pub style: ButtonStyle,

    #[serde(default)]
    pub disabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<Emoji>,

    /// Target of a link button; mutually exclusive with `custom_id`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,

    /// Developer-defined identifier echoed back in interactions.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub custom_id: String,
}

/// A selectable option in a string select menu.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectMenuOption {
    #[serde(default)]
    pub label: String,

    pub value: String,

    #[serde(default)]
    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<Emoji>,

    #[serde(default)]
    pub default: bool,
}

/// A select menu (string, user, role, mentionable, or channel flavored).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectMenu {
    /// Which select flavor this is; defaults to string select.
    #[serde(rename = "type", default, skip_serializing)]
    pub menu_type: ComponentType,

    #[serde(default)]
    pub custom_id: String,

    #[serde(default)]
    pub placeholder: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_values: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_values: Option<u8>,

    /// Options; only meaningful on string selects.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<SelectMenuOption>,

    #[serde(default)]
    pub disabled: bool,

    /// Channel type filter; only meaningful on channel selects.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channel_types: Vec<ChannelType>,
}

impl SelectMenu {
    /// The wire discriminator, defaulting to a string select.
    #[must_use]
    pub fn kind(&self) -> ComponentType {
        if self.menu_type == ComponentType::default() {
            ComponentType::STRING_SELECT
        } else {
            self.menu_type
        }
    }
}

/// Text input style.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextInputStyle(pub u8);

impl TextInputStyle {
    pub const SHORT: Self = Self(1);
    pub const PARAGRAPH: Self = Self(2);
}

/// A text input within a modal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextInput {
    pub custom_id: String,

    #[serde(default)]
    pub label: String,

    #[serde(default)]
    pub style: TextInputStyle,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub placeholder: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,

    #[serde(default)]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn button_roundtrip_carries_type() {
        let component = MessageComponent::Button(Button {
            label: "Click".into(),
            style: ButtonStyle::PRIMARY,
            custom_id: "btn-1".into(),
            ..Default::default()
        });

        let json = serde_json::to_value(&component).unwrap();
        assert_eq!(json["type"], 2);

        let decoded: MessageComponent = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, component);
    }

    #[test]
    fn action_row_roundtrip_nested() {
        let row = MessageComponent::ActionRow(ActionRow {
            components: vec![MessageComponent::Button(Button {
                label: "Go".into(),
                style: ButtonStyle::LINK,
                url: "https://example.com".into(),
                ..Default::default()
            })],
        });

        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["type"], 1);
        assert_eq!(json["components"][0]["type"], 2);

        let decoded: MessageComponent = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, row);
    }

    #[test]
    fn select_menu_flavors_roundtrip() {
        for kind in [
            ComponentType::STRING_SELECT,
            ComponentType::USER_SELECT,
            ComponentType::ROLE_SELECT,
            ComponentType::MENTIONABLE_SELECT,
            ComponentType::CHANNEL_SELECT,
        ] {
            let menu = MessageComponent::SelectMenu(SelectMenu {
                menu_type: kind,
                custom_id: "sel".into(),
                ..Default::default()
            });

            let json = serde_json::to_value(&menu).unwrap();
            assert_eq!(json["type"], u64::from(kind.0));

            let decoded: MessageComponent = serde_json::from_value(json).unwrap();
            assert_eq!(decoded.kind(), kind);
        }
    }

    #[test]
    fn text_input_roundtrip() {
        let input = MessageComponent::TextInput(TextInput {
            custom_id: "answer".into(),
            label: "Answer".into(),
            style: TextInputStyle::PARAGRAPH,
            required: true,
            ..Default::default()
        });

        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json["type"], 4);
        let decoded: MessageComponent = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, input);
    }

    #[test]
    fn unknown_component_type_rejected() {
        let err = MessageComponent::from_value(&serde_json::json!({"type": 99})).unwrap_err();
        assert!(matches!(err, ModelError::UnknownComponentType(99)));
    }
}
