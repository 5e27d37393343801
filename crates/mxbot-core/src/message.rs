//! Messages and outbound payload formatting.

use std::fmt;
use std::str::FromStr;

use pulldown_cmark::{Options, Parser, html};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::CoreError;
use crate::identity::Identifier;

/// Format marker for HTML-formatted bodies.
pub const HTML_FORMAT: &str = "org.matrix.custom.html";

/// Event type for room messages.
pub const MESSAGE_EVENT_TYPE: &str = "m.room.message";

// =============================================================================
// MessageType
// =============================================================================

/// The fixed set of message subtypes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    #[default]
    #[serde(rename = "m.text")]
    Text,
    #[serde(rename = "m.notice")]
    Notice,
    #[serde(rename = "m.image")]
    Image,
    #[serde(rename = "m.audio")]
    Audio,
    #[serde(rename = "m.video")]
    Video,
    #[serde(rename = "m.location")]
    Location,
    #[serde(rename = "m.emote")]
    Emote,
    #[serde(rename = "nic.custom.confetti")]
    Confetti,
    #[serde(rename = "nic.custom.fireworks")]
    Fireworks,
    #[serde(rename = "io.element.effect.snowfall")]
    Snowfall,
    #[serde(rename = "io.element.effects.space_invaders")]
    SpaceInvaders,
}

impl MessageType {
    /// Every subtype, in declaration order.
    pub const ALL: [MessageType; 11] = [
        Self::Text,
        Self::Notice,
        Self::Image,
        Self::Audio,
        Self::Video,
        Self::Location,
        Self::Emote,
        Self::Confetti,
        Self::Fireworks,
        Self::Snowfall,
        Self::SpaceInvaders,
    ];

    /// The wire string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "m.text",
            Self::Notice => "m.notice",
            Self::Image => "m.image",
            Self::Audio => "m.audio",
            Self::Video => "m.video",
            Self::Location => "m.location",
            Self::Emote => "m.emote",
            Self::Confetti => "nic.custom.confetti",
            Self::Fireworks => "nic.custom.fireworks",
            Self::Snowfall => "io.element.effect.snowfall",
            Self::SpaceInvaders => "io.element.effects.space_invaders",
        }
    }

    /// Looks a subtype up by its position in [`MessageType::ALL`].
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Room-effect subtypes render as animations in supporting clients.
    pub fn is_effect(&self) -> bool {
        matches!(
            self,
            Self::Confetti | Self::Fireworks | Self::Snowfall | Self::SpaceInvaders
        )
    }
}

impl FromStr for MessageType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CoreError::UnknownMessageType(s.to_string()))
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Message
// =============================================================================

/// A chat message, inbound or outbound.
#[derive(Debug, Clone, Default)]
pub struct Message {
    pub body: String,
    pub frm: Option<Identifier>,
    pub to: Option<Identifier>,
    pub msgtype: MessageType,
    /// Custom content merged into the outbound payload.
    pub content: Map<String, Value>,
    /// Inbound protocol metadata.
    pub extras: Map<String, Value>,
}

impl Message {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn with_from(mut self, frm: impl Into<Identifier>) -> Self {
        self.frm = Some(frm.into());
        self
    }

    pub fn with_to(mut self, to: impl Into<Identifier>) -> Self {
        self.to = Some(to.into());
        self
    }

    pub fn with_msgtype(mut self, msgtype: MessageType) -> Self {
        self.msgtype = msgtype;
        self
    }

    /// A bare person writing into a private room.
    pub fn is_direct(&self) -> bool {
        let from_person = matches!(self.frm, Some(Identifier::Person(_)));
        let to_private = match &self.to {
            Some(Identifier::Room(room)) => room.is_private(),
            Some(Identifier::PrivateRoom(direct)) => direct.room.is_private(),
            _ => false,
        };
        from_person && to_private
    }

    /// An occupant writing into a non-private room.
    pub fn is_group(&self) -> bool {
        let from_occupant = matches!(self.frm, Some(Identifier::Occupant(_)));
        let to_group = matches!(&self.to, Some(Identifier::Room(room)) if !room.is_private());
        from_occupant && to_group
    }

    /// The inbound event id, if the message came from the server.
    pub fn event_id(&self) -> Option<&str> {
        self.extras.get("event_id").and_then(Value::as_str)
    }

    pub fn get_custom(&self, key: &str) -> Option<&Value> {
        self.content.get(key)
    }

    /// Sets a custom content key; `None` removes it.
    pub fn set_custom(&mut self, key: impl Into<String>, value: Option<Value>) {
        let key = key.into();
        match value {
            Some(value) => {
                self.content.insert(key, value);
            }
            None => {
                self.content.remove(&key);
            }
        }
    }

    /// Builds the outbound `m.room.message` content.
    pub fn to_content(&self) -> Value {
        let mut payload = Map::new();
        payload.insert("msgtype".into(), json!(self.msgtype.as_str()));
        payload.insert("body".into(), json!(self.body));
        payload.extend(self.content.clone());
        format_payload(&mut payload);
        Value::Object(payload)
    }
}

/// Adds an HTML rendering to `m.text` payloads that carry no `format` yet.
pub fn format_payload(payload: &mut Map<String, Value>) {
    let is_text = payload.get("msgtype").and_then(Value::as_str) == Some(MessageType::Text.as_str());
    if !is_text || payload.contains_key("format") {
        return;
    }
    let body = payload
        .get("body")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let formatted = render_html(body);
    payload.insert("format".into(), json!(HTML_FORMAT));
    payload.insert("formatted_body".into(), json!(formatted));
}

/// Renders a CommonMark body to HTML.
pub fn render_html(body: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);

    let mut out = String::with_capacity(body.len() * 2);
    html::push_html(&mut out, Parser::new_ext(body, options));
    out.trim_end().to_string()
}
