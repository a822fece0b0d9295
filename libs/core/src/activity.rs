use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

/// Activity `type` values understood by the relay.
pub mod activity_types {
    pub const MESSAGE: &str = "message";
    pub const TRACE: &str = "trace";
    pub const CONVERSATION_UPDATE: &str = "conversationUpdate";
    pub const EVENT: &str = "event";
    pub const INVOKE: &str = "invoke";
    pub const TYPING: &str = "typing";
    pub const END_OF_CONVERSATION: &str = "endOfConversation";
}

pub const DELIVERY_MODE_EXPECT_REPLIES: &str = "expectReplies";

/// Bot Framework activity as exchanged with channels.
///
/// Only `type` is mandatory. Fields the relay does not model are kept in
/// [`Activity::extra`] so an activity survives a decode/encode cycle intact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub r#type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<ConversationAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_data: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Activity {
    /// Creates an empty activity of the given type.
    pub fn new(r#type: impl Into<String>) -> Self {
        Self {
            r#type: r#type.into(),
            id: None,
            timestamp: None,
            channel_id: None,
            service_url: None,
            from: None,
            recipient: None,
            conversation: None,
            text: None,
            locale: None,
            reply_to_id: None,
            name: None,
            label: None,
            value: None,
            value_type: None,
            delivery_mode: None,
            attachments: Vec::new(),
            entities: Vec::new(),
            channel_data: None,
            extra: Map::new(),
        }
    }

    /// Plain text message.
    pub fn message(text: impl Into<String>) -> Self {
        let mut activity = Self::new(activity_types::MESSAGE);
        activity.text = Some(text.into());
        activity
    }

    /// Diagnostic activity meant for developer tooling such as the emulator.
    pub fn trace(
        name: impl Into<String>,
        value: Value,
        value_type: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        let mut activity = Self::new(activity_types::TRACE);
        activity.name = Some(name.into());
        activity.value = Some(value);
        activity.value_type = Some(value_type.into());
        activity.label = Some(label.into());
        activity
    }

    pub fn is_type(&self, r#type: &str) -> bool {
        self.r#type.eq_ignore_ascii_case(r#type)
    }

    pub fn is_message(&self) -> bool {
        self.is_type(activity_types::MESSAGE)
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation.as_ref().map(|c| c.id.as_str())
    }

    pub fn expects_replies(&self) -> bool {
        self.delivery_mode
            .as_deref()
            .map(|mode| mode.eq_ignore_ascii_case(DELIVERY_MODE_EXPECT_REPLIES))
            .unwrap_or(false)
    }

    /// Addresses `self` as a reply to `inbound`: the bot becomes the sender and
    /// the original sender becomes the recipient.
    pub fn apply_conversation_reference(&mut self, inbound: &Activity) {
        if self.from.is_none() {
            self.from = inbound.recipient.clone();
        }
        if self.recipient.is_none() {
            self.recipient = inbound.from.clone();
        }
        if self.conversation.is_none() {
            self.conversation = inbound.conversation.clone();
        }
        if self.channel_id.is_none() {
            self.channel_id = inbound.channel_id.clone();
        }
        if self.service_url.is_none() {
            self.service_url = inbound.service_url.clone();
        }
        if self.locale.is_none() {
            self.locale = inbound.locale.clone();
        }
        if self.reply_to_id.is_none() {
            self.reply_to_id = inbound.id.clone();
        }
        if self.timestamp.is_none() {
            self.timestamp = Some(OffsetDateTime::now_utc());
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChannelAccount {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConversationAccount {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_group: Option<bool>,
}

/// Identifier the channel assigns to an accepted activity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ResourceResponse {
    #[serde(default)]
    pub id: String,
}

/// HTTP response body used when replies travel back on the inbound request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ExpectedReplies {
    pub activities: Vec<Activity>,
}
