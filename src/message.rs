//! Chat message model
//!
//! The shape of a message as exchanged with the transport. Only the fields the
//! dialog engine reads or threads through replies are modeled here.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A participant in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelAccount {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl ChannelAccount {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }
}

/// A single chat message, inbound or outbound
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Message {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub from: Option<ChannelAccount>,
    #[serde(default)]
    pub to: Option<ChannelAccount>,
    #[serde(default)]
    pub reply_to_message_id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    /// Data bag scoped to the user across all conversations
    #[serde(default)]
    pub bot_user_data: Option<Value>,
    /// Data bag scoped to the conversation
    #[serde(default)]
    pub bot_conversation_data: Option<Value>,
    /// Data bag scoped to the user within this conversation
    #[serde(default)]
    pub bot_per_user_in_conversation_data: Option<Value>,
}

impl Message {
    /// A bare message carrying only text
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// An inbound user message addressed to the bot
    pub fn from_user(
        conversation_id: impl Into<String>,
        user: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: Some(uuid::Uuid::new_v4().to_string()),
            conversation_id: Some(conversation_id.into()),
            from: Some(ChannelAccount::new(user)),
            to: Some(ChannelAccount::new("bot")),
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Text or the empty string
    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    /// Build a reply addressed back to the sender of this message.
    ///
    /// The data bags are not copied; see [`to_user`] for that.
    pub fn create_reply(&self, text: impl Into<String>) -> Self {
        Self {
            id: None,
            conversation_id: self.conversation_id.clone(),
            from: self.to.clone(),
            to: self.from.clone(),
            reply_to_message_id: self.id.clone(),
            text: Some(text.into()),
            bot_user_data: None,
            bot_conversation_data: None,
            bot_per_user_in_conversation_data: None,
        }
    }
}

/// Build an outbound message for `text` in reply to `to_bot`.
///
/// When there is a triggering inbound message the reply keeps its conversation
/// identity and all three data bags, so a stateless transport can hand them
/// back on the next turn. Without one, the reply is a bare text message.
pub fn to_user(to_bot: Option<&Message>, text: impl Into<String>) -> Message {
    match to_bot {
        Some(to_bot) => {
            let mut reply = to_bot.create_reply(text);
            reply.bot_user_data.clone_from(&to_bot.bot_user_data);
            reply.bot_conversation_data.clone_from(&to_bot.bot_conversation_data);
            reply
                .bot_per_user_in_conversation_data
                .clone_from(&to_bot.bot_per_user_in_conversation_data);
            reply
        }
        None => Message::text(text),
    }
}
