//! Message relay between the dialog stack and the transport

use crate::message::{self, Message};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Outbound side of the transport
#[async_trait]
pub trait Connector: Send + Sync {
    /// Deliver a message to the user
    async fn send_message(&self, message: &Message) -> Result<(), String>;
}

#[async_trait]
impl<T: Connector + ?Sized> Connector for Arc<T> {
    async fn send_message(&self, message: &Message) -> Result<(), String> {
        (**self).send_message(message).await
    }
}

/// The two latched message slots of one conversation.
///
/// `to_bot` holds the inbound message of the current turn. `to_user` holds at
/// most one outbound message that has not been sent yet; buffering another
/// hands the previous one back to be flushed first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Relay {
    #[serde(default)]
    to_user: Option<Message>,
    #[serde(default)]
    to_bot: Option<Message>,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latch the inbound message for this turn
    pub fn receive(&mut self, message: Message) {
        self.to_bot = Some(message);
    }

    pub fn to_bot(&self) -> Option<&Message> {
        self.to_bot.as_ref()
    }

    pub fn to_bot_mut(&mut self) -> Option<&mut Message> {
        self.to_bot.as_mut()
    }

    pub fn pending(&self) -> Option<&Message> {
        self.to_user.as_ref()
    }

    /// Take the unsent outbound message that `message` is about to supersede.
    ///
    /// The caller must send the returned message before calling [`buffer`].
    ///
    /// [`buffer`]: Relay::buffer
    pub fn take_superseded(&mut self) -> Option<Message> {
        self.to_user.take()
    }

    /// Buffer `message` as the reply for this turn.
    ///
    /// The slot must already be empty; see [`Relay::take_superseded`].
    pub fn buffer(&mut self, message: Message) {
        debug_assert!(self.to_user.is_none(), "outbound message overwritten unsent");
        self.to_user = Some(message);
    }

    /// End the turn: hand back the buffered reply and forget the inbound
    /// message
    pub fn finish_turn(&mut self) -> Option<Message> {
        self.to_bot = None;
        self.to_user.take()
    }

    /// Build a reply to the current inbound message
    pub fn reply(&self, text: impl Into<String>) -> Message {
        message::to_user(self.to_bot.as_ref(), text)
    }
}
