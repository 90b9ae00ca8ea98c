//! Runtime for executing conversations
//!
//! Wraps [`Session`] with persistence: each inbound message loads the
//! conversation's suspended stack, runs one turn, and saves the result only
//! when the turn succeeded.

pub mod traits;

#[cfg(test)]
pub mod testing;

pub use traits::*;

use crate::dialog::{Connector, DialogRegistry, Session};
use crate::fiber::{DialogId, FiberConfig, FiberError, DEFAULT_MAX_STEPS_PER_TURN};
use crate::message::Message;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotConfig {
    /// Path of the sqlite file holding suspended sessions
    pub db_path: String,
    pub max_steps_per_turn: usize,
}

impl BotConfig {
    pub fn from_env() -> Self {
        let db_path = std::env::var("DIALOG_FIBER_DB_PATH").unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            format!("{home}/.dialog-fiber/state.db")
        });
        let max_steps_per_turn = parse_max_steps(std::env::var("DIALOG_FIBER_MAX_STEPS").ok());
        Self {
            db_path,
            max_steps_per_turn,
        }
    }

    pub fn fiber(&self) -> FiberConfig {
        FiberConfig {
            max_steps_per_turn: self.max_steps_per_turn,
        }
    }
}

/// Step budget from the environment; unparsable or zero falls back to the default
fn parse_max_steps(raw: Option<String>) -> usize {
    raw.and_then(|s| s.trim().parse().ok())
        .filter(|&n: &usize| n > 0)
        .unwrap_or(DEFAULT_MAX_STEPS_PER_TURN)
}

/// Errors surfaced to the transport
#[derive(Debug, Error)]
pub enum BotError {
    #[error("inbound message has no conversation id")]
    MissingConversationId,
    #[error(transparent)]
    Fiber(#[from] FiberError),
    #[error("state store: {0}")]
    Store(String),
}

/// Runs turns for any number of conversations against one dialog tree.
///
/// Turns for the same conversation must not overlap; the transport is
/// expected to deliver one conversation's messages one at a time.
pub struct Bot<S: StateStore> {
    store: S,
    registry: Arc<DialogRegistry>,
    connector: Arc<dyn Connector>,
    root: DialogId,
    config: FiberConfig,
}

impl<S: StateStore> Bot<S> {
    pub fn new(
        store: S,
        registry: Arc<DialogRegistry>,
        connector: Arc<dyn Connector>,
        root: impl Into<DialogId>,
        config: FiberConfig,
    ) -> Self {
        Self {
            store,
            registry,
            connector,
            root: root.into(),
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Handle one inbound message and return the reply for it
    pub async fn handle(&self, message: Message) -> Result<Option<Message>, BotError> {
        let conv_id = message
            .conversation_id
            .clone()
            .ok_or(BotError::MissingConversationId)?;

        let mut session = match self.resume(&conv_id).await? {
            Some(session) => session,
            None => {
                let (session, greeting) = self.start(&conv_id).await?;
                if session.is_finished() {
                    // root ended inside its start routine; its greeting answers this message
                    tracing::info!(conv_id = %conv_id, "Conversation ended on start");
                    self.store.delete(&conv_id).await.map_err(BotError::Store)?;
                    return Ok(greeting);
                }
                if let Some(greeting) = greeting {
                    self.connector
                        .send_message(&greeting)
                        .await
                        .map_err(FiberError::Connector)?;
                }
                session
            }
        };

        let reply = match session.send(message).await {
            Ok(reply) => reply,
            Err(e) => {
                if e.is_protocol_violation() {
                    tracing::error!(conv_id = %conv_id, error = %e, "Dialog broke the turn protocol, keeping last saved state");
                } else {
                    tracing::warn!(conv_id = %conv_id, error = %e, "Turn failed, keeping last saved state");
                }
                return Err(e.into());
            }
        };

        if session.is_finished() {
            tracing::info!(conv_id = %conv_id, "Conversation ended");
            self.store.delete(&conv_id).await.map_err(BotError::Store)?;
        } else {
            let state = session.into_state();
            tracing::info!(conv_id = %conv_id, depth = state.stack.depth(), "Turn complete");
            self.store
                .save(&conv_id, &state)
                .await
                .map_err(BotError::Store)?;
        }
        Ok(reply)
    }

    /// The saved session for `conv_id`, if one is still running
    async fn resume(&self, conv_id: &str) -> Result<Option<Session>, BotError> {
        let saved = self.store.load(conv_id).await.map_err(BotError::Store)?;
        Ok(saved.filter(|s| !s.stack.is_empty()).map(|state| {
            tracing::debug!(conv_id = %conv_id, depth = state.stack.depth(), "Resuming session");
            Session::restore(
                state,
                self.registry.clone(),
                self.connector.clone(),
                self.config,
            )
        }))
    }

    /// A fresh session with the root dialog started, plus its greeting
    async fn start(&self, conv_id: &str) -> Result<(Session, Option<Message>), BotError> {
        tracing::info!(conv_id = %conv_id, root = %self.root, "Starting conversation");
        let mut session = Session::new(self.registry.clone(), self.connector.clone(), self.config);
        let greeting = session.start(self.root.clone(), &Value::Null).await?;
        Ok((session, greeting))
    }
}
