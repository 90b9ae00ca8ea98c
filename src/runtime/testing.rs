//! Mock implementations for testing
//!
//! These mocks enable integration testing without a real transport.

use crate::dialog::Connector;
use crate::message::Message;
use async_trait::async_trait;
use std::sync::Mutex;

// ============================================================================
// Recording Connector
// ============================================================================

/// Connector that keeps every message it is asked to send
#[derive(Default)]
pub struct RecordingConnector {
    sent: Mutex<Vec<Message>>,
}

impl RecordingConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages sent so far, in order
    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }

    /// Texts of the messages sent so far
    pub fn sent_texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|m| m.text)
            .collect()
    }
}

#[async_trait]
impl Connector for RecordingConnector {
    async fn send_message(&self, message: &Message) -> Result<(), String> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

// ============================================================================
// Failing Connector
// ============================================================================

/// Connector whose sends always fail
pub struct FailingConnector {
    message: String,
}

impl FailingConnector {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl Connector for FailingConnector {
    async fn send_message(&self, _message: &Message) -> Result<(), String> {
        Err(self.message.clone())
    }
}
