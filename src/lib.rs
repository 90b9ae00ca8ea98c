//! Dialog Fiber - resumable dialog stacks for multi-turn conversations
//!
//! Each inbound message runs one turn of a conversation's dialog stack. The
//! turn ends when the active dialog waits for the next message, leaving the
//! stack as plain data that can be saved and resumed by another process.

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]

pub mod db;
pub mod demo;
pub mod dialog;
pub mod fiber;
pub mod message;
pub mod runtime;

pub use dialog::{Connector, Dialog, DialogContext, DialogRegistry, Session, SessionState};
pub use fiber::{
    DialogId, DialogValue, Fiber, FiberConfig, FiberError, FiberResult, Payload, ResumeAfter,
    Stack, TurnOutcome,
};
pub use message::{to_user, Message};
pub use runtime::{Bot, BotConfig, BotError};
