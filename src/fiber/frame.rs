//! Frame and continuation types
//!
//! Everything here is plain serializable data. A continuation names the dialog
//! and the resume handler to run, never a function pointer, so a stack saved
//! by one process can be resumed by another that registers the same dialogs.

use super::error::{FiberError, FiberResult, Violation};
use crate::message::Message;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

/// Stable identifier a dialog is registered under
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DialogId(String);

impl DialogId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DialogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DialogId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DialogId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Name of a resume handler within a dialog
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResumeAfter(String);

impl ResumeAfter {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResumeAfter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResumeAfter {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ResumeAfter {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl PartialEq<str> for ResumeAfter {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ResumeAfter {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

// ============================================================================
// Typed values
// ============================================================================

/// A value that can be passed from a child dialog to its caller.
///
/// `TYPE_TAG` is the persisted identity of the type; it must stay stable
/// across deployments for saved stacks to resume.
pub trait DialogValue: Serialize + DeserializeOwned + Send {
    const TYPE_TAG: &'static str;
}

macro_rules! dialog_value {
    ($($ty:ty => $tag:literal),* $(,)?) => {
        $(impl DialogValue for $ty {
            const TYPE_TAG: &'static str = $tag;
        })*
    };
}

dialog_value! {
    () => "unit",
    bool => "bool",
    i64 => "i64",
    u32 => "u32",
    f64 => "f64",
    String => "string",
    Value => "json",
    Message => "message",
    Option<bool> => "option<bool>",
    Option<i64> => "option<i64>",
    Option<f64> => "option<f64>",
    Option<String> => "option<string>",
}

/// The kind of value a frame is waiting to receive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "tag", rename_all = "snake_case")]
pub enum ValueType {
    /// The "no prior value" sentinel delivered to a start routine
    Initiation,
    /// The next inbound user message
    Message,
    /// A child dialog's result with the given type tag
    Result(String),
}

impl ValueType {
    pub fn of<R: DialogValue>() -> Self {
        Self::Result(R::TYPE_TAG.to_string())
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Initiation => f.write_str("initiation"),
            ValueType::Message => f.write_str("message"),
            ValueType::Result(tag) => write!(f, "result<{tag}>"),
        }
    }
}

/// A child result tagged with its type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedValue {
    pub type_tag: String,
    pub value: Value,
}

impl TypedValue {
    pub fn new<R: DialogValue>(value: &R) -> FiberResult<Self> {
        Ok(Self {
            type_tag: R::TYPE_TAG.to_string(),
            value: serde_json::to_value(value)?,
        })
    }

    pub fn value_type(&self) -> ValueType {
        ValueType::Result(self.type_tag.clone())
    }

    /// Decode into `R`, refusing any implicit coercion between tags
    pub fn decode<R: DialogValue>(self) -> FiberResult<R> {
        if self.type_tag != R::TYPE_TAG {
            return Err(FiberError::TypeMismatch {
                expected: ValueType::of::<R>(),
                actual: self.value_type(),
            });
        }
        Ok(serde_json::from_value(self.value)?)
    }
}

/// A value delivered to a frame's continuation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Payload {
    Initiation,
    Message(Message),
    Result(TypedValue),
}

impl Payload {
    pub fn value_type(&self) -> ValueType {
        match self {
            Payload::Initiation => ValueType::Initiation,
            Payload::Message(_) => ValueType::Message,
            Payload::Result(value) => value.value_type(),
        }
    }

    /// Unwrap an inbound message
    pub fn into_message(self) -> FiberResult<Message> {
        match self {
            Payload::Message(message) => Ok(message),
            other => Err(FiberError::TypeMismatch {
                expected: ValueType::Message,
                actual: other.value_type(),
            }),
        }
    }

    /// Unwrap a child result of type `R`
    pub fn into_result<R: DialogValue>(self) -> FiberResult<R> {
        match self {
            Payload::Result(value) => value.decode(),
            other => Err(FiberError::TypeMismatch {
                expected: ValueType::of::<R>(),
                actual: other.value_type(),
            }),
        }
    }
}

// ============================================================================
// Frames
// ============================================================================

/// Which routine of the frame's dialog runs next
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Rest {
    /// Start-thunk: run the dialog's start routine on the initiation sentinel
    Start,
    /// Resume-thunk: run the named handler with the delivered value
    Resume { handler: ResumeAfter },
}

/// One suspended unit of dialog computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub dialog: DialogId,
    /// The dialog instance's own state
    #[serde(default)]
    pub state: Value,
    pub rest: Rest,
    pub expects: ValueType,
}

impl Frame {
    /// A fresh frame whose next step is the dialog's start routine
    pub fn start(dialog: impl Into<DialogId>, state: Value) -> Self {
        Self {
            dialog: dialog.into(),
            state,
            rest: Rest::Start,
            expects: ValueType::Initiation,
        }
    }

    /// Check that `input` may be delivered to this frame
    pub fn accepts(&self, input: &Payload) -> FiberResult<()> {
        if self.rest == Rest::Start && *input != Payload::Initiation {
            return Err(Violation::UnexpectedInitiationValue.into());
        }
        let actual = input.value_type();
        if actual != self.expects {
            return Err(FiberError::TypeMismatch {
                expected: self.expects.clone(),
                actual,
            });
        }
        Ok(())
    }

    /// Suspend on the next inbound message
    pub(crate) fn settle_wait(&mut self, handler: ResumeAfter) {
        self.rest = Rest::Resume { handler };
        self.expects = ValueType::Message;
    }

    /// Suspend on a child's result
    pub(crate) fn settle_call(&mut self, handler: ResumeAfter, result: ValueType) {
        self.rest = Rest::Resume { handler };
        self.expects = result;
    }
}
