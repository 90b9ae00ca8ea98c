//! The API dialog code sees during one step

use super::relay::{Connector, Relay};
use crate::fiber::{
    Command, DialogId, DialogValue, FiberError, FiberResult, ResumeAfter, TypedValue, ValueType,
    Violation,
};
use crate::message::Message;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// Handle given to a dialog routine.
///
/// A routine must call exactly one of [`call`], [`wait`] or [`done`] before it
/// returns. It may [`post`] any number of messages along the way.
///
/// [`call`]: DialogContext::call
/// [`wait`]: DialogContext::wait
/// [`done`]: DialogContext::done
/// [`post`]: DialogContext::post
pub struct DialogContext<'a> {
    dialog: &'a DialogId,
    state: &'a mut Value,
    relay: &'a mut Relay,
    connector: &'a dyn Connector,
    command: Option<Command>,
    violation: Option<Violation>,
}

impl<'a> DialogContext<'a> {
    pub(crate) fn new(
        dialog: &'a DialogId,
        state: &'a mut Value,
        relay: &'a mut Relay,
        connector: &'a dyn Connector,
    ) -> Self {
        Self {
            dialog,
            state,
            relay,
            connector,
            command: None,
            violation: None,
        }
    }

    /// The dialog this step belongs to
    pub fn dialog_id(&self) -> &DialogId {
        self.dialog
    }

    // ==================== Stack operations ====================

    /// Push `child` with its initial `state`. When the child is done with an
    /// `R`, this dialog's `resume` handler runs with it.
    pub fn call<R: DialogValue>(
        &mut self,
        child: impl Into<DialogId>,
        state: &impl Serialize,
        resume: impl Into<ResumeAfter>,
    ) -> FiberResult<()> {
        let command = Command::Call {
            child: child.into(),
            state: serde_json::to_value(state)?,
            handler: resume.into(),
            result: ValueType::of::<R>(),
        };
        self.record(command)
    }

    /// Complete this dialog with `value`, resuming the caller
    pub fn done<R: DialogValue>(&mut self, value: R) -> FiberResult<()> {
        let value = TypedValue::new(&value)?;
        self.record(Command::Done { value })
    }

    /// Suspend until the next inbound message, then run `resume`
    pub fn wait(&mut self, resume: impl Into<ResumeAfter>) -> FiberResult<()> {
        self.record(Command::Wait {
            handler: resume.into(),
        })
    }

    fn record(&mut self, command: Command) -> FiberResult<()> {
        if self.command.is_some() {
            self.violation = Some(Violation::MultipleTerminals);
            return Err(Violation::MultipleTerminals.into());
        }
        self.command = Some(command);
        Ok(())
    }

    /// Resolve what the routine did into the command for the fiber
    pub(crate) fn finish(self, outcome: FiberResult<()>) -> FiberResult<Command> {
        if let Some(violation) = self.violation {
            return Err(violation.into());
        }
        outcome?;
        self.command.ok_or_else(|| Violation::NoTerminal.into())
    }

    // ==================== Messages ====================

    /// Buffer `message` as the reply, sending any earlier unsent reply first
    pub async fn post(&mut self, message: Message) -> FiberResult<()> {
        if let Some(superseded) = self.relay.take_superseded() {
            tracing::debug!(dialog = %self.dialog, "Flushing superseded reply");
            self.connector
                .send_message(&superseded)
                .await
                .map_err(FiberError::Connector)?;
        }
        self.relay.buffer(message);
        Ok(())
    }

    /// Post `text` as a reply to the current inbound message
    pub async fn post_text(&mut self, text: impl Into<String> + Send) -> FiberResult<()> {
        let reply = self.relay.reply(text);
        self.post(reply).await
    }

    /// The inbound message of the current turn, if any
    pub fn inbound(&self) -> Option<&Message> {
        self.relay.to_bot()
    }

    // ==================== Dialog state ====================

    /// This dialog instance's state, or `T::default()` before anything was set
    pub fn state<T: DeserializeOwned + Default>(&self) -> FiberResult<T> {
        if self.state.is_null() {
            return Ok(T::default());
        }
        Ok(serde_json::from_value(self.state.clone())?)
    }

    pub fn set_state<T: Serialize>(&mut self, state: &T) -> FiberResult<()> {
        *self.state = serde_json::to_value(state)?;
        Ok(())
    }

    // ==================== Bot data bags ====================

    pub fn user_data(&self) -> Option<&Value> {
        self.inbound().and_then(|m| m.bot_user_data.as_ref())
    }

    pub fn conversation_data(&self) -> Option<&Value> {
        self.inbound().and_then(|m| m.bot_conversation_data.as_ref())
    }

    pub fn per_user_in_conversation_data(&self) -> Option<&Value> {
        self.inbound()
            .and_then(|m| m.bot_per_user_in_conversation_data.as_ref())
    }

    /// Mutable user bag; replies posted afterwards carry the change
    pub fn user_data_mut(&mut self) -> FiberResult<&mut Map<String, Value>> {
        Ok(bag(&mut self.inbound_mut()?.bot_user_data))
    }

    pub fn conversation_data_mut(&mut self) -> FiberResult<&mut Map<String, Value>> {
        Ok(bag(&mut self.inbound_mut()?.bot_conversation_data))
    }

    pub fn per_user_in_conversation_data_mut(&mut self) -> FiberResult<&mut Map<String, Value>> {
        Ok(bag(&mut self.inbound_mut()?.bot_per_user_in_conversation_data))
    }

    fn inbound_mut(&mut self) -> FiberResult<&mut Message> {
        self.relay
            .to_bot_mut()
            .ok_or_else(|| FiberError::invalid_state("no inbound message in this turn"))
    }
}

/// Bags are written as JSON objects; anything else in the slot is replaced
fn bag(slot: &mut Option<Value>) -> &mut Map<String, Value> {
    let value = slot.get_or_insert_with(|| Value::Object(Map::new()));
    if !value.is_object() {
        tracing::warn!(found = %value, "Replacing non-object data bag");
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("bag was just made an object"),
    }
}
