//! One conversation's adapter: fiber, relay and dispatch to dialog code

use super::context::DialogContext;
use super::relay::{Connector, Relay};
use super::DialogRegistry;
use crate::fiber::{
    Command, DialogId, Fiber, FiberConfig, FiberResult, Frame, Payload, Rest, Stack, Step,
    TurnOutcome,
};
use crate::message::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Everything that must be persisted between turns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub stack: Stack,
    #[serde(default)]
    pub relay: Relay,
}

/// Runs a frame's continuation by looking its dialog up in the registry
struct Dispatcher<'a> {
    registry: &'a DialogRegistry,
    relay: &'a mut Relay,
    connector: &'a dyn Connector,
}

#[async_trait]
impl<'a> Step for Dispatcher<'a> {
    async fn step(&mut self, frame: &mut Frame, input: Payload) -> FiberResult<Command> {
        let dialog = self.registry.get(&frame.dialog)?;
        let rest = frame.rest.clone();
        let mut ctx = DialogContext::new(
            &frame.dialog,
            &mut frame.state,
            &mut *self.relay,
            self.connector,
        );
        let outcome = match &rest {
            Rest::Start => dialog.start(&mut ctx).await,
            Rest::Resume { handler } => dialog.resume(&mut ctx, handler, input).await,
        };
        ctx.finish(outcome)
    }
}

/// The dialog-stack adapter for a single conversation.
///
/// Turns are driven through `&mut self`, so one session can never run two
/// turns at once.
pub struct Session {
    fiber: Fiber,
    relay: Relay,
    registry: Arc<DialogRegistry>,
    connector: Arc<dyn Connector>,
}

impl Session {
    /// A session with no dialog started yet
    pub fn new(
        registry: Arc<DialogRegistry>,
        connector: Arc<dyn Connector>,
        config: FiberConfig,
    ) -> Self {
        Self {
            fiber: Fiber::new(config),
            relay: Relay::new(),
            registry,
            connector,
        }
    }

    /// Rebuild a session from persisted state
    pub fn restore(
        state: SessionState,
        registry: Arc<DialogRegistry>,
        connector: Arc<dyn Connector>,
        config: FiberConfig,
    ) -> Self {
        Self {
            fiber: Fiber::from_stack(state.stack, config),
            relay: state.relay,
            registry,
            connector,
        }
    }

    /// Snapshot for persistence
    pub fn state(&self) -> SessionState {
        SessionState {
            stack: self.fiber.stack().clone(),
            relay: self.relay.clone(),
        }
    }

    pub fn into_state(self) -> SessionState {
        SessionState {
            stack: self.fiber.into_stack(),
            relay: self.relay,
        }
    }

    pub fn stack(&self) -> &Stack {
        self.fiber.stack()
    }

    pub fn is_finished(&self) -> bool {
        self.fiber.is_finished()
    }

    /// Push the root dialog and run its start routine.
    ///
    /// Returns the reply the start routine left buffered, if any.
    pub async fn start<T: Serialize + Sync>(
        &mut self,
        root: impl Into<DialogId>,
        state: &T,
    ) -> FiberResult<Option<Message>> {
        let root = Frame::start(root, serde_json::to_value(state)?);
        tracing::debug!(root = %root.dialog, "Starting root dialog");
        let mut dispatcher = Dispatcher {
            registry: &self.registry,
            relay: &mut self.relay,
            connector: self.connector.as_ref(),
        };
        let result = self.fiber.start(root, &mut dispatcher).await;
        self.settle(result)
    }

    /// Deliver one inbound message and run the turn it triggers.
    ///
    /// Returns the reply left buffered at the end of the turn. Replies
    /// superseded during the turn have already gone out through the
    /// connector. On error the stack is exactly as it was before the call.
    pub async fn send(&mut self, message: Message) -> FiberResult<Option<Message>> {
        self.relay.receive(message.clone());
        let mut dispatcher = Dispatcher {
            registry: &self.registry,
            relay: &mut self.relay,
            connector: self.connector.as_ref(),
        };
        let result = self
            .fiber
            .run_turn(Payload::Message(message), &mut dispatcher)
            .await;
        self.settle(result)
    }

    fn settle(&mut self, result: FiberResult<TurnOutcome>) -> FiberResult<Option<Message>> {
        let reply = self.relay.finish_turn();
        match result {
            Ok(TurnOutcome::Waiting) => {
                tracing::debug!(depth = self.fiber.stack().depth(), "Turn waiting for input");
                Ok(reply)
            }
            Ok(TurnOutcome::Completed(value)) => {
                tracing::info!(result = %value.value, tag = %value.type_tag, "Conversation completed");
                Ok(reply)
            }
            Err(e) => {
                if reply.is_some() {
                    tracing::warn!("Discarding reply buffered by failed turn");
                }
                tracing::warn!(error = %e, "Turn failed, stack unchanged");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialog::Dialog;
    use crate::fiber::{FiberError, ResumeAfter, ValueType, Violation};
    use crate::runtime::testing::{FailingConnector, RecordingConnector};

    /// Root dialog whose behaviour is picked by the text it receives
    struct Root;

    #[async_trait]
    impl Dialog for Root {
        async fn start(&self, ctx: &mut DialogContext<'_>) -> FiberResult<()> {
            ctx.wait("message")
        }

        async fn resume(
            &self,
            ctx: &mut DialogContext<'_>,
            handler: &ResumeAfter,
            input: Payload,
        ) -> FiberResult<()> {
            if handler == "after_child" {
                let value: String = input.into_result()?;
                ctx.post_text(format!("child said {value}")).await?;
                return ctx.wait("message");
            }
            if handler == "after_name" {
                let name: String = input.into_result()?;
                ctx.post_text(format!("hello {name}")).await?;
                return ctx.wait("message");
            }

            let message = input.into_message()?;
            match message.text_or_empty() {
                "child" => ctx.call::<String>("immediate", &"v", "after_child"),
                "ask" => ctx.call::<String>("asker", &(), "after_name"),
                "two" => {
                    ctx.post_text("A").await?;
                    ctx.post_text("B").await?;
                    ctx.wait("message")
                }
                "forget" => Ok(()),
                "twice" => {
                    ctx.wait("message")?;
                    ctx.wait("message")
                }
                "wrong" => ctx.call::<bool>("immediate", &"v", "after_child"),
                "burst" => {
                    ctx.post_text("r1").await?;
                    ctx.post_text("r2").await?;
                    ctx.call::<String>("chatter", &(), "after_child")
                }
                "quit" => ctx.done("bye".to_string()),
                text => {
                    ctx.post_text(format!("echo: {text}")).await?;
                    ctx.wait("message")
                }
            }
        }
    }

    /// Done immediately with its initial state
    struct Immediate;

    #[async_trait]
    impl Dialog for Immediate {
        async fn start(&self, ctx: &mut DialogContext<'_>) -> FiberResult<()> {
            let value: String = ctx.state()?;
            ctx.done(value)
        }
    }

    /// Posts twice and is done without waiting
    struct Chatter;

    #[async_trait]
    impl Dialog for Chatter {
        async fn start(&self, ctx: &mut DialogContext<'_>) -> FiberResult<()> {
            ctx.post_text("c1").await?;
            ctx.post_text("c2").await?;
            ctx.done("chat".to_string())
        }
    }

    /// Asks for a name and is done with the next message's text
    struct Asker;

    #[async_trait]
    impl Dialog for Asker {
        async fn start(&self, ctx: &mut DialogContext<'_>) -> FiberResult<()> {
            ctx.post_text("name?").await?;
            ctx.wait("answer")
        }

        async fn resume(
            &self,
            ctx: &mut DialogContext<'_>,
            _handler: &ResumeAfter,
            input: Payload,
        ) -> FiberResult<()> {
            let message = input.into_message()?;
            ctx.done(message.text_or_empty().to_string())
        }
    }

    fn registry() -> Arc<DialogRegistry> {
        Arc::new(
            DialogRegistry::new()
                .with("root", Root)
                .with("immediate", Immediate)
                .with("asker", Asker)
                .with("chatter", Chatter),
        )
    }

    async fn started(connector: &Arc<RecordingConnector>) -> Session {
        let mut session = Session::new(registry(), connector.clone(), FiberConfig::default());
        let reply = session.start("root", &()).await.unwrap();
        assert!(reply.is_none());
        session
    }

    fn text(reply: Option<Message>) -> Option<String> {
        reply.and_then(|m| m.text)
    }

    #[tokio::test]
    async fn test_call_done_roundtrip_resumes_parent_with_value() {
        let connector = Arc::new(RecordingConnector::new());
        let mut session = started(&connector).await;

        let reply = session.send(Message::from_user("c", "u", "child")).await.unwrap();

        assert_eq!(text(reply).as_deref(), Some("child said v"));
        assert_eq!(session.stack().depth(), 1);
        assert_eq!(session.stack().top().unwrap().expects, ValueType::Message);
    }

    #[tokio::test]
    async fn test_child_waits_across_turns() {
        let connector = Arc::new(RecordingConnector::new());
        let mut session = started(&connector).await;

        let reply = session.send(Message::from_user("c", "u", "ask")).await.unwrap();
        assert_eq!(text(reply).as_deref(), Some("name?"));
        assert_eq!(session.stack().depth(), 2);

        let reply = session.send(Message::from_user("c", "u", "Ada")).await.unwrap();
        assert_eq!(text(reply).as_deref(), Some("hello Ada"));
        assert_eq!(session.stack().depth(), 1);
    }

    #[tokio::test]
    async fn test_outbound_ordering_flushes_first_post() {
        let connector = Arc::new(RecordingConnector::new());
        let mut session = started(&connector).await;

        let reply = session.send(Message::from_user("c", "u", "two")).await.unwrap();

        assert_eq!(connector.sent_texts(), vec!["A".to_string()]);
        assert_eq!(text(reply).as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn test_failed_flush_fails_turn_and_keeps_stack() {
        let mut session = Session::new(
            registry(),
            Arc::new(FailingConnector::new("channel closed")),
            FiberConfig::default(),
        );
        session.start("root", &()).await.unwrap();
        let before = session.state();

        let err = session
            .send(Message::from_user("c", "u", "two"))
            .await
            .unwrap_err();

        assert!(matches!(err, FiberError::Connector(ref e) if e == "channel closed"));
        assert_eq!(session.state(), before);
    }

    #[tokio::test]
    async fn test_same_state_and_input_give_same_outbound_sequence() {
        let connector = Arc::new(RecordingConnector::new());
        let mut session = started(&connector).await;
        session.send(Message::from_user("c", "u", "hi")).await.unwrap();
        let saved = serde_json::to_string(&session.into_state()).unwrap();
        let inbound = Message::from_user("c", "u", "burst");

        let mut runs = Vec::new();
        for _ in 0..2 {
            let connector = Arc::new(RecordingConnector::new());
            let mut session = Session::restore(
                serde_json::from_str(&saved).unwrap(),
                registry(),
                connector.clone(),
                FiberConfig::default(),
            );
            let reply = session.send(inbound.clone()).await.unwrap();
            runs.push((connector.sent(), reply, session.into_state()));
        }

        let (sent, reply, _) = &runs[0];
        let texts: Vec<_> = sent.iter().map(|m| m.text_or_empty()).collect();
        assert_eq!(texts, vec!["r1", "r2", "c1", "c2"]);
        assert_eq!(reply.as_ref().and_then(|m| m.text.as_deref()), Some("child said chat"));
        assert_eq!(runs[0], runs[1]);
    }

    #[tokio::test]
    async fn test_missing_terminal_fails_and_keeps_stack() {
        let connector = Arc::new(RecordingConnector::new());
        let mut session = started(&connector).await;
        let before = session.state();

        let err = session
            .send(Message::from_user("c", "u", "forget"))
            .await
            .unwrap_err();

        assert!(matches!(err, FiberError::ProtocolViolation(Violation::NoTerminal)));
        assert_eq!(session.state(), before);
    }

    #[tokio::test]
    async fn test_double_terminal_fails() {
        let connector = Arc::new(RecordingConnector::new());
        let mut session = started(&connector).await;

        let err = session
            .send(Message::from_user("c", "u", "twice"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FiberError::ProtocolViolation(Violation::MultipleTerminals)
        ));
    }

    #[tokio::test]
    async fn test_child_result_type_mismatch_fails() {
        let connector = Arc::new(RecordingConnector::new());
        let mut session = started(&connector).await;
        let before = session.state();

        let err = session
            .send(Message::from_user("c", "u", "wrong"))
            .await
            .unwrap_err();
        assert!(matches!(err, FiberError::TypeMismatch { .. }));
        assert_eq!(session.state(), before);
    }

    #[tokio::test]
    async fn test_root_done_ends_conversation() {
        let connector = Arc::new(RecordingConnector::new());
        let mut session = started(&connector).await;

        session.send(Message::from_user("c", "u", "quit")).await.unwrap();
        assert!(session.is_finished());

        let err = session
            .send(Message::from_user("c", "u", "hello?"))
            .await
            .unwrap_err();
        assert!(matches!(err, FiberError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_resume_on_another_instance_after_serialization() {
        let connector = Arc::new(RecordingConnector::new());
        let mut session = started(&connector).await;
        session.send(Message::from_user("c", "u", "ask")).await.unwrap();

        let saved = serde_json::to_string(&session.into_state()).unwrap();
        let restored: SessionState = serde_json::from_str(&saved).unwrap();

        // fresh registry and connector, as a new process would have
        let mut session = Session::restore(
            restored,
            registry(),
            Arc::new(RecordingConnector::new()),
            FiberConfig::default(),
        );
        let reply = session.send(Message::from_user("c", "u", "Grace")).await.unwrap();
        assert_eq!(text(reply).as_deref(), Some("hello Grace"));
    }

    #[tokio::test]
    async fn test_unknown_root_dialog_leaves_session_unstarted() {
        let connector = Arc::new(RecordingConnector::new());
        let mut session = Session::new(registry(), connector, FiberConfig::default());

        let err = session.start("missing", &()).await.unwrap_err();
        assert!(matches!(err, FiberError::UnknownDialog(_)));
        assert!(session.is_finished());
    }

    #[tokio::test]
    async fn test_unknown_handler_is_reported() {
        let connector = Arc::new(RecordingConnector::new());
        let mut session = Session::new(
            Arc::new(DialogRegistry::new().with("immediate_waiter", Waiter)),
            connector,
            FiberConfig::default(),
        );
        session.start("immediate_waiter", &()).await.unwrap();

        let err = session
            .send(Message::from_user("c", "u", "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, FiberError::UnknownHandler { .. }));
    }

    /// Waits but never overrides `resume`
    struct Waiter;

    #[async_trait]
    impl Dialog for Waiter {
        async fn start(&self, ctx: &mut DialogContext<'_>) -> FiberResult<()> {
            ctx.wait("never_handled")
        }
    }

    #[tokio::test]
    async fn test_replies_carry_inbound_data_bags() {
        let connector = Arc::new(RecordingConnector::new());
        let mut session = started(&connector).await;

        let mut inbound = Message::from_user("conv-7", "u", "hi");
        inbound.bot_conversation_data = Some(serde_json::json!({"k": 1}));
        let reply = session.send(inbound).await.unwrap().unwrap();

        assert_eq!(reply.conversation_id.as_deref(), Some("conv-7"));
        assert_eq!(reply.bot_conversation_data, Some(serde_json::json!({"k": 1})));
        assert!(session.state().relay.to_bot().is_none());
    }
}
