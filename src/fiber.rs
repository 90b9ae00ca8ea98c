//! Continuation execution engine
//!
//! A [`Fiber`] owns the dialog [`Stack`] and drives it one turn at a time. A
//! turn delivers one value to the top frame and keeps stepping until some
//! frame settles on a wait or the stack empties. Each step is delegated to a
//! [`Step`] implementation, which runs dialog code and reports back exactly
//! one [`Command`].
//!
//! The engine never recurses: `done` feeding a value to the next frame is
//! just another iteration of the turn loop, so host stack usage does not grow
//! with dialog nesting.

mod error;
pub mod frame;
mod stack;

#[cfg(test)]
mod proptests;

pub use error::{FiberError, FiberResult, Violation};
pub use frame::{DialogId, DialogValue, Frame, Payload, ResumeAfter, Rest, TypedValue, ValueType};
pub use stack::Stack;

use async_trait::async_trait;
use serde_json::Value;

/// Default bound on steps within a single turn
pub const DEFAULT_MAX_STEPS_PER_TURN: usize = 10_000;

/// Engine configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiberConfig {
    /// Steps allowed in one turn before it is aborted. Guards against dialogs
    /// that chain call/done forever without waiting.
    pub max_steps_per_turn: usize,
}

impl Default for FiberConfig {
    fn default() -> Self {
        Self {
            max_steps_per_turn: DEFAULT_MAX_STEPS_PER_TURN,
        }
    }
}

/// The single terminal operation a dialog routine performed
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Suspend until the next inbound message, then run `handler`
    Wait { handler: ResumeAfter },
    /// Push `child`; when it completes, run `handler` with its result
    Call {
        child: DialogId,
        state: Value,
        handler: ResumeAfter,
        result: ValueType,
    },
    /// Pop the current frame and deliver `value` to the one below
    Done { value: TypedValue },
}

/// Runs one continuation.
///
/// Implementations may mutate the frame's dialog state but must leave its
/// `rest` and `expects` alone; the fiber rewrites those from the returned
/// command.
#[async_trait]
pub trait Step: Send {
    async fn step(&mut self, frame: &mut Frame, input: Payload) -> FiberResult<Command>;
}

/// How a successful turn ended
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// The top frame is waiting for the next inbound message
    Waiting,
    /// The root dialog completed with this value; the conversation is over
    Completed(TypedValue),
}

/// The execution engine for one conversation
#[derive(Debug, Clone, Default)]
pub struct Fiber {
    stack: Stack,
    config: FiberConfig,
}

impl Fiber {
    pub fn new(config: FiberConfig) -> Self {
        Self {
            stack: Stack::new(),
            config,
        }
    }

    /// Rebuild a fiber around a previously persisted stack
    pub fn from_stack(stack: Stack, config: FiberConfig) -> Self {
        Self { stack, config }
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn into_stack(self) -> Stack {
        self.stack
    }

    pub fn config(&self) -> FiberConfig {
        self.config
    }

    /// True when no dialog is alive: never started, or the root is done
    pub fn is_finished(&self) -> bool {
        self.stack.is_empty()
    }

    /// Push `root` and run its start routine as the first turn.
    ///
    /// On failure the fiber is left empty, as if never started.
    pub async fn start<S: Step>(&mut self, root: Frame, stepper: &mut S) -> FiberResult<TurnOutcome> {
        if !self.stack.is_empty() {
            return Err(FiberError::invalid_state("conversation already started"));
        }
        self.stack.push(root);
        let outcome = self.run_turn(Payload::Initiation, stepper).await;
        if outcome.is_err() {
            self.stack.clear();
        }
        outcome
    }

    /// Deliver `input` to the top frame and drive the stack until it settles.
    ///
    /// The turn runs against a working copy; the fiber's stack is replaced
    /// only when the turn succeeds.
    pub async fn run_turn<S: Step>(
        &mut self,
        input: Payload,
        stepper: &mut S,
    ) -> FiberResult<TurnOutcome> {
        if self.stack.is_empty() {
            return Err(FiberError::invalid_state("no active dialog to deliver to"));
        }

        let mut work = self.stack.clone();
        let mut input = input;
        let mut steps = 0usize;

        let outcome = loop {
            if steps == self.config.max_steps_per_turn {
                return Err(Violation::StepLimitExceeded(steps).into());
            }
            steps += 1;

            let depth = work.depth();
            let frame = work.top_mut()?;
            frame.accepts(&input)?;
            tracing::debug!(
                dialog = %frame.dialog,
                depth,
                input = %input.value_type(),
                "Stepping frame"
            );

            match stepper.step(frame, input).await? {
                Command::Wait { handler } => {
                    frame.settle_wait(handler);
                    break TurnOutcome::Waiting;
                }
                Command::Call {
                    child,
                    state,
                    handler,
                    result,
                } => {
                    frame.settle_call(handler, result);
                    work.push(Frame::start(child, state));
                    input = Payload::Initiation;
                }
                Command::Done { value } => {
                    work.pop()?;
                    if work.is_empty() {
                        break TurnOutcome::Completed(value);
                    }
                    input = Payload::Result(value);
                }
            }
        };

        tracing::debug!(steps, depth = work.depth(), "Turn settled");
        self.stack = work;
        Ok(outcome)
    }
}
