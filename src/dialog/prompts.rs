//! Built-in prompt dialogs
//!
//! Each prompt posts a question, waits for the answer and is done with
//! `Some(value)` once the answer parses. Unparseable answers are re-prompted
//! until the attempts run out, at which point the prompt is done with `None`.

use super::{Dialog, DialogContext, DialogRegistry};
use crate::fiber::{DialogValue, FiberResult, Payload, ResumeAfter};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const TEXT: &str = "prompt.text";
pub const CONFIRM: &str = "prompt.confirm";
pub const NUMBER: &str = "prompt.number";

const DEFAULT_ATTEMPTS: u32 = 3;
const REPLY: &str = "reply";

/// Prompt configuration, stored as the prompt frame's state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PromptOptions {
    pub prompt: String,
    /// Text posted after an unrecognized answer; defaults per prompt kind
    #[serde(default)]
    pub retry: Option<String>,
    /// Answers accepted before giving up
    pub attempts: u32,
}

impl PromptOptions {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            retry: None,
            attempts: DEFAULT_ATTEMPTS,
        }
    }

    pub fn with_retry(mut self, retry: impl Into<String>) -> Self {
        self.retry = Some(retry.into());
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }
}

/// Register all built-in prompts
pub fn register(registry: &mut DialogRegistry) {
    registry.register(TEXT, PromptText);
    registry.register(CONFIRM, PromptConfirm);
    registry.register(NUMBER, PromptNumber);
}

/// Call the text prompt; `resume` receives an `Option<String>`
pub fn text(
    ctx: &mut DialogContext<'_>,
    options: &PromptOptions,
    resume: impl Into<ResumeAfter>,
) -> FiberResult<()> {
    ctx.call::<Option<String>>(TEXT, options, resume)
}

/// Call the yes/no prompt; `resume` receives an `Option<bool>`
pub fn confirm(
    ctx: &mut DialogContext<'_>,
    options: &PromptOptions,
    resume: impl Into<ResumeAfter>,
) -> FiberResult<()> {
    ctx.call::<Option<bool>>(CONFIRM, options, resume)
}

/// Call the integer prompt; `resume` receives an `Option<i64>`
pub fn number(
    ctx: &mut DialogContext<'_>,
    options: &PromptOptions,
    resume: impl Into<ResumeAfter>,
) -> FiberResult<()> {
    ctx.call::<Option<i64>>(NUMBER, options, resume)
}

// ============================================================================
// Recognizers
// ============================================================================

fn recognize_text(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn recognize_confirm(text: &str) -> Option<bool> {
    match text.trim().to_lowercase().as_str() {
        "y" | "yes" | "yep" | "sure" | "ok" | "true" => Some(true),
        "n" | "no" | "nope" | "false" => Some(false),
        _ => None,
    }
}

fn recognize_number(text: &str) -> Option<i64> {
    text.trim().parse().ok()
}

// ============================================================================
// Dialogs
// ============================================================================

async fn ask(ctx: &mut DialogContext<'_>) -> FiberResult<()> {
    let options: PromptOptions = ctx.state()?;
    ctx.post_text(options.prompt).await?;
    ctx.wait(REPLY)
}

async fn answer<T>(
    ctx: &mut DialogContext<'_>,
    input: Payload,
    recognize: fn(&str) -> Option<T>,
    default_retry: &str,
) -> FiberResult<()>
where
    T: Send,
    Option<T>: DialogValue,
{
    let message = input.into_message()?;
    if let Some(value) = recognize(message.text_or_empty()) {
        return ctx.done(Some(value));
    }

    let mut options: PromptOptions = ctx.state()?;
    options.attempts = options.attempts.saturating_sub(1);
    if options.attempts == 0 {
        tracing::debug!(dialog = %ctx.dialog_id(), "Prompt out of attempts");
        return ctx.done::<Option<T>>(None);
    }

    let retry = options
        .retry
        .clone()
        .unwrap_or_else(|| format!("{default_retry} {}", options.prompt));
    ctx.set_state(&options)?;
    ctx.post_text(retry).await?;
    ctx.wait(REPLY)
}

/// Any non-blank answer
pub struct PromptText;

#[async_trait]
impl Dialog for PromptText {
    async fn start(&self, ctx: &mut DialogContext<'_>) -> FiberResult<()> {
        ask(ctx).await
    }

    async fn resume(
        &self,
        ctx: &mut DialogContext<'_>,
        _handler: &ResumeAfter,
        input: Payload,
    ) -> FiberResult<()> {
        answer(ctx, input, recognize_text, "I need an answer.").await
    }
}

/// Yes or no
pub struct PromptConfirm;

#[async_trait]
impl Dialog for PromptConfirm {
    async fn start(&self, ctx: &mut DialogContext<'_>) -> FiberResult<()> {
        ask(ctx).await
    }

    async fn resume(
        &self,
        ctx: &mut DialogContext<'_>,
        _handler: &ResumeAfter,
        input: Payload,
    ) -> FiberResult<()> {
        answer(ctx, input, recognize_confirm, "Please answer yes or no.").await
    }
}

/// A whole number
pub struct PromptNumber;

#[async_trait]
impl Dialog for PromptNumber {
    async fn start(&self, ctx: &mut DialogContext<'_>) -> FiberResult<()> {
        ask(ctx).await
    }

    async fn resume(
        &self,
        ctx: &mut DialogContext<'_>,
        _handler: &ResumeAfter,
        input: Payload,
    ) -> FiberResult<()> {
        answer(ctx, input, recognize_number, "Please enter a number.").await
    }
}
