//! Sample dialog tree used by the console binary
//!
//! A greeting root that can place sandwich orders. The order dialog chains
//! three prompts and reports back a summary, or `None` when the user backs
//! out.

use crate::dialog::prompts::{self, PromptOptions};
use crate::dialog::{Dialog, DialogContext, DialogRegistry};
use crate::fiber::{FiberResult, Payload, ResumeAfter};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const ROOT: &str = "demo.greeting";
pub const ORDER: &str = "demo.order";

/// Registry with the demo dialogs and the built-in prompts
pub fn registry() -> DialogRegistry {
    DialogRegistry::with_prompts()
        .with(ROOT, Greeting)
        .with(ORDER, Order)
}

// ============================================================================
// Greeting
// ============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
struct GreetingState {
    orders: u32,
}

/// Root dialog: routes commands and counts placed orders
pub struct Greeting;

#[async_trait]
impl Dialog for Greeting {
    async fn start(&self, ctx: &mut DialogContext<'_>) -> FiberResult<()> {
        ctx.post_text("Hi! Say 'order' to order a sandwich or 'bye' to leave.")
            .await?;
        ctx.wait("message")
    }

    async fn resume(
        &self,
        ctx: &mut DialogContext<'_>,
        handler: &ResumeAfter,
        input: Payload,
    ) -> FiberResult<()> {
        match handler.as_str() {
            "message" => self.on_message(ctx, input).await,
            "ordered" => self.on_ordered(ctx, input).await,
            _ => Err(crate::fiber::FiberError::UnknownHandler {
                dialog: ctx.dialog_id().clone(),
                handler: handler.clone(),
            }),
        }
    }
}

impl Greeting {
    async fn on_message(&self, ctx: &mut DialogContext<'_>, input: Payload) -> FiberResult<()> {
        let message = input.into_message()?;
        match message.text_or_empty().trim().to_lowercase().as_str() {
            "order" => ctx.call::<Option<String>>(ORDER, &OrderState::default(), "ordered"),
            "bye" => {
                let state: GreetingState = ctx.state()?;
                ctx.post_text(format!("Goodbye! You placed {} order(s).", state.orders))
                    .await?;
                ctx.done(state.orders)
            }
            _ => {
                ctx.post_text("Say 'order' to order a sandwich or 'bye' to leave.")
                    .await?;
                ctx.wait("message")
            }
        }
    }

    async fn on_ordered(&self, ctx: &mut DialogContext<'_>, input: Payload) -> FiberResult<()> {
        match input.into_result::<Option<String>>()? {
            Some(summary) => {
                let mut state: GreetingState = ctx.state()?;
                state.orders += 1;
                ctx.set_state(&state)?;
                if let Ok(data) = ctx.conversation_data_mut() {
                    data.insert("last_order".to_string(), json!(summary));
                }
                ctx.post_text(format!("Ordered {summary}. Anything else?"))
                    .await?;
            }
            None => ctx.post_text("Order cancelled.").await?,
        }
        ctx.wait("message")
    }
}

// ============================================================================
// Order
// ============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
struct OrderState {
    sandwich: Option<String>,
    count: Option<i64>,
}

/// Asks for a sandwich, a quantity and a confirmation
pub struct Order;

#[async_trait]
impl Dialog for Order {
    async fn start(&self, ctx: &mut DialogContext<'_>) -> FiberResult<()> {
        prompts::text(
            ctx,
            &PromptOptions::new("What sandwich would you like?"),
            "sandwich",
        )
    }

    async fn resume(
        &self,
        ctx: &mut DialogContext<'_>,
        handler: &ResumeAfter,
        input: Payload,
    ) -> FiberResult<()> {
        let mut state: OrderState = ctx.state()?;
        match handler.as_str() {
            "sandwich" => {
                let Some(sandwich) = input.into_result::<Option<String>>()? else {
                    return ctx.done::<Option<String>>(None);
                };
                state.sandwich = Some(sandwich);
                ctx.set_state(&state)?;
                prompts::number(ctx, &PromptOptions::new("How many?"), "count")
            }
            "count" => {
                let Some(count) = input.into_result::<Option<i64>>()?.filter(|n| *n > 0) else {
                    return ctx.done::<Option<String>>(None);
                };
                state.count = Some(count);
                ctx.set_state(&state)?;
                let summary = summarize(&state);
                prompts::confirm(ctx, &PromptOptions::new(format!("{summary}, right?")), "confirm")
            }
            "confirm" => {
                let confirmed = input.into_result::<Option<bool>>()?.unwrap_or(false);
                ctx.done(confirmed.then(|| summarize(&state)))
            }
            _ => Err(crate::fiber::FiberError::UnknownHandler {
                dialog: ctx.dialog_id().clone(),
                handler: handler.clone(),
            }),
        }
    }
}

fn summarize(state: &OrderState) -> String {
    format!(
        "{} x {}",
        state.count.unwrap_or(1),
        state.sandwich.as_deref().unwrap_or("sandwich")
    )
}
