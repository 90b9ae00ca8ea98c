//! Dialog-stack adapter
//!
//! Dialog authors implement [`Dialog`] and register it under a stable
//! [`DialogId`]. A [`Session`] drives the fiber for one conversation and
//! hands each step to the registered dialog through a [`DialogContext`].

mod context;
pub mod prompts;
mod relay;
mod session;

pub use context::DialogContext;
pub use relay::{Connector, Relay};
pub use session::{Session, SessionState};

use crate::fiber::{DialogId, FiberError, FiberResult, Payload, ResumeAfter};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// A unit of conversational logic.
///
/// Both routines must perform exactly one of `call`, `wait` or `done` on the
/// context before returning. Handler names passed to `call` and `wait` come
/// back through [`Dialog::resume`], so they must stay stable for as long as
/// saved conversations may refer to them.
#[async_trait]
pub trait Dialog: Send + Sync {
    /// Entry routine, run when the dialog is pushed
    async fn start(&self, ctx: &mut DialogContext<'_>) -> FiberResult<()>;

    /// Resume routine for `handler`, run with the message or child result the
    /// frame was waiting for
    async fn resume(
        &self,
        ctx: &mut DialogContext<'_>,
        handler: &ResumeAfter,
        _input: Payload,
    ) -> FiberResult<()> {
        Err(FiberError::UnknownHandler {
            dialog: ctx.dialog_id().clone(),
            handler: handler.clone(),
        })
    }
}

/// Maps stable dialog identifiers to dialog code
#[derive(Clone, Default)]
pub struct DialogRegistry {
    dialogs: HashMap<DialogId, Arc<dyn Dialog>>,
}

impl DialogRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in prompts
    pub fn with_prompts() -> Self {
        let mut registry = Self::new();
        prompts::register(&mut registry);
        registry
    }

    pub fn register(&mut self, id: impl Into<DialogId>, dialog: impl Dialog + 'static) {
        self.dialogs.insert(id.into(), Arc::new(dialog));
    }

    pub fn with(mut self, id: impl Into<DialogId>, dialog: impl Dialog + 'static) -> Self {
        self.register(id, dialog);
        self
    }

    pub fn get(&self, id: &DialogId) -> FiberResult<Arc<dyn Dialog>> {
        self.dialogs
            .get(id)
            .cloned()
            .ok_or_else(|| FiberError::UnknownDialog(id.clone()))
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Vec<&DialogId> {
        let mut ids: Vec<_> = self.dialogs.keys().collect();
        ids.sort();
        ids
    }
}

impl std::fmt::Debug for DialogRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogRegistry")
            .field("dialogs", &self.ids())
            .finish()
    }
}
