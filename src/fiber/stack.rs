//! The dialog stack

use super::error::{FiberError, FiberResult};
use super::frame::Frame;
use serde::{Deserialize, Serialize};

/// Ordered frames: bottom is the root dialog, top is the awaiting frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Stack {
    frames: Vec<Frame>,
}

impl Stack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn top(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub(crate) fn top_mut(&mut self) -> FiberResult<&mut Frame> {
        self.frames
            .last_mut()
            .ok_or_else(|| FiberError::invalid_state("stack is empty"))
    }

    pub(crate) fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub(crate) fn pop(&mut self) -> FiberResult<Frame> {
        self.frames
            .pop()
            .ok_or_else(|| FiberError::invalid_state("done with no active frame"))
    }

    pub(crate) fn clear(&mut self) {
        self.frames.clear();
    }
}

impl FromIterator<Frame> for Stack {
    fn from_iter<I: IntoIterator<Item = Frame>>(iter: I) -> Self {
        Self {
            frames: iter.into_iter().collect(),
        }
    }
}
