//! Progress and confirmation provider traits
//!
//! These let the orchestrator report to any front end without depending on
//! a specific terminal or UI crate.

use crate::types::{ApplyState, ResourceId};
use anyhow::Result;

/// Progress callback for apply operations
pub trait ProgressCallback: Send {
    /// Called when a batch starts (the independent items, or one sequence group)
    fn on_batch_start(&mut self, label: &str, count: usize);

    /// Called before a single resource is applied
    fn on_resource_start(&mut self, id: &ResourceId);

    /// Called once a resource reached a terminal state
    fn on_resource_complete(&mut self, id: &ResourceId, state: &ApplyState);

    /// Called when a batch completes
    fn on_batch_complete(&mut self);
}

/// Confirmation callback for user interaction
pub trait ConfirmCallback: Send {
    /// Ask the user to confirm an action
    ///
    /// # Returns
    /// `true` if the user confirmed, `false` otherwise
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_batch_start(&mut self, _label: &str, _count: usize) {}
    fn on_resource_start(&mut self, _id: &ResourceId) {}
    fn on_resource_complete(&mut self, _id: &ResourceId, _state: &ApplyState) {}
    fn on_batch_complete(&mut self) {}
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}
