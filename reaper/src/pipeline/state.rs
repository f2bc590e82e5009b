//! Per-task pipeline bookkeeping.

use crate::cancellation::CancellationToken;
use std::sync::Arc;

/// Where one task is in its pipeline.
///
/// Created when the task is admitted and dropped once it is terminal.
#[derive(Debug, Default)]
pub struct PipelineState {
    stage_index: usize,
    attempts: usize,
    max_attempts: usize,
    cancel: Option<Arc<CancellationToken>>,
}

impl PipelineState {
    /// Creates the state for a task that has not entered any stage yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the task into a stage. Stages are only ever entered in order.
    pub fn enter_stage(&mut self, index: usize, max_attempts: usize) {
        debug_assert!(index >= self.stage_index, "stages never re-enter");
        self.stage_index = index;
        self.attempts = 0;
        self.max_attempts = max_attempts;
        self.cancel = None;
    }

    /// Starts a new attempt and returns its 1-based number.
    pub fn begin_attempt(&mut self, cancel: Arc<CancellationToken>) -> usize {
        self.attempts += 1;
        self.cancel = Some(cancel);
        self.attempts
    }

    /// Clears the outstanding cancellation handle once an attempt settles.
    pub fn settle_attempt(&mut self) {
        self.cancel = None;
    }

    /// Returns the index of the current stage.
    #[must_use]
    pub fn stage_index(&self) -> usize {
        self.stage_index
    }

    /// Returns the attempts made at the current stage.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// Returns the attempts left at the current stage.
    #[must_use]
    pub fn attempts_remaining(&self) -> usize {
        self.max_attempts.saturating_sub(self.attempts)
    }

    /// Returns the outstanding cancellation handle, if an attempt is in flight.
    #[must_use]
    pub fn cancel_handle(&self) -> Option<&Arc<CancellationToken>> {
        self.cancel.as_ref()
    }
}
