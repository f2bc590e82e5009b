//! Callback-style stages.
//!
//! A [`CallbackStage`] wraps work that settles through a [`Settler`] rather
//! than by returning a future. The work returns a cancel callback, which the
//! runner invokes if the attempt times out.

use super::{Stage, StageContext};
use crate::cancellation::CancelCallback;
use crate::core::{StageOutput, Task};
use crate::errors::StageError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::oneshot;

type Outcome = Result<StageOutput, StageError>;

/// Settles one stage attempt.
///
/// Only the first `resolve` or `reject` takes effect; later calls, and any
/// call made after the attempt timed out, are ignored.
#[derive(Debug, Clone)]
pub struct Settler {
    tx: Arc<Mutex<Option<oneshot::Sender<Outcome>>>>,
}

impl Settler {
    fn new(tx: oneshot::Sender<Outcome>) -> Self {
        Self {
            tx: Arc::new(Mutex::new(Some(tx))),
        }
    }

    /// Resolves the attempt. Returns true if this call settled it.
    pub fn resolve(&self, output: StageOutput) -> bool {
        self.settle(Ok(output))
    }

    /// Rejects the attempt. Returns true if this call settled it.
    pub fn reject(&self, error: StageError) -> bool {
        self.settle(Err(error))
    }

    /// Returns true once the attempt has been settled or abandoned.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.tx.lock().as_ref().map_or(true, oneshot::Sender::is_closed)
    }

    fn settle(&self, outcome: Outcome) -> bool {
        match self.tx.lock().take() {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }
}

/// A stage driven by a `work(task, ctx, settler) -> cancel` callback.
pub struct CallbackStage<F>
where
    F: Fn(&Task, &StageContext, Settler) -> CancelCallback + Send + Sync,
{
    name: String,
    work: F,
}

impl<F> CallbackStage<F>
where
    F: Fn(&Task, &StageContext, Settler) -> CancelCallback + Send + Sync,
{
    /// Creates a new callback stage.
    pub fn new(name: impl Into<String>, work: F) -> Self {
        Self {
            name: name.into(),
            work,
        }
    }
}

impl<F> Debug for CallbackStage<F>
where
    F: Fn(&Task, &StageContext, Settler) -> CancelCallback + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackStage")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl<F> Stage for CallbackStage<F>
where
    F: Fn(&Task, &StageContext, Settler) -> CancelCallback + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, task: &Task, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let (tx, rx) = oneshot::channel();
        let cancel = (self.work)(task, ctx, Settler::new(tx));
        ctx.cancel_token().on_cancel(cancel);

        rx.await.unwrap_or_else(|_| {
            Err(StageError::Abandoned {
                stage: self.name.clone(),
            })
        })
    }
}
