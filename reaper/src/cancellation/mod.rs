//! Cancellation handles for in-flight stage attempts.
//!
//! Every stage attempt gets its own [`CancellationToken`]. Stage work
//! registers whatever is needed to abort its pending operation, and the
//! runner fires the token when the attempt times out.

mod token;

pub use token::{CancelCallback, CancellationToken};
