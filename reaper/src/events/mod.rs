//! Pipeline notifications.
//!
//! This module provides:
//! - [`PipelineEvent`], the notifications a run produces
//! - The [`EventSink`] trait and its implementations
//!
//! A run emits one [`PipelineEvent::TaskFailed`] per task whose attempts
//! were exhausted, and exactly one [`PipelineEvent::Completed`] after every
//! task has settled.

mod event;
mod sink;

pub use event::PipelineEvent;
pub use sink::{
    ChannelEventSink, CollectingEventSink, EventSink, FanoutEventSink, LoggingEventSink,
    NoOpEventSink,
};
