//! Lifecycle management utilities for background components
//!
//! - **[`task`]**: cancellable periodic tasks with tracked join handles

pub mod task;

pub use task::PeriodicTask;
