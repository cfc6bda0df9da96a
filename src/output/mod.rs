// src/output/mod.rs

//! Serving the output buffer to live observers.

pub mod broadcaster;
pub mod waiter;

pub use broadcaster::{OutputBroadcaster, OutputSubscription, NO_OUTPUT_MESSAGE};
pub use waiter::{waiter_for, ChangeWaiter, IntervalWaiter, NotifyWaiter};
