//! Application layer: the correlation engine and its moving parts.
//!
//! `CorrelationEngine` composes the waiter registry, the timeout scheduler,
//! the store and the dispatcher into a blocking `call` plus callback intake.
//! The `Reaper` runs beside it as a single background task.

pub mod callback;
pub mod engine;
pub mod reaper;
pub mod registry;
pub mod scheduler;
