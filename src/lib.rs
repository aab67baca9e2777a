//! API availability and certificate monitoring.
//!
//! Shared between the `apimon` daemon and the one-shot `certcheck` binary.

pub mod config;
pub mod metrics;
pub mod probe;
pub mod scheduler;
pub mod target;
pub mod web;
