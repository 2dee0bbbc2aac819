//! Incident triage service.
//!
//! Turns free-text operational alerts into a structured verdict (severity,
//! category, runbook, escalation target) by coordinating calls to one or more
//! text-generation backends, with deterministic fallbacks when inference is
//! unavailable or unsure.

pub mod api;
pub mod config;
pub mod error;
pub mod inference;
pub mod metrics;
pub mod models;
pub mod triage;

pub use error::{AppError, Result};
