//! Inference abstraction used by the triage pipeline.
//!
//! The pipeline never talks to a provider directly. It hands a [`StagePrompt`]
//! and a [`ResponseSchema`] to the [`InferenceClient`], which picks a provider,
//! enforces the call timeout, parses the model output as JSON and validates it
//! against the schema before anything downstream sees it.
//!
//! Providers implement [`InferenceProvider`]:
//!
//! - [`OpenAiCompatibleProvider`]: any `/chat/completions` endpoint
//! - [`ScriptedProvider`]: deterministic, queue-driven responses for tests
//!   and offline runs
//!
//! The client does not retry. Failures come back as a typed
//! [`InferenceError`] so the orchestrator can decide between retry and
//! fallback.

mod client;
mod error;
mod openai;
mod prompt;
mod schema;
mod scripted;

pub use client::{extract_json, InferenceClient, InferenceProvider, ParsedOutput};
pub use error::{FailureKind, InferenceError};
pub use openai::OpenAiCompatibleProvider;
pub use prompt::{Stage, StagePrompt};
pub use schema::{FieldKind, FieldSpec, ResponseSchema};
pub use scripted::{ScriptedProvider, ScriptedResponse};
