//! Core error types for ido-core.
//!
//! Mirrors the hierarchy style used throughout this codebase: a small
//! top-level enum that aggregates per-subsystem error enums via
//! `#[from]`, each with `thiserror`-derived messages.

use thiserror::Error;

/// Top-level error type for ido-core.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("image store error: {0}")]
    ImageStore(#[from] ImageStoreError),

    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("pomodoro error: {0}")]
    Pomodoro(#[from] PomodoroError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("{0}")]
    Custom(String),
}

/// Errors raised by the [`crate::image_store::ImageStore`].
#[derive(Error, Debug)]
pub enum ImageStoreError {
    #[error("hash {hash} is neither in memory nor on disk")]
    NotFound { hash: String },

    #[error("failed to write thumbnail for {hash} to disk: {message}")]
    DiskWriteFailed { hash: String, message: String },

    #[error("failed to read thumbnail for {hash} from disk: {message}")]
    DiskReadFailed { hash: String, message: String },

    #[error("failed to decode image bytes for {hash}: {message}")]
    DecodeFailed { hash: String, message: String },

    #[error("could not determine cache directory: {0}")]
    NoCacheDir(String),
}

/// Errors raised by the accumulation/extraction pipeline (RawAgent,
/// ActionAgent, SessionAgent).
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("LLM call failed for prompt category '{category}': {message}")]
    LlmCallFailed { category: String, message: String },

    #[error("LLM response for '{category}' was not valid JSON: {message}")]
    MalformedResponse { category: String, message: String },

    #[error("LLM response for '{category}' did not match the expected shape: {message}")]
    UnexpectedShape { category: String, message: String },

    #[error("no actions could be derived from the current accumulator")]
    NoActionsFound,

    #[error("action clustering into activities failed: {0}")]
    ClusteringFailed(String),

    #[error("supervisor revision was rejected: {0}")]
    SupervisorValidationFailed(String),
}

/// Errors raised by [`crate::pomodoro`].
#[derive(Error, Debug)]
pub enum PomodoroError {
    #[error("a Pomodoro session is already active")]
    SessionAlreadyActive,

    #[error("no active Pomodoro session")]
    NoActiveSession,

    #[error("session {0} was not found")]
    SessionNotFound(String),

    #[error("work phase {phase_number} of session {session_id} was not found")]
    WorkPhaseNotFound { session_id: String, phase_number: u32 },

    #[error("work phase {phase_number} of session {session_id} has exhausted its retry budget")]
    RetryBudgetExhausted { session_id: String, phase_number: u32 },
}

/// Errors surfaced by the consumed `Store` collaborator (spec §6).
///
/// This core never inspects the underlying persistence technology; it
/// only distinguishes transient-vs-fatal for retry purposes.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store operation failed: {0}")]
    OperationFailed(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("store is unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by the consumed `Settings` collaborator, and by the
/// bundled [`crate::settings::TomlSettings`] implementation.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("missing required setting: {0}")]
    MissingKey(String),

    #[error("invalid value for setting '{key}': {message}")]
    InvalidValue { key: String, message: String },

    #[error("failed to load settings from {path}: {message}")]
    LoadFailed { path: String, message: String },

    #[error("failed to save settings to {path}: {message}")]
    SaveFailed { path: String, message: String },
}

pub type Result<T, E = CoreError> = std::result::Result<T, E>;
