//! # ido-core
//!
//! Core library for the activity observatory: a perception-to-aggregation
//! engine that turns raw screenshot/keyboard/mouse capture into phase-scoped
//! Activities, with an optional Pomodoro session engine layered on top.
//!
//! ## Architecture
//!
//! - **Perception**: injectable capture sources (keyboard, mouse, screenshot,
//!   screen-lock state, active-monitor tracking) feeding a sliding-window
//!   buffer via an mpsc channel.
//! - **Filtering**: record merging/deduplication and perceptual-hash image
//!   similarity filtering ahead of any LLM call.
//! - **Extraction**: a two-step LLM pipeline (`RawAgent` then `ActionAgent`)
//!   turning a batch of screenshots into persisted `Action`s.
//! - **Aggregation**: `SessionAgent` clusters `Action`s into `Activity`
//!   records, with supervisor revision and overlap merging.
//! - **Pomodoro**: a session/work-phase state machine with retry-budgeted
//!   phase aggregation and startup orphan recovery.
//! - **Coordinator**: the composition root sequencing all of the above.
//!
//! External collaborators (LLM backend, prompt templates, persistence,
//! dynamic settings) are consumed through the traits in [`interfaces`].

pub mod action;
pub mod activity;
pub mod agents;
pub mod behavior;
pub mod buffer;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod filters;
pub mod image_store;
pub mod interfaces;
pub mod perception;
pub mod pomodoro;
pub mod record;
pub mod settings;

pub use action::Action;
pub use activity::{Activity, AggregationMode};
pub use coordinator::{Coordinator, CoordinatorConfig, CoordinatorDeps, CoordinatorMode, CoordinatorSnapshot};
pub use error::{CoreError, ImageStoreError, PipelineError, PomodoroError, Result, SettingsError, StoreError};
pub use events::{Event, EventBus};
pub use interfaces::{ChatMessage, ChatParams, ChatResponse, LlmClient, PromptCategory, PromptProvider, Settings, Store};
pub use pomodoro::{PomodoroManager, PomodoroPhase, PomodoroSession, PomodoroStatus};
pub use record::{RawRecord, RawRecordData};
pub use settings::TomlSettings;
