//! Raw capture records (spec §3: RawRecord).
//!
//! A `RawRecord` is the unit produced by a [`crate::perception`] source
//! and consumed by the [`crate::buffer::SlidingWindowBuffer`]. It is
//! intentionally thin: heavier per-type payloads live in their own
//! structs so that matching on `RawRecordData` stays cheap.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One captured event from any perception source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    pub timestamp: DateTime<Utc>,
    pub data: RawRecordData,
    /// Tagged on capture while the Coordinator is in Pomodoro mode.
    pub pomodoro_session_id: Option<String>,
}

impl RawRecord {
    pub fn new(timestamp: DateTime<Utc>, data: RawRecordData) -> Self {
        Self {
            timestamp,
            data,
            pomodoro_session_id: None,
        }
    }

    pub fn with_session(mut self, session_id: Option<String>) -> Self {
        self.pomodoro_session_id = session_id;
        self
    }

    pub fn is_screenshot(&self) -> bool {
        matches!(self.data, RawRecordData::Screenshot(_))
    }

    pub fn is_keyboard(&self) -> bool {
        matches!(self.data, RawRecordData::Keyboard(_))
    }

    pub fn is_mouse(&self) -> bool {
        matches!(self.data, RawRecordData::Mouse(_))
    }
}

/// Variant-tagged payload for a [`RawRecord`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RawRecordData {
    Keyboard(KeyboardData),
    Mouse(MouseData),
    Screenshot(ScreenshotData),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    Char,
    Special,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyboardData {
    pub key_type: KeyType,
    pub key: String,
    pub modifiers: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseAction {
    Click,
    Scroll,
    Drag,
    DragEnd,
    Press,
    Release,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MouseData {
    pub action: MouseAction,
    pub position: Option<(i32, i32)>,
    /// Present when [`crate::filters::record_filter::RecordFilter`] has
    /// merged consecutive identical records; absent otherwise.
    #[serde(default)]
    pub merged_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenshotData {
    /// Content-address hash: key into [`crate::image_store::ImageStore`].
    pub hash: String,
    pub monitor_index: u32,
    pub width: u32,
    pub height: u32,
    /// Base64-encoded, compression-optimized bytes. Populated by
    /// [`crate::filters::image_filter::ImageFilter`]; absent beforehand.
    #[serde(default)]
    pub optimized_image: Option<String>,
    /// Active window title/bundle, enriched in-line when available.
    #[serde(default)]
    pub active_window: Option<String>,
}
