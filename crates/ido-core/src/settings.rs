//! TOML-backed [`Settings`] implementation.
//!
//! Laid out the way the teacher's `storage/config.rs` handles
//! configuration: a flat file under the platform config directory,
//! `serde`-driven with defaults, `load`/`save` round trip. Unlike the
//! teacher's fixed struct, keys here are dynamic (spec §6 lists keys as
//! "non-exhaustive"), so the backing store is a `toml::Value` table
//! with dotted-path lookup.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;
use crate::interfaces::Settings;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlSettings {
    #[serde(flatten)]
    table: toml::value::Table,
}

impl Default for TomlSettings {
    fn default() -> Self {
        Self {
            table: default_table(),
        }
    }
}

/// Builds the documented defaults for every key spec §6 names.
fn default_table() -> toml::value::Table {
    let defaults = toml::toml! {
        [screenshot]
        force_save_interval = 60
        smart_capture_enabled = true

        [image]
        memory_cache_size = 500
        memory_ttl = 180
        memory_ttl_multiplier = 1.0
        memory_ttl_min = 120
        memory_ttl_max = 600

        [image_optimization]
        quality = 75
        max_dimension = 1440

        [processing]
        screenshot_threshold = 20
        max_screenshots_per_extraction = 10
        max_accumulation_time = 180
        session_aggregation_interval = 300
        merge_time_gap_tolerance = 300
        merge_similarity_threshold = 0.6

        [pomodoro]
        work_duration_minutes = 25
        break_duration_minutes = 5
        total_rounds = 4
    };
    match defaults {
        toml::Value::Table(t) => t,
        _ => toml::value::Table::new(),
    }
}

impl TomlSettings {
    pub fn new() -> Self {
        Self::default()
    }

    fn path() -> Result<PathBuf, SettingsError> {
        let dir = dirs::home_dir()
            .map(|h| h.join(".config").join("ido"))
            .ok_or_else(|| SettingsError::LoadFailed {
                path: "<unknown>".into(),
                message: "could not determine home directory".into(),
            })?;
        std::fs::create_dir_all(&dir).map_err(|e| SettingsError::SaveFailed {
            path: dir.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(dir.join("settings.toml"))
    }

    /// Load from disk, falling back to (and persisting) defaults if the
    /// file does not yet exist.
    pub fn load() -> Result<Self, SettingsError> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let table: toml::value::Table =
                    toml::from_str(&content).map_err(|e| SettingsError::LoadFailed {
                        path: path.display().to_string(),
                        message: e.to_string(),
                    })?;
                let mut merged = default_table();
                merge_tables(&mut merged, table);
                Ok(Self { table: merged })
            }
            Err(_) => {
                let settings = Self::default();
                settings.save()?;
                Ok(settings)
            }
        }
    }

    pub fn save(&self) -> Result<(), SettingsError> {
        let path = Self::path()?;
        let content = toml::to_string_pretty(&self.table).map_err(|e| SettingsError::SaveFailed {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, content).map_err(|e| SettingsError::SaveFailed {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    pub fn set(&mut self, dotted_key: &str, value: toml::Value) {
        set_dotted(&mut self.table, dotted_key, value);
    }

    fn lookup(&self, dotted_key: &str) -> Option<&toml::Value> {
        get_dotted(&self.table, dotted_key)
    }
}

fn merge_tables(base: &mut toml::value::Table, overlay: toml::value::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(base_t)), toml::Value::Table(overlay_t)) => {
                merge_tables(base_t, overlay_t);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn get_dotted<'a>(table: &'a toml::value::Table, dotted_key: &str) -> Option<&'a toml::Value> {
    let mut parts = dotted_key.split('.');
    let first = parts.next()?;
    let mut current = table.get(first)?;
    for part in parts {
        current = current.as_table()?.get(part)?;
    }
    Some(current)
}

fn set_dotted(table: &mut toml::value::Table, dotted_key: &str, value: toml::Value) {
    let mut parts: Vec<&str> = dotted_key.split('.').collect();
    let last = parts.pop().unwrap_or(dotted_key);
    let mut current = table;
    for part in parts {
        current = current
            .entry(part.to_string())
            .or_insert_with(|| toml::Value::Table(toml::value::Table::new()))
            .as_table_mut()
            .expect("settings path component is not a table");
    }
    current.insert(last.to_string(), value);
}

impl Settings for TomlSettings {
    fn get_string(&self, key: &str) -> Option<String> {
        self.lookup(key).and_then(|v| v.as_str()).map(str::to_string)
    }

    fn get_u64(&self, key: &str) -> Option<u64> {
        self.lookup(key).and_then(|v| v.as_integer()).map(|i| i as u64)
    }

    fn get_f64(&self, key: &str) -> Option<f64> {
        self.lookup(key)
            .and_then(|v| v.as_float().or_else(|| v.as_integer().map(|i| i as f64)))
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        self.lookup(key).and_then(|v| v.as_bool())
    }

    fn get_string_list(&self, key: &str) -> Option<Vec<String>> {
        self.lookup(key).and_then(|v| v.as_array()).map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_documented_keys() {
        let settings = TomlSettings::new();
        assert_eq!(settings.get_u64("screenshot.force_save_interval"), Some(60));
        assert_eq!(settings.get_bool("screenshot.smart_capture_enabled"), Some(true));
        assert_eq!(settings.get_u64("processing.screenshot_threshold"), Some(20));
        assert_eq!(settings.get_f64("processing.merge_similarity_threshold"), Some(0.6));
        assert_eq!(settings.get_u64("pomodoro.work_duration_minutes"), Some(25));
    }

    #[test]
    fn set_overrides_nested_key() {
        let mut settings = TomlSettings::new();
        settings.set("processing.screenshot_threshold", toml::Value::Integer(42));
        assert_eq!(settings.get_u64("processing.screenshot_threshold"), Some(42));
    }

    #[test]
    fn missing_key_is_none() {
        let settings = TomlSettings::new();
        assert_eq!(settings.get_string("does.not.exist"), None);
    }
}
