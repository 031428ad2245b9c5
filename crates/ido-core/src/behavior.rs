//! BehaviorAnalyzer — classifies a window of keyboard/mouse records
//! into operation/browsing/mixed with a confidence (spec §4.7).

use chrono::{DateTime, Utc};

use crate::record::{KeyType, MouseAction, RawRecord, RawRecordData};

const KEYBOARD_WEIGHT: f64 = 0.6;
const MOUSE_WEIGHT: f64 = 0.4;
const OPERATION_THRESHOLD: f64 = 0.6;
const BROWSING_THRESHOLD: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BehaviorClass {
    Operation,
    Browsing,
    Mixed,
}

#[derive(Debug, Clone, Default)]
pub struct KeyboardMetrics {
    pub total_keys: usize,
    pub char_keys: usize,
    pub modifier_combos: usize,
    pub events_per_minute: f64,
}

#[derive(Debug, Clone, Default)]
pub struct MouseMetrics {
    pub total_events: usize,
    pub click_ratio: f64,
    pub scroll_ratio: f64,
    pub drag_ratio: f64,
    pub precision_score: f64,
}

#[derive(Debug, Clone)]
pub struct BehaviorAnalysis {
    pub decision: BehaviorClass,
    pub confidence: f64,
    pub keyboard: KeyboardMetrics,
    pub mouse: MouseMetrics,
    pub keyboard_score: f64,
    pub mouse_score: f64,
    pub combined_score: f64,
    /// Short summary suitable for injection into the RawAgent prompt
    /// context (spec §4.7, §4.8).
    pub reasoning: String,
}

#[derive(Debug, Default)]
pub struct BehaviorAnalyzer;

impl BehaviorAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Classifies `records` (spec §4.7). Empty input returns a neutral
    /// `mixed` verdict with zero confidence rather than dividing by
    /// zero (spec §8 boundary case).
    pub fn analyze(&self, records: &[RawRecord]) -> BehaviorAnalysis {
        let keyboard = keyboard_metrics(records);
        let mouse = mouse_metrics(records);

        if keyboard.total_keys == 0 && mouse.total_events == 0 {
            return BehaviorAnalysis {
                decision: BehaviorClass::Mixed,
                confidence: 0.0,
                keyboard,
                mouse,
                keyboard_score: 0.0,
                mouse_score: 0.0,
                combined_score: 0.0,
                reasoning: "no keyboard or mouse activity in this window".to_string(),
            };
        }

        let keyboard_score = score_keyboard(&keyboard);
        let mouse_score = score_mouse(&mouse);
        let combined = KEYBOARD_WEIGHT * keyboard_score + MOUSE_WEIGHT * mouse_score;

        let decision = if combined >= OPERATION_THRESHOLD {
            BehaviorClass::Operation
        } else if combined <= BROWSING_THRESHOLD {
            BehaviorClass::Browsing
        } else {
            BehaviorClass::Mixed
        };

        let confidence = match decision {
            BehaviorClass::Mixed => 1.0 - 2.0 * (combined - 0.5).abs(),
            _ => combined,
        };

        let reasoning = format!(
            "{:?}: keyboard={:.2} (epm={:.1}, char_ratio={:.2}), mouse={:.2} (click_ratio={:.2}, drag_ratio={:.2}), combined={:.2}",
            decision,
            keyboard_score,
            keyboard.events_per_minute,
            ratio(keyboard.char_keys, keyboard.total_keys),
            mouse_score,
            mouse.click_ratio,
            mouse.drag_ratio,
            combined
        );

        BehaviorAnalysis {
            decision,
            confidence: confidence.clamp(0.0, 1.0),
            keyboard,
            mouse,
            keyboard_score,
            mouse_score,
            combined_score: combined,
            reasoning,
        }
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn window_duration_minutes(timestamps: &[DateTime<Utc>]) -> f64 {
    let (Some(min), Some(max)) = (timestamps.iter().min(), timestamps.iter().max()) else {
        return 1.0 / 60.0;
    };
    ((*max - *min).num_milliseconds() as f64 / 1000.0 / 60.0).max(1.0 / 60.0)
}

fn keyboard_metrics(records: &[RawRecord]) -> KeyboardMetrics {
    let mut timestamps = Vec::new();
    let mut total_keys = 0usize;
    let mut char_keys = 0usize;
    let mut modifier_combos = 0usize;

    for record in records {
        if let RawRecordData::Keyboard(data) = &record.data {
            total_keys += 1;
            timestamps.push(record.timestamp);
            if data.key_type == KeyType::Char {
                char_keys += 1;
            }
            if !data.modifiers.is_empty() {
                modifier_combos += 1;
            }
        }
    }

    let events_per_minute = if total_keys == 0 {
        0.0
    } else {
        total_keys as f64 / window_duration_minutes(&timestamps)
    };

    KeyboardMetrics { total_keys, char_keys, modifier_combos, events_per_minute }
}

fn mouse_metrics(records: &[RawRecord]) -> MouseMetrics {
    let mut total_events = 0usize;
    let mut clicks = 0usize;
    let mut scrolls = 0usize;
    let mut drags = 0usize;
    let mut positions: Vec<(f64, f64)> = Vec::new();

    for record in records {
        if let RawRecordData::Mouse(data) = &record.data {
            total_events += 1;
            match data.action {
                MouseAction::Click => clicks += 1,
                MouseAction::Scroll => scrolls += 1,
                MouseAction::Drag | MouseAction::DragEnd => {
                    drags += 1;
                    if let Some((x, y)) = data.position {
                        positions.push((x as f64, y as f64));
                    }
                }
                MouseAction::Press | MouseAction::Release => {}
            }
            if matches!(data.action, MouseAction::Click) {
                if let Some((x, y)) = data.position {
                    positions.push((x as f64, y as f64));
                }
            }
        }
    }

    let precision_score = if positions.len() < 2 {
        0.0
    } else {
        let mean_x = positions.iter().map(|p| p.0).sum::<f64>() / positions.len() as f64;
        let mean_y = positions.iter().map(|p| p.1).sum::<f64>() / positions.len() as f64;
        let variance = positions
            .iter()
            .map(|(x, y)| (x - mean_x).powi(2) + (y - mean_y).powi(2))
            .sum::<f64>()
            / positions.len() as f64;
        (variance / 100_000.0).min(1.0)
    };

    MouseMetrics {
        total_events,
        click_ratio: ratio(clicks, total_events),
        scroll_ratio: ratio(scrolls, total_events),
        drag_ratio: ratio(drags, total_events),
        precision_score,
    }
}

fn score_keyboard(metrics: &KeyboardMetrics) -> f64 {
    if metrics.total_keys == 0 {
        return 0.0;
    }
    let epm_term = (metrics.events_per_minute / 20.0).min(1.0);
    let char_term = ratio(metrics.char_keys, metrics.total_keys);
    let modifier_term = (ratio(metrics.modifier_combos, metrics.total_keys) / 0.2).min(1.0);
    0.4 * epm_term + 0.4 * char_term + 0.2 * modifier_term
}

fn score_mouse(metrics: &MouseMetrics) -> f64 {
    if metrics.total_events == 0 {
        return 0.0;
    }
    0.3 * metrics.click_ratio
        + 0.2 * (1.0 - metrics.scroll_ratio)
        + 0.2 * (2.0 * metrics.drag_ratio).min(1.0)
        + 0.3 * metrics.precision_score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{KeyboardData, MouseData};
    use std::collections::BTreeSet;

    fn kb(key_type: KeyType, modifiers: BTreeSet<String>, at: DateTime<Utc>) -> RawRecord {
        RawRecord::new(
            at,
            RawRecordData::Keyboard(KeyboardData { key_type, key: "a".into(), modifiers }),
        )
    }

    fn mouse(action: MouseAction, position: Option<(i32, i32)>, at: DateTime<Utc>) -> RawRecord {
        RawRecord::new(at, RawRecordData::Mouse(MouseData { action, position, merged_count: 0 }))
    }

    #[test]
    fn empty_input_is_neutral_mixed_with_zero_confidence() {
        let analysis = BehaviorAnalyzer::new().analyze(&[]);
        assert_eq!(analysis.decision, BehaviorClass::Mixed);
        assert_eq!(analysis.confidence, 0.0);
    }

    #[test]
    fn dense_typing_classifies_as_operation() {
        let t0 = Utc::now();
        let records: Vec<RawRecord> = (0..40)
            .map(|i| kb(KeyType::Char, BTreeSet::new(), t0 + chrono::Duration::milliseconds(i * 500)))
            .collect();
        let analysis = BehaviorAnalyzer::new().analyze(&records);
        assert_eq!(analysis.decision, BehaviorClass::Operation);
    }

    #[test]
    fn scroll_heavy_session_classifies_as_browsing() {
        let t0 = Utc::now();
        let records: Vec<RawRecord> = (0..20)
            .map(|i| mouse(MouseAction::Scroll, None, t0 + chrono::Duration::seconds(i)))
            .collect();
        let analysis = BehaviorAnalyzer::new().analyze(&records);
        assert_eq!(analysis.decision, BehaviorClass::Browsing);
    }
}
