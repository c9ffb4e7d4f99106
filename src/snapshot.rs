//! Snapshot derivation and decoding
//!
//! A snapshot is a pure function of the accumulator at computation time; the
//! builder holds no state of its own.

use crate::accumulator::SessionAccumulator;
use crate::scoring::{click_pattern_score, round_decimals};
use crate::types::{BehavioralSnapshot, ScrollTier};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Decimal places kept for every numeric snapshot field
pub const SNAPSHOT_PRECISION: i32 = 2;

/// Derives [`BehavioralSnapshot`]s from accumulator state
pub struct SnapshotBuilder;

impl SnapshotBuilder {
    pub fn build(
        session_id: &str,
        start_timestamp: DateTime<Utc>,
        acc: &SessionAccumulator,
        now: DateTime<Utc>,
    ) -> BehavioralSnapshot {
        let seconds_on_page = ((now - start_timestamp).num_milliseconds().max(0)) as f64 / 1000.0;

        BehavioralSnapshot {
            session_id: session_id.to_string(),
            start_timestamp,
            cursor_travel_units: round(acc.cursor_travel()),
            typing_speed_chars_per_minute: round(typing_speed_cpm(acc)),
            click_pattern_score: click_pattern_score(acc.click_history()),
            seconds_on_page: round(seconds_on_page),
            scroll_tier: ScrollTier::from_count(acc.scroll_event_count()),
            captcha_success: u8::from(acc.captcha_success()),
            form_fill_seconds: round(acc.form_fill_ms() as f64 / 1000.0),
        }
    }

    /// Decode a stored snapshot, filling absent or mistyped fields from `fallback`.
    ///
    /// Content that is not a JSON object at all is an error; the caller decides
    /// what to substitute.
    pub fn decode(
        raw: &str,
        fallback: &BehavioralSnapshot,
    ) -> Result<BehavioralSnapshot, serde_json::Error> {
        let stored: StoredSnapshot = serde_json::from_str(raw)?;
        Ok(stored.into_snapshot(fallback))
    }
}

/// Characters per minute between the first and last qualifying keystroke.
///
/// Zero when nothing was typed or all keystrokes landed on the same instant.
fn typing_speed_cpm(acc: &SessionAccumulator) -> f64 {
    let (Some(first), Some(last)) = (acc.first_key_time(), acc.last_key_time()) else {
        return 0.0;
    };
    let minutes = (last - first).num_milliseconds() as f64 / 60_000.0;
    if minutes <= 0.0 {
        return 0.0;
    }
    acc.key_count() as f64 / minutes
}

fn round(value: f64) -> f64 {
    round_decimals(value, SNAPSHOT_PRECISION)
}

/// Lenient view of a persisted snapshot; every field is optional
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSnapshot {
    #[serde(default, deserialize_with = "lenient")]
    session_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    start_timestamp: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient")]
    cursor_travel_units: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    typing_speed_chars_per_minute: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    click_pattern_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    seconds_on_page: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    scroll_tier: Option<ScrollTier>,
    #[serde(default, deserialize_with = "lenient")]
    captcha_success: Option<u8>,
    #[serde(default, deserialize_with = "lenient")]
    form_fill_seconds: Option<f64>,
}

impl StoredSnapshot {
    fn into_snapshot(self, fallback: &BehavioralSnapshot) -> BehavioralSnapshot {
        BehavioralSnapshot {
            session_id: self
                .session_id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| fallback.session_id.clone()),
            start_timestamp: self.start_timestamp.unwrap_or(fallback.start_timestamp),
            cursor_travel_units: self.cursor_travel_units.unwrap_or(fallback.cursor_travel_units),
            typing_speed_chars_per_minute: self
                .typing_speed_chars_per_minute
                .unwrap_or(fallback.typing_speed_chars_per_minute),
            click_pattern_score: self.click_pattern_score.unwrap_or(fallback.click_pattern_score),
            seconds_on_page: self.seconds_on_page.unwrap_or(fallback.seconds_on_page),
            scroll_tier: self.scroll_tier.unwrap_or(fallback.scroll_tier),
            captcha_success: self
                .captcha_success
                .map(|v| v.min(1))
                .unwrap_or(fallback.captcha_success),
            form_fill_seconds: self.form_fill_seconds.unwrap_or(fallback.form_fill_seconds),
        }
    }
}

/// Deserialize a field, treating a value of the wrong type as absent
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClickRecord, Point};
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap() + Duration::milliseconds(ms)
    }

    #[test]
    fn test_empty_accumulator() {
        let acc = SessionAccumulator::new();
        let snapshot = SnapshotBuilder::build("sess", t(0), &acc, t(0));

        assert_eq!(snapshot.cursor_travel_units, 0.0);
        assert_eq!(snapshot.typing_speed_chars_per_minute, 0.0);
        assert_eq!(snapshot.seconds_on_page, 0.0);
        assert_eq!(snapshot.scroll_tier, ScrollTier::None);
        assert_eq!(snapshot.captcha_success, 0);
        assert_eq!(snapshot.form_fill_seconds, 0.0);
        assert_eq!(snapshot.click_pattern_score, 1.0);
    }

    #[test]
    fn test_typing_speed_without_keys_is_zero() {
        let acc = SessionAccumulator::new();
        let snapshot = SnapshotBuilder::build("sess", t(0), &acc, t(3_600_000));
        assert_eq!(snapshot.typing_speed_chars_per_minute, 0.0);
        assert!(!snapshot.typing_speed_chars_per_minute.is_nan());
        assert_eq!(snapshot.seconds_on_page, 3600.0);
    }

    #[test]
    fn test_single_keystroke_has_no_speed() {
        let mut acc = SessionAccumulator::new();
        acc.record_key("x", t(1_000));
        let snapshot = SnapshotBuilder::build("sess", t(0), &acc, t(2_000));
        assert_eq!(snapshot.typing_speed_chars_per_minute, 0.0);
    }

    #[test]
    fn test_typing_speed() {
        let mut acc = SessionAccumulator::new();
        for (i, key) in ["h", "e", "l", "l", "o"].iter().enumerate() {
            acc.record_key(key, t(1_000 + i as i64 * 750));
        }
        // 5 chars over 3 seconds
        let snapshot = SnapshotBuilder::build("sess", t(0), &acc, t(10_000));
        assert_eq!(snapshot.typing_speed_chars_per_minute, 100.0);
    }

    #[test]
    fn test_full_snapshot() {
        let mut acc = SessionAccumulator::new();
        acc.record_pointer_move(Point::new(0.0, 0.0));
        acc.record_pointer_move(Point::new(1.0, 1.0));
        for _ in 0..5 {
            acc.record_scroll();
        }
        acc.record_click(ClickRecord {
            time: t(100),
            x: 5.0,
            y: 5.0,
            target_tag: "BUTTON".to_string(),
        });
        acc.record_form_interaction(t(1_000));
        acc.record_form_interaction(t(13_340));
        acc.set_captcha_success();

        let snapshot = SnapshotBuilder::build("sess-9", t(0), &acc, t(20_004));
        assert_eq!(
            snapshot,
            BehavioralSnapshot {
                session_id: "sess-9".to_string(),
                start_timestamp: t(0),
                cursor_travel_units: 1.41,
                typing_speed_chars_per_minute: 0.0,
                click_pattern_score: 1.0,
                seconds_on_page: 20.0,
                scroll_tier: ScrollTier::Medium,
                captcha_success: 1,
                form_fill_seconds: 12.34,
            }
        );
    }

    #[test]
    fn test_decode_roundtrip() {
        let snapshot = BehavioralSnapshot {
            cursor_travel_units: 20.0,
            scroll_tier: ScrollTier::Long,
            ..BehavioralSnapshot::zeroed("sess-a", t(0))
        };
        let raw = serde_json::to_string(&snapshot).unwrap();
        let fallback = BehavioralSnapshot::zeroed("other", t(5));

        assert_eq!(SnapshotBuilder::decode(&raw, &fallback).unwrap(), snapshot);
    }

    #[test]
    fn test_decode_fills_missing_and_mistyped_fields() {
        let fallback = BehavioralSnapshot::zeroed("current", t(0));
        let raw = r#"{"cursorTravelUnits": 42.5, "scrollTier": "sideways", "captchaSuccess": 1}"#;

        let decoded = SnapshotBuilder::decode(raw, &fallback).unwrap();
        assert_eq!(decoded.session_id, "current");
        assert_eq!(decoded.cursor_travel_units, 42.5);
        assert_eq!(decoded.scroll_tier, ScrollTier::None);
        assert_eq!(decoded.captcha_success, 1);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let fallback = BehavioralSnapshot::zeroed("current", t(0));
        assert!(SnapshotBuilder::decode("not json", &fallback).is_err());
        assert!(SnapshotBuilder::decode("42", &fallback).is_err());
    }
}
