//! Session accumulator
//!
//! The mutable aggregation state behind a session. Every update is O(1)
//! amortized and touches only plain fields, so a half-applied event can never
//! be observed.

use crate::types::{ClickRecord, Point};
use chrono::{DateTime, Utc};

/// Running interaction totals for one session
#[derive(Debug, Clone, Default)]
pub struct SessionAccumulator {
    cursor_travel: f64,
    last_cursor_position: Option<Point>,

    key_count: u32,
    first_key_time: Option<DateTime<Utc>>,
    last_key_time: Option<DateTime<Utc>>,

    click_history: Vec<ClickRecord>,

    scroll_event_count: u32,

    form_active_since: Option<DateTime<Utc>>,
    last_form_interaction: Option<DateTime<Utc>>,
    /// Duration of form spans that have already closed
    closed_form_ms: i64,

    captcha_success: bool,
}

impl SessionAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the distance from the previous pointer position, then move the baseline.
    ///
    /// The first movement after a reset only establishes the baseline.
    pub fn record_pointer_move(&mut self, position: Point) {
        if let Some(previous) = self.last_cursor_position {
            self.cursor_travel += previous.distance_to(&position);
        }
        self.last_cursor_position = Some(position);
    }

    /// Count a keystroke if it is a single printable character.
    ///
    /// Returns `false` for modifier and navigation keys, which are ignored.
    pub fn record_key(&mut self, key: &str, now: DateTime<Utc>) -> bool {
        if !is_printable_key(key) {
            return false;
        }
        if self.first_key_time.is_none() {
            self.first_key_time = Some(now);
        }
        self.last_key_time = Some(now);
        self.key_count += 1;
        true
    }

    pub fn record_click(&mut self, click: ClickRecord) {
        self.click_history.push(click);
    }

    pub fn record_scroll(&mut self) {
        self.scroll_event_count = self.scroll_event_count.saturating_add(1);
    }

    /// Register a form-control interaction. Returns `true` when it opened a new span.
    pub fn record_form_interaction(&mut self, now: DateTime<Utc>) -> bool {
        let opened = self.form_active_since.is_none();
        if opened {
            self.form_active_since = Some(now);
        }
        self.last_form_interaction = Some(now);
        opened
    }

    /// Close the open form span, folding its duration into the running total.
    ///
    /// Returns the closed span's duration in milliseconds, or `None` if no span
    /// was open.
    pub fn close_form_span(&mut self) -> Option<i64> {
        let span_ms = self.open_form_span_ms()?;
        self.closed_form_ms += span_ms;
        self.form_active_since = None;
        self.last_form_interaction = None;
        Some(span_ms)
    }

    pub fn set_captcha_success(&mut self) {
        self.captcha_success = true;
    }

    /// Drop everything, returning to the freshly-created state
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn cursor_travel(&self) -> f64 {
        self.cursor_travel
    }

    pub fn last_cursor_position(&self) -> Option<Point> {
        self.last_cursor_position
    }

    pub fn key_count(&self) -> u32 {
        self.key_count
    }

    pub fn first_key_time(&self) -> Option<DateTime<Utc>> {
        self.first_key_time
    }

    pub fn last_key_time(&self) -> Option<DateTime<Utc>> {
        self.last_key_time
    }

    pub fn click_history(&self) -> &[ClickRecord] {
        &self.click_history
    }

    pub fn scroll_event_count(&self) -> u32 {
        self.scroll_event_count
    }

    pub fn form_span_open(&self) -> bool {
        self.form_active_since.is_some()
    }

    pub fn last_form_interaction(&self) -> Option<DateTime<Utc>> {
        self.last_form_interaction
    }

    /// Total form fill time: closed spans plus the span still open, if any
    pub fn form_fill_ms(&self) -> i64 {
        self.closed_form_ms + self.open_form_span_ms().unwrap_or(0)
    }

    pub fn captcha_success(&self) -> bool {
        self.captcha_success
    }

    fn open_form_span_ms(&self) -> Option<i64> {
        match (self.form_active_since, self.last_form_interaction) {
            (Some(since), Some(last)) => Some((last - since).num_milliseconds().max(0)),
            _ => None,
        }
    }
}

/// A key identifier of exactly one character is a printable keystroke
fn is_printable_key(key: &str) -> bool {
    let mut chars = key.chars();
    chars.next().is_some() && chars.next().is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap() + Duration::milliseconds(ms)
    }

    #[test]
    fn test_first_pointer_move_sets_baseline_only() {
        let mut acc = SessionAccumulator::new();
        acc.record_pointer_move(Point::new(100.0, 100.0));
        assert_eq!(acc.cursor_travel(), 0.0);
        assert_eq!(acc.last_cursor_position(), Some(Point::new(100.0, 100.0)));

        acc.record_pointer_move(Point::new(103.0, 104.0));
        assert_eq!(acc.cursor_travel(), 5.0);
    }

    #[test]
    fn test_cursor_travel_is_monotonic() {
        let mut acc = SessionAccumulator::new();
        let path = [(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 0.0), (0.0, 0.0)];
        let mut previous = 0.0;
        for (x, y) in path {
            acc.record_pointer_move(Point::new(x, y));
            assert!(acc.cursor_travel() >= previous);
            previous = acc.cursor_travel();
        }
        assert!((acc.cursor_travel() - (20.0 + 200f64.sqrt())).abs() < 1e-9);
    }

    #[test]
    fn test_only_printable_keys_count() {
        let mut acc = SessionAccumulator::new();
        assert!(!acc.record_key("Shift", t(0)));
        assert!(!acc.record_key("Tab", t(10)));
        assert!(!acc.record_key("", t(20)));
        assert_eq!(acc.key_count(), 0);
        assert_eq!(acc.first_key_time(), None);

        assert!(acc.record_key("a", t(100)));
        assert!(acc.record_key("é", t(200)));
        assert!(acc.record_key(" ", t(300)));
        assert_eq!(acc.key_count(), 3);
        assert_eq!(acc.first_key_time(), Some(t(100)));
        assert_eq!(acc.last_key_time(), Some(t(300)));
    }

    #[test]
    fn test_scroll_count_never_decreases() {
        let mut acc = SessionAccumulator::new();
        for expected in 1..=12 {
            acc.record_scroll();
            assert_eq!(acc.scroll_event_count(), expected);
        }
    }

    #[test]
    fn test_form_spans_accumulate() {
        let mut acc = SessionAccumulator::new();
        assert_eq!(acc.form_fill_ms(), 0);

        assert!(acc.record_form_interaction(t(0)));
        assert!(!acc.record_form_interaction(t(4_000)));
        assert_eq!(acc.form_fill_ms(), 4_000);

        assert_eq!(acc.close_form_span(), Some(4_000));
        assert!(!acc.form_span_open());
        assert_eq!(acc.close_form_span(), None);

        assert!(acc.record_form_interaction(t(60_000)));
        acc.record_form_interaction(t(62_500));
        assert_eq!(acc.form_fill_ms(), 6_500);
    }

    #[test]
    fn test_captcha_flag_persists_until_clear() {
        let mut acc = SessionAccumulator::new();
        acc.set_captcha_success();
        assert!(acc.captcha_success());

        acc.record_scroll();
        acc.clear();
        assert!(!acc.captcha_success());
        assert_eq!(acc.scroll_event_count(), 0);
    }

    #[test]
    fn test_clear_drops_click_history() {
        let mut acc = SessionAccumulator::new();
        acc.record_click(ClickRecord {
            time: t(0),
            x: 1.0,
            y: 1.0,
            target_tag: "BUTTON".to_string(),
        });
        acc.record_pointer_move(Point::new(1.0, 1.0));
        assert_eq!(acc.click_history().len(), 1);

        acc.clear();
        assert!(acc.click_history().is_empty());
        assert_eq!(acc.last_cursor_position(), None);
    }
}
