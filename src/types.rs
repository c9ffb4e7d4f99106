//! Core data types shared across the telemetry engine
//!
//! Raw interaction events flow in, click records accumulate inside a session,
//! and a [`BehavioralSnapshot`] is the only thing that ever leaves the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A position in page coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance_to(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// A single observed click
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickRecord {
    /// Arrival time of the click
    pub time: DateTime<Utc>,
    pub x: f64,
    pub y: f64,
    /// Tag name of the element the click landed on (e.g. `BUTTON`)
    #[serde(alias = "tag")]
    pub target_tag: String,
}

impl ClickRecord {
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// Coarse bucket for the number of scroll events seen in a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollTier {
    #[default]
    None,
    Short,
    Medium,
    Long,
}

impl ScrollTier {
    /// More than this many scroll events is a long scroll session
    pub const LONG_THRESHOLD: u32 = 10;
    /// More than this many scroll events is a medium scroll session
    pub const MEDIUM_THRESHOLD: u32 = 3;

    pub fn from_count(scroll_events: u32) -> Self {
        if scroll_events > Self::LONG_THRESHOLD {
            ScrollTier::Long
        } else if scroll_events > Self::MEDIUM_THRESHOLD {
            ScrollTier::Medium
        } else if scroll_events > 0 {
            ScrollTier::Short
        } else {
            ScrollTier::None
        }
    }
}

/// The derived feature vector handed to the external classifier.
///
/// Serialized as a flat camelCase JSON object. Numeric fields are rounded to
/// two decimal places when built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehavioralSnapshot {
    pub session_id: String,
    /// Session start (RFC3339)
    pub start_timestamp: DateTime<Utc>,
    /// Raw accumulated pointer distance
    pub cursor_travel_units: f64,
    pub typing_speed_chars_per_minute: f64,
    /// Human-likeness of the click history (0-1)
    pub click_pattern_score: f64,
    pub seconds_on_page: f64,
    pub scroll_tier: ScrollTier,
    /// 1 if a verification challenge was passed this session, else 0
    pub captcha_success: u8,
    pub form_fill_seconds: f64,
}

impl BehavioralSnapshot {
    /// The all-zero snapshot reported when nothing has been persisted yet
    pub fn zeroed(session_id: impl Into<String>, start_timestamp: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.into(),
            start_timestamp,
            cursor_travel_units: 0.0,
            typing_speed_chars_per_minute: 0.0,
            click_pattern_score: 0.0,
            seconds_on_page: 0.0,
            scroll_tier: ScrollTier::None,
            captcha_success: 0,
            form_fill_seconds: 0.0,
        }
    }
}

/// Kinds of interaction a listener can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PointerMove,
    KeyDown,
    Click,
    Scroll,
    FocusIn,
    Input,
    Submit,
    Unload,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        EventKind::PointerMove,
        EventKind::KeyDown,
        EventKind::Click,
        EventKind::Scroll,
        EventKind::FocusIn,
        EventKind::Input,
        EventKind::Submit,
        EventKind::Unload,
    ];
}

/// A raw interaction primitive delivered by the host page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InteractionEvent {
    PointerMove {
        x: f64,
        y: f64,
    },
    KeyDown {
        /// Key identifier as reported by the host (`"a"`, `"Shift"`, ...)
        key: String,
    },
    Click {
        x: f64,
        y: f64,
        target_tag: String,
    },
    Scroll,
    FocusIn {
        target_tag: String,
    },
    Input {
        target_tag: String,
    },
    Submit,
    /// The page is going away; triggers the final flush
    Unload,
}

impl InteractionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            InteractionEvent::PointerMove { .. } => EventKind::PointerMove,
            InteractionEvent::KeyDown { .. } => EventKind::KeyDown,
            InteractionEvent::Click { .. } => EventKind::Click,
            InteractionEvent::Scroll => EventKind::Scroll,
            InteractionEvent::FocusIn { .. } => EventKind::FocusIn,
            InteractionEvent::Input { .. } => EventKind::Input,
            InteractionEvent::Submit => EventKind::Submit,
            InteractionEvent::Unload => EventKind::Unload,
        }
    }
}

/// An interaction event stamped with its dispatch time, used for replaying
/// recorded streams
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: InteractionEvent,
}
