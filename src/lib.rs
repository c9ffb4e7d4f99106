//! Synheart Sentinel - On-device behavioral telemetry engine
//!
//! Sentinel observes a stream of user interaction (pointer motion, keystrokes,
//! clicks, scrolling, form focus) and reduces it to a compact, bounded
//! [`BehavioralSnapshot`] describing how human-like the current session looks:
//! interaction capture → session accumulator → debounced snapshot persistence
//! → pull API for the caller that forwards it to an external classifier.
//!
//! ## Modules
//!
//! - **Session**: lifecycle (`init` / `reset`), capture dispatch and timers
//! - **Scoring**: click pattern human-likeness score
//! - **Capture**: listener subscriptions against an event source

pub mod accumulator;
pub mod capture;
pub mod clock;
pub mod config;
pub mod error;
pub mod scheduler;
pub mod scoring;
pub mod session;
pub mod snapshot;
pub mod store;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use capture::{attach, EventHub, EventSource, Subscription};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SentinelConfig;
pub use error::SentinelError;
pub use scoring::click_pattern_score;
pub use session::BehaviorSession;
pub use store::{FileStore, MemoryStore, SnapshotStore};
pub use types::{BehavioralSnapshot, ClickRecord, InteractionEvent, ScrollTier};

/// Sentinel version embedded in CLI and FFI output
pub const SENTINEL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the tooling
pub const PRODUCER_NAME: &str = "synheart-sentinel";
