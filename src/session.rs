//! Session lifecycle and capture dispatch
//!
//! A [`BehaviorSession`] owns one accumulator, its identity, the two deferred
//! timers (persistence debounce and form quiescence) and the durable store.
//! It is an ordinary owned value: several sessions can live side by side, each
//! with its own clock and store.
//!
//! Lifecycle: uninitialized -> active -> (reset) -> active ...
//!
//! All mutation is expected on one logical thread. The host delivers events
//! through [`BehaviorSession::handle_event`] (directly or via
//! [`crate::capture::attach`]) and gives the timers a chance to run with
//! [`BehaviorSession::poll_timers`], ideally at [`BehaviorSession::next_deadline`].

use crate::accumulator::SessionAccumulator;
use crate::clock::Clock;
use crate::config::SentinelConfig;
use crate::scheduler::Debouncer;
use crate::snapshot::SnapshotBuilder;
use crate::store::SnapshotStore;
use crate::types::{BehavioralSnapshot, ClickRecord, InteractionEvent, Point};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use uuid::Uuid;

/// Identity of the current observation window
#[derive(Debug, Clone, PartialEq, Eq)]
struct SessionIdentity {
    id: String,
    started_at: DateTime<Utc>,
}

impl SessionIdentity {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            started_at: now,
        }
    }
}

/// A live behavioral telemetry session
pub struct BehaviorSession<C: Clock, S: SnapshotStore> {
    config: SentinelConfig,
    clock: C,
    store: S,
    identity: SessionIdentity,
    active: bool,
    accumulator: SessionAccumulator,
    persistence: Debouncer,
    form_quiescence: Debouncer,
}

impl<C: Clock, S: SnapshotStore> BehaviorSession<C, S> {
    /// Create an uninitialized session. Nothing is written until the session
    /// becomes active.
    pub fn new(config: SentinelConfig, clock: C, store: S) -> Self {
        let identity = SessionIdentity::fresh(clock.now());
        let persistence = Debouncer::new(config.debounce_ms);
        let form_quiescence = Debouncer::exclusive(config.form_quiescence_ms);
        Self {
            config,
            clock,
            store,
            identity,
            active: false,
            accumulator: SessionAccumulator::new(),
            persistence,
            form_quiescence,
        }
    }

    /// Begin tracking. Idempotent: an active session keeps its id and start time.
    ///
    /// Returns `true` if this call started the session.
    pub fn init(&mut self) -> bool {
        if self.active {
            return false;
        }
        self.activate();
        self.persist();
        true
    }

    /// Discard all session state and durable storage, then start over with a
    /// fresh identity. The zeroed state is written immediately.
    pub fn reset(&mut self) {
        let previous = std::mem::replace(&mut self.identity, SessionIdentity::fresh(self.clock.now()));
        self.accumulator.clear();
        self.persistence.cancel();
        self.form_quiescence.cancel();

        if let Err(e) = self.store.remove(&self.config.storage_key) {
            warn!("failed to discard stored snapshot on reset: {e}");
        }

        self.active = true;
        info!(
            "behavior session {} reset, new session {}",
            previous.id, self.identity.id
        );
        self.persist();
    }

    /// Record the outcome of a verification challenge.
    ///
    /// A pass sets the flag for the rest of the session; a failure never clears it.
    pub fn notify_verification_success(&mut self, passed: bool) {
        self.ensure_active();
        if passed {
            self.accumulator.set_captcha_success();
        }
        self.schedule_save();
    }

    /// The last durably persisted snapshot.
    ///
    /// Falls back to the all-zero snapshot for the current session when
    /// nothing is stored or the stored content cannot be read.
    pub fn get_snapshot(&self) -> BehavioralSnapshot {
        let fallback = BehavioralSnapshot::zeroed(&self.identity.id, self.identity.started_at);

        match self.store.load(&self.config.storage_key) {
            Ok(Some(raw)) => SnapshotBuilder::decode(&raw, &fallback).unwrap_or_else(|e| {
                warn!("discarding unreadable stored snapshot: {e}");
                fallback
            }),
            Ok(None) => fallback,
            Err(e) => {
                warn!("failed to read stored snapshot: {e}");
                fallback
            }
        }
    }

    /// Snapshot of the live accumulator, without touching storage
    pub fn current_snapshot(&self) -> BehavioralSnapshot {
        SnapshotBuilder::build(
            &self.identity.id,
            self.identity.started_at,
            &self.accumulator,
            self.clock.now(),
        )
    }

    /// Apply one interaction event.
    ///
    /// Elapsed timers run first so they observe the state as of the previous
    /// event. The first captured event implicitly starts an uninitialized
    /// session.
    pub fn handle_event(&mut self, event: &InteractionEvent) {
        if matches!(event, InteractionEvent::Unload) {
            // The exit flush below writes everything a due debounce would
            self.persistence.cancel();
        }
        self.poll_timers();
        self.ensure_active();
        let now = self.clock.now();

        match event {
            InteractionEvent::PointerMove { x, y } => {
                self.accumulator.record_pointer_move(Point::new(*x, *y));
                self.schedule_save();
            }
            InteractionEvent::KeyDown { key } => {
                if self.accumulator.record_key(key, now) {
                    self.schedule_save();
                }
            }
            InteractionEvent::Click { x, y, target_tag } => {
                self.accumulator.record_click(ClickRecord {
                    time: now,
                    x: *x,
                    y: *y,
                    target_tag: target_tag.clone(),
                });
                self.schedule_save();
            }
            InteractionEvent::Scroll => {
                self.accumulator.record_scroll();
                self.schedule_save();
            }
            InteractionEvent::FocusIn { target_tag } | InteractionEvent::Input { target_tag } => {
                if self.config.is_form_tag(target_tag) {
                    if self.accumulator.record_form_interaction(now) {
                        debug!("form span opened on {target_tag}");
                    }
                    self.form_quiescence.arm(now);
                    self.schedule_save();
                }
            }
            InteractionEvent::Submit => {
                if self.accumulator.form_span_open() {
                    self.accumulator.record_form_interaction(now);
                    self.close_form_span("submit");
                }
                self.schedule_save();
            }
            InteractionEvent::Unload => self.flush(),
        }
    }

    /// Run every deferred callback whose deadline has passed.
    ///
    /// The form quiescence window is checked before the persistence debounce
    /// so a write issued in the same poll sees the closed span. Returns `true`
    /// if a snapshot was written.
    pub fn poll_timers(&mut self) -> bool {
        let now = self.clock.now();

        if self.form_quiescence.fire_if_due(now) {
            self.close_form_span("quiescence");
        }

        if self.persistence.fire_if_due(now) {
            self.persist();
            return true;
        }
        false
    }

    /// Write immediately, bypassing the debounce. Used on page exit.
    pub fn flush(&mut self) {
        self.persistence.cancel();
        self.persist();
    }

    /// Earliest instant at which [`Self::poll_timers`] has work to do
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        match (self.persistence.fires_at(), self.form_quiescence.fires_at()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn session_id(&self) -> &str {
        &self.identity.id
    }

    pub fn start_timestamp(&self) -> DateTime<Utc> {
        self.identity.started_at
    }

    pub fn accumulator(&self) -> &SessionAccumulator {
        &self.accumulator
    }

    pub fn config(&self) -> &SentinelConfig {
        &self.config
    }

    pub fn has_pending_write(&self) -> bool {
        self.persistence.is_pending()
    }

    fn ensure_active(&mut self) {
        if !self.active {
            self.activate();
        }
    }

    fn activate(&mut self) {
        self.identity.started_at = self.clock.now();
        self.active = true;
        info!("behavior session {} started", self.identity.id);
    }

    fn schedule_save(&mut self) {
        self.persistence.arm(self.clock.now());
    }

    fn close_form_span(&mut self, reason: &str) {
        self.form_quiescence.cancel();
        if let Some(span_ms) = self.accumulator.close_form_span() {
            debug!("form span closed by {reason} after {span_ms} ms");
        }
    }

    fn persist(&mut self) {
        let snapshot = self.current_snapshot();
        let payload = match serde_json::to_string(&snapshot) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("failed to serialize snapshot: {e}");
                return;
            }
        };

        match self.store.save(&self.config.storage_key, &payload) {
            Ok(()) => debug!(
                "persisted snapshot for session {} ({} bytes)",
                self.identity.id,
                payload.len()
            ),
            Err(e) => warn!("failed to persist snapshot: {e}"),
        }
    }
}
