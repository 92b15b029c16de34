//! Host-authoritative playback state and the viewer reconciliation rule.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Viewers resync their position only when they diverge from the
/// authoritative time by more than this many seconds. Smaller divergence is
/// ordinary network latency and seeking on it would cause visible stutter.
pub const DRIFT_THRESHOLD_SECS: f64 = 2.0;

/// The single authoritative playback state a room's host produces.
///
/// Every sync message carries the full state, so messages are idempotent and
/// a dropped one is healed by the next.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackState {
    pub is_playing: bool,
    /// Position in seconds at the moment of `updated_at`.
    pub current_time: f64,
    pub playback_rate: f64,
    /// -1 = subtitles off, 0+ = track index.
    pub subtitle_index: i32,
    pub updated_at: DateTime<Utc>,
}

impl PlaybackState {
    pub fn initial(now: DateTime<Utc>) -> Self {
        Self {
            is_playing: false,
            current_time: 0.0,
            playback_rate: 1.0,
            subtitle_index: -1,
            updated_at: now,
        }
    }

    /// Reset after a content change: paused at zero, defaults restored.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        *self = Self::initial(now);
    }

    pub fn play(&mut self, current_time: f64, now: DateTime<Utc>) {
        self.is_playing = true;
        self.current_time = current_time;
        self.updated_at = now;
    }

    pub fn pause(&mut self, current_time: f64, now: DateTime<Utc>) {
        self.is_playing = false;
        self.current_time = current_time;
        self.updated_at = now;
    }

    pub fn seek(&mut self, current_time: f64, now: DateTime<Utc>) {
        self.current_time = current_time;
        self.updated_at = now;
    }

    pub fn set_rate(&mut self, rate: f64, now: DateTime<Utc>) {
        // Re-anchor the position first so the old rate applies up to now.
        self.current_time = self.position_at(now);
        self.playback_rate = rate;
        self.updated_at = now;
    }

    pub fn set_subtitle(&mut self, subtitle_index: i32) {
        self.subtitle_index = subtitle_index;
    }

    /// Where playback is "now": the stored position advances with wall clock
    /// while playing.
    pub fn position_at(&self, now: DateTime<Utc>) -> f64 {
        if !self.is_playing {
            return self.current_time;
        }
        let elapsed = (now - self.updated_at).num_milliseconds() as f64 / 1000.0;
        self.current_time + elapsed.max(0.0) * self.playback_rate
    }

    /// A copy with the position brought forward to `now`, for answering a
    /// late `video:request-state`.
    pub fn at(&self, now: DateTime<Utc>) -> Self {
        let mut state = self.clone();
        state.current_time = self.position_at(now);
        state.updated_at = now;
        state
    }
}

/// What a viewer's player should do with an authoritative sync message.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    /// `Some` only when drift exceeded [`DRIFT_THRESHOLD_SECS`].
    pub seek_to: Option<f64>,
    /// `Some(true)` = resume, `Some(false)` = pause, `None` = already matching.
    pub set_playing: Option<bool>,
    /// Adopted unconditionally when it differs; no jitter risk.
    pub set_rate: Option<f64>,
}

impl Reconciliation {
    pub fn is_noop(&self) -> bool {
        self.seek_to.is_none() && self.set_playing.is_none() && self.set_rate.is_none()
    }
}

/// The state-reconciliation rule viewers apply to each `video:sync` message.
pub fn reconcile(
    local_time: f64,
    local_playing: bool,
    local_rate: f64,
    authoritative: &PlaybackState,
) -> Reconciliation {
    let drift = (local_time - authoritative.current_time).abs();
    Reconciliation {
        seek_to: (drift > DRIFT_THRESHOLD_SECS).then_some(authoritative.current_time),
        set_playing: (local_playing != authoritative.is_playing).then_some(authoritative.is_playing),
        set_rate: (local_rate != authoritative.playback_rate).then_some(authoritative.playback_rate),
    }
}
