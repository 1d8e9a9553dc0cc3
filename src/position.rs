//! Last-known playback position with its wall-clock anchor.

use std::time::Instant;

/// Offset into the current track plus the instant at which it was last true.
///
/// Anchored at the issue time of each start action, so progress queries are
/// consistent even before the engine confirms the transition.
#[derive(Debug, Clone)]
pub struct PlaybackPosition {
    offset_ms: u64,
    updated_at: Instant,
}

impl Default for PlaybackPosition {
    fn default() -> Self {
        Self {
            offset_ms: 0,
            updated_at: Instant::now(),
        }
    }
}

impl PlaybackPosition {
    /// Last offset the engine was known to be at, in milliseconds.
    pub fn last_known_ms(&self) -> u64 {
        self.offset_ms
    }

    /// A track was started at `offset_ms`; re-anchor to now.
    pub fn restart(&mut self, offset_ms: u64) {
        self.offset_ms = offset_ms;
        self.updated_at = Instant::now();
    }

    /// The engine paused: recompute the offset from wall-clock elapsed since
    /// the last anchor, then re-anchor.
    pub fn mark_paused(&mut self) {
        self.offset_ms = self.updated_at.elapsed().as_millis() as u64;
        self.updated_at = Instant::now();
    }

    /// The track ended; back to zero.
    pub fn reset(&mut self) {
        self.restart(0);
    }
}
