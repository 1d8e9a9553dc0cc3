//! Helpers for constructing audio stream URLs for track ids.

use crate::protocol::TrackId;

/// Builds authenticated stream URLs against the media server.
#[derive(Debug, Clone)]
pub struct StreamUrl {
    base_url: String,
    token: String,
}

impl StreamUrl {
    pub fn new(base_url: String, token: String) -> Self {
        Self { base_url, token }
    }

    /// Transcoded opus stream for a track, resolvable by any player process.
    pub fn for_track(&self, track: &TrackId) -> String {
        format!(
            "{}/Audio/{}/stream.opus?audioCodec=opus&maxBitrate=96000&api_key={}",
            self.base_url.trim_end_matches('/'),
            track.0,
            self.token,
        )
    }
}
