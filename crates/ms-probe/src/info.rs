//! The track/info object graph produced by the box backend.

use serde::{Deserialize, Serialize};

/// Container-level information read from the box structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerInfo {
    /// Major brand from the `ftyp` box, when present.
    pub brand: Option<String>,
    /// Movie timescale in ticks per second.
    pub timescale: u32,
    /// Movie duration in timescale ticks.
    pub duration: u64,
    /// Enumerated tracks, in declaration order.
    pub tracks: Vec<TrackInfo>,
}

/// Declared track type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
    Text,
}

/// One enumerated track.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackInfo {
    /// Track id as declared in the container (1-based).
    pub id: u32,
    /// Declared track type.
    pub kind: TrackKind,
    /// Codec identifier (e.g. "avc1", "mp4a", "tx3g").
    pub codec: String,
    /// Track timescale in ticks per second.
    pub timescale: u32,
    /// Track duration in timescale ticks.
    pub duration: u64,
    /// Number of samples in the track.
    pub nb_samples: u64,
    /// Width in pixels (video tracks).
    pub width: Option<u32>,
    /// Height in pixels (video tracks).
    pub height: Option<u32>,
    /// Sample rate in Hz (audio tracks).
    pub sample_rate: Option<u32>,
    /// Channel count (audio tracks).
    pub channel_count: Option<u32>,
    /// Track bit rate in bits per second, when declared.
    pub bit_rate: Option<u64>,
    /// Declared language tag, when not the container's "undetermined".
    pub language: Option<String>,
    /// Whether the track is flagged as default.
    pub default: bool,
    /// Whether the track is flagged as forced.
    pub forced: bool,
}

impl TrackInfo {
    /// Track duration in seconds, `None` when the timescale is zero.
    pub fn duration_secs(&self) -> Option<f64> {
        if self.timescale == 0 {
            return None;
        }
        Some(self.duration as f64 / self.timescale as f64)
    }

    /// Frame (sample) rate from sample count over duration.
    pub fn sample_rate_hz(&self) -> Option<f64> {
        let secs = self.duration_secs()?;
        if secs <= 0.0 {
            return None;
        }
        Some(self.nb_samples as f64 / secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_and_rate() {
        let track = TrackInfo {
            id: 1,
            kind: TrackKind::Video,
            codec: "avc1".into(),
            timescale: 1000,
            duration: 2000,
            nb_samples: 48,
            width: Some(640),
            height: Some(360),
            sample_rate: None,
            channel_count: None,
            bit_rate: None,
            language: None,
            default: true,
            forced: false,
        };
        assert_eq!(track.duration_secs(), Some(2.0));
        assert_eq!(track.sample_rate_hz(), Some(24.0));
    }

    #[test]
    fn zero_timescale_yields_none() {
        let track = TrackInfo {
            id: 1,
            kind: TrackKind::Audio,
            codec: "mp4a".into(),
            timescale: 0,
            duration: 500,
            nb_samples: 10,
            width: None,
            height: None,
            sample_rate: Some(48000),
            channel_count: Some(2),
            bit_rate: None,
            language: None,
            default: false,
            forced: false,
        };
        assert_eq!(track.duration_secs(), None);
        assert_eq!(track.sample_rate_hz(), None);
    }
}
