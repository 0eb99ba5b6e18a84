//! Typed metadata model shared by both extraction backends.
//!
//! Fields the backend could not determine are genuine `Option`s; the
//! literal string `"unknown"` exists only in the display layer (the
//! `display_*` helpers) so consumers that want a never-absent field read
//! the rendered form instead of branching on presence.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Sentinel rendered for fields the backend could not determine.
pub const UNKNOWN: &str = "unknown";

/// Frame rate assumed for frame-count arithmetic when no video stream was
/// detected in the diagnostic text.
pub const DEFAULT_FRAME_RATE: f64 = 25.0;

fn display_opt<T: ToString>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

// ---------------------------------------------------------------------------
// Container classification
// ---------------------------------------------------------------------------

/// Container family, inferred from the file extension.
///
/// The family decides both which backend handles the file and which
/// byte-range policy applies when probing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFamily {
    /// Box-parseable ISO base media (mp4/m4v/mov): metadata can sit at
    /// either end of the file.
    IsoBmff,
    /// Every other recognized container: metadata atoms are assumed to
    /// precede sample data, so a bounded prefix suffices for probing.
    Other,
}

/// Extensions routed to the box backend.
const ISO_BMFF_EXTENSIONS: &[&str] = &["mp4", "m4v", "mov"];

/// Extensions routed to the diagnostic-text backend.
const OTHER_EXTENSIONS: &[&str] = &[
    "mkv", "webm", "avi", "flv", "mpg", "mpeg", "ts", "wmv", "3gp", "ogv", "mp3", "wav", "flac",
    "aac", "ogg", "m4a", "opus",
];

/// Classify a filename's extension into a [`ContainerFamily`].
///
/// Returns `None` for unrecognized or missing extensions; callers treat
/// that as a validation failure before any backend work starts.
pub fn classify_extension(filename: &str) -> Option<ContainerFamily> {
    let ext = filename.rsplit_once('.').map(|(_, e)| e.to_lowercase())?;
    if ISO_BMFF_EXTENSIONS.contains(&ext.as_str()) {
        Some(ContainerFamily::IsoBmff)
    } else if OTHER_EXTENSIONS.contains(&ext.as_str()) {
        Some(ContainerFamily::Other)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Metadata model
// ---------------------------------------------------------------------------

/// Complete metadata record for one media file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Container-level summary.
    pub format: FormatSummary,
    /// All enumerated streams, in backend enumeration order.
    ///
    /// The position in this sequence is the default display and extraction
    /// index, so order is part of the contract.
    pub streams: Vec<StreamDescriptor>,
}

impl VideoMetadata {
    /// The first video stream, if any.
    pub fn first_video(&self) -> Option<&StreamDescriptor> {
        self.streams
            .iter()
            .find(|s| matches!(s.details, StreamDetails::Video(_)))
    }

    /// The first audio stream, if any.
    pub fn first_audio(&self) -> Option<&StreamDescriptor> {
        self.streams
            .iter()
            .find(|s| matches!(s.details, StreamDetails::Audio(_)))
    }

    /// All subtitle streams, in enumeration order.
    pub fn subtitles(&self) -> impl Iterator<Item = &StreamDescriptor> {
        self.streams
            .iter()
            .filter(|s| matches!(s.details, StreamDetails::Subtitle(_)))
    }
}

/// Container-level summary fields.
///
/// Only the first video and first audio stream feed the summary; files
/// with several video or audio tracks under-report here, but every
/// enumerated stream remains addressable by index in
/// [`VideoMetadata::streams`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatSummary {
    /// Name of the source file.
    pub filename: String,
    /// Container name as reported by the backend (e.g. "matroska,webm").
    pub container: String,
    /// Duration in whole seconds.
    pub duration_secs: Option<u64>,
    /// Total file size in bytes.
    pub size_bytes: u64,
    /// Overall bit rate in bits per second.
    pub bit_rate: Option<u64>,
    /// Frame rate of the primary video stream; kept at
    /// [`DEFAULT_FRAME_RATE`] when no video stream was detected.
    pub frame_rate: Option<f64>,
    /// Movie time in milliseconds.
    pub duration_ms: Option<u64>,
    /// Total frame count, `round(duration_ms / 1000 * frame_rate)`.
    pub frame_count: Option<u64>,
}

impl FormatSummary {
    /// Duration in whole seconds, or the `"unknown"` sentinel.
    pub fn display_duration(&self) -> String {
        display_opt(&self.duration_secs)
    }

    /// Movie time in milliseconds, or the `"unknown"` sentinel.
    pub fn display_duration_ms(&self) -> String {
        display_opt(&self.duration_ms)
    }

    /// Overall bit rate in bits per second, or the `"unknown"` sentinel.
    pub fn display_bit_rate(&self) -> String {
        display_opt(&self.bit_rate)
    }

    /// Frame rate rendered to two decimals, or the `"unknown"` sentinel.
    pub fn display_frame_rate(&self) -> String {
        self.frame_rate
            .map(|f| format!("{f:.2}"))
            .unwrap_or_else(|| UNKNOWN.to_string())
    }

    /// Total frame count, or the `"unknown"` sentinel.
    pub fn display_frame_count(&self) -> String {
        display_opt(&self.frame_count)
    }
}

/// Stream codec type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Video,
    Audio,
    Subtitle,
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamKind::Video => write!(f, "video"),
            StreamKind::Audio => write!(f, "audio"),
            StreamKind::Subtitle => write!(f, "subtitle"),
        }
    }
}

/// One enumerated stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// Stream index in backend enumeration order.
    pub index: u32,
    /// Codec name as reported by the backend.
    pub codec: String,
    /// Codec profile, when the backend reports one.
    pub profile: Option<String>,
    /// Kind-specific fields.
    #[serde(flatten)]
    pub details: StreamDetails,
}

impl StreamDescriptor {
    /// The stream's codec type.
    pub fn kind(&self) -> StreamKind {
        match self.details {
            StreamDetails::Video(_) => StreamKind::Video,
            StreamDetails::Audio(_) => StreamKind::Audio,
            StreamDetails::Subtitle(_) => StreamKind::Subtitle,
        }
    }
}

/// Kind-specific stream fields, discriminated by codec type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "codec_type", rename_all = "lowercase")]
pub enum StreamDetails {
    Video(VideoStream),
    Audio(AudioStream),
    Subtitle(SubtitleStream),
}

/// Video stream fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoStream {
    /// Width in pixels.
    pub width: Option<u32>,
    /// Height in pixels.
    pub height: Option<u32>,
    /// Frame rate in frames per second.
    pub frame_rate: Option<f64>,
    /// Pixel format (e.g. "yuv420p").
    pub pixel_format: Option<String>,
    /// Stream bit rate in bits per second.
    pub bit_rate: Option<u64>,
    /// Total frame count.
    pub frame_count: Option<u64>,
}

impl VideoStream {
    /// "WxH" resolution, or the `"unknown"` sentinel.
    pub fn display_resolution(&self) -> String {
        match (self.width, self.height) {
            (Some(w), Some(h)) => format!("{w}x{h}"),
            _ => UNKNOWN.to_string(),
        }
    }
}

/// Audio stream fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AudioStream {
    /// Sample rate in Hz.
    pub sample_rate: Option<u32>,
    /// Channel count.
    pub channels: Option<u32>,
    /// Channel layout label (e.g. "stereo", "5.1").
    pub channel_layout: Option<String>,
    /// Stream bit rate in bits per second.
    pub bit_rate: Option<u64>,
}

impl AudioStream {
    /// Sample rate in Hz, or the `"unknown"` sentinel.
    pub fn display_sample_rate(&self) -> String {
        display_opt(&self.sample_rate)
    }

    /// Channel layout, or the `"unknown"` sentinel.
    pub fn display_channel_layout(&self) -> String {
        self.channel_layout
            .clone()
            .unwrap_or_else(|| UNKNOWN.to_string())
    }
}

/// Subtitle stream fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubtitleStream {
    /// Language tag as reported by the backend (usually ISO 639-2).
    pub language: Option<String>,
    /// Whether this is a forced track.
    pub forced: bool,
    /// Whether this is the default track.
    pub default: bool,
}

impl SubtitleStream {
    /// Language tag, or the `"unknown"` sentinel.
    pub fn display_language(&self) -> String {
        self.language.clone().unwrap_or_else(|| UNKNOWN.to_string())
    }
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

/// A produced downloadable byte payload (subtitle text or raw stream
/// bytes) plus its suggested filename. Produced once per export call and
/// consumed once by the delivery layer.
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Suggested output filename.
    pub file_name: String,
    /// Payload bytes.
    pub data: Bytes,
}

impl Artifact {
    /// Create a new artifact.
    pub fn new(file_name: impl Into<String>, data: Bytes) -> Self {
        Self {
            file_name: file_name.into(),
            data,
        }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
