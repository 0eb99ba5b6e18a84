//! # ms-parser
//!
//! Turns a backend's free-text diagnostic output into a typed
//! [`VideoMetadata`] record via an ordered set of pattern extractors, each
//! independent and tolerant of absence.
//!
//! Free-text log mining is inherently brittle, so it is isolated behind
//! this crate: a structured-output probe mode could replace it without
//! touching any caller.

use std::sync::LazyLock;

use regex::Regex;

use ms_core::{
    AudioStream, Error, FormatSummary, ParseErrorKind, Result, StreamDescriptor, StreamDetails,
    SubtitleStream, VideoMetadata, VideoStream, DEFAULT_FRAME_RATE, UNKNOWN,
};

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

static INPUT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Input #\d+, (.+?), from ").expect("invalid input regex")
});

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Duration:\s*(\d{2,}):(\d{2}):(\d{2})\.(\d{2})").expect("invalid duration regex")
});

static OVERALL_BITRATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"bitrate:\s*(\d+)\s*kb/s").expect("invalid bitrate regex"));

/// Stream header line: index, optional language qualifier, codec type and
/// the remainder of the line.
static STREAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Stream #\d+:(\d+)(?:\[[^\]]*\])?(?:\(([^)]+)\))?: (Video|Audio|Subtitle): (.+)")
        .expect("invalid stream regex")
});

static RESOLUTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{2,5})x(\d{2,5})").expect("invalid resolution regex"));

static FPS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([\d.]+)\s*fps").expect("invalid fps regex"));

static STREAM_KBPS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*kb/s").expect("invalid stream bitrate regex"));

static SAMPLE_RATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*Hz").expect("invalid sample rate regex"));

static PIXEL_FORMAT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(yuvj?[a-z0-9_]+|rgba?[0-9a-z_]*|bgra?[0-9a-z_]*|gray[0-9a-z_]*|nv12|nv21|pal8|p010[0-9a-z_]*)\b")
        .expect("invalid pixel format regex")
});

static CHANNELS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*channels").expect("invalid channels regex"));

/// Per-stream metadata tag carrying the audio bit rate in bits/s. The
/// audio stream header line does not reliably carry a rate, so it is
/// recovered from the metadata block below the stream line instead.
static BPS_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*BPS(?:-[a-z]{3})?\s*:\s*(\d+)").expect("invalid BPS regex"));

// ---------------------------------------------------------------------------
// Failure classification
// ---------------------------------------------------------------------------

/// Classify a diagnostic text with no usable stream markers.
///
/// Specific substrings map to specific [`ParseErrorKind`]s so the caller
/// can present an actionable message instead of a generic failure.
fn classify_failure(text: &str) -> ParseErrorKind {
    if text.contains("Invalid data found when processing input")
        || text.contains("moov atom not found")
    {
        ParseErrorKind::CorruptedInput
    } else if text.contains("decoder not found") || text.contains("Decoder not found") {
        ParseErrorKind::MissingDecoder
    } else {
        ParseErrorKind::NoStreams
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse backend diagnostic output into a [`VideoMetadata`] record.
///
/// The text is scanned with an ordered set of independent extractors;
/// anything a pattern cannot find stays `None` (rendered as the
/// `"unknown"` sentinel by the display layer). Fails with a classified
/// [`Error::Parse`] only when the text contains no stream markers at all.
///
/// Only the first video and first audio stream are promoted into the
/// summary fields; all subtitle streams are kept. Multi-video and
/// multi-audio files under-report in the summary, but every enumerated
/// stream stays in the stream list for per-index export.
pub fn parse(filename: &str, file_size: u64, text: &str) -> Result<VideoMetadata> {
    if !text.contains("Stream #") {
        let kind = classify_failure(text);
        tracing::debug!(file = filename, ?kind, "diagnostic text not parseable");
        return Err(Error::parse(kind));
    }

    let streams = parse_streams(text);

    let container = INPUT_RE
        .captures(text)
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| UNKNOWN.to_string());

    // Duration HH:MM:SS.cc -> whole seconds plus movie time in ms.
    let (duration_secs, duration_ms) = match DURATION_RE.captures(text) {
        Some(c) => {
            let h: u64 = c[1].parse().unwrap_or(0);
            let m: u64 = c[2].parse().unwrap_or(0);
            let s: u64 = c[3].parse().unwrap_or(0);
            let cs: u64 = c[4].parse().unwrap_or(0);
            let secs = h * 3600 + m * 60 + s;
            (Some(secs), Some(secs * 1000 + cs * 10))
        }
        None => (None, None),
    };

    let bit_rate = OVERALL_BITRATE_RE
        .captures(text)
        .and_then(|c| c[1].parse::<u64>().ok())
        .map(|kbps| kbps * 1000);

    // The first video stream feeds the summary frame rate; an audio-only
    // file falls back to DEFAULT_FRAME_RATE rather than aborting.
    let video_fps = streams.iter().find_map(|s| match &s.details {
        StreamDetails::Video(v) => v.frame_rate,
        _ => None,
    });
    let frame_rate = video_fps.unwrap_or(DEFAULT_FRAME_RATE);

    let frame_count = duration_ms.map(|ms| (ms as f64 / 1000.0 * frame_rate).round() as u64);

    // Backfill the computed frame count onto the first video stream, which
    // reports no count of its own in diagnostic output.
    let mut streams = streams;
    if let Some(first_video) = streams.iter_mut().find_map(|s| match &mut s.details {
        StreamDetails::Video(v) => Some(v),
        _ => None,
    }) {
        first_video.frame_count = frame_count;
    }

    Ok(VideoMetadata {
        format: FormatSummary {
            filename: filename.to_string(),
            container,
            duration_secs,
            size_bytes: file_size,
            bit_rate,
            frame_rate: Some(frame_rate),
            duration_ms,
            frame_count,
        },
        streams,
    })
}

/// Extract every stream descriptor, in enumeration order.
fn parse_streams(text: &str) -> Vec<StreamDescriptor> {
    let lines: Vec<&str> = text.lines().collect();
    let mut streams = Vec::new();
    let mut saw_audio = false;

    for (line_no, line) in lines.iter().enumerate() {
        let Some(caps) = STREAM_RE.captures(line) else {
            continue;
        };

        let index: u32 = caps[1].parse().unwrap_or(streams.len() as u32);
        let language = caps.get(2).map(|m| m.as_str().to_string());
        let kind = &caps[3];
        let rest = &caps[4];

        let (codec, profile) = parse_codec(rest);

        let details = match kind {
            "Video" => StreamDetails::Video(parse_video(rest)),
            "Audio" => {
                let mut audio = parse_audio(rest);
                // First audio stream: recover the bit rate from the
                // per-stream metadata block below the header line.
                if !saw_audio {
                    audio.bit_rate = audio
                        .bit_rate
                        .or_else(|| find_bps_tag(&lines[line_no + 1..]));
                    saw_audio = true;
                }
                StreamDetails::Audio(audio)
            }
            "Subtitle" => StreamDetails::Subtitle(SubtitleStream {
                language,
                forced: line.contains("(forced)"),
                default: line.contains("(default)"),
            }),
            _ => continue,
        };

        streams.push(StreamDescriptor {
            index,
            codec,
            profile,
            details,
        });
    }

    streams
}

/// Codec name and optional profile from the remainder of a stream line.
///
/// The profile is the first parenthesized group after the codec name that
/// is not a sample-entry tag like `(avc1 / 0x31637661)`.
fn parse_codec(rest: &str) -> (String, Option<String>) {
    let first_field = rest.split(',').next().unwrap_or(rest);
    let mut tokens = first_field.split_whitespace();
    let codec = tokens
        .next()
        .map(|t| t.to_string())
        .unwrap_or_else(|| UNKNOWN.to_string());

    let profile = first_field
        .match_indices('(')
        .filter_map(|(start, _)| {
            let inner = &first_field[start + 1..];
            let end = inner.find(')')?;
            Some(&inner[..end])
        })
        .find(|group| !group.contains('/') && *group != "default" && *group != "forced")
        .map(|g| g.to_string());

    (codec, profile)
}

fn parse_video(rest: &str) -> VideoStream {
    let (width, height) = RESOLUTION_RE
        .captures(rest)
        .map(|c| {
            (
                c[1].parse::<u32>().ok(),
                c[2].parse::<u32>().ok(),
            )
        })
        .unwrap_or((None, None));

    let frame_rate = FPS_RE.captures(rest).and_then(|c| c[1].parse::<f64>().ok());

    let pixel_format = PIXEL_FORMAT_RE
        .captures(rest)
        .map(|c| c[1].to_string());

    let bit_rate = STREAM_KBPS_RE
        .captures(rest)
        .and_then(|c| c[1].parse::<u64>().ok())
        .map(|kbps| kbps * 1000);

    VideoStream {
        width,
        height,
        frame_rate,
        pixel_format,
        bit_rate,
        frame_count: None,
    }
}

fn parse_audio(rest: &str) -> AudioStream {
    let sample_rate = SAMPLE_RATE_RE
        .captures(rest)
        .and_then(|c| c[1].parse::<u32>().ok());

    let (channels, channel_layout) = parse_channel_layout(rest);

    AudioStream {
        sample_rate,
        channels,
        channel_layout,
        // The header line does not reliably carry the audio bit rate; the
        // caller recovers it from the per-stream metadata block.
        bit_rate: None,
    }
}

/// Channel count and layout label from an audio stream line.
fn parse_channel_layout(rest: &str) -> (Option<u32>, Option<String>) {
    for field in rest.split(',').map(str::trim) {
        let layout = field.split('(').next().unwrap_or(field).trim();
        let count = match layout {
            "mono" => Some(1),
            "stereo" | "downmix" => Some(2),
            "2.1" => Some(3),
            "3.0" | "3.0(back)" => Some(3),
            "quad" | "4.0" => Some(4),
            "5.0" => Some(5),
            "5.1" => Some(6),
            "6.1" => Some(7),
            "7.1" => Some(8),
            _ => CHANNELS_RE
                .captures(field)
                .and_then(|c| c[1].parse::<u32>().ok()),
        };
        if count.is_some() {
            return (count, Some(layout.to_string()));
        }
    }
    (None, None)
}

/// Scan the metadata block following a stream line for a `BPS` tag.
/// Stops at the next stream header.
fn find_bps_tag(following: &[&str]) -> Option<u64> {
    for line in following {
        if line.contains("Stream #") {
            return None;
        }
        if let Some(caps) = BPS_TAG_RE.captures(line) {
            return caps[1].parse().ok();
        }
    }
    None
}
