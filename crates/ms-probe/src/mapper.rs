//! Pure structural transform from [`ContainerInfo`] to
//! [`ms_core::VideoMetadata`].

use ms_core::{
    AudioStream, FormatSummary, StreamDescriptor, StreamDetails, SubtitleStream, VideoMetadata,
    VideoStream, DEFAULT_FRAME_RATE,
};

use crate::info::{ContainerInfo, TrackKind};

/// Map a box parser's info graph into the shared metadata record.
///
/// No error branches: a parse failure happens in the backend before this
/// point, and anything the box structure does not declare is carried
/// through as `None`. Tracks map in declaration order; the stream index is
/// the enumeration position.
pub fn map(filename: &str, file_size: u64, info: &ContainerInfo) -> VideoMetadata {
    let streams: Vec<StreamDescriptor> = info
        .tracks
        .iter()
        .enumerate()
        .map(|(position, track)| {
            let details = match track.kind {
                TrackKind::Video => StreamDetails::Video(VideoStream {
                    width: track.width,
                    height: track.height,
                    frame_rate: track.sample_rate_hz(),
                    pixel_format: None,
                    bit_rate: track.bit_rate,
                    frame_count: Some(track.nb_samples),
                }),
                TrackKind::Audio => StreamDetails::Audio(AudioStream {
                    sample_rate: track.sample_rate,
                    channels: track.channel_count,
                    channel_layout: track.channel_count.map(layout_label),
                    bit_rate: track.bit_rate,
                }),
                TrackKind::Text => StreamDetails::Subtitle(SubtitleStream {
                    language: track.language.clone(),
                    forced: track.forced,
                    default: track.default,
                }),
            };

            StreamDescriptor {
                index: position as u32,
                codec: track.codec.clone(),
                profile: None,
                details,
            }
        })
        .collect();

    // Movie duration from the container timescale.
    let (duration_secs, duration_ms) = if info.timescale > 0 {
        (
            Some(info.duration / info.timescale as u64),
            Some(info.duration * 1000 / info.timescale as u64),
        )
    } else {
        (None, None)
    };

    // The first video track drives the summary frame fields; its sample
    // count is the exact frame count.
    let video = info.tracks.iter().find(|t| t.kind == TrackKind::Video);
    let frame_rate = video.and_then(|t| t.sample_rate_hz());
    let frame_count = video.map(|t| t.nb_samples);

    let container = match &info.brand {
        Some(brand) => format!("mp4 ({brand})"),
        None => "mp4".to_string(),
    };

    VideoMetadata {
        format: FormatSummary {
            filename: filename.to_string(),
            container,
            duration_secs,
            size_bytes: file_size,
            bit_rate: None,
            frame_rate: Some(frame_rate.unwrap_or(DEFAULT_FRAME_RATE)),
            duration_ms,
            frame_count,
        },
        streams,
    }
}

/// Conventional layout label for a channel count.
fn layout_label(channels: u32) -> String {
    match channels {
        1 => "mono".to_string(),
        2 => "stereo".to_string(),
        6 => "5.1".to_string(),
        8 => "7.1".to_string(),
        n => format!("{n} channels"),
    }
}
