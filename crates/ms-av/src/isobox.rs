//! The box-structure backend: ISO base media parsing via the `mp4` crate
//! over an in-memory virtual filesystem.
//!
//! Probing reads the box tree directly (no diagnostic text); subtitle
//! export decodes `tx3g` samples into SRT; stream export concatenates the
//! track's raw samples.

use std::collections::HashMap;
use std::io::Cursor;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;

use ms_core::{Error, Result};
use ms_probe::{ContainerInfo, TrackInfo, TrackKind};

use crate::backend::{Backend, ExecOutput, ExecRequest};

const BACKEND: &str = "isobox";

/// The box-parser backend.
#[derive(Default)]
pub struct IsoBoxBackend {
    vfs: Mutex<HashMap<String, Bytes>>,
}

impl IsoBoxBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    fn fetch(&self, name: &str) -> Result<Bytes> {
        self.vfs
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::backend(BACKEND, format!("no such file: {name}")))
    }
}

#[async_trait]
impl Backend for IsoBoxBackend {
    fn name(&self) -> &'static str {
        BACKEND
    }

    async fn load(&self) -> Result<()> {
        // In-process parser; nothing to initialize.
        Ok(())
    }

    fn loaded_version(&self) -> Option<String> {
        Some("mp4 box parser (in-process)".to_string())
    }

    async fn write(&self, name: &str, data: Bytes) -> Result<()> {
        if name.is_empty() {
            return Err(Error::validation("empty scratch name"));
        }
        self.vfs.lock().insert(name.to_string(), data);
        Ok(())
    }

    async fn execute(&self, request: &ExecRequest) -> Result<ExecOutput> {
        match request {
            ExecRequest::Probe { input } => {
                let data = self.fetch(input)?;
                let info = probe_boxes(&data)?;
                Ok(ExecOutput::Structured(info))
            }
            ExecRequest::ExportSubtitle {
                input,
                stream_index,
                output,
                ..
            } => {
                let data = self.fetch(input)?;
                let text = extract_subtitle_text(&data, *stream_index)?;
                self.vfs
                    .lock()
                    .insert(output.clone(), Bytes::from(text.into_bytes()));
                let info = probe_boxes(&data)?;
                Ok(ExecOutput::Structured(info))
            }
            ExecRequest::ExportStream {
                input,
                stream_index,
                output,
                ..
            } => {
                let data = self.fetch(input)?;
                let payload = extract_raw_samples(&data, *stream_index)?;
                self.vfs.lock().insert(output.clone(), payload);
                let info = probe_boxes(&data)?;
                Ok(ExecOutput::Structured(info))
            }
        }
    }

    async fn read_file(&self, name: &str) -> Result<Bytes> {
        self.fetch(name)
    }

    async fn delete_file(&self, name: &str) -> Result<()> {
        self.vfs.lock().remove(name);
        Ok(())
    }

    async fn scratch_files(&self) -> Result<Vec<String>> {
        Ok(self.vfs.lock().keys().cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// Box parsing
// ---------------------------------------------------------------------------

fn open_reader(data: &[u8]) -> Result<mp4::Mp4Reader<Cursor<&[u8]>>> {
    mp4::Mp4Reader::read_header(Cursor::new(data), data.len() as u64)
        .map_err(|e| Error::backend(BACKEND, format!("box parse failed: {e}")))
}

/// Read the container's track/info graph.
fn probe_boxes(data: &[u8]) -> Result<ContainerInfo> {
    let reader = open_reader(data)?;

    let timescale = reader.timescale();
    let duration_ticks = (reader.duration().as_secs_f64() * timescale as f64).round() as u64;
    let brand = Some(reader.major_brand().to_string());

    let mut tracks = Vec::new();
    let mut seen_kind: Vec<TrackKind> = Vec::new();

    for track_id in sorted_track_ids(&reader) {
        let track = &reader.tracks()[&track_id];
        let Some(kind) = track_kind(track) else {
            continue;
        };

        let codec = track
            .media_type()
            .map(media_type_label)
            .unwrap_or_else(|_| "unknown".to_string());

        let track_timescale = track.timescale();
        let track_duration =
            (track.duration().as_secs_f64() * track_timescale as f64).round() as u64;

        let language = match track.language() {
            "" | "und" => None,
            lang => Some(lang.to_string()),
        };

        let is_first_of_kind = !seen_kind.contains(&kind);
        seen_kind.push(kind);

        tracks.push(TrackInfo {
            id: track_id,
            kind,
            codec,
            timescale: track_timescale,
            duration: track_duration,
            nb_samples: track.sample_count() as u64,
            width: match track.width() {
                0 => None,
                w => Some(w as u32),
            },
            height: match track.height() {
                0 => None,
                h => Some(h as u32),
            },
            sample_rate: track.sample_freq_index().ok().map(|i| i.freq()),
            channel_count: track.channel_config().ok().map(channel_count),
            bit_rate: match track.bitrate() {
                0 => None,
                b => Some(b as u64),
            },
            language,
            default: is_first_of_kind,
            // Forced flags are not declared in the box structure.
            forced: false,
        });
    }

    Ok(ContainerInfo {
        brand,
        timescale,
        duration: duration_ticks,
        tracks,
    })
}

fn sorted_track_ids<R: std::io::Read + std::io::Seek>(reader: &mp4::Mp4Reader<R>) -> Vec<u32> {
    let mut ids: Vec<u32> = reader.tracks().keys().copied().collect();
    ids.sort_unstable();
    ids
}

fn track_kind(track: &mp4::Mp4Track) -> Option<TrackKind> {
    match track.track_type().ok()? {
        mp4::TrackType::Video => Some(TrackKind::Video),
        mp4::TrackType::Audio => Some(TrackKind::Audio),
        mp4::TrackType::Subtitle => Some(TrackKind::Text),
    }
}

fn media_type_label(media_type: mp4::MediaType) -> String {
    match media_type {
        mp4::MediaType::H264 => "h264".to_string(),
        mp4::MediaType::H265 => "h265".to_string(),
        mp4::MediaType::VP9 => "vp9".to_string(),
        mp4::MediaType::AAC => "aac".to_string(),
        mp4::MediaType::TTXT => "tx3g".to_string(),
        other => format!("{other:?}").to_lowercase(),
    }
}

fn channel_count(config: mp4::ChannelConfig) -> u32 {
    match config {
        mp4::ChannelConfig::Mono => 1,
        mp4::ChannelConfig::Stereo => 2,
        mp4::ChannelConfig::Three => 3,
        mp4::ChannelConfig::Four => 4,
        mp4::ChannelConfig::Five => 5,
        mp4::ChannelConfig::FiveOne => 6,
        mp4::ChannelConfig::SevenOne => 8,
    }
}

/// Resolve an enumeration-order stream index to a track id.
fn track_id_at<R: std::io::Read + std::io::Seek>(
    reader: &mp4::Mp4Reader<R>,
    stream_index: u32,
) -> Result<u32> {
    sorted_track_ids(reader)
        .get(stream_index as usize)
        .copied()
        .ok_or_else(|| Error::backend(BACKEND, format!("no track at index {stream_index}")))
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

/// Concatenate a track's raw sample bytes.
fn extract_raw_samples(data: &[u8], stream_index: u32) -> Result<Bytes> {
    let mut reader = open_reader(data)?;
    let track_id = track_id_at(&reader, stream_index)?;
    let sample_count = reader.tracks()[&track_id].sample_count();

    let mut out = BytesMut::new();
    for sample_id in 1..=sample_count {
        let sample = reader
            .read_sample(track_id, sample_id)
            .map_err(|e| Error::backend(BACKEND, format!("sample read failed: {e}")))?;
        if let Some(sample) = sample {
            out.put_slice(&sample.bytes);
        }
    }

    if out.is_empty() {
        return Err(Error::backend(
            BACKEND,
            format!("track at index {stream_index} has no sample data"),
        ));
    }
    Ok(out.freeze())
}

/// Decode a `tx3g` text track into SRT.
///
/// Each sample is a 2-byte big-endian length followed by UTF-8 text;
/// empty samples mark gaps between cues.
fn extract_subtitle_text(data: &[u8], stream_index: u32) -> Result<String> {
    let mut reader = open_reader(data)?;
    let track_id = track_id_at(&reader, stream_index)?;

    let track = &reader.tracks()[&track_id];
    if !matches!(track.track_type(), Ok(mp4::TrackType::Subtitle)) {
        return Err(Error::backend(
            BACKEND,
            format!("track at index {stream_index} is not a text track"),
        ));
    }
    let timescale = track.timescale().max(1) as u64;
    let sample_count = track.sample_count();

    let mut srt = String::new();
    let mut cue = 1u32;
    for sample_id in 1..=sample_count {
        let sample = reader
            .read_sample(track_id, sample_id)
            .map_err(|e| Error::backend(BACKEND, format!("sample read failed: {e}")))?;
        let Some(sample) = sample else { continue };

        let Some(text) = decode_tx3g(&sample.bytes) else {
            continue;
        };
        if text.is_empty() {
            continue;
        }

        let start_ms = sample.start_time * 1000 / timescale;
        let end_ms = start_ms + sample.duration as u64 * 1000 / timescale;
        srt.push_str(&format!(
            "{cue}\n{} --> {}\n{text}\n\n",
            srt_timestamp(start_ms),
            srt_timestamp(end_ms)
        ));
        cue += 1;
    }

    if srt.is_empty() {
        return Err(Error::backend(
            BACKEND,
            format!("text track at index {stream_index} produced no cues"),
        ));
    }
    Ok(srt)
}

fn decode_tx3g(payload: &[u8]) -> Option<String> {
    if payload.len() < 2 {
        return None;
    }
    let len = u16::from_be_bytes([payload[0], payload[1]]) as usize;
    let end = (2 + len).min(payload.len());
    String::from_utf8(payload[2..end].to_vec()).ok()
}

fn srt_timestamp(ms: u64) -> String {
    let h = ms / 3_600_000;
    let m = (ms % 3_600_000) / 60_000;
    let s = (ms % 60_000) / 1000;
    let millis = ms % 1000;
    format!("{h:02}:{m:02}:{s:02},{millis:03}")
}
