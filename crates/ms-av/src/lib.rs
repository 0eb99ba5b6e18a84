//! # ms-av
//!
//! The extraction layer: media sources, byte-range selection, the backend
//! capability contract, the two backend implementations (diagnostic-text
//! over an external `ffmpeg` binary, box-structure over the `mp4` crate),
//! and the [`ExtractionEngine`] that owns them behind a single-session
//! permit.

pub mod backend;
pub mod engine;
pub mod ffmpeg;
pub mod isobox;
pub mod range;
pub mod source;
pub mod subtitle;

pub use backend::{Backend, BackendStatus, ExecOutput, ExecRequest};
pub use engine::{ExportHints, ExtractionEngine, ExtractionSession};
pub use ffmpeg::FfmpegBackend;
pub use isobox::IsoBoxBackend;
pub use range::{select_ranges, ByteRange, Operation, RangePlan};
pub use source::{FileSource, MediaSource, MemorySource};
