//! The backend capability contract.
//!
//! Both wrapped engines (the diagnostic-text transcoder and the
//! box-structure parser) are polymorphic over the same operations:
//! load, write into a private virtual filesystem, execute, read back a
//! produced file, delete. Callers never know which backend is active.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;

use ms_core::{Result, StreamKind};
use ms_probe::ContainerInfo;

/// A request the engine hands to a backend's `execute`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecRequest {
    /// Probe the named input for metadata.
    Probe {
        /// Input name inside the backend's virtual filesystem.
        input: String,
    },
    /// Extract one subtitle stream to a named output.
    ExportSubtitle {
        input: String,
        /// Stream index in enumeration order.
        stream_index: u32,
        /// Output name inside the backend's virtual filesystem.
        output: String,
        /// Force conversion to a plain-text subtitle format instead of
        /// keeping the track's native format.
        convert_to_text: bool,
    },
    /// Extract one video or audio stream to a named output.
    ExportStream {
        input: String,
        stream_index: u32,
        kind: StreamKind,
        output: String,
        /// Re-encode with the fixed fallback parameters instead of stream
        /// copy.
        reencode: bool,
    },
}

impl ExecRequest {
    /// The output name this request produces, if any.
    pub fn output(&self) -> Option<&str> {
        match self {
            ExecRequest::Probe { .. } => None,
            ExecRequest::ExportSubtitle { output, .. } => Some(output),
            ExecRequest::ExportStream { output, .. } => Some(output),
        }
    }

    /// Short operation label for logs and timeout errors.
    pub fn describe(&self) -> &'static str {
        match self {
            ExecRequest::Probe { .. } => "probe",
            ExecRequest::ExportSubtitle { .. } => "subtitle export",
            ExecRequest::ExportStream { .. } => "stream export",
        }
    }
}

/// What a backend's `execute` produced.
#[derive(Debug, Clone)]
pub enum ExecOutput {
    /// Free-text diagnostic output (text backend).
    Diagnostic(String),
    /// Structured container info (box backend).
    Structured(ContainerInfo),
}

/// Availability information for one backend.
#[derive(Debug, Clone)]
pub struct BackendStatus {
    /// Backend name.
    pub name: &'static str,
    /// Whether `load` succeeded.
    pub available: bool,
    /// Version string, when the backend can report one.
    pub version: Option<String>,
    /// Failure detail when unavailable.
    pub detail: Option<String>,
}

/// One wrapped media-analysis engine.
///
/// The backend's virtual filesystem and log stream are shared, unordered,
/// mutable state with no isolation between logical operations, which is
/// why the engine allows only one [`crate::ExtractionSession`] at a time.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Stable backend name ("ffmpeg", "isobox").
    fn name(&self) -> &'static str;

    /// Initialize the backend. Must be called before any other operation;
    /// failures are fatal for the whole session.
    async fn load(&self) -> Result<()>;

    /// Version reported during `load`, when available.
    fn loaded_version(&self) -> Option<String> {
        None
    }

    /// Write a file into the backend's virtual filesystem.
    async fn write(&self, name: &str, data: Bytes) -> Result<()>;

    /// Execute one operation against previously written files.
    async fn execute(&self, request: &ExecRequest) -> Result<ExecOutput>;

    /// Read a produced file back out of the virtual filesystem.
    async fn read_file(&self, name: &str) -> Result<Bytes>;

    /// Delete one file from the virtual filesystem.
    async fn delete_file(&self, name: &str) -> Result<()>;

    /// Enumerate the files currently in the virtual filesystem, for
    /// scratch cleanup between operations.
    async fn scratch_files(&self) -> Result<Vec<String>>;

    /// Subscribe to live diagnostic log lines, when the backend emits
    /// them during `execute`. The text backend returns a receiver; the
    /// box backend produces structured output and returns `None`.
    fn subscribe_log(&self) -> Option<broadcast::Receiver<String>> {
        None
    }
}
