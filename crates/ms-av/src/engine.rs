//! The extraction engine: owns both backends, dispatches per file
//! extension, and guards the shared backend state with a single-session
//! permit.
//!
//! The backend's virtual filesystem and log stream have no isolation
//! between logical operations, so at most one [`ExtractionSession`] may
//! exist at a time. The permit is an owned mutex guard: it must be dropped
//! before the next session can be issued, which makes the invariant a
//! construction-time property rather than a convention.

use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::sync::{Mutex, OwnedMutexGuard};

use ms_core::config::{Config, EngineConfig, RangeConfig};
use ms_core::{
    classify_extension, Artifact, ContainerFamily, Error, Result, StreamKind, VideoMetadata,
};

use crate::backend::{Backend, BackendStatus, ExecOutput, ExecRequest};
use crate::ffmpeg::FfmpegBackend;
use crate::isobox::IsoBoxBackend;
use crate::range::{select_ranges, Operation, RangePlan};
use crate::source::MediaSource;
use crate::subtitle;

/// Caller-supplied hints for subtitle export naming.
#[derive(Debug, Clone, Default)]
pub struct ExportHints {
    /// Language tag for the output filename.
    pub language: Option<String>,
    /// Subtitle codec, used to pick the native output extension.
    pub codec: Option<String>,
    /// Whether the track is forced.
    pub forced: bool,
}

/// The one active use of a backend.
///
/// Holding a session means exclusive ownership of the backend's virtual
/// filesystem until the session is dropped.
pub struct ExtractionSession {
    backend: Arc<dyn Backend>,
    family: ContainerFamily,
    _permit: OwnedMutexGuard<()>,
}

impl ExtractionSession {
    /// Name of the backend this session locked.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }
}

/// Extraction engine over the two wrapped backends.
pub struct ExtractionEngine {
    text_backend: Arc<dyn Backend>,
    box_backend: Arc<dyn Backend>,
    session: Arc<Mutex<()>>,
    engine_cfg: EngineConfig,
    range_cfg: RangeConfig,
}

impl ExtractionEngine {
    /// Build the engine with the real backends.
    pub fn new(cfg: &Config) -> Result<Self> {
        Ok(Self::with_backends(
            Arc::new(FfmpegBackend::new(&cfg.backends)?),
            Arc::new(IsoBoxBackend::new()),
            cfg.engine.clone(),
            cfg.ranges.clone(),
        ))
    }

    /// Build the engine over caller-supplied backends.
    pub fn with_backends(
        text_backend: Arc<dyn Backend>,
        box_backend: Arc<dyn Backend>,
        engine_cfg: EngineConfig,
        range_cfg: RangeConfig,
    ) -> Self {
        Self {
            text_backend,
            box_backend,
            session: Arc::new(Mutex::new(())),
            engine_cfg,
            range_cfg,
        }
    }

    /// Initialize both backends. A failure here is fatal for the session.
    pub async fn load(&self) -> Result<()> {
        self.text_backend.load().await?;
        self.box_backend.load().await?;
        Ok(())
    }

    /// Availability report for both backends.
    pub async fn availability(&self) -> Vec<BackendStatus> {
        let mut statuses = Vec::new();
        for backend in [&self.text_backend, &self.box_backend] {
            let status = match backend.load().await {
                Ok(()) => BackendStatus {
                    name: backend.name(),
                    available: true,
                    version: backend.loaded_version(),
                    detail: None,
                },
                Err(e) => BackendStatus {
                    name: backend.name(),
                    available: false,
                    version: None,
                    detail: Some(e.to_string()),
                },
            };
            statuses.push(status);
        }
        statuses
    }

    /// The backend name a file would be dispatched to, or `None` for an
    /// unrecognized extension.
    pub fn method_name(&self, filename: &str) -> Option<&'static str> {
        match classify_extension(filename)? {
            ContainerFamily::IsoBmff => Some(self.box_backend.name()),
            ContainerFamily::Other => Some(self.text_backend.name()),
        }
    }

    /// Validate a source and open the exclusive session for it.
    ///
    /// Fails with a validation error before touching the backend when the
    /// file is empty or its extension is unrecognized, and with an
    /// internal error when a session is already active.
    pub fn begin_session(&self, source: &dyn MediaSource) -> Result<ExtractionSession> {
        if source.is_empty() {
            return Err(Error::validation(format!(
                "{} is empty",
                source.name()
            )));
        }
        let family = classify_extension(source.name()).ok_or_else(|| {
            Error::validation(format!("unsupported file extension: {}", source.name()))
        })?;

        let permit = self
            .session
            .clone()
            .try_lock_owned()
            .map_err(|_| Error::internal("an extraction session is already active"))?;

        let backend = match family {
            ContainerFamily::IsoBmff => self.box_backend.clone(),
            ContainerFamily::Other => self.text_backend.clone(),
        };

        Ok(ExtractionSession {
            backend,
            family,
            _permit: permit,
        })
    }

    // -- Operations ---------------------------------------------------------

    /// Probe a file for metadata.
    pub async fn probe(&self, source: &dyn MediaSource) -> Result<VideoMetadata> {
        let session = self.begin_session(source)?;
        self.cleanup(&session.backend).await;
        let result = self.probe_locked(source, &session).await;
        self.cleanup(&session.backend).await;
        result
    }

    async fn probe_locked(
        &self,
        source: &dyn MediaSource,
        session: &ExtractionSession,
    ) -> Result<VideoMetadata> {
        let backend = &session.backend;
        let plan = select_ranges(
            Operation::Probe,
            session.family,
            source.len(),
            &self.range_cfg,
        );
        let data = read_plan(source, &plan).await?;
        self.write_with_retry(backend, source.name(), data).await?;

        let forwarder = self.spawn_log_forwarder(backend);
        let output = self
            .execute_with_timeout(
                backend,
                &ExecRequest::Probe {
                    input: source.name().to_string(),
                },
            )
            .await;
        if let Some(handle) = forwarder {
            handle.abort();
        }

        match output? {
            ExecOutput::Diagnostic(text) => ms_parser::parse(source.name(), source.len(), &text),
            ExecOutput::Structured(info) => {
                Ok(ms_probe::map(source.name(), source.len(), &info))
            }
        }
    }

    /// Export one subtitle stream as a text artifact.
    ///
    /// The track's native format is attempted first; on failure the
    /// extraction is re-run exactly once, forcing conversion to SRT.
    pub async fn export_subtitle(
        &self,
        source: &dyn MediaSource,
        stream_index: u32,
        hints: &ExportHints,
    ) -> Result<Artifact> {
        let session = self.begin_session(source)?;
        self.cleanup(&session.backend).await;
        let result = self
            .export_subtitle_locked(source, stream_index, hints, &session)
            .await;
        self.cleanup(&session.backend).await;
        result
    }

    async fn export_subtitle_locked(
        &self,
        source: &dyn MediaSource,
        stream_index: u32,
        hints: &ExportHints,
        session: &ExtractionSession,
    ) -> Result<Artifact> {
        let backend = &session.backend;
        self.stage_export_input(source, session).await?;

        let native_name = subtitle::subtitle_file_name(
            source.name(),
            hints.language.as_deref(),
            hints.forced,
            hints.codec.as_deref(),
        );
        let native = ExecRequest::ExportSubtitle {
            input: source.name().to_string(),
            stream_index,
            output: native_name.clone(),
            convert_to_text: false,
        };

        let output_name = match self.execute_with_timeout(backend, &native).await {
            Ok(_) => native_name,
            Err(e @ Error::Timeout { .. }) => return Err(e),
            Err(e) => {
                tracing::warn!(
                    stream = stream_index,
                    error = %e,
                    "native subtitle export failed; converting to SRT"
                );
                let srt_name = subtitle::subtitle_file_name(
                    source.name(),
                    hints.language.as_deref(),
                    hints.forced,
                    Some("srt"),
                );
                let fallback = ExecRequest::ExportSubtitle {
                    input: source.name().to_string(),
                    stream_index,
                    output: srt_name.clone(),
                    convert_to_text: true,
                };
                self.execute_with_timeout(backend, &fallback)
                    .await
                    .map_err(|e2| Error::ExportFallbackExhausted {
                        stream: stream_index,
                        message: e2.to_string(),
                    })?;
                srt_name
            }
        };

        let data = backend.read_file(&output_name).await?;
        Ok(Artifact::new(output_name, data))
    }

    /// Export one video or audio stream as a byte artifact.
    ///
    /// Stream copy is attempted first because it is lossless and fast; on
    /// failure the engine re-encodes exactly once with fixed parameters.
    pub async fn export_stream(
        &self,
        source: &dyn MediaSource,
        stream_index: u32,
        kind: StreamKind,
        codec: Option<&str>,
    ) -> Result<Artifact> {
        if kind == StreamKind::Subtitle {
            return Err(Error::validation(
                "subtitle streams are exported with export_subtitle",
            ));
        }
        let session = self.begin_session(source)?;
        self.cleanup(&session.backend).await;
        let result = self
            .export_stream_locked(source, stream_index, kind, codec, &session)
            .await;
        self.cleanup(&session.backend).await;
        result
    }

    async fn export_stream_locked(
        &self,
        source: &dyn MediaSource,
        stream_index: u32,
        kind: StreamKind,
        codec: Option<&str>,
        session: &ExtractionSession,
    ) -> Result<Artifact> {
        let backend = &session.backend;
        self.stage_export_input(source, session).await?;

        let output = stream_file_name(source.name(), stream_index, kind, session.family, codec);
        let copy = ExecRequest::ExportStream {
            input: source.name().to_string(),
            stream_index,
            kind,
            output: output.clone(),
            reencode: false,
        };

        match self.execute_with_timeout(backend, &copy).await {
            Ok(_) => {}
            Err(e @ Error::Timeout { .. }) => return Err(e),
            Err(e) => {
                tracing::warn!(
                    stream = stream_index,
                    error = %e,
                    "stream copy failed; re-encoding once"
                );
                let reencode = ExecRequest::ExportStream {
                    input: source.name().to_string(),
                    stream_index,
                    kind,
                    output: output.clone(),
                    reencode: true,
                };
                self.execute_with_timeout(backend, &reencode)
                    .await
                    .map_err(|e2| Error::ExportFallbackExhausted {
                        stream: stream_index,
                        message: e2.to_string(),
                    })?;
            }
        }

        let data = backend.read_file(&output).await?;
        Ok(Artifact::new(output, data))
    }

    /// Read the export range and write it into the backend.
    async fn stage_export_input(
        &self,
        source: &dyn MediaSource,
        session: &ExtractionSession,
    ) -> Result<()> {
        let plan = select_ranges(
            Operation::Export,
            session.family,
            source.len(),
            &self.range_cfg,
        );
        if !plan.complete {
            tracing::warn!(
                file = source.name(),
                buffered = plan.total_len(),
                total = source.len(),
                "export input truncated to the largest bufferable prefix; \
                 the backend may be unable to complete the export"
            );
        }
        let data = read_plan(source, &plan).await?;
        self.write_with_retry(&session.backend, source.name(), data)
            .await
    }

    // -- Plumbing -----------------------------------------------------------

    /// Write with bounded retries and exponential backoff. A write that
    /// exceeds its hard deadline is fatal immediately; exhausted retries
    /// escalate to a write error.
    async fn write_with_retry(
        &self,
        backend: &Arc<dyn Backend>,
        name: &str,
        data: Bytes,
    ) -> Result<()> {
        let attempts = self.engine_cfg.write_attempts.max(1);
        let deadline = Duration::from_secs(self.engine_cfg.write_timeout_secs);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match tokio::time::timeout(deadline, backend.write(name, data.clone())).await {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(e)) => {
                    tracing::warn!(attempt, error = %e, "backend write failed");
                    last_error = e.to_string();
                }
                Err(_) => return Err(Error::timeout("write", deadline)),
            }
            if attempt < attempts {
                let backoff = self.engine_cfg.write_backoff_ms << (attempt - 1);
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }
        }

        Err(Error::Write {
            attempts,
            message: last_error,
        })
    }

    /// Execute with the hard operation deadline.
    async fn execute_with_timeout(
        &self,
        backend: &Arc<dyn Backend>,
        request: &ExecRequest,
    ) -> Result<ExecOutput> {
        let deadline = Duration::from_secs(self.engine_cfg.exec_timeout_secs);
        match tokio::time::timeout(deadline, backend.execute(request)).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(request.describe(), deadline)),
        }
    }

    /// Best-effort scratch cleanup with bounded retries. Failures are
    /// swallowed: leftover files only waste space, they do not corrupt
    /// subsequent runs.
    async fn cleanup(&self, backend: &Arc<dyn Backend>) {
        let attempts = self.engine_cfg.cleanup_attempts.max(1);
        for attempt in 1..=attempts {
            match backend.scratch_files().await {
                Ok(files) => {
                    let mut all_deleted = true;
                    for file in &files {
                        if let Err(e) = backend.delete_file(file).await {
                            tracing::debug!(file, error = %e, "scratch delete failed");
                            all_deleted = false;
                        }
                    }
                    if all_deleted {
                        return;
                    }
                }
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "scratch listing failed");
                }
            }
            tokio::time::sleep(Duration::from_millis(self.engine_cfg.cleanup_backoff_ms)).await;
        }
        tracing::warn!(backend = backend.name(), "scratch cleanup incomplete");
    }

    /// Forward live diagnostic lines to tracing while an execute runs.
    fn spawn_log_forwarder(
        &self,
        backend: &Arc<dyn Backend>,
    ) -> Option<tokio::task::JoinHandle<()>> {
        let mut rx = backend.subscribe_log()?;
        Some(tokio::spawn(async move {
            while let Ok(line) = rx.recv().await {
                tracing::trace!(target: "mediascope::diagnostic", "{line}");
            }
        }))
    }
}

/// Output name for a raw stream export. The codec hint picks a container
/// the stream can be copied into; without one the defaults are broad.
fn stream_file_name(
    source_name: &str,
    stream_index: u32,
    kind: StreamKind,
    family: ContainerFamily,
    codec: Option<&str>,
) -> String {
    let stem = source_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(source_name);
    let ext = match family {
        // The box backend emits raw concatenated samples with no muxing.
        ContainerFamily::IsoBmff => "bin",
        ContainerFamily::Other => stream_extension(kind, codec),
    };
    format!("{stem}.stream{stream_index}.{ext}")
}

fn stream_extension(kind: StreamKind, codec: Option<&str>) -> &'static str {
    let codec = codec.map(|c| c.to_lowercase());
    match kind {
        StreamKind::Video => match codec.as_deref() {
            Some("vp8") | Some("vp9") | Some("av1") => "webm",
            _ => "mp4",
        },
        StreamKind::Audio => match codec.as_deref() {
            Some("mp3") => "mp3",
            Some("flac") => "flac",
            Some("opus") => "opus",
            Some("vorbis") => "ogg",
            Some("ac3") => "ac3",
            Some("eac3") => "eac3",
            Some("dts") => "dts",
            _ => "m4a",
        },
        StreamKind::Subtitle => "srt",
    }
}

/// Read all ranges of a plan and concatenate them.
async fn read_plan(source: &dyn MediaSource, plan: &RangePlan) -> Result<Bytes> {
    if plan.ranges.len() == 1 {
        return source.read_range(plan.ranges[0]).await;
    }
    let mut buf = BytesMut::with_capacity(plan.total_len() as usize);
    for range in &plan.ranges {
        let chunk = source.read_range(*range).await?;
        buf.put_slice(&chunk);
    }
    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use async_trait::async_trait;
    use parking_lot::Mutex as PlMutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    const DIAG: &str = "\
Input #0, matroska,webm, from 'clip.mkv':
  Duration: 00:00:10.00, start: 0.000000, bitrate: 1000 kb/s
  Stream #0:0: Video: h264 (High), yuv420p, 1280x720, 30 fps, 30 tbr, 1k tbn
  Stream #0:1(eng): Audio: aac (LC), 48000 Hz, stereo, fltp
  Stream #0:2(eng): Subtitle: subrip (default)
";

    /// Scripted backend for engine tests.
    #[derive(Default)]
    struct MockBackend {
        files: PlMutex<HashMap<String, Bytes>>,
        executed: PlMutex<Vec<ExecRequest>>,
        write_failures_remaining: AtomicU32,
        fail_copy_exports: bool,
        fail_all_exports: bool,
        execute_delay: Option<Duration>,
    }

    impl MockBackend {
        fn executed(&self) -> Vec<ExecRequest> {
            self.executed.lock().clone()
        }
    }

    #[async_trait]
    impl Backend for MockBackend {
        fn name(&self) -> &'static str {
            "mock"
        }

        async fn load(&self) -> Result<()> {
            Ok(())
        }

        async fn write(&self, name: &str, data: Bytes) -> Result<()> {
            if self
                .write_failures_remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(Error::backend("mock", "simulated write failure"));
            }
            self.files.lock().insert(name.to_string(), data);
            Ok(())
        }

        async fn execute(&self, request: &ExecRequest) -> Result<ExecOutput> {
            if let Some(delay) = self.execute_delay {
                tokio::time::sleep(delay).await;
            }
            self.executed.lock().push(request.clone());

            let is_copy = match request {
                ExecRequest::Probe { .. } => {
                    return Ok(ExecOutput::Diagnostic(DIAG.to_string()));
                }
                ExecRequest::ExportSubtitle {
                    convert_to_text, ..
                } => !convert_to_text,
                ExecRequest::ExportStream { reencode, .. } => !reencode,
            };

            if self.fail_all_exports || (self.fail_copy_exports && is_copy) {
                return Err(Error::backend("mock", "simulated export failure"));
            }

            let output = request.output().expect("export has an output");
            self.files
                .lock()
                .insert(output.to_string(), Bytes::from_static(b"artifact"));
            Ok(ExecOutput::Diagnostic(String::new()))
        }

        async fn read_file(&self, name: &str) -> Result<Bytes> {
            self.files
                .lock()
                .get(name)
                .cloned()
                .ok_or_else(|| Error::backend("mock", format!("no such file: {name}")))
        }

        async fn delete_file(&self, name: &str) -> Result<()> {
            self.files.lock().remove(name);
            Ok(())
        }

        async fn scratch_files(&self) -> Result<Vec<String>> {
            Ok(self.files.lock().keys().cloned().collect())
        }
    }

    fn engine_with(mock: Arc<MockBackend>) -> ExtractionEngine {
        ExtractionEngine::with_backends(
            mock.clone(),
            mock,
            EngineConfig {
                write_backoff_ms: 1,
                cleanup_backoff_ms: 1,
                ..EngineConfig::default()
            },
            RangeConfig::default(),
        )
    }

    fn mkv_source() -> MemorySource {
        MemorySource::new("clip.mkv", Bytes::from(vec![0u8; 4096]))
    }

    #[tokio::test]
    async fn probe_parses_diagnostic_output() {
        let mock = Arc::new(MockBackend::default());
        let engine = engine_with(mock.clone());

        let meta = engine.probe(&mkv_source()).await.unwrap();
        assert_eq!(meta.streams.len(), 3);
        assert_eq!(meta.format.duration_secs, Some(10));
        assert_eq!(meta.format.filename, "clip.mkv");
        // Scratch is reset after the operation settles.
        assert!(mock.scratch_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_file_fails_validation() {
        let engine = engine_with(Arc::new(MockBackend::default()));
        let source = MemorySource::new("clip.mkv", Bytes::new());
        let err = engine.probe(&source).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn unsupported_extension_fails_validation() {
        let engine = engine_with(Arc::new(MockBackend::default()));
        let source = MemorySource::new("notes.txt", Bytes::from_static(b"x"));
        let err = engine.probe(&source).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("unsupported file extension"));
    }

    #[tokio::test]
    async fn sessions_are_mutually_exclusive() {
        let engine = engine_with(Arc::new(MockBackend::default()));
        let source = mkv_source();

        let held = engine.begin_session(&source).unwrap();
        assert_eq!(held.backend_name(), "mock");

        let err = engine.probe(&source).await.unwrap_err();
        assert!(err.to_string().contains("already active"));

        drop(held);
        assert!(engine.probe(&source).await.is_ok());
    }

    #[tokio::test]
    async fn write_retries_then_succeeds() {
        let mock = Arc::new(MockBackend::default());
        mock.write_failures_remaining.store(2, Ordering::SeqCst);
        let engine = engine_with(mock.clone());

        assert!(engine.probe(&mkv_source()).await.is_ok());
    }

    #[tokio::test]
    async fn write_retries_exhaust_to_write_error() {
        let mock = Arc::new(MockBackend::default());
        mock.write_failures_remaining.store(u32::MAX, Ordering::SeqCst);
        let engine = engine_with(mock);

        let err = engine.probe(&mkv_source()).await.unwrap_err();
        match err {
            Error::Write { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn execute_deadline_fires() {
        let mock = Arc::new(MockBackend {
            execute_delay: Some(Duration::from_secs(600)),
            ..MockBackend::default()
        });
        let engine = engine_with(mock);

        let err = engine.probe(&mkv_source()).await.unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[tokio::test]
    async fn copy_failure_triggers_exactly_one_reencode() {
        let mock = Arc::new(MockBackend {
            fail_copy_exports: true,
            ..MockBackend::default()
        });
        let engine = engine_with(mock.clone());

        let artifact = engine
            .export_stream(&mkv_source(), 1, StreamKind::Audio, Some("aac"))
            .await
            .unwrap();
        assert_eq!(artifact.file_name, "clip.stream1.m4a");
        assert_eq!(&artifact.data[..], b"artifact");

        let attempts: Vec<bool> = mock
            .executed()
            .iter()
            .filter_map(|r| match r {
                ExecRequest::ExportStream { reencode, .. } => Some(*reencode),
                _ => None,
            })
            .collect();
        assert_eq!(attempts, vec![false, true]);
    }

    #[tokio::test]
    async fn both_export_paths_failing_exhausts_fallback() {
        let mock = Arc::new(MockBackend {
            fail_all_exports: true,
            ..MockBackend::default()
        });
        let engine = engine_with(mock.clone());

        let err = engine
            .export_stream(&mkv_source(), 0, StreamKind::Video, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ExportFallbackExhausted { stream: 0, .. }));

        // Exactly one copy attempt and one re-encode attempt, never more.
        let export_count = mock
            .executed()
            .iter()
            .filter(|r| matches!(r, ExecRequest::ExportStream { .. }))
            .count();
        assert_eq!(export_count, 2);
    }

    #[tokio::test]
    async fn subtitle_export_native_then_converted() {
        let mock = Arc::new(MockBackend {
            fail_copy_exports: true,
            ..MockBackend::default()
        });
        let engine = engine_with(mock.clone());

        let hints = ExportHints {
            language: Some("eng".into()),
            codec: Some("ass".into()),
            forced: false,
        };
        let artifact = engine
            .export_subtitle(&mkv_source(), 2, &hints)
            .await
            .unwrap();
        // Native .ass attempt failed, so the artifact is the SRT fallback.
        assert_eq!(artifact.file_name, "clip.en.srt");

        let requested: Vec<(String, bool)> = mock
            .executed()
            .iter()
            .filter_map(|r| match r {
                ExecRequest::ExportSubtitle {
                    output,
                    convert_to_text,
                    ..
                } => Some((output.clone(), *convert_to_text)),
                _ => None,
            })
            .collect();
        assert_eq!(
            requested,
            vec![("clip.en.ass".to_string(), false), ("clip.en.srt".to_string(), true)]
        );
    }

    #[tokio::test]
    async fn subtitle_export_native_success_keeps_native_name() {
        let mock = Arc::new(MockBackend::default());
        let engine = engine_with(mock);

        let hints = ExportHints {
            language: Some("ger".into()),
            codec: Some("subrip".into()),
            forced: true,
        };
        let artifact = engine
            .export_subtitle(&mkv_source(), 2, &hints)
            .await
            .unwrap();
        assert_eq!(artifact.file_name, "clip.de.forced.srt");
    }

    #[tokio::test]
    async fn subtitle_kind_rejected_by_export_stream() {
        let engine = engine_with(Arc::new(MockBackend::default()));
        let err = engine
            .export_stream(&mkv_source(), 2, StreamKind::Subtitle, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn stream_file_names() {
        assert_eq!(
            stream_file_name("clip.mkv", 0, StreamKind::Video, ContainerFamily::Other, None),
            "clip.stream0.mp4"
        );
        assert_eq!(
            stream_file_name("clip.mkv", 1, StreamKind::Audio, ContainerFamily::Other, None),
            "clip.stream1.m4a"
        );
        assert_eq!(
            stream_file_name("clip.mp4", 1, StreamKind::Audio, ContainerFamily::IsoBmff, None),
            "clip.stream1.bin"
        );
        assert_eq!(
            stream_file_name("clip.mkv", 2, StreamKind::Audio, ContainerFamily::Other, Some("flac")),
            "clip.stream2.flac"
        );
        assert_eq!(
            stream_file_name("clip.mkv", 0, StreamKind::Video, ContainerFamily::Other, Some("vp9")),
            "clip.stream0.webm"
        );
    }

    #[test]
    fn method_names_follow_extension() {
        let engine = engine_with(Arc::new(MockBackend::default()));
        // Both slots hold the mock, so the names match the mock's.
        assert_eq!(engine.method_name("a.mp4"), Some("mock"));
        assert_eq!(engine.method_name("a.mkv"), Some("mock"));
        assert_eq!(engine.method_name("a.xyz"), None);
    }
}
