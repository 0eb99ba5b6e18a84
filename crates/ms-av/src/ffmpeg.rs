//! The diagnostic-text backend: an external `ffmpeg` binary working
//! against a private scratch directory.
//!
//! `execute` streams the tool's stderr (the diagnostic log) line by line
//! into a broadcast channel while also accumulating it as the operation's
//! result, so observers can tap the log live.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::broadcast;

use ms_core::config::BackendsConfig;
use ms_core::{Error, Result, StreamKind};

use crate::backend::{Backend, ExecOutput, ExecRequest};

/// Constant-quality factor for the H.264 re-encode fallback.
const FALLBACK_VIDEO_CRF: &str = "23";
/// Encoder preset for the re-encode fallback.
const FALLBACK_VIDEO_PRESET: &str = "medium";
/// Fixed bit rate for the AAC re-encode fallback.
const FALLBACK_AUDIO_BITRATE: &str = "192k";

/// Capacity of the diagnostic log broadcast channel.
const LOG_CHANNEL_CAPACITY: usize = 1024;

/// Scratch directory: either a caller-provided path or an owned temp dir
/// that is removed on drop.
struct ScratchDir {
    path: PathBuf,
    _temp: Option<tempfile::TempDir>,
}

impl ScratchDir {
    fn new(configured: Option<&PathBuf>) -> Result<Self> {
        match configured {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                Ok(Self {
                    path: dir.clone(),
                    _temp: None,
                })
            }
            None => {
                let temp = tempfile::TempDir::new()?;
                Ok(Self {
                    path: temp.path().to_path_buf(),
                    _temp: Some(temp),
                })
            }
        }
    }
}

/// The external-transcoder backend.
pub struct FfmpegBackend {
    configured_path: Option<PathBuf>,
    resolved: RwLock<Option<PathBuf>>,
    version: RwLock<Option<String>>,
    scratch: ScratchDir,
    log_tx: broadcast::Sender<String>,
}

impl FfmpegBackend {
    /// Create the backend. The tool itself is located in [`Backend::load`].
    pub fn new(cfg: &BackendsConfig) -> Result<Self> {
        let (log_tx, _) = broadcast::channel(LOG_CHANNEL_CAPACITY);
        Ok(Self {
            configured_path: cfg.ffmpeg_path.clone(),
            resolved: RwLock::new(None),
            version: RwLock::new(None),
            scratch: ScratchDir::new(cfg.scratch_dir.as_ref())?,
            log_tx,
        })
    }

    fn tool_path(&self) -> Result<PathBuf> {
        self.resolved
            .read()
            .clone()
            .ok_or_else(|| Error::backend_load("ffmpeg", "backend used before load"))
    }

    /// Names must stay inside the scratch directory.
    fn scratch_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
            return Err(Error::validation(format!("invalid scratch name: {name:?}")));
        }
        Ok(self.scratch.path.join(name))
    }

    /// Build the argument list for a request. Pure, so the mapping from
    /// operations to tool invocations is testable without the tool.
    pub fn args_for(request: &ExecRequest) -> Vec<String> {
        let mut args: Vec<String> = vec!["-hide_banner".into()];
        match request {
            ExecRequest::Probe { input } => {
                args.push("-i".into());
                args.push(input.clone());
            }
            ExecRequest::ExportSubtitle {
                input,
                stream_index,
                output,
                convert_to_text,
            } => {
                args.push("-y".into());
                args.push("-i".into());
                args.push(input.clone());
                args.push("-map".into());
                args.push(format!("0:{stream_index}"));
                args.push("-c:s".into());
                args.push(if *convert_to_text { "srt" } else { "copy" }.into());
                args.push(output.clone());
            }
            ExecRequest::ExportStream {
                input,
                stream_index,
                kind,
                output,
                reencode,
            } => {
                args.push("-y".into());
                args.push("-i".into());
                args.push(input.clone());
                args.push("-map".into());
                args.push(format!("0:{stream_index}"));
                if *reencode {
                    match kind {
                        StreamKind::Video => {
                            args.push("-c:v".into());
                            args.push("libx264".into());
                            args.push("-crf".into());
                            args.push(FALLBACK_VIDEO_CRF.into());
                            args.push("-preset".into());
                            args.push(FALLBACK_VIDEO_PRESET.into());
                        }
                        StreamKind::Audio => {
                            args.push("-c:a".into());
                            args.push("aac".into());
                            args.push("-b:a".into());
                            args.push(FALLBACK_AUDIO_BITRATE.into());
                        }
                        StreamKind::Subtitle => {
                            args.push("-c:s".into());
                            args.push("srt".into());
                        }
                    }
                } else {
                    args.push("-c".into());
                    args.push("copy".into());
                }
                args.push(output.clone());
            }
        }
        args
    }
}

#[async_trait]
impl Backend for FfmpegBackend {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn load(&self) -> Result<()> {
        let path = match &self.configured_path {
            Some(p) if p.exists() => p.clone(),
            Some(p) => {
                return Err(Error::backend_load(
                    "ffmpeg",
                    format!("configured path does not exist: {}", p.display()),
                ));
            }
            None => which::which("ffmpeg").map_err(|_| {
                Error::backend_load("ffmpeg", "ffmpeg not found; is it installed and in PATH?")
            })?,
        };

        let output = Command::new(&path)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::backend_load("ffmpeg", format!("failed to run -version: {e}")))?;

        if !output.status.success() {
            return Err(Error::backend_load(
                "ffmpeg",
                format!("-version exited with {}", output.status),
            ));
        }

        let first_line = String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or_default()
            .to_string();

        tracing::info!(path = %path.display(), version = %first_line, "ffmpeg backend ready");
        *self.resolved.write() = Some(path);
        *self.version.write() = Some(first_line);
        Ok(())
    }

    fn loaded_version(&self) -> Option<String> {
        self.version.read().clone()
    }

    async fn write(&self, name: &str, data: Bytes) -> Result<()> {
        let path = self.scratch_path(name)?;
        tokio::fs::write(&path, &data).await?;
        Ok(())
    }

    async fn execute(&self, request: &ExecRequest) -> Result<ExecOutput> {
        let tool = self.tool_path()?;
        let args = Self::args_for(request);
        tracing::debug!(?args, "executing ffmpeg");

        let mut child = Command::new(&tool)
            .args(&args)
            .current_dir(&self.scratch.path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::backend("ffmpeg", format!("failed to spawn: {e}")))?;

        // Drain stderr as it arrives: every line goes to subscribers and
        // into the accumulated diagnostic text.
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::backend("ffmpeg", "stderr not captured"))?;
        let mut lines = BufReader::new(stderr).lines();
        let mut log = String::new();
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| Error::backend("ffmpeg", format!("log read failed: {e}")))?
        {
            let _ = self.log_tx.send(line.clone());
            log.push_str(&line);
            log.push('\n');
        }

        let status = child
            .wait()
            .await
            .map_err(|e| Error::backend("ffmpeg", format!("wait failed: {e}")))?;

        // A bare `-i` probe exits non-zero (no output file was requested)
        // and its diagnostic text is still the result. Export requests
        // must succeed.
        if !matches!(request, ExecRequest::Probe { .. }) && !status.success() {
            let tail: String = log
                .lines()
                .rev()
                .take(4)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("; ");
            return Err(Error::backend(
                "ffmpeg",
                format!("{} exited with {status}: {tail}", request.describe()),
            ));
        }

        Ok(ExecOutput::Diagnostic(log))
    }

    async fn read_file(&self, name: &str) -> Result<Bytes> {
        let path = self.scratch_path(name)?;
        let data = tokio::fs::read(&path).await.map_err(|e| {
            Error::backend("ffmpeg", format!("output {name} could not be read: {e}"))
        })?;
        Ok(Bytes::from(data))
    }

    async fn delete_file(&self, name: &str) -> Result<()> {
        let path = self.scratch_path(name)?;
        tokio::fs::remove_file(&path).await?;
        Ok(())
    }

    async fn scratch_files(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.scratch.path).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        Ok(names)
    }

    fn subscribe_log(&self) -> Option<broadcast::Receiver<String>> {
        Some(self.log_tx.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_args() {
        let args = FfmpegBackend::args_for(&ExecRequest::Probe {
            input: "in.mkv".into(),
        });
        assert_eq!(args, vec!["-hide_banner", "-i", "in.mkv"]);
    }

    #[test]
    fn subtitle_copy_args() {
        let args = FfmpegBackend::args_for(&ExecRequest::ExportSubtitle {
            input: "in.mkv".into(),
            stream_index: 2,
            output: "out.ass".into(),
            convert_to_text: false,
        });
        assert_eq!(
            args,
            vec![
                "-hide_banner",
                "-y",
                "-i",
                "in.mkv",
                "-map",
                "0:2",
                "-c:s",
                "copy",
                "out.ass"
            ]
        );
    }

    #[test]
    fn subtitle_conversion_args() {
        let args = FfmpegBackend::args_for(&ExecRequest::ExportSubtitle {
            input: "in.mkv".into(),
            stream_index: 2,
            output: "out.srt".into(),
            convert_to_text: true,
        });
        assert!(args.windows(2).any(|w| w == ["-c:s", "srt"]));
    }

    #[test]
    fn stream_copy_args() {
        let args = FfmpegBackend::args_for(&ExecRequest::ExportStream {
            input: "in.mkv".into(),
            stream_index: 0,
            kind: StreamKind::Video,
            output: "out.mp4".into(),
            reencode: false,
        });
        assert!(args.windows(2).any(|w| w == ["-c", "copy"]));
        assert!(!args.iter().any(|a| a == "libx264"));
    }

    #[test]
    fn video_reencode_args_are_fixed() {
        let args = FfmpegBackend::args_for(&ExecRequest::ExportStream {
            input: "in.mkv".into(),
            stream_index: 0,
            kind: StreamKind::Video,
            output: "out.mp4".into(),
            reencode: true,
        });
        assert!(args.windows(2).any(|w| w == ["-c:v", "libx264"]));
        assert!(args.windows(2).any(|w| w == ["-crf", FALLBACK_VIDEO_CRF]));
    }

    #[test]
    fn audio_reencode_args_are_fixed() {
        let args = FfmpegBackend::args_for(&ExecRequest::ExportStream {
            input: "in.mkv".into(),
            stream_index: 1,
            kind: StreamKind::Audio,
            output: "out.m4a".into(),
            reencode: true,
        });
        assert!(args.windows(2).any(|w| w == ["-c:a", "aac"]));
        assert!(args
            .windows(2)
            .any(|w| w == ["-b:a", FALLBACK_AUDIO_BITRATE]));
    }

    #[tokio::test]
    async fn scratch_names_are_confined() {
        let backend = FfmpegBackend::new(&BackendsConfig::default()).unwrap();
        assert!(backend.write("../escape", Bytes::new()).await.is_err());
        assert!(backend.write("a/b", Bytes::new()).await.is_err());
        assert!(backend.write("", Bytes::new()).await.is_err());
    }

    #[tokio::test]
    async fn scratch_write_list_delete() {
        let backend = FfmpegBackend::new(&BackendsConfig::default()).unwrap();
        backend
            .write("input.mkv", Bytes::from_static(b"data"))
            .await
            .unwrap();

        let files = backend.scratch_files().await.unwrap();
        assert_eq!(files, vec!["input.mkv"]);

        let read = backend.read_file("input.mkv").await.unwrap();
        assert_eq!(&read[..], b"data");

        backend.delete_file("input.mkv").await.unwrap();
        assert!(backend.scratch_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn diagnostic_log_is_subscribable() {
        let backend = FfmpegBackend::new(&BackendsConfig::default()).unwrap();
        let mut rx = backend.subscribe_log().expect("text backend exposes a log");
        backend.log_tx.send("Duration: 00:00:01.00".to_string()).unwrap();
        assert_eq!(rx.recv().await.unwrap(), "Duration: 00:00:01.00");
    }

    #[tokio::test]
    async fn load_fails_for_bad_configured_path() {
        let cfg = BackendsConfig {
            ffmpeg_path: Some(PathBuf::from("/nonexistent/ffmpeg-xyz")),
            scratch_dir: None,
        };
        let backend = FfmpegBackend::new(&cfg).unwrap();
        let err = backend.load().await.unwrap_err();
        assert!(err.is_session_fatal());
        assert!(err.to_string().contains("does not exist"));
    }
}
