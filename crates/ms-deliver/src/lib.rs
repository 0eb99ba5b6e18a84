//! # ms-deliver
//!
//! Artifact delivery. Artifacts below the direct-delivery limit are handed
//! to the sink in one piece; larger artifacts stream through a pull-based
//! chunk loop with fractional progress, and the sink assembles the final
//! deliverable.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;

use ms_core::config::DeliveryConfig;
use ms_core::{Artifact, Error, Result};

/// How an artifact will be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// One piece, below the direct limit.
    Direct,
    /// Fixed-size chunks, at or above the direct limit.
    Chunked,
}

/// Receiving end of a delivery.
#[async_trait]
pub trait ArtifactSink: Send {
    /// Receive a whole artifact in one piece.
    async fn deliver_direct(&mut self, name: &str, data: Bytes) -> Result<()>;

    /// Begin a chunked delivery of `total_len` bytes.
    async fn begin_chunked(&mut self, name: &str, total_len: u64) -> Result<()>;

    /// Receive the next chunk.
    async fn deliver_chunk(&mut self, chunk: Bytes) -> Result<()>;

    /// Finish a chunked delivery; the sink assembles the deliverable.
    async fn finish_chunked(&mut self) -> Result<()>;
}

/// Size-gated artifact delivery.
pub struct ArtifactDownloader {
    cfg: DeliveryConfig,
    progress: Option<Box<dyn Fn(f64) + Send + Sync>>,
}

impl ArtifactDownloader {
    /// Create a downloader with the given thresholds.
    pub fn new(cfg: DeliveryConfig) -> Self {
        Self {
            cfg,
            progress: None,
        }
    }

    /// Attach a fractional-progress callback (0.0–1.0), reported as chunks
    /// are emitted.
    pub fn with_progress(mut self, progress: impl Fn(f64) + Send + Sync + 'static) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    /// The mode an artifact of `len` bytes will use.
    pub fn mode_for(&self, len: u64) -> DeliveryMode {
        if len < self.cfg.direct_limit_bytes {
            DeliveryMode::Direct
        } else {
            DeliveryMode::Chunked
        }
    }

    /// Deliver one artifact to a sink, consuming it.
    pub async fn deliver(&self, artifact: Artifact, sink: &mut dyn ArtifactSink) -> Result<()> {
        let total = artifact.len();
        match self.mode_for(total) {
            DeliveryMode::Direct => {
                tracing::debug!(name = %artifact.file_name, total, "direct delivery");
                sink.deliver_direct(&artifact.file_name, artifact.data).await?;
                if let Some(progress) = &self.progress {
                    progress(1.0);
                }
                Ok(())
            }
            DeliveryMode::Chunked => {
                let chunk_size = self.cfg.chunk_bytes;
                if chunk_size == 0 {
                    return Err(Error::validation("delivery chunk size is 0"));
                }
                tracing::debug!(
                    name = %artifact.file_name,
                    total,
                    chunk_size,
                    "chunked delivery"
                );
                sink.begin_chunked(&artifact.file_name, total).await?;

                let mut offset: u64 = 0;
                while offset < total {
                    let len = chunk_size.min(total - offset);
                    // Bytes slicing is zero-copy; each chunk borrows the
                    // same backing buffer.
                    let chunk = artifact
                        .data
                        .slice(offset as usize..(offset + len) as usize);
                    sink.deliver_chunk(chunk).await?;
                    offset += len;
                    if let Some(progress) = &self.progress {
                        progress(offset as f64 / total as f64);
                    }
                }

                sink.finish_chunked().await
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Filesystem sink
// ---------------------------------------------------------------------------

/// Sink that writes artifacts into a directory.
pub struct FsSink {
    dir: std::path::PathBuf,
    open: Option<tokio::fs::File>,
    path: Option<std::path::PathBuf>,
}

impl FsSink {
    /// Create a sink over an output directory.
    pub fn new(dir: impl Into<std::path::PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            open: None,
            path: None,
        }
    }

    /// Path of the last delivered artifact.
    pub fn last_path(&self) -> Option<&std::path::Path> {
        self.path.as_deref()
    }
}

#[async_trait]
impl ArtifactSink for FsSink {
    async fn deliver_direct(&mut self, name: &str, data: Bytes) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(name);
        tokio::fs::write(&path, &data).await?;
        self.path = Some(path);
        Ok(())
    }

    async fn begin_chunked(&mut self, name: &str, _total_len: u64) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(name);
        self.open = Some(tokio::fs::File::create(&path).await?);
        self.path = Some(path);
        Ok(())
    }

    async fn deliver_chunk(&mut self, chunk: Bytes) -> Result<()> {
        let file = self
            .open
            .as_mut()
            .ok_or_else(|| Error::internal("chunk delivered before begin_chunked"))?;
        file.write_all(&chunk).await?;
        Ok(())
    }

    async fn finish_chunked(&mut self) -> Result<()> {
        if let Some(mut file) = self.open.take() {
            file.flush().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// In-memory sink recording everything it receives.
    #[derive(Default)]
    struct RecordingSink {
        direct: Option<(String, Bytes)>,
        chunks: Vec<Bytes>,
        begun: Option<(String, u64)>,
        finished: bool,
    }

    #[async_trait]
    impl ArtifactSink for RecordingSink {
        async fn deliver_direct(&mut self, name: &str, data: Bytes) -> Result<()> {
            self.direct = Some((name.to_string(), data));
            Ok(())
        }

        async fn begin_chunked(&mut self, name: &str, total_len: u64) -> Result<()> {
            self.begun = Some((name.to_string(), total_len));
            Ok(())
        }

        async fn deliver_chunk(&mut self, chunk: Bytes) -> Result<()> {
            self.chunks.push(chunk);
            Ok(())
        }

        async fn finish_chunked(&mut self) -> Result<()> {
            self.finished = true;
            Ok(())
        }
    }

    fn small_cfg() -> DeliveryConfig {
        DeliveryConfig {
            direct_limit_bytes: 1024,
            chunk_bytes: 100,
        }
    }

    #[test]
    fn mode_boundary_uses_default_two_gib_limit() {
        const GIB: u64 = 1024 * 1024 * 1024;
        let downloader = ArtifactDownloader::new(DeliveryConfig::default());
        assert_eq!(downloader.mode_for(2 * GIB - 1), DeliveryMode::Direct);
        assert_eq!(downloader.mode_for(2 * GIB + 1), DeliveryMode::Chunked);
    }

    #[tokio::test]
    async fn below_limit_delivers_direct() {
        let downloader = ArtifactDownloader::new(small_cfg());
        let mut sink = RecordingSink::default();

        let artifact = Artifact::new("out.srt", Bytes::from(vec![7u8; 1023]));
        downloader.deliver(artifact, &mut sink).await.unwrap();

        let (name, data) = sink.direct.unwrap();
        assert_eq!(name, "out.srt");
        assert_eq!(data.len(), 1023);
        assert!(sink.chunks.is_empty());
    }

    #[tokio::test]
    async fn above_limit_chunks_sum_exactly() {
        let downloader = ArtifactDownloader::new(small_cfg());
        let mut sink = RecordingSink::default();

        let total = 1025usize;
        let artifact = Artifact::new("big.mp4", Bytes::from(vec![1u8; total]));
        downloader.deliver(artifact, &mut sink).await.unwrap();

        assert!(sink.direct.is_none());
        assert_eq!(sink.begun, Some(("big.mp4".to_string(), total as u64)));
        assert!(sink.finished);

        // 10 full chunks of 100 and one final 25-byte chunk.
        assert_eq!(sink.chunks.len(), 11);
        let sum: usize = sink.chunks.iter().map(|c| c.len()).sum();
        assert_eq!(sum, total);
        assert_eq!(sink.chunks.last().unwrap().len(), 25);
    }

    #[tokio::test]
    async fn chunked_progress_is_fractional_and_complete() {
        let reports: Arc<Mutex<Vec<f64>>> = Arc::new(Mutex::new(Vec::new()));
        let reports_clone = reports.clone();
        let downloader = ArtifactDownloader::new(small_cfg())
            .with_progress(move |fraction| reports_clone.lock().push(fraction));

        let mut sink = RecordingSink::default();
        let artifact = Artifact::new("big.mp4", Bytes::from(vec![0u8; 2048]));
        downloader.deliver(artifact, &mut sink).await.unwrap();

        let reports = reports.lock();
        assert!(!reports.is_empty());
        assert!(reports.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*reports.last().unwrap(), 1.0);
    }

    #[tokio::test]
    async fn exactly_at_limit_is_chunked() {
        let downloader = ArtifactDownloader::new(small_cfg());
        let mut sink = RecordingSink::default();
        let artifact = Artifact::new("edge.bin", Bytes::from(vec![0u8; 1024]));
        downloader.deliver(artifact, &mut sink).await.unwrap();
        assert!(sink.direct.is_none());
        assert!(sink.finished);
    }

    #[tokio::test]
    async fn fs_sink_direct_and_chunked() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = ArtifactDownloader::new(small_cfg());

        let mut sink = FsSink::new(dir.path());
        downloader
            .deliver(
                Artifact::new("small.srt", Bytes::from_static(b"cue")),
                &mut sink,
            )
            .await
            .unwrap();
        let written = std::fs::read(dir.path().join("small.srt")).unwrap();
        assert_eq!(written, b"cue");

        let mut sink = FsSink::new(dir.path());
        downloader
            .deliver(
                Artifact::new("big.bin", Bytes::from(vec![9u8; 2000])),
                &mut sink,
            )
            .await
            .unwrap();
        let written = std::fs::read(dir.path().join("big.bin")).unwrap();
        assert_eq!(written.len(), 2000);
        assert_eq!(sink.last_path(), Some(dir.path().join("big.bin").as_path()));
    }
}
