//! The batch coordinator.
//!
//! Drives queued files through the extraction engine strictly one at a
//! time, mirroring the engine's single-session invariant. A wedged backend
//! is bounded by the item timeout: the item is forced to `TimedOut` and
//! the next one is admitted. After every settlement the coordinator waits
//! a short cooldown before admitting the next item so the backend can
//! finish asynchronous teardown; skipping that cooldown is the dominant
//! cause of cross-file corruption in this design.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use ms_av::{ExportHints, ExtractionEngine, MediaSource};
use ms_core::{Artifact, Error, Result, StreamKind, VideoMetadata};

/// The engine operations the coordinator drives.
///
/// A trait seam so the coordinator's state machine is testable with a
/// scripted engine.
#[async_trait]
pub trait MetadataEngine: Send + Sync {
    /// Resolved extraction method name for a filename, `None` when the
    /// extension is unrecognized.
    fn method_name(&self, filename: &str) -> Option<&'static str>;

    /// Probe a file for metadata.
    async fn probe(&self, source: &dyn MediaSource) -> Result<VideoMetadata>;

    /// Export one subtitle stream.
    async fn export_subtitle(
        &self,
        source: &dyn MediaSource,
        stream_index: u32,
        hints: &ExportHints,
    ) -> Result<Artifact>;

    /// Export one video or audio stream.
    async fn export_stream(
        &self,
        source: &dyn MediaSource,
        stream_index: u32,
        kind: StreamKind,
        codec: Option<&str>,
    ) -> Result<Artifact>;
}

#[async_trait]
impl MetadataEngine for ExtractionEngine {
    fn method_name(&self, filename: &str) -> Option<&'static str> {
        ExtractionEngine::method_name(self, filename)
    }

    async fn probe(&self, source: &dyn MediaSource) -> Result<VideoMetadata> {
        ExtractionEngine::probe(self, source).await
    }

    async fn export_subtitle(
        &self,
        source: &dyn MediaSource,
        stream_index: u32,
        hints: &ExportHints,
    ) -> Result<Artifact> {
        ExtractionEngine::export_subtitle(self, source, stream_index, hints).await
    }

    async fn export_stream(
        &self,
        source: &dyn MediaSource,
        stream_index: u32,
        kind: StreamKind,
        codec: Option<&str>,
    ) -> Result<Artifact> {
        ExtractionEngine::export_stream(self, source, stream_index, kind, codec).await
    }
}

// ---------------------------------------------------------------------------
// Consumer-facing state
// ---------------------------------------------------------------------------

use crate::item::{BatchItem, ItemState};

/// Aggregate progress record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressRecord {
    /// Whether progress should be shown.
    pub visible: bool,
    /// Settled items over total items, as a percentage (0–100).
    ///
    /// Per-file probe progress is deliberately not blended in, so the bar
    /// never regresses when a new file starts.
    pub percent: f32,
    /// Human-readable label for the current step.
    pub label: String,
}

/// Last-error record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorRecord {
    /// Whether an error should be shown.
    pub visible: bool,
    /// The message.
    pub message: String,
}

/// Snapshot of the batch state for the presentation layer.
#[derive(Debug, Clone, Default)]
pub struct BatchSnapshot {
    /// Metadata of the most recently completed file.
    pub current: Option<VideoMetadata>,
    /// Aggregate progress.
    pub progress: ProgressRecord,
    /// Last per-file error.
    pub error: ErrorRecord,
    /// All items, in selection order.
    pub items: Vec<BatchItem>,
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

struct Entry {
    source: Arc<dyn MediaSource>,
    item: BatchItem,
}

#[derive(Default)]
struct Inner {
    entries: Vec<Entry>,
    queue: VecDeque<usize>,
    current: Option<VideoMetadata>,
    last_error: Option<String>,
}

/// Single-flight batch pipeline over one shared extraction engine.
pub struct BatchCoordinator {
    engine: Arc<dyn MetadataEngine>,
    cfg: ms_core::config::BatchConfig,
    inner: Mutex<Inner>,
    snapshot_tx: watch::Sender<BatchSnapshot>,
}

impl BatchCoordinator {
    /// Create a coordinator over an engine.
    pub fn new(engine: Arc<dyn MetadataEngine>, cfg: ms_core::config::BatchConfig) -> Self {
        let (snapshot_tx, _) = watch::channel(BatchSnapshot::default());
        Self {
            engine,
            cfg,
            inner: Mutex::new(Inner::default()),
            snapshot_tx,
        }
    }

    /// Subscribe to state snapshots.
    pub fn subscribe(&self) -> watch::Receiver<BatchSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Current state snapshot.
    pub fn snapshot(&self) -> BatchSnapshot {
        self.build_snapshot(&self.inner.lock())
    }

    /// Add one file to the batch.
    pub fn select_file(&self, source: Arc<dyn MediaSource>) -> usize {
        self.select_files(vec![source]).pop().expect("one id")
    }

    /// Add files to the batch; they queue as `Waiting`.
    pub fn select_files(&self, sources: Vec<Arc<dyn MediaSource>>) -> Vec<usize> {
        let mut inner = self.inner.lock();
        let mut ids = Vec::with_capacity(sources.len());
        for source in sources {
            let id = inner.entries.len();
            let item = BatchItem {
                id,
                file_name: source.name().to_string(),
                size_bytes: source.len(),
                state: ItemState::Waiting,
                metadata: None,
                method: self.engine.method_name(source.name()).map(str::to_string),
                error: None,
            };
            inner.entries.push(Entry { source, item });
            inner.queue.push_back(id);
            ids.push(id);
        }
        self.publish(&inner);
        ids
    }

    /// Drop every item and reset the published state.
    pub fn clear_all(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.queue.clear();
        inner.current = None;
        inner.last_error = None;
        self.publish(&inner);
    }

    /// Process queued items until the queue is empty.
    ///
    /// On every tick the head item is admitted only when no item is
    /// `Processing`; since this loop is the only admitter, that invariant
    /// holds structurally. Per-file errors settle the item and never abort
    /// the batch.
    pub async fn process_pending(&self) {
        loop {
            let Some((id, source)) = self.admit_next() else {
                break;
            };

            let file_name = source.name().to_string();
            tracing::info!(item = id, file = %file_name, "processing batch item");

            let deadline = Duration::from_secs(self.cfg.item_timeout_secs);
            let outcome = tokio::time::timeout(deadline, self.engine.probe(source.as_ref())).await;

            {
                let mut inner = self.inner.lock();
                let item = &mut inner.entries[id].item;
                match outcome {
                    Ok(Ok(metadata)) => {
                        item.state = ItemState::Completed;
                        item.metadata = Some(metadata.clone());
                        inner.current = Some(metadata);
                        tracing::info!(item = id, "batch item completed");
                    }
                    Ok(Err(e)) => {
                        item.state = ItemState::Failed;
                        let message = e.to_string();
                        item.error = Some(message.clone());
                        inner.last_error = Some(message);
                        tracing::warn!(item = id, error = %e, "batch item failed");
                    }
                    Err(_) => {
                        // The probe future was dropped, which releases the
                        // engine session and kills any backend child; the
                        // backend is assumed poisoned for this item but
                        // reusable for the next.
                        item.state = ItemState::TimedOut;
                        let message = format!(
                            "processing timed out after {}s",
                            self.cfg.item_timeout_secs
                        );
                        item.error = Some(message.clone());
                        inner.last_error = Some(message);
                        tracing::warn!(item = id, "batch item timed out");
                    }
                }
                self.publish(&inner);
            }

            // Settlement cooldown: let the backend finish asynchronous
            // teardown before the next file's write begins.
            tokio::time::sleep(Duration::from_millis(self.cfg.settle_cooldown_ms)).await;
        }
    }

    /// Export a subtitle stream from a previously selected item.
    pub async fn export_subtitle(
        &self,
        item_id: usize,
        stream_index: u32,
        hints: &ExportHints,
    ) -> Result<Artifact> {
        let source = self.source_of(item_id)?;
        self.set_label(format!(
            "Exporting subtitle stream {stream_index} of {}",
            source.name()
        ));
        let result = self
            .engine
            .export_subtitle(source.as_ref(), stream_index, hints)
            .await;
        self.record_export_outcome(&result);
        result
    }

    /// Export a video or audio stream from a previously selected item.
    pub async fn export_stream(
        &self,
        item_id: usize,
        stream_index: u32,
        kind: StreamKind,
        codec: Option<&str>,
    ) -> Result<Artifact> {
        let source = self.source_of(item_id)?;
        self.set_label(format!(
            "Exporting {kind} stream {stream_index} of {}",
            source.name()
        ));
        let result = self
            .engine
            .export_stream(source.as_ref(), stream_index, kind, codec)
            .await;
        self.record_export_outcome(&result);
        result
    }

    // -- Internals ----------------------------------------------------------

    /// Admit the head of the queue: mark it `Processing` and return its
    /// source. Returns `None` when the queue is empty.
    fn admit_next(&self) -> Option<(usize, Arc<dyn MediaSource>)> {
        let mut inner = self.inner.lock();
        debug_assert!(
            !inner.entries.iter().any(|e| e.item.state == ItemState::Processing),
            "admitting while an item is processing"
        );
        let id = inner.queue.pop_front()?;
        inner.entries[id].item.state = ItemState::Processing;
        let source = inner.entries[id].source.clone();
        self.publish(&inner);
        Some((id, source))
    }

    fn source_of(&self, item_id: usize) -> Result<Arc<dyn MediaSource>> {
        self.inner
            .lock()
            .entries
            .get(item_id)
            .map(|e| e.source.clone())
            .ok_or_else(|| Error::validation(format!("no batch item with id {item_id}")))
    }

    fn set_label(&self, label: String) {
        let mut snapshot = self.snapshot();
        snapshot.progress.visible = true;
        snapshot.progress.label = label;
        let _ = self.snapshot_tx.send_replace(snapshot);
    }

    fn record_export_outcome(&self, result: &Result<Artifact>) {
        if let Err(e) = result {
            let mut inner = self.inner.lock();
            inner.last_error = Some(e.to_string());
            self.publish(&inner);
        }
    }

    fn build_snapshot(&self, inner: &Inner) -> BatchSnapshot {
        let total = inner.entries.len();
        let settled = inner
            .entries
            .iter()
            .filter(|e| e.item.is_settled())
            .count();

        let percent = if total == 0 {
            0.0
        } else {
            settled as f32 / total as f32 * 100.0
        };

        let label = inner
            .entries
            .iter()
            .find(|e| e.item.state == ItemState::Processing)
            .map(|e| format!("Analyzing {}", e.item.file_name))
            .unwrap_or_else(|| {
                if total > 0 && settled == total {
                    "Complete".to_string()
                } else {
                    String::new()
                }
            });

        BatchSnapshot {
            current: inner.current.clone(),
            progress: ProgressRecord {
                visible: total > 0 && settled < total,
                percent,
                label,
            },
            error: ErrorRecord {
                visible: inner.last_error.is_some(),
                message: inner.last_error.clone().unwrap_or_default(),
            },
            items: inner.entries.iter().map(|e| e.item.clone()).collect(),
        }
    }

    fn publish(&self, inner: &Inner) {
        let _ = self.snapshot_tx.send_replace(self.build_snapshot(inner));
    }
}
