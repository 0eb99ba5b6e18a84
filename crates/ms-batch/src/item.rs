//! Batch items and their lifecycle.

use serde::{Deserialize, Serialize};

use ms_core::VideoMetadata;

/// Lifecycle state of one batch item.
///
/// `Waiting → Processing → {Completed | Failed | TimedOut}`. Items are
/// mutated only by the coordinator, never by the extraction engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    /// Queued, not yet admitted.
    Waiting,
    /// Currently holds the extraction session.
    Processing,
    /// Settled with metadata.
    Completed,
    /// Settled with an error.
    Failed,
    /// Forced to settle after exceeding the processing deadline.
    TimedOut,
}

impl ItemState {
    /// Whether the item has reached a terminal state.
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            ItemState::Completed | ItemState::Failed | ItemState::TimedOut
        )
    }
}

/// One file's progress through a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    /// Stable id within the batch (also the display order).
    pub id: usize,
    /// Name of the file.
    pub file_name: String,
    /// Total size of the file in bytes.
    pub size_bytes: u64,
    /// Current lifecycle state.
    pub state: ItemState,
    /// Extracted metadata, set on completion.
    pub metadata: Option<VideoMetadata>,
    /// Resolved extraction method name (backend), when the extension is
    /// recognized.
    pub method: Option<String>,
    /// Error message, set on failure or timeout.
    pub error: Option<String>,
}

impl BatchItem {
    /// Whether the item has settled (metadata or error recorded).
    pub fn is_settled(&self) -> bool {
        self.state.is_settled()
    }
}
