//! Work items: the per-archive unit of scheduling and fault isolation.

use thiserror::Error;

/// Processing stage of a work item.
///
/// `Completed` and `Failed` are terminal: an item reaches exactly one of
/// them and is never processed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pending,
    Downloading,
    Unpacking,
    ExtractingText,
    CleaningUp,
    Completed,
    Failed,
}

impl Stage {
    /// Whether this stage is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Pending => "pending",
            Stage::Downloading => "downloading",
            Stage::Unpacking => "unpacking",
            Stage::ExtractingText => "extracting-text",
            Stage::CleaningUp => "cleaning-up",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why an item failed: the stage at fault plus the underlying cause.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("download failed: {0:#}")]
    Download(anyhow::Error),

    #[error("unpack failed: {0:#}")]
    Unpack(anyhow::Error),

    #[error("text extraction failed: {0:#}")]
    Extract(anyhow::Error),

    #[error("cleanup failed: {0:#}")]
    Cleanup(anyhow::Error),

    #[error("{stage} stage timed out after {seconds}s")]
    Timeout { stage: Stage, seconds: u64 },

    #[error("processing task aborted: {0}")]
    Aborted(anyhow::Error),
}

impl ItemError {
    /// The stage this error occurred in.
    pub fn stage(&self) -> Stage {
        match self {
            ItemError::Download(_) => Stage::Downloading,
            ItemError::Unpack(_) => Stage::Unpacking,
            ItemError::Extract(_) => Stage::ExtractingText,
            ItemError::Cleanup(_) => Stage::CleaningUp,
            ItemError::Timeout { stage, .. } => *stage,
            // A panicked task gives no stage to attribute; terminal is all
            // that is known
            ItemError::Aborted(_) => Stage::Failed,
        }
    }
}

/// One archive's unit of processing.
///
/// Owned exclusively by the stage executor driving it; nothing else mutates
/// the record. Once the terminal outcome is reported only aggregate counts
/// survive.
#[derive(Debug)]
pub struct WorkItem {
    key: String,
    stage: Stage,
}

impl WorkItem {
    /// Create a pending work item for an archive key.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            stage: Stage::Pending,
        }
    }

    /// The archive's object key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current stage.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Move the item to a new stage.
    pub fn set_stage(&mut self, stage: Stage) {
        self.stage = stage;
    }
}

/// Terminal outcome of one work item.
#[derive(Debug)]
pub enum ItemOutcome {
    /// All stages ran; individual documents may still have failed.
    Completed {
        /// Documents whose text was extracted and persisted.
        documents_extracted: usize,
        /// Documents skipped after a document-level extraction failure.
        documents_failed: usize,
    },

    /// A stage failed; remaining stages were skipped.
    Failed(ItemError),
}

impl ItemOutcome {
    /// Check if the item completed.
    pub fn is_completed(&self) -> bool {
        matches!(self, ItemOutcome::Completed { .. })
    }

    /// Check if the item failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, ItemOutcome::Failed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_terminality() {
        assert!(Stage::Completed.is_terminal());
        assert!(Stage::Failed.is_terminal());
        assert!(!Stage::Pending.is_terminal());
        assert!(!Stage::Downloading.is_terminal());
        assert!(!Stage::ExtractingText.is_terminal());
    }

    #[test]
    fn test_item_error_reports_stage() {
        let err = ItemError::Download(anyhow::anyhow!("no route to host"));
        assert_eq!(err.stage(), Stage::Downloading);

        let err = ItemError::Unpack(anyhow::anyhow!("bad header"));
        assert_eq!(err.stage(), Stage::Unpacking);

        let err = ItemError::Timeout {
            stage: Stage::ExtractingText,
            seconds: 600,
        };
        assert_eq!(err.stage(), Stage::ExtractingText);
    }

    #[test]
    fn test_item_error_display_carries_cause() {
        let err = ItemError::Download(anyhow::anyhow!("connection refused"));
        let message = err.to_string();
        assert!(message.contains("download failed"));
        assert!(message.contains("connection refused"));
    }

    #[test]
    fn test_work_item_lifecycle() {
        let mut item = WorkItem::new("pdf/arXiv_pdf_2301_001.tar");
        assert_eq!(item.stage(), Stage::Pending);

        item.set_stage(Stage::Downloading);
        assert_eq!(item.stage(), Stage::Downloading);
        assert_eq!(item.key(), "pdf/arXiv_pdf_2301_001.tar");
    }

    #[test]
    fn test_outcome_predicates() {
        let completed = ItemOutcome::Completed {
            documents_extracted: 10,
            documents_failed: 2,
        };
        assert!(completed.is_completed());
        assert!(!completed.is_failed());

        let failed = ItemOutcome::Failed(ItemError::Unpack(anyhow::anyhow!("bad tar")));
        assert!(failed.is_failed());
        assert!(!failed.is_completed());
    }
}
