//! Per-item outcomes and the per-run report.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadOutcome {
    Downloaded,
    SkippedExisting,
    Failed,
    Canceled,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    /// 1-based position in the ordered locator list.
    pub index: usize,
    pub url: String,
    pub file_name: String,
    pub outcome: DownloadOutcome,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub total: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub canceled: usize,
    pub items: Vec<ItemReport>,
}

impl RunReport {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn record(&mut self, item: ItemReport) {
        match item.outcome {
            DownloadOutcome::Downloaded => self.downloaded += 1,
            DownloadOutcome::SkippedExisting => self.skipped += 1,
            DownloadOutcome::Failed => self.failed += 1,
            DownloadOutcome::Canceled => self.canceled += 1,
        }
        self.items.push(item);
    }
}
