//! Copies every document of a source index into a running search API through
//! its bulk endpoint.

use crate::models::{BulkOutcome, Document};
use crate::traits::{BulkSink, DocumentScroll};
use crate::StoreError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{error, info, warn};

pub const DEFAULT_REINDEX_BATCH: usize = 100;
pub const BULK_ROUTE: &str = "/api/documents/_bulk";

#[derive(Debug, Deserialize)]
struct BulkApiResponse {
    indexed: u64,
    #[serde(default)]
    failed: u64,
}

pub struct BulkApiTarget {
    client: Client,
    endpoint: String,
    token: Option<String>,
}

impl BulkApiTarget {
    pub fn new(endpoint: impl Into<String>, token: Option<String>) -> Self {
        let endpoint: String = endpoint.into();
        Self {
            client: Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn url(&self) -> String {
        format!("{}{}", self.endpoint, BULK_ROUTE)
    }
}

#[async_trait]
impl BulkSink for BulkApiTarget {
    async fn send_batch(&self, documents: &[Document]) -> Result<BulkOutcome, StoreError> {
        let mut request = self.client.post(self.url()).json(documents);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::BackendResponse {
                backend: "bulk-api".to_string(),
                status: status.as_u16(),
                details: response.text().await.unwrap_or_default(),
            });
        }

        let body: BulkApiResponse = response.json().await?;
        Ok(BulkOutcome {
            indexed: body.indexed,
            failed: body.failed,
        })
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReindexReport {
    pub read: u64,
    pub batches: usize,
    pub failed_batches: usize,
    pub outcome: BulkOutcome,
}

impl ReindexReport {
    /// Folds the report of another source index into this one.
    pub fn absorb(&mut self, other: ReindexReport) {
        self.read += other.read;
        self.batches += other.batches;
        self.failed_batches += other.failed_batches;
        self.outcome.absorb(other.outcome);
    }
}

/// Scrolls the source and forwards each batch. Only a failure to open or
/// advance the scroll stops the run.
pub async fn reindex<Src, Dst>(
    source: &Src,
    target: &Dst,
    batch_size: usize,
) -> Result<ReindexReport, StoreError>
where
    Src: DocumentScroll + ?Sized,
    Dst: BulkSink + ?Sized,
{
    let mut report = ReindexReport::default();
    let mut page = source.scroll_start(batch_size.max(1)).await?;

    loop {
        if page.documents.is_empty() {
            break;
        }

        report.read += page.documents.len() as u64;
        report.batches += 1;

        match target.send_batch(&page.documents).await {
            Ok(outcome) => {
                info!(batch = report.batches, indexed = outcome.indexed, "batch reindexed");
                report.outcome.absorb(outcome);
            }
            Err(error) => {
                error!(batch = report.batches, size = page.documents.len(), %error, "batch reindex failed");
                report.failed_batches += 1;
                report.outcome.failed += page.documents.len() as u64;
            }
        }

        let Some(scroll_id) = page.scroll_id.clone() else {
            break;
        };
        page = source.scroll_next(&scroll_id).await?;
    }

    if let Some(scroll_id) = &page.scroll_id {
        if let Err(error) = source.clear_scroll(scroll_id).await {
            warn!(%error, "failed to clear scroll context");
        }
    }

    Ok(report)
}
