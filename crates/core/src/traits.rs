use crate::models::{BulkOutcome, ClusterHealth, Document};
use crate::predicate::Predicate;
use crate::store::{HighlightSpec, ScrollPage, StoreHit};
use crate::StoreError;
use async_trait::async_trait;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn count(&self, predicate: &Predicate) -> Result<u64, StoreError>;

    async fn search(
        &self,
        predicate: &Predicate,
        from: u64,
        size: u64,
        highlight: &HighlightSpec,
    ) -> Result<Vec<StoreHit>, StoreError>;

    async fn bulk_index(&self, documents: &[Document]) -> Result<BulkOutcome, StoreError>;

    async fn health(&self) -> Result<ClusterHealth, StoreError>;

    async fn index_exists(&self) -> Result<bool, StoreError>;

    async fn ensure_index(&self) -> Result<(), StoreError>;
}

/// Reads every document of an index in batches.
#[async_trait]
pub trait DocumentScroll: Send + Sync {
    async fn scroll_start(&self, batch_size: usize) -> Result<ScrollPage, StoreError>;

    async fn scroll_next(&self, scroll_id: &str) -> Result<ScrollPage, StoreError>;

    async fn clear_scroll(&self, scroll_id: &str) -> Result<(), StoreError>;
}

/// Receives batches of documents during a reindex.
#[async_trait]
pub trait BulkSink: Send + Sync {
    async fn send_batch(&self, documents: &[Document]) -> Result<BulkOutcome, StoreError>;
}
