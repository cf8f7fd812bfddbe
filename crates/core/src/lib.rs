pub mod connection;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod pagination;
pub mod predicate;
pub mod reindex;
pub mod store;
pub mod stores;
pub mod traits;

pub use connection::{Backoff, RetryPolicy, StoreConnection};
pub use error::{IngestError, SearchError, StoreError};
pub use extractor::{LopdfExtractor, PageText, PdfExtractor};
pub use ingest::{
    build_document, collect_documents, discover_pdf_files, document_id, load_in_batches,
    ExtractionReport, IngestionSummary, SkippedPdf,
};
pub use models::{
    parse_upload_date, BulkOutcome, ClusterHealth, Document, IngestionOptions, PaginationMeta,
    SearchPage, SearchQuery, SearchResult,
};
pub use orchestrator::{SearchCoordinator, DEFAULT_PAGE_SIZE};
pub use pagination::PageWindow;
pub use predicate::{FieldBoost, MatchOperator, MatchSettings, Predicate};
pub use reindex::{reindex, BulkApiTarget, ReindexReport, DEFAULT_REINDEX_BATCH};
pub use store::{HighlightSpec, ScrollPage, StoreHit};
pub use stores::ElasticsearchStore;
pub use traits::{BulkSink, DocumentScroll, DocumentStore};
