use crate::extractor::PdfExtractor;
use crate::models::{BulkOutcome, Document, IngestionOptions};
use crate::traits::DocumentStore;
use crate::IngestError;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

/// Store id for a document; re-ingesting the same path overwrites it.
pub fn document_id(file_path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(file_path.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug)]
pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct ExtractionReport {
    pub files_found: usize,
    pub documents: Vec<Document>,
    pub skipped_files: Vec<SkippedPdf>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestionSummary {
    pub batches: usize,
    pub failed_batches: usize,
    pub outcome: BulkOutcome,
}

/// Builds the document for one PDF below `root`. `Ok(None)` means the file
/// produced no text.
pub fn build_document(
    root: &Path,
    path: &Path,
    extractor: &dyn PdfExtractor,
) -> Result<Option<Document>, IngestError> {
    let relative = path.strip_prefix(root).unwrap_or(path);
    if relative.file_name().is_none() {
        return Err(IngestError::MissingFileName(path.display().to_string()));
    }

    let content = extractor.extract_text(path)?;
    if content.trim().is_empty() {
        return Ok(None);
    }

    let file_path = portable_path(relative);
    let title = portable_path(&relative.with_extension(""));

    Ok(Some(Document {
        title,
        content,
        file_path,
        uploaded_at: Utc::now().date_naive(),
    }))
}

fn portable_path(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Extracts every PDF under `root` on the blocking pool, at most
/// `options.workers` at a time. Failed or empty files are skipped.
pub async fn collect_documents<E>(
    root: &Path,
    options: &IngestionOptions,
    extractor: Arc<E>,
) -> Result<ExtractionReport, IngestError>
where
    E: PdfExtractor + 'static,
{
    let files = discover_pdf_files(root);
    if files.is_empty() {
        return Err(IngestError::InvalidArgument(format!(
            "no pdf files found in {}",
            root.display()
        )));
    }

    let files_found = files.len();
    info!(root = %root.display(), files_found, workers = options.workers, "extracting pdf text");

    let semaphore = Arc::new(Semaphore::new(options.workers.max(1)));
    let mut tasks = JoinSet::new();

    for (position, path) in files.into_iter().enumerate() {
        let permit = Arc::clone(&semaphore)
            .acquire_owned()
            .await
            .map_err(|error| IngestError::Worker(error.to_string()))?;
        let root = root.to_path_buf();
        let extractor = Arc::clone(&extractor);

        tasks.spawn_blocking(move || {
            let _permit = permit;
            let result = build_document(&root, &path, extractor.as_ref());
            (position, path, result)
        });
    }

    let mut extracted = Vec::with_capacity(files_found);
    let mut skipped_files = Vec::new();

    while let Some(joined) = tasks.join_next().await {
        let (position, path, result) =
            joined.map_err(|error| IngestError::Worker(error.to_string()))?;

        match result {
            Ok(Some(document)) => {
                debug!(path = %path.display(), chars = document.content.len(), "extracted");
                extracted.push((position, document));
            }
            Ok(None) => {
                warn!(path = %path.display(), "pdf has no text, skipping");
                skipped_files.push(SkippedPdf {
                    path,
                    reason: "no extractable text".to_string(),
                });
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "extraction failed, skipping");
                skipped_files.push(SkippedPdf {
                    path,
                    reason: error.to_string(),
                });
            }
        }
    }

    extracted.sort_by_key(|(position, _)| *position);
    skipped_files.sort_by(|left, right| left.path.cmp(&right.path));

    Ok(ExtractionReport {
        files_found,
        documents: extracted.into_iter().map(|(_, document)| document).collect(),
        skipped_files,
    })
}

/// Bulk-loads documents batch by batch. A failed batch is logged and counted,
/// the run carries on with the next one.
pub async fn load_in_batches<S>(
    store: &S,
    documents: &[Document],
    batch_size: usize,
) -> IngestionSummary
where
    S: DocumentStore + ?Sized,
{
    let mut summary = IngestionSummary::default();

    for (number, batch) in documents.chunks(batch_size.max(1)).enumerate() {
        summary.batches += 1;
        match store.bulk_index(batch).await {
            Ok(outcome) => {
                info!(batch = number + 1, indexed = outcome.indexed, failed = outcome.failed, "batch ingested");
                summary.outcome.absorb(outcome);
            }
            Err(error) => {
                error!(batch = number + 1, size = batch.len(), %error, "batch ingestion failed");
                summary.failed_batches += 1;
                summary.outcome.failed += batch.len() as u64;
            }
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::PageText;
    use crate::models::ClusterHealth;
    use crate::predicate::Predicate;
    use crate::store::{HighlightSpec, StoreHit};
    use crate::StoreError;
    use async_trait::async_trait;
    use std::fs::{self, File};
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    /// Reads the file bytes as text; files containing `broken` fail.
    struct PlainTextExtractor;

    impl PdfExtractor for PlainTextExtractor {
        fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
            let text = fs::read_to_string(path)?;
            if text.contains("broken") {
                return Err(IngestError::PdfParse("broken".to_string()));
            }
            Ok(vec![PageText { number: 1, text }])
        }
    }

    #[derive(Default)]
    struct BatchStore {
        calls: AtomicUsize,
        fail_call: Option<usize>,
    }

    #[async_trait]
    impl DocumentStore for BatchStore {
        async fn count(&self, _predicate: &Predicate) -> Result<u64, StoreError> {
            Ok(0)
        }

        async fn search(
            &self,
            _predicate: &Predicate,
            _from: u64,
            _size: u64,
            _highlight: &HighlightSpec,
        ) -> Result<Vec<StoreHit>, StoreError> {
            Ok(Vec::new())
        }

        async fn bulk_index(&self, documents: &[Document]) -> Result<BulkOutcome, StoreError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if Some(call) == self.fail_call {
                return Err(StoreError::BackendResponse {
                    backend: "fake".to_string(),
                    status: 429,
                    details: "too many requests".to_string(),
                });
            }
            Ok(BulkOutcome {
                indexed: documents.len() as u64,
                failed: 0,
            })
        }

        async fn health(&self) -> Result<ClusterHealth, StoreError> {
            Ok(ClusterHealth::Green)
        }

        async fn index_exists(&self) -> Result<bool, StoreError> {
            Ok(true)
        }

        async fn ensure_index(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn document(name: &str) -> Document {
        Document {
            title: name.to_string(),
            content: "text".to_string(),
            file_path: format!("{name}.pdf"),
            uploaded_at: Utc::now().date_naive(),
        }
    }

    #[test]
    fn discover_pdf_files_is_recursive() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        File::create(base.join("a.pdf")).and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(nested.join("b.PDF"))
            .and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(base.join("notes.txt")).and_then(|mut file| file.write_all(b"notes"))?;

        let files = discover_pdf_files(base);
        assert_eq!(files.len(), 2);
        Ok(())
    }

    #[test]
    fn document_id_is_stable_per_path() {
        assert_eq!(document_id("2020/a.pdf"), document_id("2020/a.pdf"));
        assert_ne!(document_id("2020/a.pdf"), document_id("2021/a.pdf"));
        assert_eq!(document_id("a.pdf").len(), 64);
    }

    #[test]
    fn document_uses_path_relative_to_root() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let nested = dir.path().join("2019").join("board");
        fs::create_dir_all(&nested)?;
        let path = nested.join("minutes.pdf");
        fs::write(&path, "minutes of the meeting")?;

        let document = build_document(dir.path(), &path, &PlainTextExtractor)?
            .expect("file has text");

        assert_eq!(document.file_path, "2019/board/minutes.pdf");
        assert_eq!(document.title, "2019/board/minutes");
        assert_eq!(document.content, "minutes of the meeting");
        Ok(())
    }

    #[test]
    fn blank_document_is_skipped() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("blank.pdf");
        fs::write(&path, "  \n ")?;

        assert!(build_document(dir.path(), &path, &PlainTextExtractor)?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn collection_fails_without_pdfs() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let result = collect_documents(
            dir.path(),
            &IngestionOptions::default(),
            Arc::new(PlainTextExtractor),
        )
        .await;
        assert!(matches!(result, Err(IngestError::InvalidArgument(_))));
        Ok(())
    }

    #[tokio::test]
    async fn collection_skips_failures_and_keeps_order() -> Result<(), Box<dyn std::error::Error>>
    {
        let dir = tempdir()?;
        fs::write(dir.path().join("a.pdf"), "alpha")?;
        fs::write(dir.path().join("b.pdf"), "broken file")?;
        fs::write(dir.path().join("c.pdf"), "gamma")?;
        fs::write(dir.path().join("d.pdf"), " ")?;

        let options = IngestionOptions {
            batch_size: 10,
            workers: 2,
        };
        let report = collect_documents(dir.path(), &options, Arc::new(PlainTextExtractor)).await?;

        assert_eq!(report.files_found, 4);
        let paths = report
            .documents
            .iter()
            .map(|document| document.file_path.as_str())
            .collect::<Vec<_>>();
        assert_eq!(paths, vec!["a.pdf", "c.pdf"]);
        assert_eq!(report.skipped_files.len(), 2);
        assert!(report.skipped_files[0].path.ends_with("b.pdf"));
        Ok(())
    }

    #[tokio::test]
    async fn failed_batch_does_not_abort_the_run() {
        let store = BatchStore {
            fail_call: Some(1),
            ..BatchStore::default()
        };
        let documents = (0..5).map(|index| document(&format!("doc-{index}"))).collect::<Vec<_>>();

        let summary = load_in_batches(&store, &documents, 2).await;

        assert_eq!(summary.batches, 3);
        assert_eq!(summary.failed_batches, 1);
        assert_eq!(
            summary.outcome,
            BulkOutcome {
                indexed: 3,
                failed: 2
            }
        );
    }
}
