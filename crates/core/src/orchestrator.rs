use crate::connection::StoreConnection;
use crate::models::{BulkOutcome, Document, PaginationMeta, SearchPage};
use crate::pagination::PageWindow;
use crate::predicate::{MatchSettings, Predicate};
use crate::store::HighlightSpec;
use crate::traits::DocumentStore;
use crate::{SearchError, StoreError};
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_PAGE_SIZE: u64 = 50;

/// Pages search results out of a [`DocumentStore`].
///
/// Every call counts and then searches with the same [`Predicate`]. No state
/// is kept between calls beyond the shared connection.
pub struct SearchCoordinator<S> {
    connection: Arc<StoreConnection<S>>,
    settings: MatchSettings,
    highlight: HighlightSpec,
    page_size: u64,
}

impl<S> SearchCoordinator<S>
where
    S: DocumentStore,
{
    pub fn new(connection: Arc<StoreConnection<S>>) -> Self {
        Self::with_settings(connection, MatchSettings::default(), DEFAULT_PAGE_SIZE)
    }

    pub fn with_settings(
        connection: Arc<StoreConnection<S>>,
        settings: MatchSettings,
        page_size: u64,
    ) -> Self {
        let highlight = HighlightSpec::for_settings(&settings);
        Self {
            connection,
            settings,
            highlight,
            page_size: page_size.max(1),
        }
    }

    pub fn connection(&self) -> &Arc<StoreConnection<S>> {
        &self.connection
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub async fn paginate_search(
        &self,
        query: &str,
        requested_page: i64,
    ) -> Result<SearchPage, SearchError> {
        let store = self.connection.ready().await?;
        let predicate = Predicate::build(query, &self.settings);

        let total_documents = match store.count(&predicate).await {
            Ok(total) => total,
            Err(StoreError::IndexNotFound(index)) => {
                debug!(%index, "index missing, returning empty page");
                0
            }
            Err(error) => {
                if error.is_transport() {
                    self.connection.mark_unavailable();
                }
                return Err(SearchError::BackendUnavailable(error.to_string()));
            }
        };

        let Some(window) = PageWindow::compute(total_documents, requested_page, self.page_size)
        else {
            return Ok(SearchPage::empty(self.page_size));
        };

        let hits = store
            .search(
                &predicate,
                window.from_offset,
                window.effective_size,
                &self.highlight,
            )
            .await
            .map_err(|error| {
                warn!(%error, total_documents, page = window.current_page, "search failed after count");
                SearchError::SearchExecution(error.to_string())
            })?;

        let results = hits
            .into_iter()
            .take(window.effective_size as usize)
            .map(|hit| hit.into_result(&self.highlight))
            .collect::<Vec<_>>();

        Ok(SearchPage {
            pagination: PaginationMeta {
                current_page: window.current_page,
                total_pages: window.total_pages,
                page_size: window.effective_size,
                total_documents,
                returned_documents: results.len() as u64,
            },
            results,
        })
    }

    pub async fn bulk_index(&self, documents: &[Document]) -> Result<BulkOutcome, SearchError> {
        let store = self.connection.ready().await?;
        store.bulk_index(documents).await.map_err(|error| {
            if error.is_transport() {
                self.connection.mark_unavailable();
                SearchError::BackendUnavailable(error.to_string())
            } else {
                SearchError::SearchExecution(error.to_string())
            }
        })
    }
}
