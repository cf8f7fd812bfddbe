//! HTTP surface: application state, route handlers and router construction.

use crate::error::{AppError, AppResult};
use crate::files::resolve_pdf_path;
use archive_search_core::{
    BulkOutcome, Document, DocumentStore, SearchCoordinator, SearchPage, SearchQuery,
};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

pub struct AppState<S> {
    pub coordinator: Arc<SearchCoordinator<S>>,
    pub pdf_root: Option<Arc<PathBuf>>,
    pub api_token: Option<Arc<str>>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            coordinator: Arc::clone(&self.coordinator),
            pdf_root: self.pdf_root.clone(),
            api_token: self.api_token.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub cluster_status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BulkResponse {
    pub status: String,
    pub indexed: u64,
    pub failed: u64,
}

impl From<BulkOutcome> for BulkResponse {
    fn from(outcome: BulkOutcome) -> Self {
        let status = if outcome.failed == 0 { "success" } else { "partial" };
        Self {
            status: status.to_string(),
            indexed: outcome.indexed,
            failed: outcome.failed,
        }
    }
}

pub async fn root_handler() -> Json<Value> {
    Json(json!({ "message": "Welcome to the PDF Search API" }))
}

pub async fn search_handler<S: DocumentStore + 'static>(
    State(state): State<AppState<S>>,
    payload: Result<Json<SearchQuery>, JsonRejection>,
) -> AppResult<Json<SearchPage>> {
    let Json(query) = payload?;
    let page = state
        .coordinator
        .paginate_search(&query.query, query.page)
        .await?;

    debug!(
        page = page.pagination.current_page,
        total = page.pagination.total_documents,
        returned = page.pagination.returned_documents,
        "search served"
    );
    Ok(Json(page))
}

pub async fn health_handler<S: DocumentStore + 'static>(
    State(state): State<AppState<S>>,
) -> AppResult<Json<HealthResponse>> {
    let status = state.coordinator.connection().health().await?;
    if !status.is_serving() {
        return Err(AppError::Http {
            status: StatusCode::SERVICE_UNAVAILABLE,
            code: "CLUSTER_UNHEALTHY",
            message: format!("cluster status is {}", status.as_str()),
        });
    }

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        cluster_status: status.as_str().to_string(),
    }))
}

pub async fn pdf_handler<S: DocumentStore + 'static>(
    State(state): State<AppState<S>>,
    Path(requested): Path<String>,
) -> AppResult<impl IntoResponse> {
    let root = state.pdf_root.as_ref().ok_or(AppError::NotFound)?;
    let path = resolve_pdf_path(root, &requested)
        .await
        .ok_or(AppError::NotFound)?;
    let bytes = tokio::fs::read(&path).await.map_err(|_| AppError::NotFound)?;

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("document.pdf")
        .replace('"', "");
    let disposition = HeaderValue::from_str(&format!("inline; filename=\"{file_name}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("inline"));

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/pdf")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

pub async fn bulk_handler<S: DocumentStore + 'static>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    payload: Result<Json<Vec<Document>>, JsonRejection>,
) -> AppResult<Json<BulkResponse>> {
    if let Some(expected) = &state.api_token {
        if bearer_token(&headers) != Some(expected.as_ref()) {
            return Err(AppError::Unauthorized);
        }
    }

    let Json(documents) = payload?;
    let outcome = state.coordinator.bulk_index(&documents).await?;
    info!(indexed = outcome.indexed, failed = outcome.failed, "bulk request indexed");
    Ok(Json(outcome.into()))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
}

pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins = origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin.trim()).ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

pub fn create_app<S: DocumentStore + 'static>(state: AppState<S>, cors: CorsLayer) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/search", post(search_handler::<S>))
        .route("/health", get(health_handler::<S>))
        .route("/pdf/{*path}", get(pdf_handler::<S>))
        .route("/api/documents/_bulk", post(bulk_handler::<S>))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use archive_search_core::{
        ClusterHealth, HighlightSpec, Predicate, StoreConnection, StoreError, StoreHit,
    };
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::{tempdir, TempDir};
    use tower::ServiceExt;

    struct TestStore {
        total: u64,
        health: Option<ClusterHealth>,
        fail_search: bool,
    }

    impl TestStore {
        fn with_total(total: u64) -> Self {
            Self {
                total,
                health: Some(ClusterHealth::Green),
                fail_search: false,
            }
        }
    }

    fn backend_error(details: &str) -> StoreError {
        StoreError::BackendResponse {
            backend: "test".to_string(),
            status: 500,
            details: details.to_string(),
        }
    }

    #[async_trait]
    impl DocumentStore for TestStore {
        async fn count(&self, _predicate: &Predicate) -> Result<u64, StoreError> {
            Ok(self.total)
        }

        async fn search(
            &self,
            _predicate: &Predicate,
            from: u64,
            size: u64,
            _highlight: &HighlightSpec,
        ) -> Result<Vec<StoreHit>, StoreError> {
            if self.fail_search {
                return Err(backend_error("query timed out"));
            }
            Ok((from..from + size)
                .map(|index| StoreHit {
                    id: index.to_string(),
                    score: 1.0,
                    title: format!("doc-{index}"),
                    content: "content".to_string(),
                    file_path: format!("archive/doc-{index}.pdf"),
                    highlights: BTreeMap::new(),
                })
                .collect())
        }

        async fn bulk_index(&self, documents: &[Document]) -> Result<BulkOutcome, StoreError> {
            Ok(BulkOutcome {
                indexed: documents.len() as u64,
                failed: 0,
            })
        }

        async fn health(&self) -> Result<ClusterHealth, StoreError> {
            self.health.ok_or_else(|| backend_error("connection refused"))
        }

        async fn index_exists(&self) -> Result<bool, StoreError> {
            Ok(true)
        }

        async fn ensure_index(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn app_with(store: TestStore, pdf_root: Option<&TempDir>, token: Option<&str>) -> Router {
        let connection = Arc::new(StoreConnection::new(store));
        let state = AppState {
            coordinator: Arc::new(SearchCoordinator::new(connection)),
            pdf_root: pdf_root.map(|dir| Arc::new(dir.path().to_path_buf())),
            api_token: token.map(Arc::from),
        };
        create_app(state, cors_layer(&["http://localhost:3000".to_string()]))
    }

    fn json_request(method: &str, uri: &str, body: String) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn root_says_welcome() {
        let app = app_with(TestStore::with_total(0), None, None);
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await["message"],
            "Welcome to the PDF Search API"
        );
    }

    #[tokio::test]
    async fn search_returns_pagination_and_results() {
        let app = app_with(TestStore::with_total(125), None, None);
        let response = app
            .oneshot(json_request(
                "POST",
                "/search",
                json!({"query": "budget", "page": 10}).to_string(),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(
            body["pagination"],
            json!({
                "current_page": 3,
                "total_pages": 3,
                "page_size": 25,
                "total_documents": 125,
                "returned_documents": 25
            })
        );
        assert_eq!(body["results"][0]["file_name"], "doc-100.pdf");
        assert_eq!(body["results"][0]["file_url"], "archive/doc-100.pdf");
        assert_eq!(body["results"][0]["highlights"]["content"], json!([]));
    }

    #[tokio::test]
    async fn empty_store_is_a_normal_response() {
        let app = app_with(TestStore::with_total(0), None, None);
        let response = app
            .oneshot(json_request("POST", "/search", json!({"query": "x", "page": 5}).to_string()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["pagination"]["current_page"], 1);
        assert_eq!(body["pagination"]["total_pages"], 1);
        assert_eq!(body["pagination"]["page_size"], 50);
        assert_eq!(body["results"], json!([]));
    }

    #[tokio::test]
    async fn unreachable_store_is_service_unavailable() {
        let store = TestStore {
            health: None,
            ..TestStore::with_total(10)
        };
        let app = app_with(store, None, None);
        let response = app
            .oneshot(json_request("POST", "/search", json!({"query": "x"}).to_string()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(response).await["error"], "BACKEND_UNAVAILABLE");
    }

    #[tokio::test]
    async fn failing_search_is_server_error() {
        let store = TestStore {
            fail_search: true,
            ..TestStore::with_total(10)
        };
        let app = app_with(store, None, None);
        let response = app
            .oneshot(json_request("POST", "/search", json!({"query": "x"}).to_string()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "SEARCH_EXECUTION_ERROR");
        assert!(body["message"].as_str().unwrap().contains("query timed out"));
    }

    #[tokio::test]
    async fn malformed_search_body_is_bad_request() {
        let app = app_with(TestStore::with_total(10), None, None);
        let response = app
            .oneshot(json_request("POST", "/search", "{\"page\": 1}".to_string()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_reports_cluster_status() {
        let app = app_with(TestStore::with_total(0), None, None);
        let response = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["cluster_status"], "green");

        let red = TestStore {
            health: Some(ClusterHealth::Red),
            ..TestStore::with_total(0)
        };
        let response = app_with(red, None, None)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn pdf_is_served_from_root() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("2019 board")).unwrap();
        fs::write(dir.path().join("2019 board/minutes.pdf"), b"%PDF-1.4 test").unwrap();

        let app = app_with(TestStore::with_total(0), Some(&dir), None);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/pdf/2019%20board/minutes.pdf")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/pdf"
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"%PDF-1.4 test");
    }

    #[tokio::test]
    async fn pdf_outside_root_or_wrong_type_is_not_found() {
        let outer = tempdir().unwrap();
        let root = outer.path().join("public");
        fs::create_dir_all(&root).unwrap();
        fs::write(outer.path().join("secret.pdf"), b"%PDF-1.4").unwrap();
        fs::write(root.join("notes.txt"), b"notes").unwrap();

        let connection = Arc::new(StoreConnection::new(TestStore::with_total(0)));
        let state = AppState {
            coordinator: Arc::new(SearchCoordinator::new(connection)),
            pdf_root: Some(Arc::new(root)),
            api_token: None,
        };
        let app = create_app(state, cors_layer(&[]));

        for uri in [
            "/pdf/%2E%2E/secret.pdf",
            "/pdf/..%2Fsecret.pdf",
            "/pdf/notes.txt",
            "/pdf/missing.pdf",
        ] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "uri {uri}");
        }
    }

    #[tokio::test]
    async fn page_beyond_i64_clamps_to_last_page() {
        let app = app_with(TestStore::with_total(125), None, None);
        let response = app
            .oneshot(json_request(
                "POST",
                "/search",
                r#"{"query": "x", "page": 99999999999999999999}"#.to_string(),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["pagination"]["current_page"], 3);
        assert_eq!(
            body["pagination"]["current_page"],
            body["pagination"]["total_pages"]
        );
        assert_eq!(body["pagination"]["returned_documents"], 25);
    }

    #[tokio::test]
    async fn bulk_accepts_timestamped_upload_dates() {
        let app = app_with(TestStore::with_total(0), None, None);
        let payload = json!([
            {"title": "a", "content": "alpha", "file_path": "a.pdf", "uploaded_at": "2024-04-27T10:00:00Z"}
        ])
        .to_string();

        let response = app
            .oneshot(json_request("POST", "/api/documents/_bulk", payload))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: BulkResponse = serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(body.status, "success");
        assert_eq!(body.indexed, 1);
    }

    #[tokio::test]
    async fn bulk_requires_configured_token() {
        let app = app_with(TestStore::with_total(0), None, Some("s3cret"));
        let payload = json!([
            {"title": "a", "content": "alpha", "file_path": "a.pdf", "uploaded_at": "2024-04-27"},
            {"title": "b", "content": "beta", "file_path": "b.pdf"}
        ])
        .to_string();

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/documents/_bulk", payload.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let mut request = json_request("POST", "/api/documents/_bulk", payload);
        request.headers_mut().insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer s3cret"),
        );
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: BulkResponse = serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(body.status, "success");
        assert_eq!(body.indexed, 2);
        assert_eq!(body.failed, 0);
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let app = app_with(TestStore::with_total(0), None, None);
        let response = app
            .oneshot(Request::builder().uri("/invalid").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
