use crate::ingest::document_id;
use crate::models::{parse_upload_date, BulkOutcome, ClusterHealth, Document};
use crate::predicate::Predicate;
use crate::store::{HighlightSpec, ScrollPage, StoreHit};
use crate::traits::{DocumentScroll, DocumentStore};
use crate::StoreError;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

const BACKEND: &str = "elasticsearch";
const SCROLL_KEEP_ALIVE: &str = "1m";

pub struct ElasticsearchStore {
    client: Arc<Client>,
    endpoint: String,
    index_name: String,
}

impl ElasticsearchStore {
    pub fn new(endpoint: impl Into<String>, index_name: impl Into<String>) -> Self {
        Self::with_client(Client::new(), endpoint, index_name)
    }

    pub fn with_client(
        client: Client,
        endpoint: impl Into<String>,
        index_name: impl Into<String>,
    ) -> Self {
        let endpoint: String = endpoint.into();
        Self {
            client: Arc::new(client),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            index_name: index_name.into(),
        }
    }

    /// Validates the endpoint and applies a per-request timeout.
    pub fn connect_to(
        endpoint: &str,
        index_name: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let url = Url::parse(endpoint)?;
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self::with_client(client, url.as_str(), index_name))
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Same cluster and client, another index.
    pub fn for_index(&self, index_name: impl Into<String>) -> Self {
        Self {
            client: Arc::clone(&self.client),
            endpoint: self.endpoint.clone(),
            index_name: index_name.into(),
        }
    }

    /// Names of the cluster's user indices, hidden `.`-prefixed ones excluded.
    pub async fn list_indices(&self) -> Result<Vec<String>, StoreError> {
        let response = self
            .client
            .get(format!("{}/_alias", self.endpoint))
            .send()
            .await?;

        let body: Value = self.checked(response).await?.json().await?;
        Ok(parse_index_names(&body))
    }

    fn index_url(&self, suffix: &str) -> String {
        format!("{}/{}{}", self.endpoint, self.index_name, suffix)
    }

    async fn checked(&self, response: Response) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(status, &body, &self.index_name))
    }
}

#[async_trait]
impl DocumentStore for ElasticsearchStore {
    async fn count(&self, predicate: &Predicate) -> Result<u64, StoreError> {
        let response = self
            .client
            .post(self.index_url("/_count"))
            .json(&json!({ "query": predicate.query() }))
            .send()
            .await?;

        let body: Value = self.checked(response).await?.json().await?;
        parse_count(&body)
    }

    async fn search(
        &self,
        predicate: &Predicate,
        from: u64,
        size: u64,
        highlight: &HighlightSpec,
    ) -> Result<Vec<StoreHit>, StoreError> {
        let body = search_body(predicate, from, size, highlight);
        debug!(index = %self.index_name, from, size, "issuing search");

        let response = self
            .client
            .post(self.index_url("/_search"))
            .json(&body)
            .send()
            .await?;

        let body: Value = self.checked(response).await?.json().await?;
        Ok(parse_hits(&body))
    }

    async fn bulk_index(&self, documents: &[Document]) -> Result<BulkOutcome, StoreError> {
        if documents.is_empty() {
            return Ok(BulkOutcome::default());
        }

        let mut operations = Vec::with_capacity(documents.len() * 2);
        for document in documents {
            operations.push(json!({
                "index": {
                    "_index": self.index_name,
                    "_id": document_id(&document.file_path),
                }
            }));
            operations.push(serde_json::to_value(document)?);
        }

        let payload: String = operations
            .into_iter()
            .map(|value| serde_json::to_string(&value))
            .collect::<Result<Vec<_>, serde_json::Error>>()?
            .join("\n")
            + "\n";

        let response = self
            .client
            .post(format!("{}/_bulk", self.endpoint))
            .header("Content-Type", "application/x-ndjson")
            .body(payload)
            .send()
            .await?;

        let body: Value = self.checked(response).await?.json().await?;
        Ok(parse_bulk_response(&body, documents.len()))
    }

    async fn health(&self) -> Result<ClusterHealth, StoreError> {
        let response = self
            .client
            .get(format!("{}/_cluster/health", self.endpoint))
            .send()
            .await?;

        let body: Value = self.checked(response).await?.json().await?;
        parse_health(&body)
    }

    async fn index_exists(&self) -> Result<bool, StoreError> {
        let response = self.client.head(self.index_url("")).send().await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(StoreError::BackendResponse {
                backend: BACKEND.to_string(),
                status: status.as_u16(),
                details: format!("unexpected status checking index {}", self.index_name),
            }),
        }
    }

    async fn ensure_index(&self) -> Result<(), StoreError> {
        if self.index_exists().await? {
            debug!(index = %self.index_name, "index already exists");
            return Ok(());
        }

        let response = self
            .client
            .put(self.index_url(""))
            .json(&index_definition())
            .send()
            .await?;

        self.checked(response).await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentScroll for ElasticsearchStore {
    async fn scroll_start(&self, batch_size: usize) -> Result<ScrollPage, StoreError> {
        let response = self
            .client
            .post(self.index_url(&format!("/_search?scroll={SCROLL_KEEP_ALIVE}")))
            .json(&json!({
                "size": batch_size,
                "sort": ["_doc"],
                "query": {"match_all": {}}
            }))
            .send()
            .await?;

        let body: Value = self.checked(response).await?.json().await?;
        Ok(parse_scroll_page(&body))
    }

    async fn scroll_next(&self, scroll_id: &str) -> Result<ScrollPage, StoreError> {
        let response = self
            .client
            .post(format!("{}/_search/scroll", self.endpoint))
            .json(&json!({
                "scroll": SCROLL_KEEP_ALIVE,
                "scroll_id": scroll_id,
            }))
            .send()
            .await?;

        let body: Value = self.checked(response).await?.json().await?;
        Ok(parse_scroll_page(&body))
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<(), StoreError> {
        let response = self
            .client
            .delete(format!("{}/_search/scroll", self.endpoint))
            .json(&json!({ "scroll_id": scroll_id }))
            .send()
            .await?;
        self.checked(response).await?;
        Ok(())
    }
}

fn index_definition() -> Value {
    json!({
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 0
        },
        "mappings": {
            "properties": {
                "title": {"type": "text"},
                "content": {"type": "text"},
                "file_path": {"type": "keyword"},
                "uploaded_at": {"type": "date"}
            }
        }
    })
}

fn search_body(predicate: &Predicate, from: u64, size: u64, highlight: &HighlightSpec) -> Value {
    let fields = highlight
        .fields
        .iter()
        .map(|field| {
            (
                field.clone(),
                json!({
                    "fragment_size": highlight.fragment_size,
                    "number_of_fragments": highlight.fragments,
                }),
            )
        })
        .collect::<Map<_, _>>();

    json!({
        "from": from,
        "size": size,
        "track_scores": true,
        "_source": ["title", "content", "file_path"],
        "query": predicate.query(),
        "highlight": {
            "pre_tags": [highlight.pre_tag],
            "post_tags": [highlight.post_tag],
            "fields": fields,
        }
    })
}

fn classify_failure(status: StatusCode, body: &str, index_name: &str) -> StoreError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let error_type = parsed
        .as_ref()
        .and_then(|value| value.pointer("/error/type"))
        .and_then(Value::as_str);

    if status == StatusCode::NOT_FOUND && error_type == Some("index_not_found_exception") {
        return StoreError::IndexNotFound(index_name.to_string());
    }

    let details = parsed
        .as_ref()
        .and_then(|value| value.pointer("/error/reason"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.chars().take(512).collect());

    StoreError::BackendResponse {
        backend: BACKEND.to_string(),
        status: status.as_u16(),
        details,
    }
}

fn parse_index_names(body: &Value) -> Vec<String> {
    let mut names = body
        .as_object()
        .map(|indices| {
            indices
                .keys()
                .filter(|name| !name.starts_with('.'))
                .cloned()
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    names.sort_unstable();
    names
}

fn parse_count(body: &Value) -> Result<u64, StoreError> {
    body.pointer("/count")
        .and_then(Value::as_u64)
        .ok_or_else(|| StoreError::BackendResponse {
            backend: BACKEND.to_string(),
            status: 200,
            details: "count response has no count field".to_string(),
        })
}

fn parse_health(body: &Value) -> Result<ClusterHealth, StoreError> {
    body.pointer("/status")
        .and_then(Value::as_str)
        .and_then(ClusterHealth::parse)
        .ok_or_else(|| StoreError::BackendResponse {
            backend: BACKEND.to_string(),
            status: 200,
            details: "cluster health response has no recognised status".to_string(),
        })
}

fn parse_hits(body: &Value) -> Vec<StoreHit> {
    let hits = body
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    hits.iter()
        .map(|raw| {
            let source = raw.pointer("/_source").cloned().unwrap_or(Value::Null);
            let text = |field: &str| {
                source
                    .get(field)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };

            let highlights = raw
                .pointer("/highlight")
                .and_then(Value::as_object)
                .map(|fields| {
                    fields
                        .iter()
                        .map(|(field, snippets)| {
                            let snippets = snippets
                                .as_array()
                                .map(|items| {
                                    items
                                        .iter()
                                        .filter_map(Value::as_str)
                                        .map(str::to_string)
                                        .collect()
                                })
                                .unwrap_or_default();
                            (field.clone(), snippets)
                        })
                        .collect::<BTreeMap<_, _>>()
                })
                .unwrap_or_default();

            StoreHit {
                id: raw
                    .pointer("/_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                score: raw.pointer("/_score").and_then(Value::as_f64).unwrap_or(0.0),
                title: text("title"),
                content: text("content"),
                file_path: text("file_path"),
                highlights,
            }
        })
        .collect()
}

fn parse_bulk_response(body: &Value, submitted: usize) -> BulkOutcome {
    let Some(items) = body.pointer("/items").and_then(Value::as_array) else {
        return BulkOutcome {
            indexed: 0,
            failed: submitted as u64,
        };
    };

    let mut outcome = BulkOutcome::default();
    for item in items {
        let action = item
            .as_object()
            .and_then(|actions| actions.values().next())
            .cloned()
            .unwrap_or(Value::Null);
        let status = action.pointer("/status").and_then(Value::as_u64).unwrap_or(0);
        let has_error = action.get("error").is_some_and(|error| !error.is_null());

        if (200..300).contains(&status) && !has_error {
            outcome.indexed += 1;
        } else {
            outcome.failed += 1;
        }
    }
    outcome
}

fn parse_scroll_page(body: &Value) -> ScrollPage {
    let documents = body
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .map(|hits| {
            hits.iter()
                .filter_map(|hit| hit.pointer("/_source"))
                .map(document_from_source)
                .collect()
        })
        .unwrap_or_default();

    ScrollPage {
        scroll_id: body
            .pointer("/_scroll_id")
            .and_then(Value::as_str)
            .map(str::to_string),
        documents,
    }
}

/// Reads a stored source leniently; older indices used `path`/`filename`.
pub fn document_from_source(source: &Value) -> Document {
    let first_text = |fields: &[&str]| {
        fields
            .iter()
            .find_map(|field| source.get(*field).and_then(Value::as_str))
            .unwrap_or_default()
            .to_string()
    };

    let uploaded_at = source
        .get("uploaded_at")
        .and_then(Value::as_str)
        .and_then(parse_upload_date)
        .unwrap_or_else(|| Utc::now().date_naive());

    Document {
        title: first_text(&["title", "filename"]),
        content: first_text(&["content"]),
        file_path: first_text(&["file_path", "path"]),
        uploaded_at,
    }
}
