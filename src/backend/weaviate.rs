//! Weaviate REST and GraphQL adapter.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::error::{LoaderError, Result};
use crate::types::{DatasetVector, Identifier, IndexConfig, QueryParameter};

use super::{ItemStatus, VectorBackend};

/// Object property holding the dataset position.
const IDENTIFIER_PROPERTY: &str = "identifier";

/// Weaviate HTTP client.
pub struct WeaviateBackend {
    base_url: String,
    http: reqwest::Client,
}

impl WeaviateBackend {
    /// Build a client for `url`. No request is sent until the first call.
    pub fn new(url: &str, request_timeout: Duration, connect_timeout: Duration) -> Result<Self> {
        if url.trim().is_empty() {
            return Err(LoaderError::Config("database url must not be empty".into()));
        }
        let parsed = url::Url::parse(url)
            .map_err(|e| LoaderError::Config(format!("invalid database url {url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(LoaderError::Config(format!(
                "unsupported url scheme: {}",
                parsed.scheme()
            )));
        }

        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(16)
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| LoaderError::Connection {
                url: url.to_string(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            base_url: url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Deterministic object id, so a retried chunk overwrites instead of
    /// duplicating the objects that made it through.
    pub fn object_id(identifier: Identifier) -> Uuid {
        Uuid::from_u64_pair(0, identifier)
    }

    fn identifier_from_object_id(id: &str) -> Option<Identifier> {
        let uuid = Uuid::parse_str(id).ok()?;
        match uuid.as_u64_pair() {
            (0, identifier) => Some(identifier),
            _ => None,
        }
    }
}

/// Read status and body text from a failed response.
async fn failure(resp: reqwest::Response) -> (StatusCode, String) {
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    (status, text)
}

#[derive(Debug, Deserialize)]
struct BatchObjectResult {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    result: Option<BatchResult>,
}

#[derive(Debug, Deserialize)]
struct BatchResult {
    #[serde(default)]
    errors: Option<BatchErrors>,
}

#[derive(Debug, Deserialize)]
struct BatchErrors {
    #[serde(default)]
    error: Vec<ErrorMessage>,
}

#[derive(Debug, Deserialize)]
struct ErrorMessage {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    errors: Option<Vec<ErrorMessage>>,
}

#[derive(Debug, Deserialize)]
struct SchemaListing {
    #[serde(default)]
    classes: Vec<ClassName>,
}

#[derive(Debug, Deserialize)]
struct ClassName {
    class: String,
}

/// Map a batch response back onto the submitted vectors. Objects are matched
/// by id, falling back to response position.
fn item_statuses(vectors: &[DatasetVector], results: Vec<BatchObjectResult>) -> Vec<ItemStatus> {
    results
        .into_iter()
        .enumerate()
        .filter_map(|(pos, obj)| {
            let identifier = obj
                .id
                .as_deref()
                .and_then(WeaviateBackend::identifier_from_object_id)
                .or_else(|| vectors.get(pos).map(|v| v.identifier))?;
            let errors = obj
                .result
                .and_then(|r| r.errors)
                .map(|e| e.error.into_iter().map(|m| m.message).collect())
                .unwrap_or_default();
            Some(ItemStatus { identifier, errors })
        })
        .collect()
}

fn near_vector_query(class: &str, vector: &[f32], limit: usize) -> Result<String> {
    let vector = serde_json::to_string(vector)?;
    Ok(format!(
        "{{ Get {{ {class}(nearVector: {{vector: {vector}}}, limit: {limit}) {{ {IDENTIFIER_PROPERTY} }} }} }}"
    ))
}

fn ranked_identifiers(class: &str, data: Option<serde_json::Value>) -> Result<Vec<Identifier>> {
    let Some(hits) = data
        .as_ref()
        .and_then(|d| d.get("Get"))
        .and_then(|g| g.get(class))
    else {
        return Ok(Vec::new());
    };
    if hits.is_null() {
        return Ok(Vec::new());
    }
    let hits = hits
        .as_array()
        .ok_or_else(|| LoaderError::Query(format!("unexpected result shape for {class}")))?;

    hits.iter()
        .map(|hit| {
            hit.get(IDENTIFIER_PROPERTY)
                .and_then(|v| v.as_u64())
                .ok_or_else(|| LoaderError::Query(format!("result without {IDENTIFIER_PROPERTY}")))
        })
        .collect()
}

#[async_trait]
impl VectorBackend for WeaviateBackend {
    async fn ready(&self) -> Result<()> {
        let resp = self
            .http
            .get(self.url("/v1/.well-known/ready"))
            .send()
            .await
            .map_err(|e| LoaderError::Connection {
                url: self.base_url.clone(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let (status, text) = failure(resp).await;
            return Err(LoaderError::Connection {
                url: self.base_url.clone(),
                reason: format!("readiness probe failed ({status}): {text}"),
            });
        }
        Ok(())
    }

    async fn delete_class(&self, class: &str) -> Result<()> {
        let resp = self
            .http
            .delete(self.url(&format!("/v1/schema/{class}")))
            .send()
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            debug!(class, "class absent, nothing to delete");
            return Ok(());
        }
        if !resp.status().is_success() {
            let (status, text) = failure(resp).await;
            return Err(LoaderError::schema(class, format!("delete failed ({status}): {text}")));
        }
        Ok(())
    }

    async fn create_class(&self, config: &IndexConfig) -> Result<()> {
        let class = config.class_name();
        let body = serde_json::json!({
            "class": class,
            "vectorizer": "none",
            "vectorIndexType": "hnsw",
            "vectorIndexConfig": config.vector_index_config(),
            "properties": [
                { "name": IDENTIFIER_PROPERTY, "dataType": ["int"] }
            ],
        });

        let resp = self
            .http
            .post(self.url("/v1/schema"))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let (status, text) = failure(resp).await;
            return Err(LoaderError::schema(class, format!("create failed ({status}): {text}")));
        }
        Ok(())
    }

    async fn class_exists(&self, class: &str) -> Result<bool> {
        let resp = self
            .http
            .get(self.url(&format!("/v1/schema/{class}")))
            .send()
            .await?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => Ok(true),
            _ => {
                let (status, text) = failure(resp).await;
                Err(LoaderError::Status {
                    status: status.as_u16(),
                    body: text,
                })
            }
        }
    }

    async fn batch_insert(
        &self,
        class: &str,
        vectors: &[DatasetVector],
    ) -> Result<Vec<ItemStatus>> {
        let objects: Vec<serde_json::Value> = vectors
            .iter()
            .map(|v| {
                serde_json::json!({
                    "class": class,
                    "id": Self::object_id(v.identifier).to_string(),
                    "vector": v.values,
                    "properties": { IDENTIFIER_PROPERTY: v.identifier },
                })
            })
            .collect();
        let body = serde_json::json!({ "objects": objects });

        let resp = self
            .http
            .post(self.url("/v1/batch/objects"))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let (status, text) = failure(resp).await;
            return Err(LoaderError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let results: Vec<BatchObjectResult> = resp.json().await?;
        trace!(class, objects = results.len(), "batch response");
        Ok(item_statuses(vectors, results))
    }

    async fn update_index_parameter(
        &self,
        class: &str,
        parameter: QueryParameter,
        value: u64,
    ) -> Result<()> {
        let url = self.url(&format!("/v1/schema/{class}"));
        let resp = self.http.get(&url).send().await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(LoaderError::schema(class, "class does not exist"));
        }
        if !resp.status().is_success() {
            let (status, text) = failure(resp).await;
            return Err(LoaderError::schema(class, format!("read failed ({status}): {text}")));
        }

        let mut definition: serde_json::Value = resp.json().await?;
        let index_config = definition
            .as_object_mut()
            .ok_or_else(|| LoaderError::schema(class, "class definition is not an object"))?
            .entry("vectorIndexConfig")
            .or_insert_with(|| serde_json::json!({}));
        match index_config.as_object_mut() {
            Some(map) => {
                map.insert(parameter.as_str().to_string(), serde_json::json!(value));
            }
            None => return Err(LoaderError::schema(class, "vectorIndexConfig is not an object")),
        }

        let resp = self.http.put(&url).json(&definition).send().await?;
        if !resp.status().is_success() {
            let (status, text) = failure(resp).await;
            return Err(LoaderError::schema(class, format!("update failed ({status}): {text}")));
        }
        Ok(())
    }

    async fn near_vector(
        &self,
        class: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<Identifier>> {
        let body = serde_json::json!({ "query": near_vector_query(class, vector, limit)? });

        let resp = self
            .http
            .post(self.url("/v1/graphql"))
            .json(&body)
            .send()
            .await?;

        if resp.status() == StatusCode::SERVICE_UNAVAILABLE {
            return Err(LoaderError::NotReady {
                class: class.to_string(),
            });
        }
        if !resp.status().is_success() {
            let (status, text) = failure(resp).await;
            return Err(LoaderError::Query(format!("near-vector query failed ({status}): {text}")));
        }

        let response: GraphQlResponse = resp.json().await?;
        if let Some(errors) = response.errors.filter(|e| !e.is_empty()) {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            return Err(LoaderError::Query(messages.join("; ")));
        }
        ranked_identifiers(class, response.data)
    }

    async fn delete_all(&self) -> Result<()> {
        let resp = self.http.get(self.url("/v1/schema")).send().await?;
        if !resp.status().is_success() {
            let (status, text) = failure(resp).await;
            return Err(LoaderError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let listing: SchemaListing = resp.json().await?;
        for class in listing.classes {
            self.delete_class(&class.class).await?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "Weaviate"
    }

    fn endpoint(&self) -> &str {
        &self.base_url
    }
}
