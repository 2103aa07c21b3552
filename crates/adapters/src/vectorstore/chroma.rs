//! Chroma REST vector store adapter.

use corpus_sync_ports::{
    BoxFuture, SegmentForUpsert, SegmentKey, SegmentMetadata, VectorStorePort,
    VectorStoreProviderInfo,
};
use corpus_sync_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::Mutex;

/// Chroma REST adapter configuration.
#[derive(Debug, Clone)]
pub struct ChromaVectorStoreConfig {
    /// Base URL of the Chroma server.
    pub address: Box<str>,
    /// Collection name; created on first use.
    pub collection: Box<str>,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

/// Chroma REST vector store adapter.
pub struct ChromaVectorStore {
    provider: VectorStoreProviderInfo,
    client: reqwest::Client,
    base_url: Box<str>,
    collection: Box<str>,
    collection_id: Mutex<Option<Box<str>>>,
}

impl ChromaVectorStore {
    /// Create a Chroma adapter instance from configuration.
    pub fn new(config: ChromaVectorStoreConfig) -> Result<Self> {
        let address = config.address.trim_end_matches('/').to_owned();
        if address.is_empty() {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "Chroma address is required",
            ));
        }
        if config.collection.trim().is_empty() {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "collection must be non-empty",
            ));
        }
        if config.timeout_ms == 0 {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "timeout must be greater than zero",
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|error| {
                ErrorEnvelope::unexpected(
                    ErrorCode::new("store", "client_init_failed"),
                    format!("failed to build Chroma client: {error}"),
                    ErrorClass::NonRetriable,
                )
            })?;

        Ok(Self {
            provider: VectorStoreProviderInfo {
                id: "chroma".into(),
                name: "Chroma".into(),
            },
            client,
            base_url: address.into_boxed_str(),
            collection: config.collection,
            collection_id: Mutex::new(None),
        })
    }

    /// Resolve the collection id, creating the collection on first use.
    async fn collection_id(&self, ctx: &RequestContext) -> Result<Box<str>> {
        let mut cached = self.collection_id.lock().await;
        if let Some(id) = cached.as_ref() {
            return Ok(id.clone());
        }

        ctx.ensure_not_cancelled("chroma.ensure_collection")?;
        let url = format!("{}/api/v1/collections", self.base_url);
        let body = CreateCollectionRequest {
            name: self.collection.clone(),
            get_or_create: true,
        };
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|error| map_transport_error(&error))?;
        let status = response.status();
        let payload = response
            .bytes()
            .await
            .map_err(|error| map_transport_error(&error))?;
        if !status.is_success() {
            return Err(map_http_error(status, &payload));
        }

        let created: CreateCollectionResponse =
            serde_json::from_slice(&payload).map_err(|error| decode_error(&error))?;
        *cached = Some(created.id.clone());
        Ok(created.id)
    }

    async fn post_to_collection(
        &self,
        ctx: &RequestContext,
        operation: &'static str,
        endpoint: &str,
        body: Value,
    ) -> Result<()> {
        ctx.ensure_not_cancelled(operation)?;
        let collection_id = self.collection_id(ctx).await?;
        let url = format!(
            "{}/api/v1/collections/{collection_id}/{endpoint}",
            self.base_url
        );

        let response = tokio::select! {
            () = ctx.cancelled() => {
                return Err(ErrorEnvelope::cancelled("operation cancelled")
                    .with_metadata("operation", operation));
            }
            result = self.client.post(&url).json(&body).send() => {
                result.map_err(|error| map_transport_error(&error))?
            }
        };

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let payload = response
            .bytes()
            .await
            .map_err(|error| map_transport_error(&error))?;
        Err(map_http_error(status, &payload))
    }
}

impl VectorStorePort for ChromaVectorStore {
    fn provider(&self) -> &VectorStoreProviderInfo {
        &self.provider
    }

    fn upsert(
        &self,
        ctx: &RequestContext,
        segments: Vec<SegmentForUpsert>,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            if segments.is_empty() {
                return Ok(());
            }

            let mut ids = Vec::with_capacity(segments.len());
            let mut embeddings = Vec::with_capacity(segments.len());
            let mut documents = Vec::with_capacity(segments.len());
            let mut metadatas = Vec::with_capacity(segments.len());
            for segment in segments {
                ids.push(segment.key.as_str().to_owned());
                embeddings.push(segment.vector.to_vec());
                documents.push(segment.content.to_string());
                metadatas.push(metadata_to_json(&segment.metadata));
            }

            let body = serde_json::json!({
                "ids": ids,
                "embeddings": embeddings,
                "documents": documents,
                "metadatas": metadatas,
            });
            self.post_to_collection(&ctx, "chroma.upsert", "upsert", body)
                .await
        })
    }

    fn delete(&self, ctx: &RequestContext, keys: Vec<SegmentKey>) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            if keys.is_empty() {
                return Ok(());
            }
            let ids: Vec<&str> = keys.iter().map(SegmentKey::as_str).collect();
            let body = serde_json::json!({ "ids": ids });
            self.post_to_collection(&ctx, "chroma.delete", "delete", body)
                .await
        })
    }

    fn count(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<u64>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("chroma.count")?;
            let collection_id = self.collection_id(&ctx).await?;
            let url = format!(
                "{}/api/v1/collections/{collection_id}/count",
                self.base_url
            );

            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|error| map_transport_error(&error))?;
            let status = response.status();
            let payload = response
                .bytes()
                .await
                .map_err(|error| map_transport_error(&error))?;
            if !status.is_success() {
                return Err(map_http_error(status, &payload));
            }
            serde_json::from_slice(&payload).map_err(|error| decode_error(&error))
        })
    }
}

#[derive(Debug, Serialize)]
struct CreateCollectionRequest {
    name: Box<str>,
    get_or_create: bool,
}

#[derive(Debug, Deserialize)]
struct CreateCollectionResponse {
    id: Box<str>,
}

fn metadata_to_json(metadata: &SegmentMetadata) -> Value {
    let mut map = serde_json::Map::new();
    map.insert(
        "source_tag".to_owned(),
        Value::String(metadata.source_tag.as_str().to_owned()),
    );
    map.insert(
        "path".to_owned(),
        Value::String(metadata.path.as_str().to_owned()),
    );
    map.insert("chunk_index".to_owned(), Value::from(metadata.chunk_index));
    map.insert(
        "total_chunks".to_owned(),
        Value::from(metadata.total_chunks),
    );
    for (key, value) in &metadata.attributes {
        map.entry(key.to_string()).or_insert_with(|| value.clone());
    }
    Value::Object(map)
}

fn map_transport_error(error: &reqwest::Error) -> ErrorEnvelope {
    if error.is_timeout() || error.is_connect() {
        return ErrorEnvelope::unexpected(
            ErrorCode::store_unavailable(),
            format!("Chroma is unreachable: {error}"),
            ErrorClass::Retriable,
        );
    }
    ErrorEnvelope::unexpected(
        ErrorCode::new("store", "request_failed"),
        format!("Chroma request failed: {error}"),
        ErrorClass::NonRetriable,
    )
}

fn map_http_error(status: StatusCode, payload: &[u8]) -> ErrorEnvelope {
    let message = String::from_utf8_lossy(payload);
    let message = message.trim();
    let message = if message.is_empty() {
        format!("Chroma request failed with status {status}")
    } else {
        format!("Chroma request failed with status {status}: {message}")
    };

    if status.is_server_error() {
        ErrorEnvelope::unexpected(ErrorCode::store_unavailable(), message, ErrorClass::Retriable)
            .with_metadata("status", status.as_u16().to_string())
    } else {
        ErrorEnvelope::unexpected(
            ErrorCode::new("store", "http_error"),
            message,
            ErrorClass::NonRetriable,
        )
        .with_metadata("status", status.as_u16().to_string())
    }
}

fn decode_error(error: &serde_json::Error) -> ErrorEnvelope {
    ErrorEnvelope::unexpected(
        ErrorCode::new("store", "invalid_response"),
        format!("failed to decode Chroma response: {error}"),
        ErrorClass::NonRetriable,
    )
}
