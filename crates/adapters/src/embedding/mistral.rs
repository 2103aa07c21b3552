//! Mistral embedding adapter.

use corpus_sync_ports::{
    BoxFuture, EmbedBatchRequest, EmbeddingPort, EmbeddingProviderInfo, EmbeddingVector,
};
use corpus_sync_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.mistral.ai";

/// Mistral embedding adapter configuration.
#[derive(Debug, Clone)]
pub struct MistralEmbeddingConfig {
    /// API key used for authentication.
    pub api_key: Box<str>,
    /// Embedding model name (e.g. `mistral-embed`).
    pub model: Box<str>,
    /// Base URL override (defaults to `https://api.mistral.ai`).
    pub base_url: Option<Box<str>>,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

/// Mistral embedding adapter implementation.
pub struct MistralEmbedding {
    provider: EmbeddingProviderInfo,
    client: reqwest::Client,
    endpoint: Box<str>,
    model: Box<str>,
}

impl MistralEmbedding {
    /// Create a new Mistral embedding adapter.
    pub fn new(config: &MistralEmbeddingConfig) -> Result<Self> {
        let api_key = config.api_key.trim();
        if api_key.is_empty() {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "api key must be set",
            ));
        }
        let model = config.model.trim();
        if model.is_empty() {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "model must be non-empty",
            ));
        }
        if config.timeout_ms == 0 {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "timeout must be greater than zero",
            ));
        }
        let base_url = config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_owned();
        if base_url.is_empty() {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "base url must be non-empty",
            ));
        }

        let mut headers = HeaderMap::new();
        let mut auth_header = HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|_| {
            ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "api key contains invalid header characters",
            )
        })?;
        auth_header.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth_header);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .default_headers(headers)
            .build()
            .map_err(|error| {
                ErrorEnvelope::unexpected(
                    ErrorCode::new("provider", "client_init_failed"),
                    format!("failed to build Mistral client: {error}"),
                    ErrorClass::NonRetriable,
                )
            })?;

        Ok(Self {
            provider: EmbeddingProviderInfo {
                id: "mistral".into(),
                name: "Mistral".into(),
            },
            client,
            endpoint: format!("{base_url}/v1/embeddings").into_boxed_str(),
            model: model.to_owned().into_boxed_str(),
        })
    }

    async fn send_request(
        &self,
        ctx: &RequestContext,
        request: MistralEmbeddingRequest,
    ) -> Result<MistralEmbeddingResponse> {
        ctx.ensure_not_cancelled("mistral_embedding.request")?;

        let response = tokio::select! {
            () = ctx.cancelled() => return Err(cancelled_error()),
            result = self.client.post(self.endpoint.as_ref()).json(&request).send() => {
                result.map_err(|error| map_transport_error(&error))?
            }
        };

        let status = response.status();
        let payload = tokio::select! {
            () = ctx.cancelled() => return Err(cancelled_error()),
            result = response.bytes() => result.map_err(|error| map_transport_error(&error))?,
        };

        if !status.is_success() {
            return Err(map_http_error(status, &payload));
        }

        serde_json::from_slice(&payload).map_err(|error| {
            ErrorEnvelope::unexpected(
                ErrorCode::new("provider", "invalid_response"),
                format!("failed to decode Mistral response: {error}"),
                ErrorClass::NonRetriable,
            )
        })
    }
}

impl EmbeddingPort for MistralEmbedding {
    fn provider(&self) -> &EmbeddingProviderInfo {
        &self.provider
    }

    fn embed_batch(
        &self,
        ctx: &RequestContext,
        request: EmbedBatchRequest,
    ) -> BoxFuture<'_, Result<Vec<EmbeddingVector>>> {
        let ctx = ctx.clone();
        let texts = request.texts;
        Box::pin(async move {
            if texts.is_empty() {
                return Err(ErrorEnvelope::expected(
                    ErrorCode::invalid_input(),
                    "embedding input must be non-empty",
                ));
            }
            let expected_count = texts.len();
            let request = MistralEmbeddingRequest {
                model: self.model.clone(),
                input: texts.into_iter().map(sanitize_text).collect(),
            };
            let response = self.send_request(&ctx, request).await?;
            map_embeddings(response, expected_count)
        })
    }
}

#[derive(Debug, Serialize)]
struct MistralEmbeddingRequest {
    model: Box<str>,
    input: Vec<Box<str>>,
}

#[derive(Debug, Deserialize)]
struct MistralEmbeddingResponse {
    data: Vec<MistralEmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct MistralEmbeddingDatum {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct MistralErrorResponse {
    message: Option<String>,
}

// The API rejects empty inputs; a single space embeds to a near-zero vector
// and keeps chunk indices aligned.
fn sanitize_text(text: Box<str>) -> Box<str> {
    if text.is_empty() { " ".into() } else { text }
}

fn cancelled_error() -> ErrorEnvelope {
    ErrorEnvelope::cancelled("operation cancelled")
        .with_metadata("operation", "mistral_embedding.request")
}

fn map_transport_error(error: &reqwest::Error) -> ErrorEnvelope {
    if error.is_timeout() {
        return ErrorEnvelope::unexpected(
            ErrorCode::timeout(),
            "Mistral request timed out",
            ErrorClass::Retriable,
        );
    }
    if error.is_connect() {
        return ErrorEnvelope::unexpected(
            ErrorCode::io(),
            format!("Mistral connection failed: {error}"),
            ErrorClass::Retriable,
        );
    }
    ErrorEnvelope::unexpected(
        ErrorCode::new("provider", "request_failed"),
        format!("Mistral request failed: {error}"),
        ErrorClass::NonRetriable,
    )
}

fn map_http_error(status: StatusCode, payload: &[u8]) -> ErrorEnvelope {
    let message = serde_json::from_slice::<MistralErrorResponse>(payload)
        .ok()
        .and_then(|parsed| parsed.message)
        .unwrap_or_else(|| format!("Mistral request failed with status {status}"));

    let envelope = match status.as_u16() {
        429 => {
            if message.to_ascii_lowercase().contains("quota") {
                ErrorEnvelope::expected(ErrorCode::provider_quota_exhausted(), message)
            } else {
                ErrorEnvelope::unexpected(
                    ErrorCode::provider_rate_limited(),
                    message,
                    ErrorClass::Retriable,
                )
            }
        },
        400 | 404 | 422 => ErrorEnvelope::expected(ErrorCode::invalid_input(), message),
        401 | 403 => ErrorEnvelope::expected(ErrorCode::new("provider", "unauthorized"), message),
        408 => ErrorEnvelope::unexpected(ErrorCode::timeout(), message, ErrorClass::Retriable),
        _ if status.is_server_error() => ErrorEnvelope::unexpected(
            ErrorCode::new("provider", "unavailable"),
            message,
            ErrorClass::Retriable,
        ),
        _ => ErrorEnvelope::unexpected(
            ErrorCode::new("provider", "http_error"),
            message,
            ErrorClass::NonRetriable,
        ),
    };

    envelope.with_metadata("status", status.as_u16().to_string())
}

fn map_embeddings(
    response: MistralEmbeddingResponse,
    expected_count: usize,
) -> Result<Vec<EmbeddingVector>> {
    if response.data.len() != expected_count {
        return Err(ErrorEnvelope::unexpected(
            ErrorCode::internal(),
            format!(
                "embedding response count mismatch (expected {expected_count}, got {})",
                response.data.len()
            ),
            ErrorClass::NonRetriable,
        ));
    }

    let mut slots: Vec<Option<EmbeddingVector>> = vec![None; expected_count];
    for datum in response.data {
        let slot = slots.get_mut(datum.index).ok_or_else(|| {
            ErrorEnvelope::unexpected(
                ErrorCode::internal(),
                "embedding response index out of range",
                ErrorClass::NonRetriable,
            )
        })?;
        if slot.is_some() {
            return Err(ErrorEnvelope::unexpected(
                ErrorCode::internal(),
                "embedding response index duplicated",
                ErrorClass::NonRetriable,
            ));
        }
        *slot = Some(EmbeddingVector::new(Arc::from(datum.embedding)));
    }

    slots
        .into_iter()
        .map(|slot| {
            slot.ok_or_else(|| {
                ErrorEnvelope::unexpected(
                    ErrorCode::internal(),
                    "embedding response is missing an index",
                    ErrorClass::NonRetriable,
                )
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(indices: &[usize]) -> MistralEmbeddingResponse {
        MistralEmbeddingResponse {
            data: indices
                .iter()
                .map(|&index| MistralEmbeddingDatum {
                    embedding: vec![index as f32, 0.5],
                    index,
                })
                .collect(),
        }
    }

    #[test]
    fn embeddings_are_reordered_by_index() {
        let vectors = map_embeddings(response(&[1, 0]), 2).expect("mapped vectors");
        assert_eq!(vectors[0].as_slice(), &[0.0, 0.5]);
        assert_eq!(vectors[1].as_slice(), &[1.0, 0.5]);
    }

    #[test]
    fn count_mismatch_is_rejected() {
        assert!(map_embeddings(response(&[0]), 2).is_err());
        assert!(map_embeddings(response(&[0, 0]), 2).is_err());
        assert!(map_embeddings(response(&[0, 5]), 2).is_err());
    }

    #[test]
    fn rate_limits_map_to_retriable() {
        let error = map_http_error(StatusCode::TOO_MANY_REQUESTS, b"{\"message\":\"slow down\"}");
        assert_eq!(error.code, ErrorCode::provider_rate_limited());
        assert!(error.class.is_retriable());
    }

    #[test]
    fn quota_exhaustion_is_permanent() {
        let error = map_http_error(
            StatusCode::TOO_MANY_REQUESTS,
            b"{\"message\":\"monthly quota exceeded\"}",
        );
        assert_eq!(error.code, ErrorCode::provider_quota_exhausted());
        assert!(!error.class.is_retriable());
    }

    #[test]
    fn client_errors_are_permanent() {
        let error = map_http_error(StatusCode::BAD_REQUEST, b"{\"message\":\"bad input\"}");
        assert!(!error.class.is_retriable());

        let error = map_http_error(StatusCode::INTERNAL_SERVER_ERROR, b"not json");
        assert!(error.class.is_retriable());
    }

    #[test]
    fn empty_texts_are_padded() {
        assert_eq!(sanitize_text("".into()).as_ref(), " ");
        assert_eq!(sanitize_text("text".into()).as_ref(), "text");
    }
}
