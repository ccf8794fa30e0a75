//! OpenAI-compatible embedding provider

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use crate::provider::{EmbeddingProvider, EmbeddingResult};
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(500);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Embedding provider speaking the OpenAI `/embeddings` protocol.
///
/// Works against api.openai.com and any server that mirrors its request and
/// response shapes. Inputs are sent in batches of `batch_size`; a rate-limited
/// batch is re-sent up to `max_retries` times, nothing else is retried.
pub struct OpenAiProvider {
    config: EmbedConfig,
    client: reqwest::Client,
    endpoint: String,
    retry_base_delay: Duration,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("config", &self.config)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl OpenAiProvider {
    /// Validate `config` and build the HTTP client.
    pub fn new(config: EmbedConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| EmbedError::unavailable_from("failed to build HTTP client", e))?;
        let endpoint = format!("{}/embeddings", config.base_url);
        tracing::info!(
            "Created OpenAI embedding provider: model={}, endpoint={}",
            config.model_name,
            endpoint
        );
        Ok(Self {
            config,
            client,
            endpoint,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
        })
    }

    /// Change the first backoff step. Later steps double it.
    pub fn with_retry_base_delay(self, retry_base_delay: Duration) -> Self {
        Self {
            retry_base_delay,
            ..self
        }
    }

    pub fn config(&self) -> &EmbedConfig {
        &self.config
    }

    fn check_input(&self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(EmbedError::invalid_input("text is empty"));
        }
        let chars = text.chars().count();
        if chars > self.config.max_input_chars {
            return Err(EmbedError::invalid_input(format!(
                "text has {chars} characters, limit is {}",
                self.config.max_input_chars
            )));
        }
        Ok(())
    }

    fn dimensions_param(&self) -> Option<usize> {
        // Only the v3 models accept a requested output size.
        self.config
            .dimension
            .filter(|_| self.config.model_name.starts_with("text-embedding-3"))
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut attempt = 0u32;
        loop {
            match self.send_batch(batch).await {
                Err(EmbedError::RateLimited { retry_after }) if attempt < self.config.max_retries => {
                    let delay = retry_delay(retry_after, self.retry_base_delay, attempt);
                    attempt += 1;
                    tracing::warn!(
                        "Embedding request rate limited, retry {}/{} in {:?}",
                        attempt,
                        self.config.max_retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    async fn send_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingsRequest {
            model: &self.config.model_name,
            input: batch,
            dimensions: self.dimensions_param(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, retry_after, &body));
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(e))?;
        let parsed: EmbeddingsResponse = serde_json::from_str(&body)
            .map_err(|e| EmbedError::unavailable_from("malformed embeddings response", e))?;
        let vectors = order_embeddings(parsed.data, batch.len())?;

        if let Some(expected) = self.config.expected_dimension() {
            if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
                return Err(EmbedError::unavailable(format!(
                    "provider returned {}-dimensional vector, expected {expected}",
                    bad.len()
                )));
            }
        }
        Ok(vectors)
    }

    fn map_transport_error(&self, err: reqwest::Error) -> EmbedError {
        if err.is_timeout() {
            EmbedError::Timeout {
                after: self.config.request_timeout,
            }
        } else {
            EmbedError::unavailable_from("embedding request failed", err)
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let result = self.embed_texts(&[text.to_string()]).await?;
        result
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::unavailable("provider returned no embedding"))
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        for text in texts {
            self.check_input(text)?;
        }

        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size) {
            tracing::debug!("Embedding batch of {} texts", batch.len());
            embeddings.extend(self.embed_batch(batch).await?);
        }

        let result = EmbeddingResult::new(embeddings);
        if result.embeddings.iter().any(|v| v.len() != result.dimension) {
            return Err(EmbedError::unavailable(
                "provider returned vectors of differing dimensions",
            ));
        }
        Ok(result)
    }

    fn embedding_dimension(&self) -> Option<usize> {
        self.config.expected_dimension()
    }

    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.config.model_name
    }
}

// A server-provided Retry-After wins over the backoff, within the same cap.
fn retry_delay(retry_after: Option<Duration>, base: Duration, attempt: u32) -> Duration {
    match retry_after {
        Some(delay) => delay.min(MAX_RETRY_DELAY),
        None => backoff_delay(base, attempt),
    }
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
        .min(MAX_RETRY_DELAY)
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn classify_status(status: StatusCode, retry_after: Option<Duration>, body: &str) -> EmbedError {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| format!("HTTP {status}"));

    match status {
        StatusCode::TOO_MANY_REQUESTS => EmbedError::RateLimited { retry_after },
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => EmbedError::unavailable(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            EmbedError::unavailable(format!("authentication failed: {message}"))
        }
        s if s.is_client_error() => EmbedError::invalid_input(message),
        _ => EmbedError::unavailable(message),
    }
}

fn order_embeddings(mut data: Vec<EmbeddingData>, expected: usize) -> Result<Vec<Vec<f32>>> {
    if data.len() != expected {
        return Err(EmbedError::unavailable(format!(
            "provider returned {} embeddings for {expected} inputs",
            data.len()
        )));
    }
    data.sort_by_key(|d| d.index);
    for (position, item) in data.iter().enumerate() {
        if item.index != position {
            return Err(EmbedError::unavailable(format!(
                "provider response has unexpected index {}",
                item.index
            )));
        }
        if item.embedding.is_empty() {
            return Err(EmbedError::unavailable("provider returned an empty vector"));
        }
    }
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn data(index: usize, embedding: Vec<f32>) -> EmbeddingData {
        EmbeddingData { index, embedding }
    }

    #[test]
    fn test_order_embeddings_reorders_by_index() {
        let ordered = order_embeddings(
            vec![data(1, vec![2.0]), data(0, vec![1.0]), data(2, vec![3.0])],
            3,
        )
        .unwrap();
        assert_eq!(ordered, vec![vec![1.0], vec![2.0], vec![3.0]]);
    }

    #[test]
    fn test_order_embeddings_rejects_bad_responses() {
        let short = order_embeddings(vec![data(0, vec![1.0])], 2).unwrap_err();
        assert!(matches!(short, EmbedError::Unavailable { .. }));

        let empty = order_embeddings(vec![data(0, vec![])], 1).unwrap_err();
        assert!(matches!(empty, EmbedError::Unavailable { .. }));

        let gap = order_embeddings(vec![data(0, vec![1.0]), data(5, vec![1.0])], 2).unwrap_err();
        assert!(matches!(gap, EmbedError::Unavailable { .. }));
    }

    #[test]
    fn test_classify_status() {
        let limited = classify_status(
            StatusCode::TOO_MANY_REQUESTS,
            Some(Duration::from_secs(2)),
            "",
        );
        assert!(matches!(
            limited,
            EmbedError::RateLimited {
                retry_after: Some(d)
            } if d == Duration::from_secs(2)
        ));

        let bad = classify_status(
            StatusCode::BAD_REQUEST,
            None,
            r#"{"error":{"message":"input too long"}}"#,
        );
        assert!(matches!(&bad, EmbedError::InvalidInput { message } if message == "input too long"));
        assert!(!bad.is_retriable());

        assert!(classify_status(StatusCode::UNAUTHORIZED, None, "").is_retriable());
        assert!(classify_status(StatusCode::BAD_GATEWAY, None, "oops").is_retriable());
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(800));
        assert_eq!(backoff_delay(base, 40), MAX_RETRY_DELAY);
    }

    #[test]
    fn test_retry_after_is_capped() {
        let base = Duration::from_millis(100);
        assert_eq!(
            retry_delay(Some(Duration::from_secs(86400)), base, 0),
            MAX_RETRY_DELAY
        );
        assert_eq!(
            retry_delay(Some(Duration::from_secs(2)), base, 5),
            Duration::from_secs(2)
        );
        assert_eq!(retry_delay(None, base, 1), Duration::from_millis(200));
    }

    #[test]
    fn test_retry_after_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);
        headers.insert(RETRY_AFTER, "3".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(3)));
        headers.insert(RETRY_AFTER, "Wed, 21 Oct 2015 07:28:00 GMT".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_new_rejects_missing_key() {
        let err = OpenAiProvider::new(EmbedConfig::new("", "text-embedding-ada-002")).unwrap_err();
        assert!(matches!(err, EmbedError::InvalidConfig { .. }));
    }

    /// Serve the canned HTTP responses in order, one per connection.
    async fn serve(responses: Vec<String>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                read_request(&mut socket).await;
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });
        format!("http://{addr}/v1")
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())?
                    })
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + content_length {
                    return;
                }
            }
        }
    }

    fn http_response(status: &str, extra_headers: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n{extra_headers}\r\n{body}",
            body.len()
        )
    }

    #[tokio::test]
    async fn test_embed_texts_against_local_server() {
        let body = r#"{"data":[{"index":1,"embedding":[0.0,1.0]},{"index":0,"embedding":[1.0,0.0]}]}"#;
        let base_url = serve(vec![http_response("200 OK", "", body)]).await;
        let provider = OpenAiProvider::new(
            EmbedConfig::new("sk-test", "local-model").with_base_url(base_url),
        )
        .unwrap();

        let result = provider
            .embed_texts(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();
        assert_eq!(result.dimension, 2);
        assert_eq!(result.embeddings, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried() {
        let ok = r#"{"data":[{"index":0,"embedding":[0.5,0.5]}]}"#;
        let base_url = serve(vec![
            http_response("429 Too Many Requests", "retry-after: 0\r\n", "{}"),
            http_response("200 OK", "", ok),
        ])
        .await;
        let provider = OpenAiProvider::new(
            EmbedConfig::new("sk-test", "local-model")
                .with_base_url(base_url)
                .with_max_retries(1),
        )
        .unwrap()
        .with_retry_base_delay(Duration::from_millis(1));

        let vector = provider.embed_text("hello").await.unwrap();
        assert_eq!(vector, vec![0.5, 0.5]);
    }

    #[tokio::test]
    async fn test_rate_limit_gives_up_after_max_retries() {
        let base_url = serve(vec![http_response(
            "429 Too Many Requests",
            "retry-after: 0\r\n",
            "{}",
        )])
        .await;
        let provider = OpenAiProvider::new(
            EmbedConfig::new("sk-test", "local-model")
                .with_base_url(base_url)
                .with_max_retries(0),
        )
        .unwrap();

        let err = provider.embed_text("hello").await.unwrap_err();
        assert!(matches!(err, EmbedError::RateLimited { .. }));
        assert!(err.is_retriable());
    }

    #[tokio::test]
    async fn test_invalid_input_is_rejected_locally() {
        let provider = OpenAiProvider::new(
            EmbedConfig::new("sk-test", "local-model")
                .with_base_url("http://127.0.0.1:9/v1")
                .with_max_input_chars(4),
        )
        .unwrap();

        let empty = provider.embed_text("   ").await.unwrap_err();
        assert!(matches!(empty, EmbedError::InvalidInput { .. }));
        let long = provider.embed_text("too long").await.unwrap_err();
        assert!(matches!(long, EmbedError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let provider = OpenAiProvider::new(
            EmbedConfig::new("sk-test", "local-model").with_base_url(format!("http://{addr}/v1")),
        )
        .unwrap();
        let err = provider.embed_text("hello").await.unwrap_err();
        assert!(err.is_retriable());
    }
}
