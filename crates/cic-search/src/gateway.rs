//! Model Gateway (C2)
//!
//! Routes every remote-model call through a single retry wrapper: 200
//! returns, 429/5xx rotate the active key and retry with backoff, anything
//! else fails immediately. Embeddings are also implemented as
//! [`cic_core::embed::Embedder`] so the Sync Engine can call through this
//! gateway without `cic-core` depending on this crate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use cic_core::embed::{EmbedError, Embedder};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::EmbeddingCache;
use crate::key_pool::KeyPool;

const MAX_ATTEMPTS: u32 = 5;
const BASE_DELAY_MS: u64 = 200;
const JITTER_MAX_MS: u64 = 150;

/// Observer for per-call latency, implemented by the agent crate's
/// Telemetry Sink. Kept as a narrow trait here so `cic-search` never depends
/// on `cic-agent`.
pub trait LatencyObserver: Send + Sync {
    fn record(&self, operation: &str, millis: u64);
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GenerateResult {
    pub text: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VisionResult {
    pub analysis: String,
    pub success: bool,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub embedding_model: String,
    pub generation_model: String,
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            generation_model: "gpt-4o-mini".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: ChatContent,
}

/// Plain text for ordinary completions, or the multimodal part list the
/// upstream vision-capable chat endpoint expects when an image is attached.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ChatContent {
    Text(String),
    Parts(Vec<ChatContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ChatContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

/// Base64 data-URL for an image attachment. Sniffs the JPEG magic bytes;
/// anything else is sent as PNG.
fn image_data_url(bytes: &[u8]) -> String {
    let mime = if bytes.starts_with(&[0xFF, 0xD8]) { "image/jpeg" } else { "image/png" };
    format!("data:{mime};base64,{}", base64::engine::general_purpose::STANDARD.encode(bytes))
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

pub struct ModelGateway {
    client: Client,
    config: GatewayConfig,
    keys: Arc<KeyPool>,
    cache: Arc<EmbeddingCache>,
    observer: Option<Arc<dyn LatencyObserver>>,
    jitter_cursor: AtomicU64,
}

enum CallOutcome<T> {
    Success(T),
    RateLimited,
    Fatal(String),
}

impl ModelGateway {
    pub fn new(config: GatewayConfig, keys: Arc<KeyPool>, cache: Arc<EmbeddingCache>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            config,
            keys,
            cache,
            observer: None,
            jitter_cursor: AtomicU64::new(0),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn LatencyObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    fn record_latency(&self, operation: &str, started: Instant) {
        if let Some(observer) = &self.observer {
            observer.record(operation, started.elapsed().as_millis() as u64);
        }
    }

    /// Shallow jitter while unseen keys remain in the pool this attempt;
    /// exponential growth once the pool is exhausted within the attempt.
    fn backoff_delay(&self, attempt: u32, keys_seen_this_call: usize) -> Duration {
        if keys_seen_this_call < self.keys.active_count().max(1) {
            let tick = self.jitter_cursor.fetch_add(1, Ordering::Relaxed);
            let jitter = (tick * 37 + u64::from(attempt) * 11) % JITTER_MAX_MS;
            Duration::from_millis(jitter)
        } else {
            Duration::from_millis(BASE_DELAY_MS * 2u64.pow(attempt.min(5)))
        }
    }

    /// Sleep `delay`, but never in slices longer than 100ms so a cancellation
    /// signal can interrupt between slices (spec.md §5).
    async fn interruptible_sleep(delay: Duration) {
        let mut remaining = delay;
        let granule = Duration::from_millis(100);
        while remaining > Duration::ZERO {
            let slice = remaining.min(granule);
            tokio::time::sleep(slice).await;
            remaining -= slice;
        }
    }

    fn auth_header(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.keys.current() {
            Some(key) => request.header("Authorization", format!("Bearer {key}")),
            None => request,
        }
    }

    async fn send_embeddings(&self, texts: &[String]) -> CallOutcome<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));
        let body = EmbeddingsRequest {
            model: &self.config.embedding_model,
            input: texts.to_vec(),
        };
        let request = self.auth_header(self.client.post(&url).json(&body));
        match request.send().await {
            Ok(resp) => classify_response(resp.status(), || async {
                resp.json::<EmbeddingsResponse>()
                    .await
                    .map(|r| r.data.into_iter().map(|d| d.embedding).collect())
                    .map_err(|e| e.to_string())
            })
            .await,
            Err(err) => CallOutcome::Fatal(err.to_string()),
        }
    }

    async fn send_chat(
        &self,
        prompt: &str,
        max_tokens: u32,
        stop: Vec<&str>,
        image: Option<&[u8]>,
    ) -> CallOutcome<GenerateResult> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let content = match image {
            Some(bytes) => ChatContent::Parts(vec![
                ChatContentPart::Text { text: prompt.to_string() },
                ChatContentPart::ImageUrl { image_url: ImageUrl { url: image_data_url(bytes) } },
            ]),
            None => ChatContent::Text(prompt.to_string()),
        };
        let body = ChatRequest {
            model: &self.config.generation_model,
            messages: vec![ChatMessage { role: "user", content }],
            max_tokens,
            stop,
        };
        let request = self.auth_header(self.client.post(&url).json(&body));
        match request.send().await {
            Ok(resp) => classify_response(resp.status(), || async {
                let parsed = resp.json::<ChatResponse>().await.map_err(|e| e.to_string())?;
                let text = parsed
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message.content)
                    .unwrap_or_default();
                let (prompt_tokens, completion_tokens, total_tokens) = parsed
                    .usage
                    .map(|u| (u.prompt_tokens, u.completion_tokens, u.total_tokens))
                    .unwrap_or((0, 0, 0));
                Ok(GenerateResult {
                    text,
                    prompt_tokens,
                    completion_tokens,
                    total_tokens,
                    success: true,
                })
            })
            .await,
            Err(err) => CallOutcome::Fatal(err.to_string()),
        }
    }

    /// The shared retry loop: 200 returns; 429/5xx rotate+retry (≤5 attempts
    /// total); any other status fails immediately.
    async fn with_retry<T, F, Fut>(&self, mut call: F) -> Result<T, String>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = CallOutcome<T>>,
    {
        let mut last_error = String::from("no attempts made");
        let mut keys_seen = std::collections::HashSet::new();
        if let Some(k) = self.keys.current() {
            keys_seen.insert(k.to_string());
        }

        for attempt in 0..MAX_ATTEMPTS {
            match call().await {
                CallOutcome::Success(value) => return Ok(value),
                CallOutcome::RateLimited => {
                    self.keys.report_rate_limit();
                    if let Some(k) = self.keys.current() {
                        keys_seen.insert(k.to_string());
                    }
                    last_error = "rate limited".to_string();
                    if attempt + 1 < MAX_ATTEMPTS {
                        let delay = self.backoff_delay(attempt, keys_seen.len());
                        Self::interruptible_sleep(delay).await;
                    }
                }
                CallOutcome::Fatal(msg) => return Err(msg),
            }
        }
        Err(last_error)
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, String> {
        let vectors = self.embed_batch_internal(vec![text.to_string()]).await?;
        Ok(vectors.into_iter().next().unwrap_or_default())
    }

    async fn embed_batch_internal(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, String> {
        let mut results = vec![Vec::new(); texts.len()];
        let mut to_fetch = Vec::new();
        let mut fetch_indices = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            if let Some(cached) = self.cache.get(text) {
                results[i] = cached;
            } else {
                to_fetch.push(text.clone());
                fetch_indices.push(i);
            }
        }

        if !to_fetch.is_empty() {
            let started = Instant::now();
            let fetched = self.with_retry(|| self.send_embeddings(&to_fetch)).await?;
            self.record_latency("embed", started);
            for (offset, idx) in fetch_indices.into_iter().enumerate() {
                if let Some(vector) = fetched.get(offset) {
                    self.cache.put(texts[idx].clone(), vector.clone());
                    results[idx] = vector.clone();
                }
            }
        }

        Ok(results)
    }

    pub async fn generate(&self, prompt: &str) -> GenerateResult {
        let started = Instant::now();
        let result = self.with_retry(|| self.send_chat(prompt, 1024, vec![], None)).await;
        self.record_latency("generate", started);
        match result {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "generate failed after retries");
                GenerateResult { success: false, ..Default::default() }
            }
        }
    }

    /// Sends `prompt` alongside `image_bytes` as a multimodal chat turn so
    /// the vision-capable model actually sees the attachment (spec.md §4.2,
    /// §4.8), instead of silently falling back to a text-only completion.
    pub async fn generate_vision(&self, prompt: &str, image_bytes: &[u8]) -> VisionResult {
        let started = Instant::now();
        let result = self.with_retry(|| self.send_chat(prompt, 512, vec![], Some(image_bytes))).await;
        self.record_latency("generate_vision", started);
        match result {
            Ok(value) => VisionResult { analysis: value.text, success: true },
            Err(err) => {
                warn!(error = %err, "generate_vision failed after retries");
                VisionResult { success: false, ..Default::default() }
            }
        }
    }

    /// Bounded-output completion with a short stop list, used for ghost-text.
    pub async fn autocomplete(&self, prefix: &str) -> String {
        let started = Instant::now();
        let result = self
            .with_retry(|| self.send_chat(prefix, 64, vec!["\n\n", "```"], None))
            .await;
        self.record_latency("autocomplete", started);
        match result {
            Ok(value) => value.text,
            Err(err) => {
                debug!(error = %err, "autocomplete failed after retries");
                String::new()
            }
        }
    }
}

#[async_trait]
impl Embedder for ModelGateway {
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbedError> {
        self.embed_batch_internal(texts).await.map_err(EmbedError)
    }
}

async fn classify_response<T, F, Fut>(status: StatusCode, decode: F) -> CallOutcome<T>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, String>>,
{
    match status {
        StatusCode::OK => match decode().await {
            Ok(value) => CallOutcome::Success(value),
            Err(msg) => CallOutcome::Fatal(msg),
        },
        StatusCode::TOO_MANY_REQUESTS => CallOutcome::RateLimited,
        s if s.is_server_error() => CallOutcome::RateLimited,
        s => CallOutcome::Fatal(format!("request failed with status {s}")),
    }
}
