use crate::parse::parse_json_lenient;
use crate::tree::{KntNode, TraceNode};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_REGION_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_TRACE_TIMEOUT_MS: u64 = 60_000;

const REGION_PROMPT: &str = "You explain one region of a recorded method call tree. \
Reply with a JSON object with the string fields briefSummary, detailedBehaviour and flowRepresentation.";
const KNT_PROMPT: &str = "You explain what a program does from the key nodes of its call tree. \
Reply with a short plain-text explanation.";
const KNT_WITH_DATA_PROMPT: &str = "You explain what a program does from the key nodes of its call tree. \
Each node may carry a briefSummary of the region it starts. Reply with a plain-text explanation of the whole trace.";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("explanation request timed out after {0:?}")]
    Timeout(Duration),
    #[error("explanation request was cancelled")]
    Cancelled,
    #[error("no explanation provider url configured")]
    NotConfigured,
    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed provider response: {0}")]
    Decode(String),
}

/// Connection details of an OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub model: String,
    pub url: String,
    pub key: String,
}

impl ProviderConfig {
    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty()
    }
}

/// Result of explaining one region.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegionExplanation {
    pub brief_summary: String,
    pub detailed_behaviour: String,
    pub flow_representation: String,
    /// Set when the content is a stand-in rather than a model answer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RegionExplanation {
    pub fn fallback(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            brief_summary: format!("Explanation unavailable: {message}"),
            detailed_behaviour: String::new(),
            flow_representation: String::new(),
            error: Some(message),
        }
    }
}

/// Text generation backend used by the explainer.
///
/// Implementations do not enforce deadlines themselves; callers wrap each
/// call in [`with_deadline`].
#[async_trait]
pub trait ExplanationService: Send + Sync {
    async fn explain_region(&self, region: &TraceNode) -> Result<RegionExplanation, ServiceError>;

    /// Summary of a bare key-node tree.
    async fn explain_pure_knt(&self, knt: &KntNode) -> Result<String, ServiceError>;

    /// Summary of a key-node tree whose nodes carry region summaries.
    async fn explain_knt_with_data(&self, knt: &KntNode) -> Result<String, ServiceError>;
}

/// Run `call` until it finishes, `timeout` elapses or `token` is cancelled.
pub async fn with_deadline<T, F>(
    token: &CancellationToken,
    timeout: Duration,
    call: F,
) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, ServiceError>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(ServiceError::Cancelled),
        result = tokio::time::timeout(timeout, call) => match result {
            Ok(outcome) => outcome,
            Err(_) => Err(ServiceError::Timeout(timeout)),
        },
    }
}

/// [`ExplanationService`] over an OpenAI-compatible HTTP API.
pub struct HttpExplanationService {
    client: reqwest::Client,
    provider: ProviderConfig,
}

impl HttpExplanationService {
    pub fn new(provider: ProviderConfig) -> Result<Self, ServiceError> {
        if !provider.is_configured() {
            return Err(ServiceError::NotConfigured);
        }
        let client = reqwest::Client::builder()
            .user_agent(concat!("callscope/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, provider })
    }

    pub fn provider(&self) -> &ProviderConfig {
        &self.provider
    }

    fn endpoint(&self) -> String {
        let base = self.provider.url.trim().trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else {
            format!("{base}/chat/completions")
        }
    }

    async fn complete(&self, system: &str, user: String) -> Result<String, ServiceError> {
        let body = json!({
            "model": self.provider.model,
            "temperature": 0.2,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });

        let mut request = self.client.post(self.endpoint()).json(&body);
        if !self.provider.key.is_empty() {
            request = request.bearer_auth(&self.provider.key);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: Value = response.json().await?;
        payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| ServiceError::Decode("missing choices[0].message.content".to_string()))
    }
}

fn to_payload<T: Serialize>(value: &T) -> Result<String, ServiceError> {
    serde_json::to_string(value).map_err(|e| ServiceError::Decode(e.to_string()))
}

#[async_trait]
impl ExplanationService for HttpExplanationService {
    async fn explain_region(&self, region: &TraceNode) -> Result<RegionExplanation, ServiceError> {
        let reply = self.complete(REGION_PROMPT, to_payload(region)?).await?;
        serde_json::from_value(parse_json_lenient(&reply))
            .map_err(|e| ServiceError::Decode(e.to_string()))
    }

    async fn explain_pure_knt(&self, knt: &KntNode) -> Result<String, ServiceError> {
        self.complete(KNT_PROMPT, to_payload(knt)?).await
    }

    async fn explain_knt_with_data(&self, knt: &KntNode) -> Result<String, ServiceError> {
        self.complete(KNT_WITH_DATA_PROMPT, to_payload(knt)?).await
    }
}
