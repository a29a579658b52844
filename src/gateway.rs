//! Chat-completion gateway.
//!
//! Sends the (truncated) corpus and the user's query to an OpenAI-compatible
//! chat-completions endpoint (Mistral by default) and classifies the outcome
//! into a reply or a [`GatewayError`].
//!
//! # Cancellation
//!
//! Every call takes a [`CancellationToken`]. A token that is already
//! cancelled short-circuits before any network I/O; a token cancelled while
//! the request is in flight drops the request and yields
//! [`GatewayError::Cancelled`].
//!
//! # Classification
//!
//! | Outcome | Result |
//! |---|---|
//! | 2xx with `choices[0].message.content` | `Ok(reply)` |
//! | 402 / 429 | [`GatewayError::QuotaOrRateLimited`] |
//! | other non-2xx | [`GatewayError::Transport`] with the status |
//! | connect / timeout / IO | [`GatewayError::Transport`] without a status |
//! | 2xx with any other body | [`GatewayError::MalformedResponse`] |

use std::fmt;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;

/// Reply recorded when the user stops an analysis.
pub const STOPPED_REPLY: &str = "Analysis was stopped by the user.";

/// How the model should treat the documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnalysisMode {
    #[default]
    GeneralAnalysis,
    Summarize,
    BulletPoints,
    Simplify,
    ExtractKeyInsights,
}

impl AnalysisMode {
    pub const ALL: [AnalysisMode; 5] = [
        AnalysisMode::GeneralAnalysis,
        AnalysisMode::Summarize,
        AnalysisMode::BulletPoints,
        AnalysisMode::Simplify,
        AnalysisMode::ExtractKeyInsights,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            AnalysisMode::GeneralAnalysis => "General Analysis",
            AnalysisMode::Summarize => "Summarize",
            AnalysisMode::BulletPoints => "Bullet Points",
            AnalysisMode::Simplify => "Simplify",
            AnalysisMode::ExtractKeyInsights => "Extract Key Insights",
        }
    }

    /// Parses a mode label. Case, spaces, `-` and `_` are ignored, so
    /// `"bullet-points"` and `"Bullet Points"` agree. Unknown labels fall back
    /// to [`AnalysisMode::GeneralAnalysis`].
    pub fn from_label(label: &str) -> Self {
        let wanted = normalize(label);
        Self::ALL
            .into_iter()
            .find(|mode| normalize(mode.label()) == wanted)
            .unwrap_or_default()
    }

    pub fn system_instruction(&self) -> &'static str {
        match self {
            AnalysisMode::GeneralAnalysis => {
                "You are a helpful document analysis assistant specialized in understanding \
                 structured data from various document formats including Excel files. Analyze \
                 the documents and respond to the user's query with specific information from \
                 the documents. When Excel files are presented, focus on analyzing the tabular \
                 data and providing insights based on the column values and structure. Never \
                 claim you can't access the file - all relevant content has been extracted and \
                 provided to you in plain text format."
            }
            AnalysisMode::Summarize => {
                "You are a document summarization expert. Provide a concise summary of the \
                 documents, including any structured data they contain such as Excel \
                 spreadsheets. When Excel data is included, summarize the data found in each \
                 sheet, focusing on column headers and the types of information present."
            }
            AnalysisMode::BulletPoints => {
                "You are a document structuring expert. Convert the key points of the documents \
                 into bullet points. For Excel data, create bullet points for each sheet, \
                 highlighting the key columns and data patterns."
            }
            AnalysisMode::Simplify => {
                "You are a simplification expert. Rewrite the document content in simpler, more \
                 accessible language, including explanations of any structured data or Excel \
                 content."
            }
            AnalysisMode::ExtractKeyInsights => {
                "You are a data insights expert. Extract and explain the most important insights \
                 from these documents, especially focusing on patterns in any tabular data from \
                 Excel files."
            }
        }
    }
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn normalize(label: &str) -> String {
    label
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .flat_map(char::to_lowercase)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error(
        "Error: API rate limit or payment required. Status code: {0}. Your API key may be valid, \
         but your account doesn't have sufficient credits or has reached its rate limit."
    )]
    QuotaOrRateLimited(u16),
    #[error("Error calling completion API: {message}")]
    Transport { status: Option<u16>, message: String },
    #[error("Error: malformed completion response: {0}")]
    MalformedResponse(String),
    #[error("Analysis was stopped by the user.")]
    Cancelled,
}

/// Anything that can answer a query about a corpus.
#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(
        &self,
        corpus: &str,
        query: &str,
        mode: AnalysisMode,
        cancel: &CancellationToken,
    ) -> Result<String, GatewayError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
}

/// Longest prefix of `text` holding at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}

pub struct CompletionGateway {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f64,
    max_document_chars: usize,
    api_key: String,
}

impl CompletionGateway {
    pub fn new(config: &GatewayConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_document_chars: config.max_document_chars,
            api_key: api_key.into(),
        })
    }

    /// Builds a gateway with the key read from `config.api_key_env`.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let key = config.api_key()?;
        Self::new(config, key)
    }

    pub fn build_request(&self, corpus: &str, query: &str, mode: AnalysisMode) -> ChatRequest {
        let document = truncate_chars(corpus, self.max_document_chars);
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: mode.system_instruction().to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: format!("DOCUMENT CONTENT:\n{}\nQUERY: {}", document, query),
                },
            ],
            temperature: self.temperature,
        }
    }

    pub async fn complete(
        &self,
        corpus: &str,
        query: &str,
        mode: AnalysisMode,
        cancel: &CancellationToken,
    ) -> Result<String, GatewayError> {
        if cancel.is_cancelled() {
            info!("analysis cancelled before dispatch");
            return Err(GatewayError::Cancelled);
        }

        let request = self.build_request(corpus, query, mode);
        debug!(
            endpoint = %self.endpoint,
            model = %self.model,
            mode = mode.label(),
            corpus_chars = corpus.chars().count(),
            "sending completion request"
        );

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("analysis cancelled in flight");
                Err(GatewayError::Cancelled)
            }
            outcome = self.send(&request) => outcome,
        };
        if let Err(e) = &outcome {
            if *e != GatewayError::Cancelled {
                warn!(error = %e, "completion request failed");
            }
        }
        outcome
    }

    async fn send(&self, request: &ChatRequest) -> Result<String, GatewayError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| GatewayError::Transport {
                status: None,
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let code = status.as_u16();
            if code == 402 || code == 429 {
                return Err(GatewayError::QuotaOrRateLimited(code));
            }
            let body_text = response.text().await.unwrap_or_default();
            return Err(GatewayError::Transport {
                status: Some(code),
                message: format!("{} {}", status, body_text.trim()).trim_end().to_string(),
            });
        }

        let body_text = response.text().await.map_err(|e| GatewayError::Transport {
            status: Some(status.as_u16()),
            message: e.to_string(),
        })?;
        let json: serde_json::Value = serde_json::from_str(&body_text)
            .map_err(|e| GatewayError::MalformedResponse(format!("body is not JSON: {}", e)))?;
        parse_completion(&json)
    }
}

#[async_trait]
impl Completer for CompletionGateway {
    async fn complete(
        &self,
        corpus: &str,
        query: &str,
        mode: AnalysisMode,
        cancel: &CancellationToken,
    ) -> Result<String, GatewayError> {
        CompletionGateway::complete(self, corpus, query, mode, cancel).await
    }
}

fn parse_completion(json: &serde_json::Value) -> Result<String, GatewayError> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_owned)
        .ok_or_else(|| {
            GatewayError::MalformedResponse("missing choices[0].message.content".to_string())
        })
}
