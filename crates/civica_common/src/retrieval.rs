//! Retrieval-service client.
//!
//! The verification tool queries an external retrieval index for official
//! content about a claim. The service answers with either free text or a
//! ranked `matches` array; zero matches and no answer is the data-gap signal.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retrieval service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub endpoint: String,
    /// Index (chatbot) the query runs against
    pub index: String,
    pub namespace: Option<String>,
    pub top_k: usize,
    pub timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8100".to_string(),
            index: "civica-official".to_string(),
            namespace: None,
            top_k: 5,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RetrievalError {
    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request timeout after {0} seconds")]
    Timeout(u64),
}

/// One ranked passage of official content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalMatch {
    pub text: String,
    pub filename: Option<String>,
    pub source_url: Option<String>,
    pub chunk_index: Option<i64>,
    pub score: f64,
}

/// What the retrieval service found for a query
#[derive(Debug, Clone, Default)]
pub struct RetrievalResponse {
    /// Free-text answer, when the service synthesizes one
    pub answer: Option<String>,
    /// Ranked passages, best first
    pub matches: Vec<RetrievalMatch>,
}

impl RetrievalResponse {
    /// No answer and no matches: the data-gap trigger.
    pub fn is_empty(&self) -> bool {
        self.answer.as_deref().map_or(true, |a| a.trim().is_empty()) && self.matches.is_empty()
    }

    /// Combined passage text fed back to the model, best match first.
    pub fn combined_text(&self) -> String {
        if let Some(answer) = &self.answer {
            if !answer.trim().is_empty() {
                return answer.clone();
            }
        }
        self.matches
            .iter()
            .map(|m| m.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Source citations extracted from match metadata.
    pub fn sources(&self) -> Vec<String> {
        self.matches
            .iter()
            .filter_map(|m| {
                m.source_url
                    .clone()
                    .or_else(|| m.filename.clone())
            })
            .collect()
    }
}

/// Seam between the verification tool and the retrieval service
#[async_trait]
pub trait RetrievalIndex: Send + Sync {
    async fn query(&self, query: &str) -> Result<RetrievalResponse, RetrievalError>;
}

/// HTTP implementation posting `{indexName, namespace?, query, topK}`
pub struct HttpRetrievalIndex {
    config: RetrievalConfig,
    client: reqwest::Client,
}

impl HttpRetrievalIndex {
    pub fn new(config: RetrievalConfig) -> Result<Self, RetrievalError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RetrievalError::HttpError(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    answer: Option<String>,
    #[serde(default)]
    matches: Vec<WireMatch>,
}

#[derive(Debug, Deserialize)]
struct WireMatch {
    metadata: WireMetadata,
    #[serde(default)]
    score: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMetadata {
    text: String,
    filename: Option<String>,
    source_url: Option<String>,
    chunk_index: Option<i64>,
}

#[async_trait]
impl RetrievalIndex for HttpRetrievalIndex {
    async fn query(&self, query: &str) -> Result<RetrievalResponse, RetrievalError> {
        let mut body = serde_json::json!({
            "indexName": self.config.index,
            "query": query,
            "topK": self.config.top_k,
        });
        if let Some(ns) = &self.config.namespace {
            body["namespace"] = serde_json::Value::String(ns.clone());
        }

        let response = self
            .client
            .post(&self.config.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RetrievalError::Timeout(self.config.timeout_secs)
                } else {
                    RetrievalError::HttpError(format!("Request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            return Err(RetrievalError::HttpError(format!(
                "HTTP {} from retrieval service",
                response.status()
            )));
        }

        let wire: WireResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        Ok(RetrievalResponse {
            answer: wire.answer,
            matches: wire
                .matches
                .into_iter()
                .map(|m| RetrievalMatch {
                    text: m.metadata.text,
                    filename: m.metadata.filename,
                    source_url: m.metadata.source_url,
                    chunk_index: m.metadata.chunk_index,
                    score: m.score,
                })
                .collect(),
        })
    }
}

/// Scripted retrieval index for tests
#[cfg(test)]
pub(crate) struct StaticRetrieval {
    response: Option<RetrievalResponse>,
}

#[cfg(test)]
impl StaticRetrieval {
    pub(crate) fn with(response: RetrievalResponse) -> Self {
        Self {
            response: Some(response),
        }
    }

    pub(crate) fn empty() -> Self {
        Self::with(RetrievalResponse::default())
    }

    pub(crate) fn failing() -> Self {
        Self { response: None }
    }
}

#[cfg(test)]
#[async_trait]
impl RetrievalIndex for StaticRetrieval {
    async fn query(&self, _query: &str) -> Result<RetrievalResponse, RetrievalError> {
        match &self.response {
            Some(r) => Ok(r.clone()),
            None => Err(RetrievalError::HttpError("connection refused".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_response_with_matches_parses() {
        let body = r#"{
            "matches": [
                {"metadata": {"text": "Official gazette text", "filename": "gazette.pdf",
                              "sourceUrl": "https://gov.example/gazette", "chunkIndex": 3},
                 "score": 0.91},
                {"metadata": {"text": "Second passage"}, "score": 0.52}
            ]
        }"#;
        let wire: WireResponse = serde_json::from_str(body).unwrap();
        assert_eq!(wire.matches.len(), 2);
        assert_eq!(
            wire.matches[0].metadata.source_url.as_deref(),
            Some("https://gov.example/gazette")
        );
    }

    #[test]
    fn empty_response_is_the_data_gap_signal() {
        let empty = RetrievalResponse::default();
        assert!(empty.is_empty());

        let blank_answer = RetrievalResponse {
            answer: Some("   ".to_string()),
            matches: vec![],
        };
        assert!(blank_answer.is_empty());

        let with_answer = RetrievalResponse {
            answer: Some("The ban applies statewide.".to_string()),
            matches: vec![],
        };
        assert!(!with_answer.is_empty());
    }

    #[test]
    fn combined_text_prefers_answer_then_joins_passages() {
        let resp = RetrievalResponse {
            answer: None,
            matches: vec![
                RetrievalMatch {
                    text: "first".into(),
                    filename: Some("a.pdf".into()),
                    source_url: None,
                    chunk_index: None,
                    score: 0.9,
                },
                RetrievalMatch {
                    text: "second".into(),
                    filename: None,
                    source_url: Some("https://x".into()),
                    chunk_index: None,
                    score: 0.4,
                },
            ],
        };
        assert_eq!(resp.combined_text(), "first\n\nsecond");
        assert_eq!(resp.sources(), vec!["a.pdf".to_string(), "https://x".to_string()]);
    }
}
