//! Messaging-gateway interfaces.
//!
//! Inbound message events arrive from the gateway (text, location, or media);
//! outbound replies go back through its send endpoint with an API-key header.
//! Delivery is an external collaborator: the orchestration loop exposes the
//! sender to tool handlers via context but never calls it for the final reply.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub send_endpoint: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            send_endpoint: "http://localhost:3000/send".to_string(),
            api_key: String::new(),
            timeout_secs: 15,
        }
    }
}

/// Coordinates plus free-text description shared by the user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationContext {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub description: Option<String>,
}

/// Media payload attached to an inbound message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaContext {
    pub mimetype: String,
    /// Base64 payload as delivered by the gateway
    pub data: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

/// Inbound message event as posted by the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(alias = "phoneE164")]
    pub from: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, alias = "messageType")]
    pub message_type: Option<String>,
    #[serde(default)]
    pub location: Option<LocationContext>,
    #[serde(default)]
    pub media: Option<MediaContext>,
}

/// Seam for pushing a message out to a user
#[async_trait]
pub trait OutboundSender: Send + Sync {
    async fn send(&self, phone: &str, message: &str) -> anyhow::Result<()>;
}

/// HTTP implementation posting `{phoneE164, message}` to the gateway
pub struct HttpGateway {
    config: GatewayConfig,
    client: reqwest::Client,
}

impl HttpGateway {
    pub fn new(config: GatewayConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl OutboundSender for HttpGateway {
    async fn send(&self, phone: &str, message: &str) -> anyhow::Result<()> {
        let response = self
            .client
            .post(&self.config.send_endpoint)
            .header("X-API-Key", &self.config.api_key)
            .json(&serde_json::json!({
                "phoneE164": phone,
                "message": message,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("gateway send returned HTTP {}", response.status());
        }
        Ok(())
    }
}

/// Gateway double that records outbound sends
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingGateway {
    sent: std::sync::Mutex<Vec<(String, String)>>,
}

#[cfg(test)]
impl RecordingGateway {
    pub(crate) fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl OutboundSender for RecordingGateway {
    async fn send(&self, phone: &str, message: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((phone.to_string(), message.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_event_parses_gateway_shape() {
        let body = r#"{
            "event": "message",
            "phoneE164": "+2348012345678",
            "message": "Is the okada ban real?",
            "messageType": "text"
        }"#;
        let msg: InboundMessage = serde_json::from_str(body).unwrap();
        assert_eq!(msg.from, "+2348012345678");
        assert_eq!(msg.message_type.as_deref(), Some("text"));
        assert!(msg.location.is_none());
    }

    #[test]
    fn location_event_parses_without_text() {
        let body = r#"{
            "from": "+2348012345678",
            "messageType": "location",
            "location": {"latitude": 6.45, "longitude": 3.39, "description": "Lagos Island"}
        }"#;
        let msg: InboundMessage = serde_json::from_str(body).unwrap();
        assert!(msg.message.is_none());
        let loc = msg.location.unwrap();
        assert!((loc.latitude - 6.45).abs() < f64::EPSILON);
        assert_eq!(loc.description.as_deref(), Some("Lagos Island"));
    }
}
