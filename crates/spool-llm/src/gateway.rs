use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use spool_core::errors::GatewayError;
use spool_core::messages::TranscriptLine;
use spool_core::provider::SummaryProvider;
use spool_core::summary::{SummaryOutline, SummaryRequest};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const SUMMARIZE_PATH: &str = "/api/agent/summarize";

/// Connection settings for the external agent gateway.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub base_url: String,
    pub token: Option<SecretString>,
    pub model: String,
}

/// Summary provider backed by the agent gateway's summarize endpoint.
pub struct GatewayProvider {
    client: Client,
    config: GatewayConfig,
    endpoint: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SummarizeBody<'a> {
    model: &'a str,
    messages: &'a [TranscriptLine],
    max_summary_tokens: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummarizeReply {
    summary: String,
    #[serde(default)]
    key_points: Vec<String>,
    #[serde(default)]
    entities: Vec<String>,
}

impl GatewayProvider {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::NetworkError(format!("build HTTP client: {e}")))?;
        let endpoint = format!("{}{SUMMARIZE_PATH}", config.base_url.trim_end_matches('/'));

        Ok(Self {
            client,
            config,
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl SummaryProvider for GatewayProvider {
    fn name(&self) -> &str {
        "gateway"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    #[instrument(skip(self, request), fields(model = %self.config.model, lines = request.lines.len()))]
    async fn summarize(&self, request: &SummaryRequest) -> Result<SummaryOutline, GatewayError> {
        let body = SummarizeBody {
            model: &self.config.model,
            messages: &request.lines,
            max_summary_tokens: request.max_summary_tokens,
        };

        let mut req = self.client.post(&self.endpoint).json(&body);
        if let Some(token) = &self.config.token {
            req = req.bearer_auth(token.expose_secret());
        }

        let resp = req
            .send()
            .await
            .map_err(|e| GatewayError::NetworkError(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::from_status(status, body));
        }

        let reply: SummarizeReply = resp
            .json()
            .await
            .map_err(|e| GatewayError::InvalidRequest(format!("malformed gateway response: {e}")))?;

        Ok(SummaryOutline {
            summary: reply.summary,
            key_points: reply.key_points,
            entities: reply.entities,
        }
        .normalized())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spool_core::messages::Role;

    fn config(base_url: &str) -> GatewayConfig {
        GatewayConfig {
            base_url: base_url.into(),
            token: Some(SecretString::from("test-token")),
            model: "summary-compact".into(),
        }
    }

    #[test]
    fn provider_properties() {
        let provider = GatewayProvider::new(config("http://gateway.local:9100")).unwrap();
        assert_eq!(provider.name(), "gateway");
        assert_eq!(provider.model(), "summary-compact");
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let provider = GatewayProvider::new(config("http://gateway.local:9100/")).unwrap();
        assert_eq!(
            provider.endpoint(),
            "http://gateway.local:9100/api/agent/summarize"
        );
    }

    #[test]
    fn request_body_serializes_camel_case() {
        let lines = vec![TranscriptLine::new(Role::User, "hello")];
        let body = SummarizeBody {
            model: "summary-compact",
            messages: &lines,
            max_summary_tokens: 256,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["maxSummaryTokens"], 256);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hello");
    }

    #[test]
    fn reply_deserializes_with_missing_lists() {
        let reply: SummarizeReply =
            serde_json::from_str(r#"{"summary":"talked about plans"}"#).unwrap();
        assert_eq!(reply.summary, "talked about plans");
        assert!(reply.key_points.is_empty());
        assert!(reply.entities.is_empty());
    }

    #[tokio::test]
    async fn unreachable_gateway_is_network_error() {
        // Port 1 on loopback: refused immediately, no real traffic.
        let provider = GatewayProvider::new(GatewayConfig {
            base_url: "http://127.0.0.1:1".into(),
            token: None,
            model: "summary-compact".into(),
        })
        .unwrap();
        let request = SummaryRequest {
            lines: vec![TranscriptLine::new(Role::User, "hi")],
            max_summary_tokens: 64,
        };
        let result = provider.summarize(&request).await;
        assert!(matches!(result, Err(GatewayError::NetworkError(_))));
    }
}
