use async_trait::async_trait;

use crate::errors::GatewayError;
use crate::summary::{SummaryOutline, SummaryRequest};

/// Capability for turning a transcript window into a summary outline.
/// Implemented by the agent-gateway client in production and by a
/// deterministic mock in tests; the engine never calls a model directly.
#[async_trait]
pub trait SummaryProvider: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;

    async fn summarize(&self, request: &SummaryRequest) -> Result<SummaryOutline, GatewayError>;
}
