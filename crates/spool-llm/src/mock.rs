use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use spool_core::errors::GatewayError;
use spool_core::provider::SummaryProvider;
use spool_core::summary::{SummaryOutline, SummaryRequest};

/// Pre-programmed responses for deterministic testing without a gateway.
pub enum MockSummary {
    /// Return this outline.
    Outline(SummaryOutline),
    /// Return an error from the summarize() call.
    Error(GatewayError),
    /// Wait a duration, then yield the inner response.
    Delay(Duration, Box<MockSummary>),
}

impl MockSummary {
    /// Convenience: a plain-text outline with no key points or entities.
    pub fn text(summary: &str) -> Self {
        Self::Outline(SummaryOutline::new(summary))
    }

    /// Convenience: wrap any response with a delay.
    pub fn delayed(delay: Duration, inner: MockSummary) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Mock provider that returns pre-programmed responses in sequence,
/// optionally falling back to a fixed outline once the sequence runs out.
pub struct MockSummaryProvider {
    responses: Vec<MockSummary>,
    fallback: Option<SummaryOutline>,
    call_count: AtomicUsize,
}

impl MockSummaryProvider {
    pub fn new(responses: Vec<MockSummary>) -> Self {
        Self {
            responses,
            fallback: None,
            call_count: AtomicUsize::new(0),
        }
    }

    /// A provider that answers every call with the same outline.
    pub fn fixed(outline: SummaryOutline) -> Self {
        Self {
            responses: Vec::new(),
            fallback: Some(outline),
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SummaryProvider for MockSummaryProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn summarize(&self, _request: &SummaryRequest) -> Result<SummaryOutline, GatewayError> {
        let idx = self.call_count.fetch_add(1, Ordering::Relaxed);

        let Some(response) = self.responses.get(idx) else {
            if let Some(fallback) = &self.fallback {
                return Ok(fallback.clone());
            }
            return Err(GatewayError::InvalidRequest(format!(
                "MockSummaryProvider: no response configured for call {idx}"
            )));
        };

        // Unroll nested delays iteratively to avoid recursive async.
        let mut current = response;
        loop {
            match current {
                MockSummary::Outline(outline) => return Ok(outline.clone()),
                MockSummary::Error(e) => return Err(e.clone()),
                MockSummary::Delay(duration, inner) => {
                    tokio::time::sleep(*duration).await;
                    current = inner;
                }
            }
        }
    }
}
