pub mod gateway;
pub mod mock;

pub use gateway::{GatewayConfig, GatewayProvider};
pub use mock::{MockSummary, MockSummaryProvider};
