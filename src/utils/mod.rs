//! Shared utilities: error types, logging setup, and evaluation metrics.

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{Error, Result};
pub use logging::{init_logging, LogConfig};
pub use metrics::{ClassMetrics, ConfusionMatrix, Metrics};
