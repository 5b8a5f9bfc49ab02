//! Logging abstraction layer.
//!
//! The cache tiers log through a small leveled interface instead of a
//! concrete backend:
//!
//! - `Logger` trait: the interface the cache components use
//! - `TracingLogger`: production adapter that delegates to the `tracing` crate
//! - `NoOpLogger`: silent logger for tests and benchmarks
//!
//! Components accept an `Arc<dyn Logger>` and use the provided macros:
//!
//! ```
//! use pixcache::log::{Logger, NoOpLogger};
//! use pixcache::log_info;
//! use std::sync::Arc;
//!
//! let logger: Arc<dyn Logger> = Arc::new(NoOpLogger);
//! log_info!(logger, "cache ready");
//! ```

mod noop;
mod tracing_adapter;
mod r#trait;

pub use noop::NoOpLogger;
pub use r#trait::{LogLevel, Logger};
pub use tracing_adapter::TracingLogger;
