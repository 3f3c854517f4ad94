pub mod metrics;
pub mod tracing_init;

pub use metrics::{serve_health, HealthSnapshot, Metrics};
pub use tracing_init::{init_tracing, shutdown_tracing};
