pub mod auth;
pub mod loader;
pub mod root;
pub mod security;
pub mod telemetry;
pub mod timeout;
pub mod validator;

pub use auth::AuthConfig;
pub use loader::load_from_path;
pub use root::{Config, ListenConfig, TtyConfig};
pub use security::SecurityConfig;
pub use telemetry::{LoggingConfig, TelemetryConfig};
pub use timeout::TimeoutConfig;
pub use validator::validate_config;
