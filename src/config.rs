use clap::{Args, Parser, ValueEnum};
use std::time::Duration;

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub auth: AuthConfig,

    #[command(flatten)]
    pub routes: RouteConfig,

    #[command(flatten)]
    pub upstream: UpstreamConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

#[derive(Clone, Debug, Args)]
pub struct ServerConfig {
    /// Host to listen on
    #[arg(long, env = "SESSION_GATE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "SESSION_GATE_PORT", default_value_t = 3000)]
    pub port: u16,

    /// Port for the management (liveness) server
    #[arg(long, env = "SESSION_GATE_MGMT_PORT", default_value_t = 9090)]
    pub mgmt_port: u16,

    /// Seconds to wait for in-flight work during shutdown
    #[arg(long, env = "SESSION_GATE_SHUTDOWN_TIMEOUT_SECS", default_value_t = 5)]
    pub shutdown_timeout_secs: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

#[derive(Clone, Debug, Args)]
pub struct AuthConfig {
    /// Base URL of the auth service exposing /auth/refresh and /auth/login
    #[arg(long, env = "SESSION_GATE_AUTH_SERVICE_URL", default_value = "http://localhost:4000")]
    pub auth_service_url: String,

    /// Timeout for calls to the auth service in milliseconds
    #[arg(long, env = "SESSION_GATE_AUTH_TIMEOUT_MS", default_value_t = 5000)]
    pub request_timeout_ms: u64,

    /// Refresh proactively when the access token expires within this many seconds
    #[arg(long, env = "SESSION_GATE_REFRESH_LOOKAHEAD_SECS", default_value_t = 60)]
    pub refresh_lookahead_secs: u64,

    /// Deployment environment; cookies are marked Secure in production
    #[arg(long, env = "SESSION_GATE_ENVIRONMENT", value_enum, default_value_t = Environment::Development)]
    pub environment: Environment,
}

impl AuthConfig {
    #[must_use]
    pub const fn secure_cookies(&self) -> bool {
        matches!(self.environment, Environment::Production)
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    #[must_use]
    pub const fn refresh_lookahead(&self) -> Duration {
        Duration::from_secs(self.refresh_lookahead_secs)
    }
}

#[derive(Clone, Debug, Args)]
pub struct RouteConfig {
    /// Paths only reachable without a session (login, registration)
    #[arg(
        long,
        env = "SESSION_GATE_AUTH_ONLY_PATHS",
        default_value = "/login,/register",
        value_delimiter = ','
    )]
    pub auth_only_paths: Vec<String>,

    /// Path prefixes requiring a valid session
    #[arg(
        long,
        env = "SESSION_GATE_PRIVATE_PATHS",
        default_value = "/dashboard,/profile,/settings",
        value_delimiter = ','
    )]
    pub private_paths: Vec<String>,

    /// Login entry point
    #[arg(long, env = "SESSION_GATE_LOGIN_PATH", default_value = "/login")]
    pub login_path: String,

    /// Landing page for authenticated users
    #[arg(long, env = "SESSION_GATE_LANDING_PATH", default_value = "/dashboard")]
    pub landing_path: String,

    /// Notice shown on the login page after a session ends
    #[arg(
        long,
        env = "SESSION_GATE_EXPIRED_NOTICE",
        default_value = "Your session has expired. Please sign in again."
    )]
    pub expired_notice: String,
}

#[derive(Clone, Debug, Args)]
pub struct UpstreamConfig {
    /// Base URL of the page renderer that receives gated requests
    #[arg(long, env = "SESSION_GATE_UPSTREAM_URL", default_value = "http://localhost:3001")]
    pub upstream_url: String,

    /// Maximum request body forwarded upstream (Default: 10MB)
    #[arg(long, env = "SESSION_GATE_MAX_BODY_BYTES", default_value_t = 10_485_760)]
    pub max_body_bytes: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Args)]
pub struct TelemetryConfig {
    /// OTLP collector endpoint; traces and metrics are exported when set
    #[arg(long, env = "SESSION_GATE_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    /// Log output format
    #[arg(long, env = "SESSION_GATE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}
