//! Per-tool connection settings.

use std::fmt;
use std::time::Duration;

use backoff::ExponentialBackoff;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::RequestBuilder;

use crate::Tool;

/// Opaque credentials for one tool.
///
/// Supplied by the caller, attached to every request, never persisted and
/// never written to logs.
#[derive(Clone)]
pub enum AuthContext {
    /// API token sent as HTTP basic auth (`token:api_token`).
    BasicToken(String),
    /// Key sent in the `X-Api-Key` header.
    ApiKey(String),
    /// No credentials (local mock servers).
    Anonymous,
}

impl AuthContext {
    pub(crate) fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            AuthContext::BasicToken(token) => {
                let encoded = STANDARD.encode(format!("{}:api_token", token));
                request.header("Authorization", format!("Basic {}", encoded))
            }
            AuthContext::ApiKey(key) => request.header("X-Api-Key", key),
            AuthContext::Anonymous => request,
        }
    }
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthContext::BasicToken(_) => f.write_str("BasicToken(<redacted>)"),
            AuthContext::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
            AuthContext::Anonymous => f.write_str("Anonymous"),
        }
    }
}

/// Bounded retry for transient failures.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts including the first (minimum 1).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_interval: Duration,
    /// Cap on any single delay.
    pub max_interval: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// A config that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub(crate) fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_interval,
            current_interval: self.initial_interval,
            max_interval: self.max_interval,
            multiplier: 2.0,
            randomization_factor: 0.0,
            max_elapsed_time: None, // attempts are bounded instead
            ..Default::default()
        }
    }
}

/// Everything needed to reach one tool.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub tool: Tool,
    pub base_url: String,
    pub auth: AuthContext,
    /// Ceiling on concurrent requests, shared by every caller of this tool.
    pub max_in_flight: usize,
    /// Minimum gap between the starts of two requests.
    pub min_spacing: Duration,
    /// Items requested per page for paginated collections.
    pub page_size: u32,
    pub retry: RetryConfig,
}

impl ToolConfig {
    /// Defaults for the source tool, whose published limit is about one
    /// request per second.
    pub fn source(base_url: impl Into<String>, auth: AuthContext) -> Self {
        Self {
            tool: Tool::Source,
            base_url: base_url.into(),
            auth,
            max_in_flight: 1,
            min_spacing: Duration::from_millis(1000),
            page_size: 50,
            retry: RetryConfig::default(),
        }
    }

    /// Defaults for the target tool.
    pub fn target(base_url: impl Into<String>, auth: AuthContext) -> Self {
        Self {
            tool: Tool::Target,
            base_url: base_url.into(),
            auth,
            max_in_flight: 4,
            min_spacing: Duration::from_millis(250),
            page_size: 100,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    pub fn with_min_spacing(mut self, min_spacing: Duration) -> Self {
        self.min_spacing = min_spacing;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}
