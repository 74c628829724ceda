//! Error types shared across the crate.
//!
//! [`FetchError`] is the provider-neutral taxonomy every adapter maps its
//! failures into. [`ConfigError`] covers everything detected before the first
//! network call and is always fatal.

use thiserror::Error;

/// Why a single provider request failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The provider rejected the credentials.
    #[error("authentication rejected: {message}")]
    Authentication { message: String },

    /// The provider reported its own quota as exhausted.
    #[error("provider rate limit exceeded: {message}")]
    RateLimitExceeded { message: String },

    /// The provider answered but found no route between the two points.
    #[error("no route found: {message}")]
    NoRouteFound { message: String },

    /// The provider refused the request as malformed.
    #[error("invalid request (status {status}): {message}")]
    InvalidRequest { status: u16, message: String },

    /// Connection failures, timeouts and 5xx-class responses.
    #[error("transient network error: {message}")]
    TransientNetwork { message: String },

    /// The payload did not have the expected shape.
    #[error("malformed response: {message}")]
    MalformedResponse { message: String },
}

impl FetchError {
    /// Short stable label, used as a key in run reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Authentication { .. } => "authentication",
            Self::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Self::NoRouteFound { .. } => "no_route_found",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::TransientNetwork { .. } => "transient_network",
            Self::MalformedResponse { .. } => "malformed_response",
        }
    }

    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimitExceeded { .. } | Self::TransientNetwork { .. }
        )
    }

    /// Whether the remaining tasks of the same provider should be dropped.
    pub fn abandons_provider(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }

    pub(crate) fn no_route(message: impl Into<String>) -> Self {
        Self::NoRouteFound {
            message: message.into(),
        }
    }

    pub(crate) fn transient(message: impl Into<String>) -> Self {
        Self::TransientNetwork {
            message: message.into(),
        }
    }
}

/// Fatal problems found while preparing a run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid provider configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unsupported API provider: {0}")]
    UnknownProvider(String),

    #[error("provider {0} is configured more than once")]
    DuplicateProvider(String),

    #[error("baseline provider {0} is not enabled")]
    BaselineNotEnabled(String),

    #[error("provider {provider} is missing its {field}")]
    MissingCredential {
        provider: String,
        field: &'static str,
    },

    #[error("provider {provider} has invalid max-rpm: {value}")]
    InvalidBudget { provider: String, value: String },

    #[error("provider {provider} has invalid api-endpoint {endpoint}: {message}")]
    InvalidEndpoint {
        provider: String,
        endpoint: String,
        message: String,
    },

    #[error("invalid header {name}: {message}")]
    InvalidHeader { name: String, message: String },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("row {row}: invalid coordinates {value:?}: {message}")]
    InvalidCoordinates {
        row: usize,
        value: String,
        message: String,
    },

    #[error("input file {0} has no data rows")]
    EmptyInput(String),

    #[error("invalid departure times: {0}")]
    InvalidDeparture(String),

    #[error("unknown time zone: {0}")]
    UnknownTimeZone(String),

    #[error("outlier ratio must be a finite number above 1, got {0}")]
    InvalidOutlierRatio(f64),

    #[error("dataset is missing column {0}")]
    MissingColumn(String),

    #[error("row {row}: invalid value {value:?} in column {column}")]
    InvalidCell {
        row: usize,
        column: String,
        value: String,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}
