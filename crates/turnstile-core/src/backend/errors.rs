use thiserror::Error;

/// Classification of JSON-RPC errors returned by a ledger backend.
///
/// The category decides whether a failed call moves on to the next backend or is
/// surfaced to the caller immediately:
/// - Provider errors and rate limits are the backend's problem and fail over
/// - Execution errors are deterministic ledger refusals and never fail over
/// - Invalid params are the caller's problem and never fail over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcErrorCategory {
    /// Invalid request or invalid params (-32600, -32602).
    ClientError,
    /// Method not found (-32601). Usually a backend that lacks a namespace.
    Unsupported,
    /// Internal and server errors not attributable to the call itself.
    ProviderError,
    /// Rate limiting at JSON-RPC level (-32005).
    RateLimit,
    /// Parse error reported by the backend.
    ParseError,
    /// Execution errors (reverts, out of gas, nonce issues).
    ExecutionError,
}

impl RpcErrorCategory {
    /// Classifies a JSON-RPC error code and message into a category.
    ///
    /// Code `3` is the conventional "execution reverted" code used by geth-style nodes.
    /// Inside the -32000 to -32099 server range the message decides between an execution
    /// error and a provider error.
    #[must_use]
    pub fn from_code_and_message(code: i32, message: &str) -> Self {
        match code {
            3 => Self::ExecutionError,
            -32700 => Self::ParseError,
            -32601 => Self::Unsupported,
            -32602 | -32600 => Self::ClientError,
            -32603 => Self::ProviderError,
            -32005 => Self::RateLimit,
            -32099..=-32000 => {
                let message_lower = message.to_lowercase();
                if message_lower.contains("revert") ||
                    message_lower.contains("out of gas") ||
                    message_lower.contains("insufficient funds") ||
                    message_lower.contains("nonce too low") ||
                    message_lower.contains("gas too low") ||
                    message_lower.contains("gas required exceeds")
                {
                    Self::ExecutionError
                } else {
                    Self::ProviderError
                }
            }
            _ => Self::ProviderError,
        }
    }

    /// Returns `true` if the same call may succeed on a different backend.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimit | Self::ProviderError | Self::ParseError | Self::Unsupported)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientError => "client_error",
            Self::Unsupported => "unsupported",
            Self::ProviderError => "provider_error",
            Self::RateLimit => "rate_limit",
            Self::ParseError => "parse_error",
            Self::ExecutionError => "execution_error",
        }
    }
}

/// Errors that can occur when talking to a single ledger access backend.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BackendError {
    /// Request exceeded the configured timeout duration.
    #[error("Request timeout")]
    Timeout,

    /// Failed to establish a connection to the backend.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Non-2xx HTTP status. First field is the status code, second the body excerpt.
    #[error("HTTP error {0}: {1}")]
    HttpError(u16, String),

    /// JSON-RPC error object returned by the backend.
    #[error("RPC error {0}: {1}")]
    RpcError(i32, String, Option<serde_json::Value>),

    /// Network-level error from the underlying HTTP client.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Response could not be parsed or was malformed.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Maximum concurrent requests limit has been reached.
    #[error("Concurrency limit reached: {0}")]
    ConcurrencyLimit(String),
}

impl BackendError {
    /// Returns the RPC error category if this is an RPC error.
    #[must_use]
    pub fn rpc_category(&self) -> Option<RpcErrorCategory> {
        match self {
            Self::RpcError(code, message, _) => {
                Some(RpcErrorCategory::from_code_and_message(*code, message))
            }
            _ => None,
        }
    }

    /// Returns `true` if this error is a transport failure and the call should move on
    /// to the next eligible backend.
    ///
    /// Transport failures include:
    /// - Timeouts and connection or network errors
    /// - HTTP 5xx and 429
    /// - Malformed responses
    /// - Provider-side RPC errors and rate limits
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout |
            Self::Network(_) |
            Self::ConnectionFailed(_) |
            Self::InvalidResponse(_) |
            Self::ConcurrencyLimit(_) => true,
            Self::HttpError(status, _) => (500..=599).contains(status) || *status == 429,
            Self::RpcError(..) => self.rpc_category().is_some_and(|cat| cat.is_transient()),
        }
    }

    /// Returns `true` if the ledger deterministically refused the call.
    #[must_use]
    pub fn is_execution_error(&self) -> bool {
        self.rpc_category() == Some(RpcErrorCategory::ExecutionError)
    }

    /// Returns `true` if the backend rejected the arguments of the call.
    #[must_use]
    pub fn is_invalid_params(&self) -> bool {
        self.rpc_category() == Some(RpcErrorCategory::ClientError)
    }

    /// Returns `true` if this error means the backend could not be reached at all.
    ///
    /// Used by the health monitor to tell an unreachable backend from one that answered
    /// with an error.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        match self {
            Self::Timeout | Self::Network(_) | Self::ConnectionFailed(_) => true,
            Self::HttpError(status, _) => (500..=599).contains(status),
            _ => false,
        }
    }

    /// Returns the revert payload attached to an execution error, if any.
    #[must_use]
    pub fn revert_data(&self) -> Option<&str> {
        match self {
            Self::RpcError(_, _, Some(data)) => data.as_str().or_else(|| {
                data.get("data").and_then(serde_json::Value::as_str)
            }),
            _ => None,
        }
    }
}
