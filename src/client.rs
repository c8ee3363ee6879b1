//! Top-level client and error types.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

use crate::error::ApiFailure;
use crate::http::{ReqwestTransport, Transport};
use crate::options::ClientOptions;
use crate::runtime::ApiClient;
use crate::services::{MessagesService, MoneyBalancesService};

/// Errors that can occur during client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Malformed caller input, detected before anything is sent.
    #[error("Invalid argument '{name}': {reason}")]
    InvalidArgument { name: String, reason: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    /// A 2xx response whose body could not be read as the expected resource.
    #[error("Unreadable response body (status {status}, request id {request_id:?})")]
    UnreadableBody {
        status: StatusCode,
        request_id: Option<String>,
    },

    /// The server answered with a non-2xx status.
    #[error("{0}")]
    Api(Box<ApiFailure>),
}

impl ClientError {
    pub(crate) fn invalid_argument(name: &str, reason: impl Into<String>) -> Self {
        ClientError::InvalidArgument {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the failure happened below the API layer and may succeed if sent again.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Http(e) => e.is_connect() || e.is_timeout() || e.is_request() || e.is_body(),
            ClientError::Transport(_) | ClientError::Timeout(_) => true,
            _ => false,
        }
    }

    /// The structured failure, when the server answered with an error status.
    pub fn api_failure(&self) -> Option<&ApiFailure> {
        match self {
            ClientError::Api(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<ApiFailure> for ClientError {
    fn from(failure: ApiFailure) -> Self {
        ClientError::Api(Box::new(failure))
    }
}

/// Client for the Falu API.
///
/// Owns the shared request runtime and hands out one service handle per
/// resource. Cloning is cheap; clones share the transport and options.
///
/// # Example
/// ```no_run
/// use falu::{ClientOptions, FaluClient};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = FaluClient::new(ClientOptions::new("fskt_test_123"))?;
///
///     let response = client.messages().get("msg_123", None).await?;
///     let message = response.ensure_success()?.into_resource();
///     println!("{:?}", message);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct FaluClient {
    api: ApiClient,
}

impl FaluClient {
    /// Create a client backed by a `reqwest` connection pool.
    pub fn new(options: ClientOptions) -> Result<Self, ClientError> {
        let transport = ReqwestTransport::new()?;
        Self::with_transport(options, Arc::new(transport))
    }

    /// Create a client over a caller-supplied transport.
    pub fn with_transport(
        options: ClientOptions,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            api: ApiClient::new(options, transport)?,
        })
    }

    /// The shared runtime, for operations without a dedicated service.
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn messages(&self) -> MessagesService {
        MessagesService::new(self.api.clone())
    }

    pub fn money_balances(&self) -> MoneyBalancesService {
        MoneyBalancesService::new(self.api.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::mock::MockTransport;

    #[test]
    fn test_client_requires_api_key() {
        let transport = Arc::new(MockTransport::new());
        let err = FaluClient::with_transport(ClientOptions::default(), transport).unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn test_transient_classification() {
        assert!(ClientError::Transport("reset".to_string()).is_transient());
        assert!(ClientError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(!ClientError::Cancelled.is_transient());
        assert!(!ClientError::invalid_argument("id", "blank").is_transient());
    }
}
