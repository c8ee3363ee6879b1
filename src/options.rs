//! Client-wide configuration.

use std::time::Duration;

use crate::client::ClientError;
use crate::retry::Backoff;
use crate::serializer::SerializerOptions;

/// Base address of the API.
pub const DEFAULT_BASE_URL: &str = "https://api.falu.io";

/// The API version this client conforms to.
pub const API_VERSION: &str = "2022-01-01";

/// Default number of retries made in addition to the first attempt.
pub const DEFAULT_RETRIES: u32 = 2;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(100);

/// A secret string type for sensitive data like API keys.
/// Prevents accidental logging or display of secrets.
#[derive(Clone)]
pub struct SecretString(String);

impl SecretString {
    /// Create a new secret string.
    pub fn new(s: String) -> Self {
        Self(s)
    }

    /// Get the underlying secret value.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretString([REDACTED])")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

/// Information about the application using the client.
///
/// Intended for third party plugins and services to identify themselves;
/// it is folded into the `User-Agent` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationInformation {
    pub name: String,
    pub version: Option<String>,
    pub url: Option<String>,
}

impl ApplicationInformation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            url: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Render as a `User-Agent` product token, e.g. `shop/1.2 (+https://shop.example)`.
    pub fn user_agent_token(&self) -> String {
        let mut token = self.name.clone();
        if let Some(version) = &self.version {
            token.push('/');
            token.push_str(version);
        }
        if let Some(url) = &self.url {
            token.push_str(&format!(" (+{url})"));
        }
        token
    }
}

/// Configuration shared read-only by every operation a client issues.
///
/// # Example
/// ```rust
/// use falu::options::ClientOptions;
/// use std::time::Duration;
///
/// let options = ClientOptions::new("fskt_test_123")
///     .with_retries(3)
///     .with_timeout(Duration::from_secs(30));
/// assert_eq!(options.retries, 3);
/// ```
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// API key for authenticating requests.
    pub api_key: Option<SecretString>,

    /// Maximum number of retries in addition to the first attempt.
    pub retries: u32,

    /// Base URL for API endpoints.
    pub base_url: String,

    /// Timeout applied to each attempt unless overridden per call.
    pub timeout: Duration,

    /// Delay schedule between attempts.
    pub backoff: Backoff,

    /// Optional identification of the calling application.
    pub application: Option<ApplicationInformation>,

    /// Serialization policy for request and response bodies.
    pub serializer: SerializerOptions,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            api_key: None,
            retries: DEFAULT_RETRIES,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            backoff: Backoff::default(),
            application: None,
            serializer: SerializerOptions::default(),
        }
    }
}

impl ClientOptions {
    /// Create options with an API key and defaults for everything else.
    pub fn new(api_key: impl Into<SecretString>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    /// Build options from `FALU_API_KEY`, `FALU_BASE_URL` and `FALU_RETRIES`.
    pub fn from_env() -> Result<Self, ClientError> {
        let api_key = std::env::var("FALU_API_KEY")
            .map_err(|_| ClientError::Config("FALU_API_KEY is not set".to_string()))?;
        let mut options = Self::new(api_key);

        if let Ok(base_url) = std::env::var("FALU_BASE_URL") {
            options.base_url = base_url;
        }
        if let Ok(retries) = std::env::var("FALU_RETRIES") {
            options.retries = retries
                .parse()
                .map_err(|_| ClientError::Config(format!("FALU_RETRIES is not a number: {retries}")))?;
        }
        Ok(options)
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the number of retries.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set the default timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the backoff schedule.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the application information.
    pub fn with_application(mut self, application: ApplicationInformation) -> Self {
        self.application = Some(application);
        self
    }

    /// Check that the options can be used to issue requests.
    pub fn validate(&self) -> Result<(), ClientError> {
        match &self.api_key {
            Some(key) if !key.expose_secret().trim().is_empty() => {}
            _ => return Err(ClientError::Config("API key is required".to_string())),
        }
        url::Url::parse(&self.base_url)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_is_redacted() {
        let options = ClientOptions::new("fskt_live_secret");
        let debug = format!("{:?}", options);
        assert!(!debug.contains("fskt_live_secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_defaults() {
        let options = ClientOptions::new("key");
        assert_eq!(options.retries, 2);
        assert_eq!(options.base_url, DEFAULT_BASE_URL);
        assert_eq!(options.timeout, DEFAULT_TIMEOUT);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_api_key() {
        let err = ClientOptions::default().validate().unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));

        let err = ClientOptions::new("   ").validate().unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_bad_base_url() {
        let err = ClientOptions::new("key")
            .with_base_url("not a url")
            .validate()
            .unwrap_err();
        assert!(matches!(err, ClientError::Url(_)));
    }

    #[test]
    fn test_user_agent_token() {
        let app = ApplicationInformation::new("shop")
            .with_version("1.2")
            .with_url("https://shop.example");
        assert_eq!(app.user_agent_token(), "shop/1.2 (+https://shop.example)");
        assert_eq!(ApplicationInformation::new("bare").user_agent_token(), "bare");
    }
}
