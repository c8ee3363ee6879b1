//! Outbound request assembly.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use itertools::Itertools;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT,
};
use reqwest::Method;
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use crate::client::ClientError;
use crate::http::HttpRequest;
use crate::options::{ClientOptions, API_VERSION};

pub const VERSION_HEADER: &str = "x-falu-version";
pub const IDEMPOTENCY_KEY_HEADER: &str = "x-idempotency-key";

const JSON_CONTENT_TYPE: &str = "application/json";
const CLIENT_USER_AGENT: &str = concat!("falu-rust/", env!("CARGO_PKG_VERSION"));

/// Per-call overrides layered on top of the client defaults.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Key identifying this logical mutation. Generated for `POST` and
    /// `PATCH` when absent.
    pub idempotency_key: Option<String>,

    /// Timeout for each attempt of this call.
    pub timeout: Option<Duration>,

    /// Headers added to, or replacing, the defaults.
    pub extra_headers: Option<HashMap<String, String>>,

    /// Aborts the call, including any pending retry, when cancelled.
    pub cancellation: Option<CancellationToken>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

/// A serialized body and its media type.
#[derive(Debug, Clone)]
pub struct RequestBody {
    pub content_type: &'static str,
    pub bytes: Bytes,
}

impl RequestBody {
    pub fn json(bytes: impl Into<Bytes>) -> Self {
        Self {
            content_type: JSON_CONTENT_TYPE,
            bytes: bytes.into(),
        }
    }
}

/// Ordered query parameters.
///
/// Parameters are emitted in insertion order, so the same options always
/// produce the same query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryValues {
    pairs: Vec<(String, String)>,
}

impl QueryValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: &str, value: impl ToString) -> &mut Self {
        self.pairs.push((key.to_string(), value.to_string()));
        self
    }

    pub fn add_opt<V: ToString>(&mut self, key: &str, value: Option<V>) -> &mut Self {
        if let Some(value) = value {
            self.add(key, value);
        }
        self
    }

    /// Add a list as one comma-separated value. Empty lists are skipped.
    pub fn add_list<I>(&mut self, key: &str, values: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: ToString,
    {
        let joined = values.into_iter().map(|v| v.to_string()).join(",");
        if !joined.is_empty() {
            self.add(key, joined);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Form-encoded query string without the leading `?`.
    pub fn to_query_string(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.pairs.iter())
            .finish()
    }

    pub(crate) fn apply(&self, url: &mut Url) {
        if !self.is_empty() {
            url.query_pairs_mut().extend_pairs(self.pairs.iter());
        }
    }
}

/// Reject a missing or whitespace-only identifier before anything is sent.
pub fn ensure_not_blank(value: &str, name: &str) -> Result<(), ClientError> {
    if value.trim().is_empty() {
        return Err(ClientError::invalid_argument(
            name,
            format!("'{name}' cannot be null or whitespace"),
        ));
    }
    Ok(())
}

/// `User-Agent` for a client, including the application token when configured.
pub(crate) fn user_agent(options: &ClientOptions) -> String {
    match &options.application {
        Some(app) => format!("{CLIENT_USER_AGENT} {}", app.user_agent_token()),
        None => CLIENT_USER_AGENT.to_string(),
    }
}

/// Assemble the request for one logical call.
///
/// Called once per call; every retry resends the result, so a generated
/// idempotency key stays the same across attempts.
pub(crate) fn build_request(
    options: &ClientOptions,
    method: Method,
    url: Url,
    body: Option<RequestBody>,
    overrides: Option<&RequestOptions>,
) -> Result<HttpRequest, ClientError> {
    let api_key = options
        .api_key
        .as_ref()
        .ok_or_else(|| ClientError::Config("API key is required".to_string()))?;

    let mut headers = HeaderMap::new();
    let mut authorization = header_value("Authorization", &format!("Bearer {}", api_key.expose_secret()))?;
    authorization.set_sensitive(true);
    headers.insert(AUTHORIZATION, authorization);
    headers.insert(VERSION_HEADER, HeaderValue::from_static(API_VERSION));
    headers.insert(ACCEPT, HeaderValue::from_static(JSON_CONTENT_TYPE));
    headers.insert(USER_AGENT, header_value("User-Agent", &user_agent(options))?);

    if let Some(body) = &body {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(body.content_type));
    }

    let idempotency_key = overrides
        .and_then(|o| o.idempotency_key.clone())
        .or_else(|| is_mutation(&method).then(|| Uuid::new_v4().to_string()));
    if let Some(key) = idempotency_key {
        ensure_not_blank(&key, "idempotency_key")?;
        headers.insert(IDEMPOTENCY_KEY_HEADER, header_value("idempotency_key", &key)?);
    }

    if let Some(extra) = overrides.and_then(|o| o.extra_headers.as_ref()) {
        for (key, value) in extra {
            let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
                ClientError::invalid_argument("extra_headers", format!("invalid header name ({key}): {e}"))
            })?;
            headers.insert(name, header_value("extra_headers", value)?);
        }
    }

    let timeout = overrides
        .and_then(|o| o.timeout)
        .unwrap_or(options.timeout);

    Ok(HttpRequest {
        method,
        url,
        headers,
        body: body.map(|b| b.bytes),
        timeout,
    })
}

fn is_mutation(method: &Method) -> bool {
    *method == Method::POST || *method == Method::PATCH
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, ClientError> {
    HeaderValue::from_str(value)
        .map_err(|e| ClientError::invalid_argument(name, format!("invalid header value: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ApplicationInformation;

    fn options() -> ClientOptions {
        ClientOptions::new("fskt_test_key")
    }

    fn url() -> Url {
        Url::parse("https://api.falu.io/v1/messages").unwrap()
    }

    #[test]
    fn test_default_headers() {
        let req = build_request(&options(), Method::GET, url(), None, None).unwrap();
        assert_eq!(req.headers[AUTHORIZATION], "Bearer fskt_test_key");
        assert!(req.headers[AUTHORIZATION].is_sensitive());
        assert!(!format!("{:?}", req).contains("fskt_test_key"));
        assert_eq!(req.headers["X-Falu-Version"], API_VERSION);
        assert!(req.headers.get(CONTENT_TYPE).is_none());
        assert!(req.headers.get(IDEMPOTENCY_KEY_HEADER).is_none());
        assert_eq!(req.timeout, options().timeout);
    }

    #[test]
    fn test_mutations_get_generated_idempotency_key() {
        let body = RequestBody::json("{}");
        let post = build_request(&options(), Method::POST, url(), Some(body.clone()), None).unwrap();
        let patch = build_request(&options(), Method::PATCH, url(), Some(body), None).unwrap();
        let post_key = post.headers[IDEMPOTENCY_KEY_HEADER].to_str().unwrap();
        let patch_key = patch.headers[IDEMPOTENCY_KEY_HEADER].to_str().unwrap();
        assert!(Uuid::parse_str(post_key).is_ok());
        assert_ne!(post_key, patch_key);
        assert_eq!(post.headers[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn test_overrides_layer_on_defaults() {
        let client_options = options();
        let overrides = RequestOptions::new()
            .with_idempotency_key("idem-1")
            .with_timeout(Duration::from_secs(5))
            .with_header("X-Custom", "yes")
            .with_header("x-falu-version", "2099-01-01");

        let req = build_request(&client_options, Method::DELETE, url(), None, Some(&overrides)).unwrap();
        assert_eq!(req.headers[IDEMPOTENCY_KEY_HEADER], "idem-1");
        assert_eq!(req.headers["x-custom"], "yes");
        assert_eq!(req.headers[VERSION_HEADER], "2099-01-01");
        assert_eq!(req.timeout, Duration::from_secs(5));

        // client defaults are untouched
        let plain = build_request(&client_options, Method::GET, url(), None, None).unwrap();
        assert_eq!(plain.headers[VERSION_HEADER], API_VERSION);
        assert_eq!(plain.timeout, client_options.timeout);
    }

    #[test]
    fn test_invalid_override_header_is_argument_error() {
        let overrides = RequestOptions::new().with_header("bad header", "x");
        let err = build_request(&options(), Method::GET, url(), None, Some(&overrides)).unwrap_err();
        assert!(matches!(err, ClientError::InvalidArgument { .. }));
    }

    #[test]
    fn test_user_agent_includes_application() {
        let options = options().with_application(ApplicationInformation::new("shop").with_version("2.0"));
        let req = build_request(&options, Method::GET, url(), None, None).unwrap();
        let agent = req.headers[USER_AGENT].to_str().unwrap();
        assert!(agent.starts_with("falu-rust/"));
        assert!(agent.ends_with(" shop/2.0"));
    }

    #[test]
    fn test_ensure_not_blank() {
        assert!(ensure_not_blank("msg_123", "id").is_ok());
        for blank in ["", "   ", "\t\n"] {
            let err = ensure_not_blank(blank, "id").unwrap_err();
            assert!(matches!(err, ClientError::InvalidArgument { ref name, .. } if name == "id"));
        }
    }

    #[test]
    fn test_query_values_are_deterministic() {
        let mut query = QueryValues::new();
        query
            .add("sort", "descending")
            .add_opt("count", Some(10))
            .add_opt::<u32>("ct", None)
            .add_list("status", ["sent", "failed"])
            .add_list("stream", Vec::<String>::new());

        assert_eq!(query.to_query_string(), "sort=descending&count=10&status=sent%2Cfailed");
        assert_eq!(query.get("count"), Some("10"));
        assert_eq!(query.get("ct"), None);

        let mut url = url();
        query.apply(&mut url);
        assert_eq!(url.query(), Some("sort=descending&count=10&status=sent%2Cfailed"));
    }
}
