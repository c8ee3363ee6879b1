//! Typed envelope around one HTTP exchange.

use bytes::Bytes;
use itertools::Itertools;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::client::ClientError;
use crate::error::{ApiError, ApiFailure};
use crate::http::HttpResponse;
use crate::serializer::JsonSerializer;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const TRACE_ID_HEADER: &str = "x-trace-id";
pub const CONTINUATION_TOKEN_HEADER: &str = "x-continuation-token";
pub const CACHED_RESPONSE_HEADER: &str = "x-cached-response";

/// Shape of a resource type, known statically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// A single object (or an untyped value).
    Single,
    /// A list; pages of these carry continuation tokens.
    Sequence,
}

/// Implemented by every type an operation can return.
///
/// ```rust
/// use falu::response::{Deserializable, ResourceKind};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Webhook { id: String }
///
/// impl Deserializable for Webhook {}
///
/// assert_eq!(<Vec<Webhook>>::KIND, ResourceKind::Sequence);
/// ```
pub trait Deserializable: DeserializeOwned + Send + 'static {
    const KIND: ResourceKind = ResourceKind::Single;
}

impl<T: Deserializable> Deserializable for Vec<T> {
    const KIND: ResourceKind = ResourceKind::Sequence;
}

impl Deserializable for serde_json::Value {}

/// The parsed result of one exchange.
///
/// A 2xx status fills [`resource`](Self::resource); any other status fills
/// [`error`](Self::error). A body that does not match the expected shape
/// leaves both empty; status, headers and raw body stay available.
#[derive(Debug, Clone)]
pub struct ResourceResponse<T> {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    resource: Option<T>,
    error: Option<ApiError>,
    request_id: Option<String>,
    trace_id: Option<String>,
    continuation_token: Option<String>,
    cached_response: Option<bool>,
}

impl<T: Deserializable> ResourceResponse<T> {
    pub(crate) fn from_http(response: HttpResponse, serializer: &JsonSerializer) -> Self {
        let HttpResponse {
            status,
            headers,
            body,
        } = response;

        let (resource, error) = if status.is_success() {
            (parse_body::<T>(serializer, &body, status), None)
        } else {
            (None, parse_body::<ApiError>(serializer, &body, status))
        };

        let request_id = header_string(&headers, REQUEST_ID_HEADER);
        let trace_id = header_string(&headers, TRACE_ID_HEADER)
            .or_else(|| error.as_ref().and_then(|e| e.trace_id.clone()));
        let continuation_token = header_string(&headers, CONTINUATION_TOKEN_HEADER);
        let cached_response = header_bool(&headers, CACHED_RESPONSE_HEADER);

        Self {
            status,
            headers,
            body,
            resource,
            error,
            request_id,
            trace_id,
            continuation_token,
            cached_response,
        }
    }

    /// `Some(true)` when a list has further pages, `Some(false)` on the last
    /// page, `None` when the resource is not a list.
    pub fn has_more_results(&self) -> Option<bool> {
        match T::KIND {
            ResourceKind::Sequence => Some(self.continuation_token.is_some()),
            ResourceKind::Single => None,
        }
    }
}

impl<T> ResourceResponse<T> {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Raw response body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn is_successful(&self) -> bool {
        self.status.is_success()
    }

    pub fn resource(&self) -> Option<&T> {
        self.resource.as_ref()
    }

    pub fn into_resource(self) -> Option<T> {
        self.resource
    }

    pub fn error(&self) -> Option<&ApiError> {
        self.error.as_ref()
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Trace id from the `X-Trace-Id` header, else from the error body.
    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    /// Token to pass back to fetch the next page.
    pub fn continuation_token(&self) -> Option<&str> {
        self.continuation_token.as_deref()
    }

    /// Whether the server replayed a stored response for a repeated
    /// idempotency key. `None` when the header was absent.
    pub fn cached_response(&self) -> Option<bool> {
        self.cached_response
    }

    /// Pass successful envelopes through; turn the rest into
    /// [`ClientError::Api`] carrying an [`ApiFailure`].
    pub fn ensure_success(self) -> Result<Self, ClientError> {
        if self.is_successful() {
            return Ok(self);
        }
        let message = self.failure_message();
        Err(ApiFailure {
            status: self.status,
            message,
            request_id: self.request_id,
            trace_id: self.trace_id,
            error: self.error,
            headers: self.headers,
            body: self.body,
        }
        .into())
    }

    fn failure_message(&self) -> String {
        let code = self.status.as_u16();
        let reason = self.status.canonical_reason().unwrap_or("Unknown");
        let title = self.error.as_ref().and_then(|e| non_blank(e.title.as_deref()));
        let detail = self.error.as_ref().and_then(|e| non_blank(e.detail.as_deref()));

        let headline = detail
            .or(title)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Request failed - {reason} ({code})"));

        let mut lines = vec![headline, format!("StatusCode: {code} ({reason})")];
        if let Some(id) = non_blank(self.request_id.as_deref()) {
            lines.push(format!("RequestId: {id}"));
        }
        if let Some(id) = non_blank(self.trace_id.as_deref()) {
            lines.push(format!("TraceId: {id}"));
        }
        if let Some(title) = title {
            lines.push(format!("Error: {title}"));
        }
        if let Some(detail) = detail {
            lines.push(format!("Message: {detail}"));
        }
        lines.into_iter().join("\n")
    }
}

fn parse_body<B: DeserializeOwned>(serializer: &JsonSerializer, body: &[u8], status: StatusCode) -> Option<B> {
    match serializer.from_slice::<B>(body) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(
                status = status.as_u16(),
                target_type = std::any::type_name::<B>(),
                "failed to deserialize response body: {}",
                e
            );
            None
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn header_bool(headers: &HeaderMap, name: &str) -> Option<bool> {
    let value = header_string(headers, name)?;
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}
