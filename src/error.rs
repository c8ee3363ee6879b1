//! Structured error payloads returned by the API.

use std::collections::BTreeMap;

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error body sent by the server for non-2xx responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Short, human-readable summary of the problem.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Explanation specific to this occurrence of the problem.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// Identifier correlating the failure with server-side logs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,

    /// Validation messages keyed by the offending field.
    #[serde(default, alias = "fieldErrors", skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, Vec<String>>,
}

/// A non-successful exchange, produced by
/// [`ResourceResponse::ensure_success`](crate::response::ResourceResponse::ensure_success).
///
/// Carries everything needed to correlate the failure with the server:
/// the raw status, headers and body, the request and trace ids, and the
/// parsed error body when one could be read.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ApiFailure {
    pub status: StatusCode,
    pub message: String,
    pub request_id: Option<String>,
    pub trace_id: Option<String>,
    pub error: Option<ApiError>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ApiFailure {
    /// Field-level validation messages, `None` when the server sent none.
    pub fn field_errors(&self) -> Option<&BTreeMap<String, Vec<String>>> {
        self.error
            .as_ref()
            .map(|e| &e.errors)
            .filter(|errors| !errors.is_empty())
    }
}
