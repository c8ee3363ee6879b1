//! List options and continuation-token paging.
//!
//! A list call returns at most one page. When the envelope carries a
//! continuation token, the same options with that token fetch the next
//! page. Tokens are opaque: they are stored and sent back verbatim.

use std::future::Future;

use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::client::ClientError;
use crate::request::QueryValues;
use crate::response::{Deserializable, ResourceResponse};

/// Query key carrying the continuation token.
pub const CONTINUATION_TOKEN_PARAM: &str = "ct";

/// Options accepted by list operations.
pub trait ListOptions: Clone + Send + 'static {
    /// Flatten the options into query parameters.
    fn populate_query_values(&self, values: &mut QueryValues);

    /// Token of the page these options point at, if any.
    fn continuation_token(&self) -> Option<&str>;

    /// Point the options at the page identified by `token`.
    fn set_continuation_token(&mut self, token: Option<String>);

    fn to_query_values(&self) -> QueryValues {
        let mut values = QueryValues::new();
        self.populate_query_values(&mut values);
        values
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "ascending",
            SortDirection::Descending => "descending",
        }
    }
}

/// Options shared by every list operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BasicListOptions {
    pub sorting: Option<SortDirection>,
    /// Maximum number of items per page.
    pub count: Option<u32>,
    pub continuation_token: Option<String>,
}

impl BasicListOptions {
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    pub fn with_sorting(mut self, sorting: SortDirection) -> Self {
        self.sorting = Some(sorting);
        self
    }

    pub fn with_continuation_token(mut self, token: impl Into<String>) -> Self {
        self.continuation_token = Some(token.into());
        self
    }
}

impl ListOptions for BasicListOptions {
    fn populate_query_values(&self, values: &mut QueryValues) {
        values
            .add_opt("sort", self.sorting.map(|s| s.as_str()))
            .add_opt("count", self.count)
            .add_opt(CONTINUATION_TOKEN_PARAM, self.continuation_token.as_deref());
    }

    fn continuation_token(&self) -> Option<&str> {
        self.continuation_token.as_deref()
    }

    fn set_continuation_token(&mut self, token: Option<String>) {
        self.continuation_token = token;
    }
}

/// Stream every item of a list query, following continuation tokens.
///
/// `fetch` issues one list call for the given options. Pages are requested
/// lazily and one at a time. The stream ends after the first page without a
/// token, after a page that hands back the token it was fetched with, or
/// after yielding the first error. A successful page whose body cannot be
/// read yields [`ClientError::UnreadableBody`].
pub fn paginate<T, O, F, Fut>(options: O, fetch: F) -> impl Stream<Item = Result<T, ClientError>>
where
    T: Deserializable,
    O: ListOptions,
    F: FnMut(O) -> Fut,
    Fut: Future<Output = Result<ResourceResponse<Vec<T>>, ClientError>>,
{
    let pages = stream::unfold((Some(options), fetch), |(next, mut fetch)| async move {
        let Some(mut options) = next else {
            return None;
        };
        let page = match fetch(options.clone()).await.and_then(ResourceResponse::ensure_success) {
            Ok(page) => page,
            Err(e) => return Some((Err(e), (None, fetch))),
        };

        let status = page.status();
        let request_id = page.request_id().map(str::to_string);
        let next_token = page.continuation_token().map(str::to_string);
        let Some(items) = page.into_resource() else {
            return Some((Err(ClientError::UnreadableBody { status, request_id }), (None, fetch)));
        };

        let next = match next_token {
            Some(token) if options.continuation_token() == Some(token.as_str()) => {
                warn!(token = %token, "server repeated the continuation token, stopping");
                None
            }
            Some(token) => {
                options.set_continuation_token(Some(token));
                Some(options)
            }
            None => None,
        };
        Some((Ok(items), (next, fetch)))
    });

    pages.flat_map(|page| {
        let items: Vec<Result<T, ClientError>> = match page {
            Ok(items) => items.into_iter().map(Ok).collect(),
            Err(e) => vec![Err(e)],
        };
        stream::iter(items)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpResponse;
    use crate::serializer::JsonSerializer;
    use reqwest::header::{HeaderMap, HeaderValue};
    use reqwest::StatusCode;
    use std::sync::{Arc, Mutex};

    fn page(status: u16, token: Option<&str>, body: &str) -> ResourceResponse<Vec<u32>> {
        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            headers.insert("x-continuation-token", HeaderValue::from_str(token).unwrap());
        }
        let response = HttpResponse::new(StatusCode::from_u16(status).unwrap(), headers, body.to_string());
        ResourceResponse::from_http(response, &JsonSerializer::default())
    }

    impl Deserializable for u32 {}

    #[test]
    fn test_basic_options_query() {
        let options = BasicListOptions::default()
            .with_sorting(SortDirection::Descending)
            .with_count(25)
            .with_continuation_token("tok/1");
        assert_eq!(
            options.to_query_values().to_query_string(),
            "sort=descending&count=25&ct=tok%2F1"
        );
        assert!(BasicListOptions::default().to_query_values().is_empty());
    }

    #[tokio::test]
    async fn test_paginate_follows_tokens() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();

        let items: Vec<u32> = paginate(BasicListOptions::default().with_count(2), move |options| {
            recorder.lock().unwrap().push(options.continuation_token.clone());
            async move {
                Ok(match options.continuation_token.as_deref() {
                    None => page(200, Some("p2"), "[1,2]"),
                    Some("p2") => page(200, Some("p3"), "[3,4]"),
                    _ => page(200, None, "[5]"),
                })
            }
        })
        .map(|item| item.unwrap())
        .collect()
        .await;

        assert_eq!(items, vec![1, 2, 3, 4, 5]);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![None, Some("p2".to_string()), Some("p3".to_string())]
        );
    }

    #[tokio::test]
    async fn test_paginate_stops_on_error_status() {
        let results: Vec<Result<u32, ClientError>> = paginate(BasicListOptions::default(), |options| async move {
            Ok(match options.continuation_token {
                None => page(200, Some("p2"), "[1]"),
                Some(_) => page(500, None, r#"{"title":"boom"}"#),
            })
        })
        .collect()
        .await;

        assert_eq!(results.len(), 2);
        assert_eq!(*results[0].as_ref().unwrap(), 1);
        assert!(matches!(results[1], Err(ClientError::Api(_))));
    }

    #[tokio::test]
    async fn test_paginate_reports_unreadable_page() {
        let results: Vec<Result<u32, ClientError>> = paginate(BasicListOptions::default(), |options| async move {
            Ok(match options.continuation_token {
                None => page(200, Some("p2"), "[1]"),
                Some(_) => page(200, Some("p3"), "<html>not json</html>"),
            })
        })
        .collect()
        .await;

        assert_eq!(results.len(), 2);
        assert_eq!(*results[0].as_ref().unwrap(), 1);
        match &results[1] {
            Err(ClientError::UnreadableBody { status, .. }) => assert_eq!(*status, StatusCode::OK),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_paginate_stops_on_repeated_token() {
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();

        let items: Vec<u32> = paginate(BasicListOptions::default(), move |options| {
            *counter.lock().unwrap() += 1;
            async move {
                Ok(match options.continuation_token {
                    None => page(200, Some("same"), "[1]"),
                    Some(_) => page(200, Some("same"), "[2]"),
                })
            }
        })
        .map(|item| item.unwrap())
        .collect()
        .await;

        assert_eq!(items, vec![1, 2]);
        assert_eq!(*calls.lock().unwrap(), 2);
    }
}
