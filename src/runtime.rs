//! The request runtime every service delegates to.
//!
//! One logical call is: build the request once, send it, consult the
//! [`RetryPolicy`], resend the same request while the policy allows, then
//! parse the final response into a [`ResourceResponse`].

use std::fmt;
use std::sync::Arc;

use reqwest::Method;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::client::ClientError;
use crate::http::{HttpRequest, HttpResponse, Transport};
use crate::options::ClientOptions;
use crate::patch::{PatchDocument, Patchable};
use crate::request::{build_request, QueryValues, RequestBody, RequestOptions};
use crate::response::{Deserializable, ResourceResponse};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::serializer::JsonSerializer;

/// Shared request runtime. Cheap to clone.
#[derive(Clone)]
pub struct ApiClient {
    options: Arc<ClientOptions>,
    transport: Arc<dyn Transport>,
    serializer: JsonSerializer,
    policy: RetryPolicy,
    base_url: Url,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("options", &self.options)
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(options: ClientOptions, transport: Arc<dyn Transport>) -> Result<Self, ClientError> {
        options.validate()?;
        let mut base_url = Url::parse(&options.base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let serializer = JsonSerializer::new(options.serializer.clone());
        let policy = RetryPolicy::new(options.retries, options.backoff);

        Ok(Self {
            options: Arc::new(options),
            transport,
            serializer,
            policy,
            base_url,
        })
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn serializer(&self) -> &JsonSerializer {
        &self.serializer
    }

    /// Resolve `path` under the base address and append `query`.
    ///
    /// `path` is always relative to the base, leading `/` or not, so a base
    /// such as `https://proxy.example/falu` keeps its `/falu` prefix.
    pub fn url(&self, path: &str, query: Option<&QueryValues>) -> Result<Url, ClientError> {
        let mut url = self.base_url.join(path.trim_start_matches('/'))?;
        if let Some(query) = query {
            query.apply(&mut url);
        }
        Ok(url)
    }

    /// Serialize `body` with the client's serializer.
    pub fn json_body<B: Serialize + ?Sized>(&self, body: &B) -> Result<RequestBody, ClientError> {
        Ok(RequestBody::json(self.serializer.to_vec(body)?))
    }

    pub async fn get<T: Deserializable>(
        &self,
        path: &str,
        query: Option<&QueryValues>,
        options: Option<&RequestOptions>,
    ) -> Result<ResourceResponse<T>, ClientError> {
        let url = self.url(path, query)?;
        self.request(Method::GET, url, None, options).await
    }

    pub async fn post<T: Deserializable, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        options: Option<&RequestOptions>,
    ) -> Result<ResourceResponse<T>, ClientError> {
        let url = self.url(path, None)?;
        let body = self.json_body(body)?;
        self.request(Method::POST, url, Some(body), options).await
    }

    pub async fn patch<T: Deserializable, P: Patchable>(
        &self,
        path: &str,
        patch: &PatchDocument<P>,
        options: Option<&RequestOptions>,
    ) -> Result<ResourceResponse<T>, ClientError> {
        let url = self.url(path, None)?;
        let body = patch.encode()?;
        self.request(Method::PATCH, url, Some(body), options).await
    }

    pub async fn delete<T: Deserializable>(
        &self,
        path: &str,
        options: Option<&RequestOptions>,
    ) -> Result<ResourceResponse<T>, ClientError> {
        let url = self.url(path, None)?;
        self.request(Method::DELETE, url, None, options).await
    }

    /// Send one logical call, retrying transient failures.
    pub async fn request<T: Deserializable>(
        &self,
        method: Method,
        url: Url,
        body: Option<RequestBody>,
        options: Option<&RequestOptions>,
    ) -> Result<ResourceResponse<T>, ClientError> {
        let request = build_request(&self.options, method, url, body, options)?;
        let cancellation = options
            .and_then(|o| o.cancellation.clone())
            .unwrap_or_default();

        let response = self.send_with_retries(request, &cancellation).await?;
        Ok(ResourceResponse::from_http(response, &self.serializer))
    }

    async fn send_with_retries(
        &self,
        request: HttpRequest,
        cancellation: &CancellationToken,
    ) -> Result<HttpResponse, ClientError> {
        let mut attempt = 0;
        loop {
            if cancellation.is_cancelled() {
                debug!(path = request.url.path(), "request cancelled before attempt");
                return Err(ClientError::Cancelled);
            }

            attempt += 1;
            debug!(
                method = %request.method,
                path = request.url.path(),
                attempt,
                max_attempts = self.policy.max_attempts(),
                "sending request"
            );

            let outcome = tokio::select! {
                biased;
                _ = cancellation.cancelled() => {
                    debug!(path = request.url.path(), attempt, "request cancelled in flight");
                    return Err(ClientError::Cancelled);
                }
                result = tokio::time::timeout(request.timeout, self.transport.send(request.clone())) => {
                    result.unwrap_or(Err(ClientError::Timeout(request.timeout)))
                }
            };

            let decision = match &outcome {
                Ok(response) => self.policy.on_response(attempt, response),
                Err(e) => self.policy.on_error(attempt, e),
            };

            let delay = match decision {
                RetryDecision::Stop => return outcome,
                RetryDecision::Retry(delay) => delay,
            };

            match &outcome {
                Ok(response) => warn!(
                    path = request.url.path(),
                    attempt,
                    status = response.status.as_u16(),
                    ?delay,
                    "transient response, retrying"
                ),
                Err(e) => warn!(
                    path = request.url.path(),
                    attempt,
                    error = %e,
                    ?delay,
                    "transient failure, retrying"
                ),
            }

            tokio::select! {
                biased;
                _ = cancellation.cancelled() => {
                    debug!(path = request.url.path(), attempt, "request cancelled during backoff");
                    return Err(ClientError::Cancelled);
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::mock::MockTransport;
    use crate::request::IDEMPOTENCY_KEY_HEADER;
    use crate::retry::Backoff;
    use serde_json::Value;
    use std::time::Duration;

    fn client(transport: Arc<MockTransport>) -> ApiClient {
        let options = ClientOptions::new("fskt_test")
            .with_base_url("https://api.test")
            .with_backoff(Backoff::none());
        ApiClient::new(options, transport).unwrap()
    }

    fn keys(transport: &MockTransport) -> Vec<String> {
        transport
            .requests()
            .iter()
            .map(|r| r.headers[IDEMPOTENCY_KEY_HEADER].to_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_retries_reuse_idempotency_key() {
        let transport = Arc::new(
            MockTransport::new()
                .respond(503, &[], "")
                .fail(|| ClientError::Transport("connection reset".to_string()))
                .respond(201, &[], r#"{"ok":true}"#),
        );
        let api = client(transport.clone());

        let res: ResourceResponse<Value> = api.post("/v1/things", &serde_json::json!({}), None).await.unwrap();
        assert_eq!(res.status().as_u16(), 201);

        let keys = keys(&transport);
        assert_eq!(keys.len(), 3);
        assert!(keys.iter().all(|k| k == &keys[0]));
    }

    #[tokio::test]
    async fn test_attempts_never_exceed_budget() {
        let transport = Arc::new(
            MockTransport::new()
                .respond(500, &[], "")
                .respond(502, &[], "")
                .respond(503, &[("x-request-id", "req_last")], ""),
        );
        let api = client(transport.clone());

        let res: ResourceResponse<Value> = api.get("/v1/things", None, None).await.unwrap();
        assert_eq!(res.status().as_u16(), 503);
        assert_eq!(res.request_id(), Some("req_last"));
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_transport_failure_surfaces_after_budget() {
        let transport = Arc::new(
            MockTransport::new()
                .fail(|| ClientError::Transport("refused".to_string()))
                .fail(|| ClientError::Transport("refused".to_string())),
        );
        let options = ClientOptions::new("fskt_test")
            .with_retries(1)
            .with_backoff(Backoff::none());
        let api = ApiClient::new(options, transport.clone()).unwrap();

        let err = api.get::<Value>("/v1/things", None, None).await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_non_transient_status_is_not_retried() {
        let transport = Arc::new(MockTransport::new().respond(404, &[], r#"{"title":"Not Found"}"#));
        let api = client(transport.clone());

        let res: ResourceResponse<Value> = api.get("/v1/things/x", None, None).await.unwrap();
        assert_eq!(res.error().unwrap().title.as_deref(), Some("Not Found"));
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_aborts_without_retry() {
        let transport = Arc::new(MockTransport::new().hang());
        let api = client(transport.clone());
        let token = CancellationToken::new();
        let options = RequestOptions::new().with_cancellation(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let err = api.get::<Value>("/v1/things", None, Some(&options)).await.unwrap_err();
        canceller.await.unwrap();
        assert!(matches!(err, ClientError::Cancelled));
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_token_sends_nothing() {
        let transport = Arc::new(MockTransport::new());
        let api = client(transport.clone());
        let token = CancellationToken::new();
        token.cancel();

        let options = RequestOptions::new().with_cancellation(token);
        let err = api.get::<Value>("/v1/things", None, Some(&options)).await.unwrap_err();
        assert!(matches!(err, ClientError::Cancelled));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_during_backoff() {
        let transport = Arc::new(MockTransport::new().respond(503, &[], ""));
        let options = ClientOptions::new("fskt_test").with_backoff(Backoff {
            initial: Duration::from_secs(30),
            max: Duration::from_secs(30),
            multiplier: 1,
            jitter: false,
        });
        let api = ApiClient::new(options, transport.clone()).unwrap();
        let token = CancellationToken::new();
        let request_options = RequestOptions::new().with_cancellation(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let err = api.get::<Value>("/v1/things", None, Some(&request_options)).await.unwrap_err();
        canceller.await.unwrap();
        assert!(matches!(err, ClientError::Cancelled));
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_transient() {
        let transport = Arc::new(MockTransport::new().hang().respond(200, &[], "{}"));
        let api = client(transport.clone());
        let options = RequestOptions::new().with_timeout(Duration::from_millis(10));

        let res: ResourceResponse<Value> = api.get("/v1/things", None, Some(&options)).await.unwrap();
        assert!(res.is_successful());
        assert_eq!(transport.requests().len(), 2);
        assert_eq!(transport.requests()[0].timeout, Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_url_resolution_with_query() {
        let transport = Arc::new(MockTransport::new());
        let api = client(transport);
        let mut query = QueryValues::new();
        query.add("count", 5);

        let url = api.url("/v1/messages", Some(&query)).unwrap();
        assert_eq!(url.as_str(), "https://api.test/v1/messages?count=5");
    }

    #[test]
    fn test_url_keeps_base_path_prefix() {
        for base in ["https://proxy.example/falu", "https://proxy.example/falu/"] {
            let options = ClientOptions::new("fskt_test").with_base_url(base);
            let api = ApiClient::new(options, Arc::new(MockTransport::new())).unwrap();
            let url = api.url("/v1/messages/msg_1", None).unwrap();
            assert_eq!(url.as_str(), "https://proxy.example/falu/v1/messages/msg_1");
        }
    }
}
