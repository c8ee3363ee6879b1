//! Messages endpoints.

use futures::Stream;

use crate::client::ClientError;
use crate::models::{Message, MessageCreateRequest, MessagePatchModel, MessagesListOptions};
use crate::pagination::{paginate, ListOptions};
use crate::patch::PatchDocument;
use crate::request::{ensure_not_blank, RequestOptions};
use crate::response::ResourceResponse;
use crate::runtime::ApiClient;

/// Largest batch accepted by [`MessagesService::create_batch`].
pub const MAX_BATCH_SIZE: usize = 10_000;

#[derive(Debug, Clone)]
pub struct MessagesService {
    api: ApiClient,
}

impl MessagesService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// List messages, one page per call.
    pub async fn list(
        &self,
        options: Option<&MessagesListOptions>,
        request_options: Option<&RequestOptions>,
    ) -> Result<ResourceResponse<Vec<Message>>, ClientError> {
        let query = options.map(ListOptions::to_query_values);
        self.api
            .get("/v1/messages", query.as_ref(), request_options)
            .await
    }

    /// Every message matching `options`, across all pages.
    pub fn list_all(
        &self,
        options: MessagesListOptions,
        request_options: Option<RequestOptions>,
    ) -> impl Stream<Item = Result<Message, ClientError>> {
        let service = self.clone();
        paginate(options, move |page_options| {
            let service = service.clone();
            let request_options = request_options.clone();
            async move {
                service
                    .list(Some(&page_options), request_options.as_ref())
                    .await
            }
        })
    }

    pub async fn get(
        &self,
        id: &str,
        request_options: Option<&RequestOptions>,
    ) -> Result<ResourceResponse<Message>, ClientError> {
        ensure_not_blank(id, "id")?;
        self.api
            .get(&format!("/v1/messages/{id}"), None, request_options)
            .await
    }

    pub async fn create(
        &self,
        message: &MessageCreateRequest,
        request_options: Option<&RequestOptions>,
    ) -> Result<ResourceResponse<Message>, ClientError> {
        self.api.post("/v1/messages", message, request_options).await
    }

    /// Change the patchable fields of a message.
    pub async fn update(
        &self,
        id: &str,
        patch: &PatchDocument<MessagePatchModel>,
        request_options: Option<&RequestOptions>,
    ) -> Result<ResourceResponse<Message>, ClientError> {
        ensure_not_blank(id, "id")?;
        self.api
            .patch(&format!("/v1/messages/{id}"), patch, request_options)
            .await
    }

    /// Send up to [`MAX_BATCH_SIZE`] messages in one request.
    pub async fn create_batch(
        &self,
        messages: &[MessageCreateRequest],
        request_options: Option<&RequestOptions>,
    ) -> Result<ResourceResponse<Vec<Message>>, ClientError> {
        if messages.len() > MAX_BATCH_SIZE {
            return Err(ClientError::invalid_argument(
                "messages",
                "The service does not support more than 10,000 (10k) messages",
            ));
        }
        self.api
            .post("/v1/messages/bulk", messages, request_options)
            .await
    }
}
