//! # falu - Falu API client
//!
//! Typed access to the Falu payments and messaging API, built on one shared
//! request runtime that every resource service delegates to.
//!
//! ## Features
//! - Async-first, tokio compatible
//! - Bearer authentication and API version negotiation on every request
//! - Retries for transient failures, reusing one idempotency key per call
//! - Typed envelopes exposing request id, trace id, continuation token and
//!   cache-hit flag
//! - JSON Patch updates validated against a patch model
//! - Continuation-token paging, including a stream over every page
//! - Cancellation and per-call timeouts
//!
//! ## Architecture
//!
//! - **`http`**: the [`Transport`](http::Transport) seam and the `reqwest` transport
//! - **`request`**: request assembly from client defaults plus per-call [`RequestOptions`]
//! - **`retry`**: the resend policy
//! - **`response`**: [`ResourceResponse<T>`], the parsed envelope
//! - **`patch`**: [`PatchDocument<T>`](patch::PatchDocument) for partial updates
//! - **`pagination`**: list options and continuation tokens
//! - **`runtime`**: [`ApiClient`], tying the above together
//! - **`services`**: thin per-resource wrappers
//!
//! ## Example
//! ```no_run
//! use falu::models::{MessageCreateRequest, MessagePatchModel};
//! use falu::patch::PatchDocument;
//! use falu::{ClientOptions, FaluClient, RequestOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = FaluClient::new(ClientOptions::from_env()?)?;
//!     let messages = client.messages();
//!
//!     let request = MessageCreateRequest::new("+254722000000", "transactional", "Hello!");
//!     let options = RequestOptions::new().with_idempotency_key("order-42-receipt");
//!     let created = messages.create(&request, Some(&options)).await?.ensure_success()?;
//!     println!("cached: {:?}", created.cached_response());
//!
//!     if let Some(message) = created.into_resource() {
//!         let patch = PatchDocument::<MessagePatchModel>::builder()
//!             .replace("/metadata/order", "42")
//!             .build()?;
//!         messages.update(&message.id, &patch, None).await?.ensure_success()?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod http;
pub mod models;
pub mod options;
pub mod pagination;
pub mod patch;
pub mod request;
pub mod response;
pub mod retry;
pub mod runtime;
pub mod serializer;
pub mod services;

// Re-exports for convenience
pub use client::{ClientError, FaluClient};
pub use error::{ApiError, ApiFailure};
pub use options::{ClientOptions, SecretString};
pub use request::RequestOptions;
pub use response::ResourceResponse;
pub use runtime::ApiClient;
pub use tokio_util::sync::CancellationToken;
