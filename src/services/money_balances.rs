//! Money balances endpoints.

use serde_json::{json, Value};

use crate::client::ClientError;
use crate::models::MoneyBalances;
use crate::request::RequestOptions;
use crate::response::ResourceResponse;
use crate::runtime::ApiClient;

#[derive(Debug, Clone)]
pub struct MoneyBalancesService {
    api: ApiClient,
}

impl MoneyBalancesService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn get(
        &self,
        request_options: Option<&RequestOptions>,
    ) -> Result<ResourceResponse<MoneyBalances>, ClientError> {
        self.api
            .get("/v1/money_balances", None, request_options)
            .await
    }

    /// Ask the server to refresh balances. The response body is not typed.
    pub async fn refresh(
        &self,
        request_options: Option<&RequestOptions>,
    ) -> Result<ResourceResponse<Value>, ClientError> {
        self.api
            .post("/v1/money_balances/refresh", &json!({}), request_options)
            .await
    }
}
