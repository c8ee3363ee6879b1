//! Resource shapes exchanged with the API.
//!
//! Field names go over the wire in camelCase and enums by their
//! (camelCased) variant names.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::pagination::{BasicListOptions, ListOptions};
use crate::patch::Patchable;
use crate::request::QueryValues;
use crate::response::Deserializable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageStatus {
    Accepted,
    Sent,
    Delivered,
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Accepted => "accepted",
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Failed => "failed",
        }
    }
}

/// A message sent through the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MessageStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

impl Deserializable for Message {}

/// Template reference used instead of a literal body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSourceTemplate {
    pub id: Option<String>,
    pub alias: Option<String>,
    #[serde(default)]
    pub model: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageCreateRequest {
    pub to: String,
    pub stream: String,
    pub body: Option<String>,
    pub template: Option<MessageSourceTemplate>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl MessageCreateRequest {
    pub fn new(to: impl Into<String>, stream: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            stream: stream.into(),
            body: Some(body.into()),
            ..Self::default()
        }
    }
}

/// Fields of a [`Message`] that can be changed after creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePatchModel {
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Patchable for MessagePatchModel {
    const PATCHABLE_FIELDS: &'static [&'static str] = &["metadata"];
}

/// Filters for listing messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagesListOptions {
    pub basic: BasicListOptions,
    pub status: Vec<MessageStatus>,
    pub stream: Option<String>,
}

impl MessagesListOptions {
    pub fn with_status(mut self, status: MessageStatus) -> Self {
        self.status.push(status);
        self
    }

    pub fn with_stream(mut self, stream: impl Into<String>) -> Self {
        self.stream = Some(stream.into());
        self
    }
}

impl ListOptions for MessagesListOptions {
    fn populate_query_values(&self, values: &mut QueryValues) {
        self.basic.populate_query_values(values);
        values
            .add_list("status", self.status.iter().map(|s| s.as_str()))
            .add_opt("stream", self.stream.as_deref());
    }

    fn continuation_token(&self) -> Option<&str> {
        self.basic.continuation_token()
    }

    fn set_continuation_token(&mut self, token: Option<String>) {
        self.basic.set_continuation_token(token);
    }
}

/// Balances per currency, in the smallest currency unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoneyBalances {
    #[serde(default)]
    pub business: HashMap<String, i64>,
    #[serde(default)]
    pub mpesa: HashMap<String, i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
}

impl Deserializable for MoneyBalances {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::JsonSerializer;

    #[test]
    fn test_create_request_wire_shape() {
        let request = MessageCreateRequest::new("+254722000000", "transactional", "Hi");
        let bytes = JsonSerializer::default().to_vec(&request).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"to": "+254722000000", "stream": "transactional", "body": "Hi"})
        );
    }

    #[test]
    fn test_message_reads_pascal_case() {
        let body = br#"{"Id":"msg_1","To":"+254722000000","Status":"delivered","Metadata":{"Ref":"A"}}"#;
        let message: Message = JsonSerializer::default().from_slice(body).unwrap();
        assert_eq!(message.id, "msg_1");
        assert_eq!(message.status, Some(MessageStatus::Delivered));
        assert_eq!(message.metadata["Ref"], "A");
    }

    #[test]
    fn test_list_options_query() {
        let options = MessagesListOptions::default()
            .with_status(MessageStatus::Sent)
            .with_status(MessageStatus::Failed)
            .with_stream("marketing");
        assert_eq!(
            options.to_query_values().to_query_string(),
            "status=sent%2Cfailed&stream=marketing"
        );
    }

    #[test]
    fn test_patchable_fields_match_patch_model() {
        let value = serde_json::to_value(MessagePatchModel::default()).unwrap();
        let mut serialized: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        let mut declared = MessagePatchModel::PATCHABLE_FIELDS.to_vec();
        serialized.sort_unstable();
        declared.sort_unstable();
        assert_eq!(serialized, declared);
    }
}
