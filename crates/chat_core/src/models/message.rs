use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::serde_helpers::{
    deserialize_id, deserialize_timestamp, null_as_empty, serialize_timestamp,
};
use crate::search::{self, SearchPayload};

/// One entry of a conversation.
///
/// Messages created on this side carry `local-<uuid>` ids; history loaded from
/// the service carries the service's numeric ids rendered as strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
    pub is_user_message: bool,
    #[serde(
        deserialize_with = "deserialize_timestamp",
        serialize_with = "serialize_timestamp"
    )]
    pub created_at: DateTime<Utc>,
    #[serde(
        rename = "searchData",
        default,
        deserialize_with = "search::deserialize_optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub search_payload: Option<SearchPayload>,
}

fn local_id() -> String {
    format!("local-{}", Uuid::new_v4())
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: local_id(),
            content: content.into(),
            is_user_message: true,
            created_at: Utc::now(),
            search_payload: None,
        }
    }

    /// Empty assistant message that stream content is appended to.
    pub fn assistant_placeholder() -> Self {
        Self {
            id: local_id(),
            content: String::new(),
            is_user_message: false,
            created_at: Utc::now(),
            search_payload: None,
        }
    }

    pub fn is_local(&self) -> bool {
        self.id.starts_with("local-")
    }
}
