use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::serde_helpers::{deserialize_timestamp, serialize_timestamp};
use super::Message;

pub type SessionId = i64;

/// A conversation as listed by `GET /chat/sessions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    #[serde(default)]
    pub name: String,
    #[serde(
        deserialize_with = "deserialize_timestamp",
        serialize_with = "serialize_timestamp"
    )]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_count: Option<u64>,
}

/// A conversation with its full history, from `GET /chat/sessions/{id}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SessionDetail {
    pub id: SessionId,
    #[serde(default)]
    pub name: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl SessionDetail {
    pub fn summary(&self) -> Session {
        Session {
            id: self.id,
            name: self.name.clone(),
            created_at: self.created_at,
            message_count: Some(self.messages.len() as u64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_list_entry_parses() {
        let session: Session = serde_json::from_value(json!({
            "id": 7,
            "name": "Rust questions",
            "created_at": "2024-05-01T10:00:00+00:00",
            "message_count": 4
        }))
        .expect("session");

        assert_eq!(session.id, 7);
        assert_eq!(session.message_count, Some(4));
    }

    #[test]
    fn test_session_detail_carries_messages() {
        let detail: SessionDetail = serde_json::from_value(json!({
            "id": 42,
            "name": "New Chat",
            "created_at": "2024-05-01T10:00:00",
            "messages": [
                {"id": 1, "content": "hi", "is_user_message": true, "created_at": "2024-05-01T10:00:01", "searchData": null},
                {"id": 2, "content": "hello", "is_user_message": false, "created_at": "2024-05-01T10:00:02"}
            ]
        }))
        .expect("detail");

        assert_eq!(detail.messages.len(), 2);
        assert_eq!(detail.summary().message_count, Some(2));
        assert_eq!(detail.messages[1].id, "2");
    }
}
