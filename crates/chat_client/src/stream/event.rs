use chat_core::search::{self, SearchPayload};
use chat_core::SessionId;
use serde::Deserialize;

/// One decoded frame of the chat stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Sent once, before any content.
    Metadata(StreamMetadata),
    /// A fragment of the assistant's answer.
    Content { text: String },
    /// The answer is complete and has been stored.
    End,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StreamMetadata {
    /// Session the exchange was stored in; absent for anonymous users.
    #[serde(default, rename = "chat_session_id", alias = "session_id")]
    pub session_id: Option<SessionId>,
    #[serde(default, deserialize_with = "search::deserialize_optional")]
    pub search: Option<SearchPayload>,
    #[serde(default)]
    pub anonymous: bool,
    #[serde(default)]
    pub message_count: Option<u64>,
    /// Seconds the service spent before answering.
    #[serde(default)]
    pub duration: Option<f64>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireFrame {
    Metadata {
        #[serde(default)]
        data: Option<StreamMetadata>,
    },
    Content {
        #[serde(default)]
        text: String,
    },
    End,
}

impl StreamEvent {
    /// Parse the JSON payload of one frame.
    pub fn from_json(payload: &str) -> serde_json::Result<Self> {
        Ok(match serde_json::from_str::<WireFrame>(payload)? {
            WireFrame::Metadata { data } => StreamEvent::Metadata(data.unwrap_or_default()),
            WireFrame::Content { text } => StreamEvent::Content { text },
            WireFrame::End => StreamEvent::End,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_each_frame_type() {
        let metadata = json!({
            "type": "metadata",
            "data": {
                "search": "",
                "duration": 0.42,
                "chat_session_id": 7,
                "anonymous": false,
                "message_count": null
            }
        });
        let StreamEvent::Metadata(meta) =
            StreamEvent::from_json(&metadata.to_string()).expect("metadata")
        else {
            panic!("expected metadata");
        };
        assert_eq!(meta.session_id, Some(7));
        assert_eq!(meta.search, None);
        assert!(!meta.anonymous);

        assert_eq!(
            StreamEvent::from_json(r#"{"type":"content","text":"Hi"}"#).expect("content"),
            StreamEvent::Content {
                text: "Hi".to_string()
            }
        );
        assert_eq!(
            StreamEvent::from_json(r#"{"type":"end"}"#).expect("end"),
            StreamEvent::End
        );
    }

    #[test]
    fn test_anonymous_metadata_has_no_session() {
        let event = StreamEvent::from_json(
            r#"{"type":"metadata","data":{"chat_session_id":null,"anonymous":true,"message_count":1}}"#,
        )
        .expect("metadata");
        assert_eq!(
            event,
            StreamEvent::Metadata(StreamMetadata {
                anonymous: true,
                message_count: Some(1),
                ..StreamMetadata::default()
            })
        );
    }

    #[test]
    fn test_unknown_type_is_an_error() {
        assert!(StreamEvent::from_json(r#"{"type":"heartbeat"}"#).is_err());
        assert!(StreamEvent::from_json(r#"{"text":"no type"}"#).is_err());
    }
}
