use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::serde_helpers::{deserialize_timestamp, serialize_timestamp};

/// An uploaded PDF document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub filename: String,
    #[serde(
        deserialize_with = "deserialize_timestamp",
        serialize_with = "serialize_timestamp"
    )]
    pub upload_date: DateTime<Utc>,
}
