use crate::status_code::StatusCode;
use crate::variant::Variant;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Value with status and timestamps, as returned by reads and kept in history
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataValue {
    pub value: Variant,
    pub status: StatusCode,
    pub source_timestamp: Option<DateTime<Utc>>,
    pub server_timestamp: Option<DateTime<Utc>>,
}

impl DataValue {
    /// Good value stamped with the current time
    pub fn new_now(value: impl Into<Variant>) -> Self {
        let now = Utc::now();
        Self {
            value: value.into(),
            status: StatusCode::GOOD,
            source_timestamp: Some(now),
            server_timestamp: Some(now),
        }
    }

    /// Good value with an explicit source timestamp
    pub fn new_at(value: impl Into<Variant>, source_timestamp: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            status: StatusCode::GOOD,
            source_timestamp: Some(source_timestamp),
            server_timestamp: Some(Utc::now()),
        }
    }

    /// Value-less result carrying only a status
    pub fn from_status(status: StatusCode) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }
}
