//! Call-log record types
//!
//! [`CallLogRow`] is what a store hands back, column for column.
//! [`CallLogRecord`] is what crosses the channel.

use serde::{Deserialize, Serialize};

/// Platform call type codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CallType {
    Incoming,
    Outgoing,
    Missed,
    Voicemail,
    Rejected,
    Blocked,
    AnsweredExternally,
}

impl CallType {
    /// Integer code stored in the call log
    pub fn code(self) -> i32 {
        match self {
            CallType::Incoming => 1,
            CallType::Outgoing => 2,
            CallType::Missed => 3,
            CallType::Voicemail => 4,
            CallType::Rejected => 5,
            CallType::Blocked => 6,
            CallType::AnsweredExternally => 7,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(CallType::Incoming),
            2 => Some(CallType::Outgoing),
            3 => Some(CallType::Missed),
            4 => Some(CallType::Voicemail),
            5 => Some(CallType::Rejected),
            6 => Some(CallType::Blocked),
            7 => Some(CallType::AnsweredExternally),
            _ => None,
        }
    }
}

/// One row of the platform call log, as projected by the query
///
/// String columns may be null in the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallLogRow {
    #[serde(default)]
    pub cached_formatted_number: Option<String>,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(rename = "type")]
    pub call_type: i32,
    /// Epoch milliseconds
    pub date: i64,
    /// Seconds
    pub duration: i64,
    #[serde(default)]
    pub cached_name: Option<String>,
}

impl CallLogRow {
    /// Convenience constructor for a row with number and timestamp
    pub fn new(number: impl Into<String>, call_type: CallType, date: i64, duration: i64) -> Self {
        Self {
            cached_formatted_number: None,
            number: Some(number.into()),
            call_type: call_type.code(),
            date,
            duration,
            cached_name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.cached_name = Some(name.into());
        self
    }

    pub fn with_formatted_number(mut self, formatted: impl Into<String>) -> Self {
        self.cached_formatted_number = Some(formatted.into());
        self
    }
}

/// A call-log entry as delivered to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallLogRecord {
    pub formatted_number: String,
    pub number: String,
    pub call_type: i32,
    /// Epoch milliseconds
    pub timestamp: i64,
    /// Seconds
    pub duration: i64,
    pub name: String,
}

impl CallLogRecord {
    /// Decoded call type, if the code is known
    pub fn kind(&self) -> Option<CallType> {
        CallType::from_code(self.call_type)
    }
}

impl From<CallLogRow> for CallLogRecord {
    fn from(row: CallLogRow) -> Self {
        Self {
            formatted_number: row.cached_formatted_number.unwrap_or_default(),
            number: row.number.unwrap_or_default(),
            call_type: row.call_type,
            timestamp: row.date,
            duration: row.duration,
            name: row.cached_name.unwrap_or_default(),
        }
    }
}
