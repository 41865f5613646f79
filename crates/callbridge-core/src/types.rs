use serde::{Deserialize, Serialize};
use std::fmt;

/// Unix epoch timestamp in seconds.
pub fn now_unix() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Chat identity as delivered by the front end.
pub type ChatId = i64;

/// First sheet of an export, one `Vec` per row, every cell rendered as text.
/// Row 0 is the header row.
pub type RawRows = Vec<Vec<String>>;

/// Call outcome as exported by the portal. Unknown values pass through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CallStatus {
    Answer,
    Cancel,
    Busy,
    Other(String),
}

impl CallStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Answer => "ANSWER",
            Self::Cancel => "CANCEL",
            Self::Busy => "BUSY",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for CallStatus {
    fn from(value: String) -> Self {
        match value.trim() {
            "ANSWER" => Self::Answer,
            "CANCEL" => Self::Cancel,
            "BUSY" => Self::Busy,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for CallStatus {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<CallStatus> for String {
    fn from(value: CallStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized row of the daily call report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub caller: String,
    pub agent: String,
    pub team: String,
    pub callee: String,
    pub status: CallStatus,
    pub duration_sec: u64,
    pub talktime_sec: u64,
    pub hangup_by: String,
    pub call_date: String,
    pub call_time: String,
    pub end_time: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_known_values() {
        assert_eq!(CallStatus::from("ANSWER"), CallStatus::Answer);
        assert_eq!(CallStatus::from("CANCEL"), CallStatus::Cancel);
        assert_eq!(CallStatus::from(" BUSY "), CallStatus::Busy);
    }

    #[test]
    fn test_status_passthrough() {
        let status = CallStatus::from("NO ANSWER");
        assert_eq!(status, CallStatus::Other("NO ANSWER".to_string()));
        assert_eq!(status.to_string(), "NO ANSWER");
    }

    #[test]
    fn test_status_serializes_as_string() {
        let json = serde_json::to_string(&CallStatus::Busy).unwrap();
        assert_eq!(json, "\"BUSY\"");
        let back: CallStatus = serde_json::from_str("\"FAILED\"").unwrap();
        assert_eq!(back, CallStatus::Other("FAILED".to_string()));
    }
}
