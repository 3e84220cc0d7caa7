//! Email and realtime message types
//!
//! The realtime server pushes JSON envelopes of the form
//! `{"type": "...", "data": {...}}`. Only `new_email` and `sync_status`
//! are understood; anything else is reported as unknown so the caller can
//! log and drop it.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::types::error::{OneMailError, Result};

/// Category assigned to an email by the backend classifier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmailCategory {
    Interested,
    Meeting,
    NotInterested,
    Spam,
    Ooo,
    #[default]
    Uncategorized,
}

/// An email item as delivered by the realtime server
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EmailMessage {
    pub id: String,
    pub subject: String,
    pub sender: String,
    pub sender_email: String,
    pub preview: String,
    pub body: String,
    pub date: Option<String>,
    pub category: EmailCategory,
    pub account: String,
    pub is_read: bool,
    pub has_attachments: bool,
}

/// State of the remote ingestion pipeline
///
/// Values the server adds later arrive as `Other` with the raw string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SyncStatus {
    Idle,
    Syncing,
    Error,
    Stopped,
    Other(String),
}

impl SyncStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Idle => "idle",
            Self::Syncing => "syncing",
            Self::Error => "error",
            Self::Stopped => "stopped",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for SyncStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "idle" => Self::Idle,
            "syncing" => Self::Syncing,
            "error" => Self::Error,
            "stopped" => Self::Stopped,
            _ => Self::Other(s),
        }
    }
}

impl From<SyncStatus> for String {
    fn from(status: SyncStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEmailData {
    pub email: EmailMessage,
    pub user_id: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusData {
    pub status: SyncStatus,
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// Inbound realtime message
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeMessage {
    NewEmail(NewEmailData),
    SyncStatus(SyncStatusData),
}

impl RealtimeMessage {
    /// User the message is addressed to
    pub fn user_id(&self) -> &str {
        match self {
            Self::NewEmail(data) => &data.user_id,
            Self::SyncStatus(data) => &data.user_id,
        }
    }
}

/// Result of decoding one text frame
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Message(RealtimeMessage),
    /// Well-formed envelope with a tag we do not handle
    Unknown(String),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Decode a realtime text frame
///
/// Returns `Err` when the payload is not a valid envelope or when a known
/// tag carries data missing required fields.
pub fn parse_realtime_message(text: &str) -> Result<InboundFrame> {
    let envelope: Envelope = serde_json::from_str(text)?;

    match envelope.kind.as_str() {
        "new_email" => {
            let data: NewEmailData = serde_json::from_value(envelope.data)?;
            Ok(InboundFrame::Message(RealtimeMessage::NewEmail(data)))
        }
        "sync_status" => {
            let data: SyncStatusData = serde_json::from_value(envelope.data)?;
            Ok(InboundFrame::Message(RealtimeMessage::SyncStatus(data)))
        }
        _ => Ok(InboundFrame::Unknown(envelope.kind)),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Millis(i64),
    FractionalMillis(f64),
    Text(String),
}

/// Accept either an RFC 3339 string or epoch milliseconds
fn deserialize_timestamp<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = RawTimestamp::deserialize(deserializer)?;
    timestamp_from_raw(raw).map_err(serde::de::Error::custom)
}

fn timestamp_from_raw(raw: RawTimestamp) -> Result<DateTime<Utc>> {
    match raw {
        RawTimestamp::Millis(ms) => Utc
            .timestamp_millis_opt(ms)
            .single()
            .ok_or_else(|| OneMailError::Parse(format!("timestamp out of range: {}", ms))),
        RawTimestamp::FractionalMillis(ms) => Utc
            .timestamp_millis_opt(ms as i64)
            .single()
            .ok_or_else(|| OneMailError::Parse(format!("timestamp out of range: {}", ms))),
        RawTimestamp::Text(s) => DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| OneMailError::Parse(format!("invalid timestamp '{}': {}", s, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sync_status() {
        let text = r#"{"type":"sync_status","data":{"userId":"u1","status":"error","error":"IMAP timeout","timestamp":"2024-05-01T10:00:00Z"}}"#;
        match parse_realtime_message(text).unwrap() {
            InboundFrame::Message(RealtimeMessage::SyncStatus(data)) => {
                assert_eq!(data.user_id, "u1");
                assert_eq!(data.status, SyncStatus::Error);
                assert_eq!(data.error.as_deref(), Some("IMAP timeout"));
                assert_eq!(data.email, None);
                assert_eq!(data.timestamp.to_rfc3339(), "2024-05-01T10:00:00+00:00");
            }
            other => panic!("Expected SyncStatus, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_new_email_with_millis_timestamp() {
        let text = r#"{"type":"new_email","data":{"userId":"u1","timestamp":1714557600000,
            "email":{"id":"m1","subject":"Hello","sender":"Ana","senderEmail":"ana@example.com","category":"not-interested"}}}"#;
        match parse_realtime_message(text).unwrap() {
            InboundFrame::Message(RealtimeMessage::NewEmail(data)) => {
                assert_eq!(data.email.id, "m1");
                assert_eq!(data.email.subject, "Hello");
                assert_eq!(data.email.category, EmailCategory::NotInterested);
                assert!(!data.email.is_read);
                assert_eq!(data.timestamp.timestamp_millis(), 1_714_557_600_000);
            }
            other => panic!("Expected NewEmail, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_tag_is_not_an_error() {
        let frame = parse_realtime_message(r#"{"type":"heartbeat","data":{}}"#).unwrap();
        assert_eq!(frame, InboundFrame::Unknown("heartbeat".to_string()));
    }

    #[test]
    fn test_malformed_payloads() {
        assert!(parse_realtime_message("not json").is_err());
        assert!(parse_realtime_message(r#"{"data":{}}"#).is_err());
        // Known tag but missing the user id
        assert!(parse_realtime_message(
            r#"{"type":"sync_status","data":{"status":"idle","timestamp":"2024-05-01T10:00:00Z"}}"#
        )
        .is_err());
    }

    #[test]
    fn test_unlisted_sync_status_passes_through() {
        let text = r#"{"type":"sync_status","data":{"userId":"u1","status":"paused","timestamp":0}}"#;
        match parse_realtime_message(text).unwrap() {
            InboundFrame::Message(RealtimeMessage::SyncStatus(data)) => {
                assert_eq!(data.status, SyncStatus::Other("paused".to_string()));
                assert_eq!(data.status.to_string(), "paused");
            }
            other => panic!("Expected SyncStatus, got {:?}", other),
        }
        assert_eq!(
            serde_json::to_string(&SyncStatus::Syncing).unwrap(),
            r#""syncing""#
        );
    }
}
