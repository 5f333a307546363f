// Wire models shared by the REST client and the push stream.
//
// Values always travel as text; the core parses them per channel kind.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

/// One inbound push message: `{ channel, value, timestamp? }`.
///
/// The dashboard backend labels the channel `type`, the feed service uses
/// `feed`; both are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushMessage {
    #[serde(alias = "type", alias = "feed")]
    pub channel: String,

    #[serde(deserialize_with = "text_value")]
    pub value: String,

    /// RFC 3339 timestamp from the backend, if it sent one.
    #[serde(default, alias = "created_at")]
    pub timestamp: Option<String>,
}

/// A single datum from the feed service (`/{channel}/data/last`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedRecord {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(deserialize_with = "text_value")]
    pub value: String,

    #[serde(default)]
    pub feed_key: Option<String>,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Threshold bounds as stored by the backend's `/config` resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdBounds {
    #[serde(default)]
    pub lower: Option<f64>,
    #[serde(default)]
    pub upper: Option<f64>,
}

/// Full `/config` payload: channel name → bounds.
pub type ThresholdTable = BTreeMap<String, ThresholdBounds>;

/// Body of `POST /devices/{channel}`.
#[derive(Debug, Serialize)]
pub(crate) struct CommandBody<'a> {
    pub value: &'a str,
}

/// Accept strings, numbers, and booleans as a textual value.
///
/// Sensors sometimes publish bare JSON numbers; actuators occasionally
/// publish `true`/`false` instead of `"1"`/`"0"`.
pub(crate) fn text_value<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Bool(b) => Ok(if b { "1" } else { "0" }.to_owned()),
        other => Err(D::Error::custom(format!("expected a text value, got {other}"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn push_message_accepts_type_alias_and_numbers() {
        let msg: PushMessage = serde_json::from_str(r#"{"type":"temp","value":31.5}"#).unwrap();
        assert_eq!(
            msg,
            PushMessage {
                channel: "temp".into(),
                value: "31.5".into(),
                timestamp: None,
            }
        );
    }

    #[test]
    fn push_message_maps_booleans_to_codes() {
        let msg: PushMessage =
            serde_json::from_str(r#"{"channel":"pump","value":true,"timestamp":"2026-01-01T00:00:00Z"}"#)
                .unwrap();
        assert_eq!(msg.value, "1");
        assert_eq!(msg.timestamp.as_deref(), Some("2026-01-01T00:00:00Z"));
    }

    #[test]
    fn push_message_rejects_structured_values() {
        let res = serde_json::from_str::<PushMessage>(r#"{"channel":"temp","value":{"x":1}}"#);
        assert!(res.is_err());
    }

    #[test]
    fn feed_record_from_feed_service_shape() {
        let json = r#"{
            "id": "0F8ABC",
            "value": "27.4",
            "feed_id": 2913,
            "feed_key": "temp",
            "created_at": "2026-03-01T08:15:00Z",
            "expiration": "2026-04-01T08:15:00Z"
        }"#;
        let record: FeedRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.value, "27.4");
        assert_eq!(record.feed_key.as_deref(), Some("temp"));
        assert!(record.created_at.is_some());
    }

    #[test]
    fn threshold_table_allows_missing_bounds() {
        let table: ThresholdTable =
            serde_json::from_str(r#"{"temp":{"lower":18,"upper":32},"moisture":{"lower":30}}"#)
                .unwrap();
        assert_eq!(table["temp"].upper, Some(32.0));
        assert_eq!(table["moisture"].upper, None);
    }
}
