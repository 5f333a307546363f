// ── Wire → domain conversion ──
//
// Turns `sprout_api` payloads into `ChannelUpdate`s. Every failure here is
// a `ParseError`; callers log and drop.

use chrono::{DateTime, Utc};

use sprout_api::{FeedRecord, PushMessage};

use crate::error::ParseError;
use crate::model::{ChannelCatalog, ChannelId, ChannelUpdate, ChannelValue, Clock, UpdateSource};

/// Decode one push-stream message.
///
/// A missing timestamp means "now"; a present but unparseable one is a
/// malformed payload.
pub fn push_to_update(
    catalog: &ChannelCatalog,
    msg: &PushMessage,
) -> Result<ChannelUpdate, ParseError> {
    let channel = catalog.resolve(&msg.channel)?;
    let value = ChannelValue::parse(&channel, &msg.value)?;
    let (timestamp, clock) = match msg.timestamp.as_deref() {
        Some(raw) => (parse_timestamp(raw)?, Clock::Backend),
        None => (Utc::now(), Clock::Local),
    };

    Ok(ChannelUpdate {
        channel,
        value,
        source: UpdateSource::Stream,
        timestamp,
        clock,
    })
}

/// Decode the result of a last-value poll for `channel`.
pub fn record_to_update(
    channel: &ChannelId,
    record: &FeedRecord,
) -> Result<ChannelUpdate, ParseError> {
    let (timestamp, clock) = match record.created_at {
        Some(at) => (at, Clock::Backend),
        None => (Utc::now(), Clock::Local),
    };

    Ok(ChannelUpdate {
        channel: channel.clone(),
        value: ChannelValue::parse(channel, &record.value)?,
        source: UpdateSource::Poll,
        timestamp,
        clock,
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ParseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| ParseError::InvalidTimestamp(raw.to_owned()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn msg(channel: &str, value: &str, timestamp: Option<&str>) -> PushMessage {
        PushMessage {
            channel: channel.into(),
            value: value.into(),
            timestamp: timestamp.map(Into::into),
        }
    }

    #[test]
    fn push_message_with_timestamp() {
        let catalog = ChannelCatalog::greenhouse();
        let update =
            push_to_update(&catalog, &msg("temp", "31.5", Some("2026-02-10T12:00:00Z"))).unwrap();

        assert_eq!(update.channel, ChannelId::sensor("temp"));
        assert_eq!(update.value, ChannelValue::Reading(31.5));
        assert_eq!(update.source, UpdateSource::Stream);
        assert_eq!(update.timestamp.to_rfc3339(), "2026-02-10T12:00:00+00:00");
        assert_eq!(update.clock, Clock::Backend);
    }

    #[test]
    fn push_message_without_timestamp_uses_receive_time() {
        let catalog = ChannelCatalog::greenhouse();
        let update = push_to_update(&catalog, &msg("humidity", "61", None)).unwrap();

        assert_eq!(update.clock, Clock::Local);
    }

    #[test]
    fn malformed_messages_are_parse_errors() {
        let catalog = ChannelCatalog::greenhouse();

        assert!(matches!(
            push_to_update(&catalog, &msg("co2", "400", None)),
            Err(ParseError::UnknownChannel(_))
        ));
        assert!(matches!(
            push_to_update(&catalog, &msg("pump", "maybe", None)),
            Err(ParseError::InvalidState { .. })
        ));
        assert!(matches!(
            push_to_update(&catalog, &msg("temp", "20", Some("yesterday"))),
            Err(ParseError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn poll_record_becomes_poll_update() {
        let record = FeedRecord {
            id: None,
            value: "1".into(),
            feed_key: Some("fan".into()),
            created_at: None,
        };
        let update = record_to_update(&ChannelId::actuator("fan"), &record).unwrap();
        assert_eq!(update.source, UpdateSource::Poll);
        assert_eq!(update.value, ChannelValue::State(1));
        assert_eq!(update.clock, Clock::Local);
    }
}
