// ── Channel identity, values, and state ──

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::ParseError;

/// Whether a channel reports a continuous reading or a commandable state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ChannelKind {
    Sensor,
    Actuator,
}

/// A named channel tagged with its kind.
///
/// The kind travels with the name so an actuator command can never be
/// routed to a sensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId {
    name: String,
    kind: ChannelKind,
}

impl ChannelId {
    pub fn new(name: impl Into<String>, kind: ChannelKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn sensor(name: impl Into<String>) -> Self {
        Self::new(name, ChannelKind::Sensor)
    }

    pub fn actuator(name: impl Into<String>) -> Self {
        Self::new(name, ChannelKind::Actuator)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn is_actuator(&self) -> bool {
        self.kind == ChannelKind::Actuator
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// ── ChannelValue ────────────────────────────────────────────────────

/// A parsed channel value.
///
/// Sensors carry floating-point readings; actuators carry small integer
/// state codes (`0` off, `1` on, or a level).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelValue {
    Reading(f64),
    State(i64),
}

impl ChannelValue {
    /// Parse wire text according to the channel's kind.
    ///
    /// Readings must be finite. States accept integers plus the
    /// `on`/`off` and `true`/`false` spellings some firmware publishes.
    pub fn parse(channel: &ChannelId, raw: &str) -> Result<Self, ParseError> {
        let text = raw.trim();
        match channel.kind() {
            ChannelKind::Sensor => text
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(Self::Reading)
                .ok_or_else(|| ParseError::InvalidReading {
                    channel: channel.name().to_owned(),
                    value: raw.to_owned(),
                }),
            ChannelKind::Actuator => {
                let state = match text.to_ascii_lowercase().as_str() {
                    "on" | "true" => Some(1),
                    "off" | "false" => Some(0),
                    other => other.parse::<i64>().ok(),
                };
                state.map(Self::State).ok_or_else(|| ParseError::InvalidState {
                    channel: channel.name().to_owned(),
                    value: raw.to_owned(),
                })
            }
        }
    }

    /// Numeric view used for threshold classification.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Reading(v) => Some(v),
            Self::State(n) => i32::try_from(n).ok().map(f64::from),
        }
    }

    /// Text form sent to the backend.
    pub fn to_wire(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ChannelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reading(v) => write!(f, "{v}"),
            Self::State(n) => write!(f, "{n}"),
        }
    }
}

// ── UpdateSource ────────────────────────────────────────────────────

/// Where a value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum UpdateSource {
    Stream,
    Poll,
    OptimisticLocal,
}

impl UpdateSource {
    /// Stream and poll updates come from the backend and always win over
    /// local predictions.
    pub fn is_authoritative(self) -> bool {
        !matches!(self, Self::OptimisticLocal)
    }
}

// ── ChannelState ────────────────────────────────────────────────────

/// Current reconciled state of one channel, as seen in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelState {
    pub id: ChannelId,
    pub value: ChannelValue,
    pub updated_at: DateTime<Utc>,
    pub source: UpdateSource,
    /// Set while the value is an optimistic prediction awaiting
    /// confirmation from the backend.
    pub provisional: bool,
}

/// Which clock produced an update's timestamp.
///
/// Only backend timestamps are comparable with each other; a local receive
/// time says nothing about when the backend recorded the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clock {
    Backend,
    Local,
}

/// A decoded update, ready for [`ChannelStore::apply`](crate::store::ChannelStore::apply).
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelUpdate {
    pub channel: ChannelId,
    pub value: ChannelValue,
    pub source: UpdateSource,
    pub timestamp: DateTime<Utc>,
    pub clock: Clock,
}

// ── ChannelCatalog ──────────────────────────────────────────────────

/// The channels this deployment knows about, by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelCatalog {
    channels: BTreeMap<String, ChannelKind>,
}

impl ChannelCatalog {
    /// An empty catalog. Every inbound name is rejected until added.
    pub fn empty() -> Self {
        Self {
            channels: BTreeMap::new(),
        }
    }

    /// The stock greenhouse layout: four sensors and three actuators.
    pub fn greenhouse() -> Self {
        let mut catalog = Self::empty();
        for name in ["temp", "humidity", "moisture", "light"] {
            catalog.insert(name, ChannelKind::Sensor);
        }
        for name in ["pump", "fan", "led"] {
            catalog.insert(name, ChannelKind::Actuator);
        }
        catalog
    }

    /// Add or re-kind a channel.
    pub fn insert(&mut self, name: impl Into<String>, kind: ChannelKind) {
        self.channels.insert(name.into(), kind);
    }

    #[must_use]
    pub fn with_channel(mut self, name: impl Into<String>, kind: ChannelKind) -> Self {
        self.insert(name, kind);
        self
    }

    /// Look up a channel by name.
    pub fn resolve(&self, name: &str) -> Result<ChannelId, ParseError> {
        self.channels
            .get(name)
            .map(|kind| ChannelId::new(name, *kind))
            .ok_or_else(|| ParseError::UnknownChannel(name.to_owned()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    /// All channels, sorted by name.
    pub fn ids(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.channels
            .iter()
            .map(|(name, kind)| ChannelId::new(name.clone(), *kind))
    }

    pub fn actuators(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.ids().filter(ChannelId::is_actuator)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl Default for ChannelCatalog {
    fn default() -> Self {
        Self::greenhouse()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn sensor_values_parse_as_readings() {
        let temp = ChannelId::sensor("temp");
        assert_eq!(
            ChannelValue::parse(&temp, " 31.5 ").unwrap(),
            ChannelValue::Reading(31.5)
        );
        assert!(ChannelValue::parse(&temp, "NaN").is_err());
        assert!(ChannelValue::parse(&temp, "warm").is_err());
    }

    #[test]
    fn actuator_values_parse_as_states() {
        let pump = ChannelId::actuator("pump");
        assert_eq!(ChannelValue::parse(&pump, "1").unwrap(), ChannelValue::State(1));
        assert_eq!(ChannelValue::parse(&pump, "OFF").unwrap(), ChannelValue::State(0));
        assert_eq!(ChannelValue::parse(&pump, "true").unwrap(), ChannelValue::State(1));
        assert!(matches!(
            ChannelValue::parse(&pump, "0.5"),
            Err(ParseError::InvalidState { .. })
        ));
    }

    #[test]
    fn greenhouse_catalog_tags_kinds() {
        let catalog = ChannelCatalog::greenhouse();
        assert_eq!(catalog.len(), 7);
        assert!(catalog.resolve("pump").unwrap().is_actuator());
        assert!(!catalog.resolve("temp").unwrap().is_actuator());
        assert_eq!(
            catalog.resolve("co2"),
            Err(ParseError::UnknownChannel("co2".into()))
        );
        assert_eq!(catalog.actuators().count(), 3);
    }

    #[test]
    fn extra_channels_extend_catalog() {
        let catalog = ChannelCatalog::greenhouse().with_channel("co2", ChannelKind::Sensor);
        assert_eq!(catalog.resolve("co2").unwrap().kind(), ChannelKind::Sensor);
    }

    #[test]
    fn wire_text_round_trips_through_display() {
        assert_eq!(ChannelValue::State(1).to_wire(), "1");
        assert_eq!(ChannelValue::Reading(24.25).to_wire(), "24.25");
        assert_eq!(UpdateSource::OptimisticLocal.to_string(), "optimistic-local");
    }
}
