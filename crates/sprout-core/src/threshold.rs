// ── Threshold evaluation ──
//
// Per-channel bounds and the stateless classification derived from them.
// Classification is recomputed from scratch on every call; there is no
// hysteresis.

use std::collections::BTreeMap;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;
use tracing::{debug, warn};

use sprout_api::{ThresholdBounds, ThresholdTable};

use crate::error::CoreError;
use crate::model::{ChannelId, ChannelValue};
use crate::store::Snapshot;

/// Why a bound pair was refused.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ThresholdError {
    #[error("lower bound {lower} is above upper bound {upper}")]
    Inverted { lower: f64, upper: f64 },

    #[error("bounds must be finite numbers")]
    NotFinite,

    #[error("at least one bound is required")]
    Unbounded,
}

/// Which side(s) of the range a threshold watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum BoundKind {
    Range,
    LowerOnly,
    UpperOnly,
}

/// A validated `(lower?, upper?)` pair with at least one bound present.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ThresholdBounds", into = "ThresholdBounds")]
pub struct Threshold {
    lower: Option<f64>,
    upper: Option<f64>,
}

impl Threshold {
    pub fn new(lower: Option<f64>, upper: Option<f64>) -> Result<Self, ThresholdError> {
        if lower.is_some_and(|v| !v.is_finite()) || upper.is_some_and(|v| !v.is_finite()) {
            return Err(ThresholdError::NotFinite);
        }
        match (lower, upper) {
            (None, None) => Err(ThresholdError::Unbounded),
            (Some(lower), Some(upper)) if lower > upper => {
                Err(ThresholdError::Inverted { lower, upper })
            }
            _ => Ok(Self { lower, upper }),
        }
    }

    pub fn range(lower: f64, upper: f64) -> Result<Self, ThresholdError> {
        Self::new(Some(lower), Some(upper))
    }

    pub fn lower(&self) -> Option<f64> {
        self.lower
    }

    pub fn upper(&self) -> Option<f64> {
        self.upper
    }

    pub fn kind(&self) -> BoundKind {
        match (self.lower, self.upper) {
            (Some(_), Some(_)) => BoundKind::Range,
            (Some(_), None) => BoundKind::LowerOnly,
            _ => BoundKind::UpperOnly,
        }
    }

    pub fn bounds(&self) -> ThresholdBounds {
        ThresholdBounds {
            lower: self.lower,
            upper: self.upper,
        }
    }
}

impl TryFrom<ThresholdBounds> for Threshold {
    type Error = ThresholdError;

    fn try_from(bounds: ThresholdBounds) -> Result<Self, Self::Error> {
        Self::new(bounds.lower, bounds.upper)
    }
}

impl From<Threshold> for ThresholdBounds {
    fn from(threshold: Threshold) -> Self {
        threshold.bounds()
    }
}

// ── Classification ──────────────────────────────────────────────────

/// Status of a value relative to its channel's threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Classification {
    Normal,
    BelowLower,
    AboveUpper,
    /// No threshold is configured for the channel.
    UnboundedOk,
}

impl Classification {
    pub fn is_alert(self) -> bool {
        matches!(self, Self::BelowLower | Self::AboveUpper)
    }
}

/// Classify `value` against `threshold`. Bounds are inclusive.
pub fn classify(value: f64, threshold: Option<&Threshold>) -> Classification {
    let Some(threshold) = threshold else {
        return Classification::UnboundedOk;
    };
    if threshold.lower.is_some_and(|lower| value < lower) {
        Classification::BelowLower
    } else if threshold.upper.is_some_and(|upper| value > upper) {
        Classification::AboveUpper
    } else {
        Classification::Normal
    }
}

/// One out-of-range channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub channel: ChannelId,
    pub value: ChannelValue,
    pub classification: Classification,
    pub threshold: Threshold,
}

// ── ThresholdEvaluator ──────────────────────────────────────────────

/// Owns the per-channel thresholds.
///
/// Thresholds change only through [`set_threshold`](Self::set_threshold)
/// and [`load`](Self::load); they are never inferred from data.
pub struct ThresholdEvaluator {
    thresholds: DashMap<String, Threshold>,
}

impl ThresholdEvaluator {
    /// An evaluator with no thresholds: everything is `UnboundedOk`.
    pub fn new() -> Self {
        Self {
            thresholds: DashMap::new(),
        }
    }

    /// An evaluator preloaded with [`default_thresholds`].
    pub fn with_defaults() -> Self {
        let evaluator = Self::new();
        for (channel, threshold) in default_thresholds() {
            evaluator.insert(channel, threshold);
        }
        evaluator
    }

    /// Set, replace, or (with both bounds `None`) clear a channel's
    /// threshold. Returns the threshold now in effect.
    pub fn set_threshold(
        &self,
        channel: &str,
        lower: Option<f64>,
        upper: Option<f64>,
    ) -> Result<Option<Threshold>, CoreError> {
        if lower.is_none() && upper.is_none() {
            self.thresholds.remove(channel);
            debug!(channel, "threshold cleared");
            return Ok(None);
        }
        let threshold = validate(channel, lower, upper)?;
        self.thresholds.insert(channel.to_owned(), threshold);
        debug!(channel, ?lower, ?upper, "threshold set");
        Ok(Some(threshold))
    }

    /// Install an already-validated threshold.
    pub fn insert(&self, channel: impl Into<String>, threshold: Threshold) {
        self.thresholds.insert(channel.into(), threshold);
    }

    pub fn threshold(&self, channel: &str) -> Option<Threshold> {
        self.thresholds.get(channel).map(|entry| *entry.value())
    }

    /// All thresholds, sorted by channel.
    pub fn all(&self) -> BTreeMap<String, Threshold> {
        self.thresholds
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    /// Merge a backend threshold table. Invalid entries are skipped and
    /// logged. Returns how many were applied.
    pub fn load(&self, table: &ThresholdTable) -> usize {
        let mut applied = 0;
        for (channel, bounds) in table {
            match Threshold::try_from(*bounds) {
                Ok(threshold) => {
                    self.thresholds.insert(channel.clone(), threshold);
                    applied += 1;
                }
                Err(ThresholdError::Unbounded) => {
                    self.thresholds.remove(channel);
                }
                Err(e) => warn!(channel, error = %e, "ignoring invalid threshold from backend"),
            }
        }
        applied
    }

    /// Classify a channel value against that channel's threshold.
    pub fn classify(&self, channel: &str, value: &ChannelValue) -> Classification {
        let Some(numeric) = value.as_f64() else {
            return Classification::UnboundedOk;
        };
        let threshold = self.threshold(channel);
        classify(numeric, threshold.as_ref())
    }

    /// Every channel in `snapshot` currently outside its threshold.
    pub fn alerts(&self, snapshot: &Snapshot) -> Vec<Alert> {
        snapshot
            .channels
            .values()
            .filter_map(|state| {
                let threshold = self.threshold(state.id.name())?;
                let classification = classify(state.value.as_f64()?, Some(&threshold));
                classification.is_alert().then(|| Alert {
                    channel: state.id.clone(),
                    value: state.value,
                    classification,
                    threshold,
                })
            })
            .collect()
    }
}

impl Default for ThresholdEvaluator {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Validate a bound pair for `channel`.
pub fn validate(
    channel: &str,
    lower: Option<f64>,
    upper: Option<f64>,
) -> Result<Threshold, CoreError> {
    Threshold::new(lower, upper).map_err(|source| CoreError::InvalidThreshold {
        channel: channel.to_owned(),
        source,
    })
}

/// Stock greenhouse ranges.
pub fn default_thresholds() -> Vec<(String, Threshold)> {
    [
        ("temp", 18.0, 32.0),
        ("humidity", 40.0, 80.0),
        ("moisture", 30.0, 70.0),
        ("light", 500.0, 2000.0),
    ]
    .into_iter()
    .map(|(channel, lower, upper)| {
        (
            channel.to_owned(),
            Threshold {
                lower: Some(lower),
                upper: Some(upper),
            },
        )
    })
    .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::model::UpdateSource;
    use crate::store::ChannelStore;

    #[test]
    fn bounds_are_inclusive() {
        let t = Threshold::range(18.0, 32.0).unwrap();

        assert_eq!(classify(32.0, Some(&t)), Classification::Normal);
        assert_eq!(classify(18.0, Some(&t)), Classification::Normal);
        assert_eq!(classify(32.0 + 1e-9, Some(&t)), Classification::AboveUpper);
        assert_eq!(classify(17.999, Some(&t)), Classification::BelowLower);
    }

    #[test]
    fn missing_threshold_is_unbounded_ok() {
        assert_eq!(classify(9000.0, None), Classification::UnboundedOk);
    }

    #[test]
    fn one_sided_thresholds() {
        let floor = Threshold::new(Some(30.0), None).unwrap();
        let ceiling = Threshold::new(None, Some(900.0)).unwrap();

        assert_eq!(floor.kind(), BoundKind::LowerOnly);
        assert_eq!(ceiling.kind(), BoundKind::UpperOnly);
        assert_eq!(classify(1e6, Some(&floor)), Classification::Normal);
        assert_eq!(classify(-1e6, Some(&ceiling)), Classification::Normal);
        assert_eq!(classify(29.0, Some(&floor)), Classification::BelowLower);
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let evaluator = ThresholdEvaluator::new();
        let err = evaluator.set_threshold("temp", Some(40.0), Some(10.0)).unwrap_err();

        assert!(matches!(
            err,
            CoreError::InvalidThreshold {
                source: ThresholdError::Inverted { .. },
                ..
            }
        ));
        assert!(evaluator.threshold("temp").is_none());
        assert!(Threshold::new(Some(f64::NAN), None).is_err());
    }

    #[test]
    fn equal_bounds_are_allowed() {
        let evaluator = ThresholdEvaluator::new();
        let t = evaluator.set_threshold("fan", Some(1.0), Some(1.0)).unwrap().unwrap();
        assert_eq!(t.kind(), BoundKind::Range);
    }

    #[test]
    fn clearing_removes_threshold() {
        let evaluator = ThresholdEvaluator::with_defaults();
        assert!(evaluator.threshold("light").is_some());

        assert_eq!(evaluator.set_threshold("light", None, None).unwrap(), None);
        assert_eq!(
            evaluator.classify("light", &ChannelValue::Reading(5.0)),
            Classification::UnboundedOk
        );
    }

    #[test]
    fn load_skips_invalid_entries() {
        let evaluator = ThresholdEvaluator::new();
        let table = ThresholdTable::from([
            (
                "temp".to_owned(),
                ThresholdBounds {
                    lower: Some(15.0),
                    upper: Some(28.0),
                },
            ),
            (
                "humidity".to_owned(),
                ThresholdBounds {
                    lower: Some(90.0),
                    upper: Some(10.0),
                },
            ),
        ]);

        assert_eq!(evaluator.load(&table), 1);
        assert_eq!(evaluator.threshold("temp").unwrap().upper(), Some(28.0));
        assert!(evaluator.threshold("humidity").is_none());
    }

    #[test]
    fn alerts_lists_out_of_range_channels() {
        let store = ChannelStore::new();
        let evaluator = ThresholdEvaluator::with_defaults();
        let now = Utc::now();

        store.apply_update(&ChannelId::sensor("temp"), ChannelValue::Reading(33.0), UpdateSource::Stream, now);
        store.apply_update(&ChannelId::sensor("humidity"), ChannelValue::Reading(55.0), UpdateSource::Stream, now);
        store.apply_update(&ChannelId::sensor("moisture"), ChannelValue::Reading(12.0), UpdateSource::Stream, now);
        store.apply_update(&ChannelId::actuator("pump"), ChannelValue::State(1), UpdateSource::Stream, now);

        let alerts = evaluator.alerts(&store.snapshot());
        let summary: Vec<(&str, Classification)> = alerts
            .iter()
            .map(|a| (a.channel.name(), a.classification))
            .collect();

        assert_eq!(
            summary,
            vec![
                ("moisture", Classification::BelowLower),
                ("temp", Classification::AboveUpper),
            ]
        );
    }

    #[test]
    fn threshold_deserializes_through_validation() {
        let ok: Threshold = serde_json::from_str(r#"{"lower":1.0,"upper":2.0}"#).unwrap();
        assert_eq!(ok.kind(), BoundKind::Range);
        assert!(serde_json::from_str::<Threshold>(r#"{"lower":3.0,"upper":2.0}"#).is_err());
    }
}
