//! Shared helpers for command handlers.

use chrono::{DateTime, Local, Utc};

use sprout_core::{ChannelCatalog, ChannelValue, CoreError};

use crate::error::CliError;

/// Convert a core error, filling in the channel list for unknown-channel
/// errors.
pub fn core_error(err: CoreError, catalog: &ChannelCatalog) -> CliError {
    match err {
        CoreError::UnknownChannel { name } => CliError::UnknownChannel {
            name,
            available: channel_names(catalog),
        },
        other => other.into(),
    }
}

pub fn channel_names(catalog: &ChannelCatalog) -> String {
    catalog
        .ids()
        .map(|id| id.name().to_owned())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn format_value(value: Option<ChannelValue>) -> String {
    value.map_or_else(|| "-".into(), |v| v.to_string())
}

/// Local wall-clock time for table views.
pub fn format_time(at: Option<DateTime<Utc>>) -> String {
    at.map_or_else(
        || "-".into(),
        |t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string(),
    )
}

pub fn format_bound(bound: Option<f64>) -> String {
    bound.map_or_else(|| "-".into(), |b| b.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_channel_lists_catalog() {
        let err = core_error(
            CoreError::UnknownChannel {
                name: "sprinkler".into(),
            },
            &ChannelCatalog::greenhouse(),
        );
        assert!(matches!(
            err,
            CliError::UnknownChannel { ref available, .. }
                if available == "fan, humidity, led, light, moisture, pump, temp"
        ));
    }

    #[test]
    fn missing_values_render_as_dash() {
        assert_eq!(format_value(None), "-");
        assert_eq!(format_value(Some(ChannelValue::State(1))), "1");
        assert_eq!(format_bound(Some(18.0)), "18");
    }
}
