//! `sprout status`: one REST reconciliation, then a classified view of
//! every channel.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tabled::Tabled;

use sprout_core::{
    ChannelKind, ChannelValue, Classification, Controller, Snapshot, SyncConfig, ThresholdEvaluator,
    UpdateSource,
};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

use super::util;

/// One catalog channel as reported by `status`.
#[derive(Debug, Serialize)]
pub struct ChannelEntry {
    pub channel: String,
    pub kind: ChannelKind,
    pub value: Option<ChannelValue>,
    pub classification: Option<Classification>,
    pub source: Option<UpdateSource>,
    pub updated_at: Option<DateTime<Utc>>,
    pub provisional: bool,
    pub stale: bool,
}

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct ChannelRow {
    #[tabled(rename = "Channel")]
    channel: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Updated")]
    updated: String,
    #[tabled(rename = "Source")]
    source: String,
}

impl ChannelRow {
    fn from_entry(entry: &ChannelEntry, color: bool) -> Self {
        let mut status = entry
            .classification
            .map(|c| output::classification_label(c, color))
            .unwrap_or_default();
        if entry.stale {
            status = format!("{status} {}", output::stale_label(true, color))
                .trim()
                .to_owned();
        }
        Self {
            channel: entry.channel.clone(),
            kind: entry.kind.to_string(),
            value: util::format_value(entry.value),
            status,
            updated: util::format_time(entry.updated_at),
            source: entry.source.map(|s| s.to_string()).unwrap_or_default(),
        }
    }
}

/// Join catalog, snapshot, and thresholds into one entry per channel.
pub fn entries(controller: &Controller, snapshot: &Snapshot) -> Vec<ChannelEntry> {
    let evaluator: &ThresholdEvaluator = controller.evaluator();
    controller
        .catalog()
        .ids()
        .map(|id| {
            let state = snapshot.get(id.name());
            ChannelEntry {
                channel: id.name().to_owned(),
                kind: id.kind(),
                value: state.map(|s| s.value),
                classification: state.map(|s| evaluator.classify(id.name(), &s.value)),
                source: state.map(|s| s.source),
                updated_at: state.map(|s| s.updated_at),
                provisional: state.is_some_and(|s| s.provisional),
                stale: snapshot.stale,
            }
        })
        .collect()
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(config: SyncConfig, global: &GlobalOpts) -> Result<(), CliError> {
    let catalog = config.channels.clone();
    let entries = Controller::oneshot(config, |controller| async move {
        let snapshot = controller.snapshot();
        Ok(entries(&controller, &snapshot))
    })
    .await
    .map_err(|e| util::core_error(e, &catalog))?;

    let color = output::should_color(&global.color);
    let out = output::render_list(
        &global.output,
        &entries,
        |e| ChannelRow::from_entry(e, color),
        |e| {
            format!(
                "{}\t{}\t{}",
                e.channel,
                util::format_value(e.value),
                e.classification.map(|c| c.to_string()).unwrap_or_default()
            )
        },
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
