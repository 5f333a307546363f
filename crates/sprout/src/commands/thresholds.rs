//! `sprout thresholds`: list and edit alert thresholds.

use serde::Serialize;
use tabled::Tabled;

use sprout_core::{BoundKind, Controller, SyncConfig, Threshold};

use crate::cli::{GlobalOpts, ThresholdsArgs, ThresholdsCommand};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Debug, Serialize)]
struct ThresholdEntry {
    channel: String,
    lower: Option<f64>,
    upper: Option<f64>,
}

impl ThresholdEntry {
    fn new(channel: String, threshold: &Threshold) -> Self {
        Self {
            channel,
            lower: threshold.lower(),
            upper: threshold.upper(),
        }
    }
}

#[derive(Tabled)]
struct ThresholdRow {
    #[tabled(rename = "Channel")]
    channel: String,
    #[tabled(rename = "Lower")]
    lower: String,
    #[tabled(rename = "Upper")]
    upper: String,
    #[tabled(rename = "Kind")]
    kind: String,
}

fn kind_label(entry: &ThresholdEntry) -> &'static str {
    match Threshold::new(entry.lower, entry.upper).map(|t| t.kind()) {
        Ok(BoundKind::Range) => "range",
        Ok(BoundKind::LowerOnly) => "lower-only",
        Ok(BoundKind::UpperOnly) => "upper-only",
        Err(_) => "-",
    }
}

pub async fn handle(
    config: SyncConfig,
    args: ThresholdsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let catalog = config.channels.clone();

    match args.command {
        ThresholdsCommand::List => {
            let entries: Vec<ThresholdEntry> =
                Controller::oneshot(config, |controller| async move {
                    Ok(controller
                        .thresholds()
                        .into_iter()
                        .map(|(channel, threshold)| ThresholdEntry::new(channel, &threshold))
                        .collect())
                })
                .await
                .map_err(|e| util::core_error(e, &catalog))?;

            let out = output::render_list(
                &global.output,
                &entries,
                |e| ThresholdRow {
                    channel: e.channel.clone(),
                    lower: util::format_bound(e.lower),
                    upper: util::format_bound(e.upper),
                    kind: kind_label(e).into(),
                },
                |e| {
                    format!(
                        "{}\t{}\t{}",
                        e.channel,
                        util::format_bound(e.lower),
                        util::format_bound(e.upper)
                    )
                },
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ThresholdsCommand::Set {
            channel,
            lower,
            upper,
            clear,
        } => {
            if !clear && lower.is_none() && upper.is_none() {
                return Err(CliError::Validation {
                    field: "threshold".into(),
                    reason: "give --lower, --upper, or --clear".into(),
                });
            }

            let name = channel.clone();
            let applied = Controller::oneshot(config, |controller| async move {
                controller.set_threshold(&channel, lower, upper).await
            })
            .await
            .map_err(|e| util::core_error(e, &catalog))?;

            if !global.quiet {
                match applied {
                    Some(t) => eprintln!(
                        "Threshold for {name} set to [{}, {}]",
                        util::format_bound(t.lower()),
                        util::format_bound(t.upper())
                    ),
                    None => eprintln!("Threshold for {name} cleared"),
                }
            }
            Ok(())
        }
    }
}
