//! `sprout alerts`: channels outside their thresholds right now.

use tabled::Tabled;

use sprout_core::{Alert, Controller, SyncConfig};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct AlertRow {
    #[tabled(rename = "Channel")]
    channel: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Lower")]
    lower: String,
    #[tabled(rename = "Upper")]
    upper: String,
}

pub async fn handle(config: SyncConfig, global: &GlobalOpts) -> Result<(), CliError> {
    let catalog = config.channels.clone();
    let alerts: Vec<Alert> = Controller::oneshot(config, |controller| async move { Ok(controller.alerts()) })
        .await
        .map_err(|e| util::core_error(e, &catalog))?;

    if alerts.is_empty() && matches!(global.output, crate::cli::OutputFormat::Table) {
        if !global.quiet {
            eprintln!("All channels within thresholds");
        }
        return Ok(());
    }

    let color = output::should_color(&global.color);
    let out = output::render_list(
        &global.output,
        &alerts,
        |a| AlertRow {
            channel: a.channel.name().to_owned(),
            value: a.value.to_string(),
            status: output::classification_label(a.classification, color),
            lower: util::format_bound(a.threshold.lower()),
            upper: util::format_bound(a.threshold.upper()),
        },
        |a| format!("{}\t{}\t{}", a.channel, a.value, a.classification),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
