//! `sprout history`: recent feed data for one channel.

use tabled::Tabled;

use sprout_core::{Controller, FeedRecord, SyncConfig};

use crate::cli::{GlobalOpts, HistoryArgs};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct RecordRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Value")]
    value: String,
}

pub async fn handle(config: SyncConfig, args: HistoryArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let catalog = config.channels.clone();
    // History is a plain REST read; no need to connect.
    let controller = Controller::new(config)?;
    let records: Vec<FeedRecord> = controller
        .history(&args.channel, args.limit)
        .await
        .map_err(|e| util::core_error(e, &catalog))?;

    let out = output::render_list(
        &global.output,
        &records,
        |r| RecordRow {
            time: util::format_time(r.created_at),
            value: r.value.clone(),
        },
        |r| {
            let time = r.created_at.map(|t| t.to_rfc3339()).unwrap_or_default();
            format!("{time}\t{}", r.value)
        },
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
