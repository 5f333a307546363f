//! `sprout watch`: follow live updates until Ctrl-C.
//!
//! Prints one line per channel whose state changed. Structured formats
//! emit one JSON document per line (NDJSON) so the output can be piped.

use std::sync::Arc;

use tokio::sync::watch;

use sprout_core::{ConnectionState, Controller, Snapshot, SyncConfig};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

use super::status::{self, ChannelEntry};
use super::util;

pub async fn handle(config: SyncConfig, args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let catalog = config.channels.clone();
    let backend = config.backend_url.to_string();
    let controller = Controller::new(config)?;
    controller
        .connect()
        .await
        .map_err(|e| util::core_error(e, &catalog))?;

    let result = follow(&controller, &args, global, &backend).await;
    controller.disconnect().await;
    result
}

async fn follow(
    controller: &Controller,
    args: &WatchArgs,
    global: &GlobalOpts,
    backend: &str,
) -> Result<(), CliError> {
    let color = output::should_color(&global.color);
    let mut snapshots = controller.subscribe();
    let mut states: watch::Receiver<ConnectionState> = controller.connection_state();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    // Everything already known is printed once up front.
    let mut previous: Arc<Snapshot> = Arc::clone(snapshots.current());
    emit(controller, None, &previous, args, global, color)?;

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                if !global.quiet {
                    eprintln!("-- {state} --");
                }
                if state == ConnectionState::Disconnected {
                    return Err(CliError::ConnectionFailed {
                        url: backend.to_owned(),
                        source: "push stream gave up reconnecting".into(),
                    });
                }
            }
            next = snapshots.changed() => {
                let Some(snapshot) = next else { break };
                emit(controller, Some(previous.as_ref()), &snapshot, args, global, color)?;
                previous = snapshot;
            }
        }
    }
    Ok(())
}

/// Print every channel whose state differs from `before`.
fn emit(
    controller: &Controller,
    before: Option<&Snapshot>,
    after: &Snapshot,
    args: &WatchArgs,
    global: &GlobalOpts,
    color: bool,
) -> Result<(), CliError> {
    let changed = status::entries(controller, after)
        .into_iter()
        .filter(|e| e.value.is_some())
        .filter(|e| {
            before.is_none_or(|b| {
                b.get(&e.channel) != after.get(&e.channel) || b.stale != after.stale
            })
        })
        .filter(|e| !args.alerts_only || e.classification.is_some_and(|c| c.is_alert()));

    for entry in changed {
        let line = render_line(&entry, &global.output, color)?;
        output::print_output(&line, global.quiet);
    }
    Ok(())
}

fn render_line(entry: &ChannelEntry, format: &OutputFormat, color: bool) -> Result<String, CliError> {
    Ok(match format {
        OutputFormat::Json | OutputFormat::JsonCompact => serde_json::to_string(entry)?,
        OutputFormat::Yaml => format!("---\n{}", serde_yaml::to_string(entry)?),
        OutputFormat::Plain => format!("{}\t{}", entry.channel, util::format_value(entry.value)),
        OutputFormat::Table => {
            let class = entry
                .classification
                .map(|c| output::classification_label(c, color))
                .unwrap_or_default();
            let mut line = format!(
                "{}  {:<10} {:>8}  {}",
                util::format_time(entry.updated_at),
                entry.channel,
                util::format_value(entry.value),
                class
            );
            if entry.provisional {
                line.push_str(" (pending)");
            }
            if entry.stale {
                line.push(' ');
                line.push_str(&output::stale_label(true, color));
            }
            line
        }
    })
}
