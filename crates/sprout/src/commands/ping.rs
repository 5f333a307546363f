//! `sprout ping`: backend liveness probe.

use std::time::Instant;

use serde::Serialize;

use sprout_core::{Controller, SyncConfig};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
struct Pong {
    backend: String,
    latency_ms: u128,
    response: String,
}

pub async fn handle(config: SyncConfig, global: &GlobalOpts) -> Result<(), CliError> {
    let backend = config.backend_url.to_string();
    let controller = Controller::new(config)?;

    let started = Instant::now();
    let response = controller.health().await?;
    let pong = Pong {
        backend,
        latency_ms: started.elapsed().as_millis(),
        response: response.trim().to_owned(),
    };

    let out = output::render_single(
        &global.output,
        &pong,
        |p| format!("{} is up ({} ms)", p.backend, p.latency_ms),
        |p| p.latency_ms.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
