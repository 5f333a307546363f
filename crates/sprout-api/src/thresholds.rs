// Threshold configuration endpoints
//
// `GET /config` returns every channel's bounds; `POST /config` writes one or
// more channels. Both require the bearer credential.

use std::collections::BTreeMap;

use tracing::debug;

use crate::client::BackendClient;
use crate::error::Error;
use crate::models::{ThresholdBounds, ThresholdTable};

impl BackendClient {
    /// Fetch the full threshold table.
    pub async fn thresholds(&self) -> Result<ThresholdTable, Error> {
        let url = self.backend_url("config")?;
        debug!("fetching threshold config");
        self.get_json(url).await
    }

    /// Write the bounds for a single channel.
    pub async fn update_threshold(
        &self,
        channel: &str,
        bounds: ThresholdBounds,
    ) -> Result<(), Error> {
        let url = self.backend_url("config")?;
        debug!(channel, ?bounds, "writing threshold config");
        let body: BTreeMap<&str, ThresholdBounds> = BTreeMap::from([(channel, bounds)]);
        self.post_text(url, &body).await?;
        Ok(())
    }
}
