// Feed service endpoints
//
// Per-channel readings: the latest datum (used for polling and the
// reconnect reconciliation pass) and a short history window.

use tracing::debug;

use crate::client::BackendClient;
use crate::error::Error;
use crate::models::FeedRecord;

impl BackendClient {
    /// Latest datum for one channel.
    ///
    /// `GET {feed}/{channel}/data/last`
    pub async fn last_value(&self, channel: &str) -> Result<FeedRecord, Error> {
        let url = self.feed_service_url(&format!("{channel}/data/last"))?;
        debug!(channel, "polling last value");
        self.get_json(url).await
    }

    /// Most recent `limit` data points for one channel, newest first.
    ///
    /// `GET {feed}/{channel}/data?limit={limit}`
    pub async fn history(&self, channel: &str, limit: u32) -> Result<Vec<FeedRecord>, Error> {
        let mut url = self.feed_service_url(&format!("{channel}/data"))?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());
        debug!(channel, limit, "fetching history");
        self.get_json(url).await
    }
}
