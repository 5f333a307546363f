// Actuator command endpoint
//
// `POST /devices/{channel}` with `{"value": "<text>"}`. The backend forwards
// the value to the device; confirmation arrives later on the push stream.

use tracing::debug;

use crate::client::BackendClient;
use crate::error::Error;
use crate::models::CommandBody;

impl BackendClient {
    /// Issue a command to the actuator behind `channel`.
    ///
    /// Returns the backend's response text. A 2xx only means the backend
    /// accepted the request, not that the device applied it.
    pub async fn send_command(&self, channel: &str, value: &str) -> Result<String, Error> {
        let url = self.backend_url(&format!("devices/{channel}"))?;
        debug!(channel, value, "sending device command");
        self.post_text(url, &CommandBody { value }).await
    }
}
