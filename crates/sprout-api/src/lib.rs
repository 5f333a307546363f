// sprout-api: Async Rust client for greenhouse backends (REST + push stream)

pub mod client;
pub mod devices;
pub mod error;
pub mod feeds;
pub mod models;
pub mod stream;
pub mod thresholds;
pub mod transport;

pub use client::BackendClient;
pub use error::Error;
pub use models::{FeedRecord, PushMessage, ThresholdBounds, ThresholdTable};
pub use stream::{ReconnectConfig, StreamEvent, StreamHandle};
pub use transport::{TlsMode, TransportConfig};
