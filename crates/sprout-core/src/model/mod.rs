// ── Domain model ──
//
// Channel identity and state, plus the command lifecycle types that the
// dispatcher and store share.

pub mod channel;
pub mod command;

pub use channel::{
    ChannelCatalog, ChannelId, ChannelKind, ChannelState, ChannelUpdate, ChannelValue, Clock,
    UpdateSource,
};
pub use command::{CommandResolution, CommandStatus, PendingCommand};
