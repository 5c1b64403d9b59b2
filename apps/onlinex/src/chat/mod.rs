//! Realtime chat: one connection manager per room or AI conversation, the
//! message log it fills, and a console that drives it.

pub mod connector;
pub mod console;
pub mod error;
pub mod log;
pub mod target;

pub use connector::{
    CloseReason, ConnectionManager, ConnectionStatus, SessionEvent, SessionHandlers,
};
pub use error::ConnectorError;
pub use log::{ChatEntry, MessageLog, Role};
pub use target::{ChannelKind, ConnectionTarget};
