//! Outbound messaging abstractions (Telegram today; other transports later).

pub mod port;
pub mod throttled;
pub mod types;
