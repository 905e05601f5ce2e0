//! Chat transport abstraction (Telegram today).

pub mod port;
