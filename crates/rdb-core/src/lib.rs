//! Core domain + application logic for the Raindrop forwarding bot.
//!
//! This crate is intentionally framework-agnostic. Telegram, Raindrop.io, the
//! HTML paste service and the image host live behind ports (traits) implemented
//! in adapter crates.

pub mod aggregator;
pub mod classifier;
pub mod compose;
pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod message;
pub mod messaging;
pub mod ports;
pub mod search;
pub mod security;
pub mod usage;
pub mod users;
pub mod utils;

pub use errors::{Error, Result};
