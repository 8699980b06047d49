//! Core domain and application logic for the message pipeline bot.
//!
//! This crate is transport-agnostic. The chat transport, the persistent store
//! and the media describer live behind ports (traits) implemented in adapter
//! crates.

pub mod cache;
pub mod classify;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod domain;
pub mod enrich;
pub mod errors;
pub mod events;
pub mod logging;
pub mod messaging;
pub mod pipeline;
pub mod store;

#[cfg(test)]
mod testing;

pub use errors::{Error, Result};
