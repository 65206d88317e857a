//! Core routing and mapping logic for the topic relay.
//!
//! This crate is framework-agnostic. The Telegram HTTP API and the webhook server
//! live behind ports (traits) implemented in `relay-telegram`.

pub mod config;
pub mod directory;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod forwarder;
pub mod gateway;
pub mod logging;
pub mod platform;
pub mod provisioner;
pub mod router;
pub mod store;
pub mod update;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
