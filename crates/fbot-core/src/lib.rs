//! Core routing + state logic for the feedback relay bot.
//!
//! This crate is intentionally framework-agnostic. Telegram lives behind a
//! delivery port (trait) implemented in the adapter crate; the core only
//! decides who sent an event, what context it belongs to, and where the
//! response must go.

pub mod config;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod ledger;
pub mod logging;
pub mod messaging;
pub mod routing;
pub mod storage;

pub use errors::{Error, Result};
