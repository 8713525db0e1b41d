//! Core domain + application logic for the storefront drop watcher.
//!
//! This crate is intentionally framework-agnostic. The storefront HTTP API and
//! Telegram live behind ports (traits) implemented in adapter crates.

pub mod catalog;
pub mod commands;
pub mod config;
pub mod detector;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod notifier;
pub mod scheduler;
pub mod store;

pub use errors::{Error, Result};
