//! Offline cache and pending-sync agent for the spese expense tracker.
//!
//! - [`cache`] serves GET requests network-first for the API and cache-first
//!   for the app shell, with per-endpoint offline placeholders
//! - [`sync`] queues mutations made while offline and replays them in order
//!   once connectivity returns
//! - [`api`] is a typed client over both

pub mod api;
pub mod app;
pub mod cache;
pub mod config;
pub mod db;
pub mod logging;
pub mod net;
pub mod sync;
