//! Dashboard aggregation for a congregation: fetches an organization's
//! members, events, giving, tasks, messaging and families in one concurrent
//! batch, derives the dashboard statistics in-process, and caches the result
//! per organization for a fixed TTL.

pub mod cache;
pub mod config;
pub mod controller;
pub mod db;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod report;
pub mod service;
pub mod source;
pub mod stats;

#[cfg(test)]
mod testing;
