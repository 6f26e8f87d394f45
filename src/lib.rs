//! Readings Proxy Library
//!
//! Caching and aggregation layer in front of a glucose telemetry share service
//! and a paginated document-database query API.

pub mod aggregate;
pub mod app;
pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
pub mod logging;
pub mod negotiate;
pub mod normalize;
pub mod proxy;
pub mod server;
