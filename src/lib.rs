//! weather-aggregator: library entry point.
//!
//! Exposes the aggregator's components for the binary and for integration
//! tests. The publisher and reader CLIs this service talks to are external
//! collaborators (§1) and are not implemented here -- only their wire
//! contract (§6) is.

pub mod clock;
pub mod config;
pub mod http;
pub mod model;
pub mod pipeline;
pub mod server;
pub mod store;
pub mod sweeper;
pub mod time;
