//! Command line configuration (§6 "CLI surface").
//!
//! The aggregator's documented surface is a single optional positional
//! argument, the listen port (default 4567). The remaining flags are
//! internal knobs (not part of the publisher/reader contract) that default
//! to the values `spec.md` names, so the binary behaves exactly as
//! specified with no flags at all.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Arg, Command};

use crate::server::ServerConfig;

const DEFAULT_PORT: u16 = 4567;

fn validate_port(value: &str) -> Result<u16, String> {
    value.parse::<u16>().map_err(|_| "invalid port number".to_owned())
}

fn validate_u64(value: &str) -> Result<u64, String> {
    value.parse::<u64>().map_err(|_| "invalid number".to_owned())
}

fn validate_usize(value: &str) -> Result<usize, String> {
    value.parse::<usize>().map_err(|_| "invalid number".to_owned())
}

/// Parses `std::env::args()` into a `ServerConfig`.
pub fn load_config() -> ServerConfig {
    parse_config(std::env::args_os())
}

fn command() -> Command {
    Command::new("Weather Aggregator")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Aggregates station weather observations pushed by publishers")
        .arg(
            Arg::new("port")
                .help("The port to listen on")
                .value_name("port")
                .value_parser(validate_port)
                .default_value("4567"),
        )
        .arg(
            Arg::new("data-path")
                .long("data-path")
                .help("Path to the persisted JSON snapshot")
                .default_value("resources/weather_data.json"),
        )
        .arg(
            Arg::new("ttl-secs")
                .long("ttl-secs")
                .help("Seconds a record may go unupdated before the sweeper removes it")
                .value_parser(validate_u64)
                .default_value("30"),
        )
        .arg(
            Arg::new("sweep-interval-secs")
                .long("sweep-interval-secs")
                .help("Seconds between sweeper runs")
                .value_parser(validate_u64)
                .default_value("10"),
        )
        .arg(
            Arg::new("queue-capacity")
                .long("queue-capacity")
                .help("Bounded FIFO capacity between the dispatcher and the pipeline")
                .value_parser(validate_usize)
                .default_value("64"),
        )
        .arg(
            Arg::new("pool-size")
                .long("pool-size")
                .help("Fixed dispatcher worker-pool size")
                .value_parser(validate_usize)
                .default_value("10"),
        )
}

fn parse_config<I, T>(args: I) -> ServerConfig
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let matches = command().get_matches_from(args);

    let port: u16 = matches.get_one::<u16>("port").copied().unwrap_or(DEFAULT_PORT);
    let data_path: PathBuf = matches
        .get_one::<String>("data-path")
        .expect("has a default value")
        .into();
    let ttl_secs = *matches.get_one::<u64>("ttl-secs").expect("has a default value");
    let sweep_interval_secs = *matches
        .get_one::<u64>("sweep-interval-secs")
        .expect("has a default value");
    let queue_capacity = *matches
        .get_one::<usize>("queue-capacity")
        .expect("has a default value");
    let pool_size = *matches.get_one::<usize>("pool-size").expect("has a default value");

    ServerConfig {
        bind_addr: format!("0.0.0.0:{port}"),
        data_path,
        ttl: Duration::from_secs(ttl_secs),
        sweep_period: Duration::from_secs(sweep_interval_secs),
        queue_capacity,
        pool_size,
    }
}
