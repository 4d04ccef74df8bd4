use crate::cli::CacheTunnelCli;
use clap::Parser;

/// Initialise the CLI and logging for the cache tunnel runner.
pub fn init() -> CacheTunnelCli {
    env_logger::init();

    CacheTunnelCli::parse()
}
