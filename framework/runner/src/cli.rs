use std::path::PathBuf;

use clap::Parser;

use crate::config::NoncePolicy;

/// Benchmark a cache-fronted HTTP API with a fixed population of virtual users.
///
/// Every flag is optional. Values are taken from the flags first, then from the `--config` file,
/// then from the built-in defaults.
#[derive(Parser, Debug, Clone, Default)]
#[command(about, long_about = None)]
pub struct CacheTunnelCli {
    /// Path to a TOML file with run settings
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Base URL of the API under test, for example `http://localhost:8001`
    #[clap(long)]
    pub api_base_url: Option<String>,

    /// The resource the API is asked to parse. The nonce is added to it as the `ts` query parameter
    #[clap(long)]
    pub resource_url: Option<String>,

    /// The endpoint read by the fetch calls.
    ///
    /// Defaults to `{api_base_url}/api/{content_hash}`, the endpoint the API serves for the cache
    /// slot of the current iteration.
    #[clap(long)]
    pub fetch_url: Option<String>,

    /// The number of virtual users to run
    #[clap(long)]
    pub virtual_users: Option<usize>,

    /// The total number of iterations, split evenly between the virtual users
    #[clap(long)]
    pub iterations: Option<usize>,

    /// The number of fetch calls in each iteration
    #[clap(long)]
    pub fetch_count: Option<usize>,

    /// Milliseconds to wait after each fetch call
    #[clap(long)]
    pub delay_ms: Option<u64>,

    /// Whether to wait after the last fetch call of an iteration, `true` or `false`
    #[clap(long)]
    pub delay_after_last_fetch: Option<bool>,

    /// The run nonce used to build cache-busting URLs. Defaults to the current Unix timestamp.
    ///
    /// Reuse a nonce from an earlier run to measure a warm cache.
    #[clap(long)]
    pub nonce: Option<String>,

    /// Whether every iteration shares the run nonce or gets its own
    #[clap(long, value_enum)]
    pub nonce_policy: Option<NoncePolicy>,

    /// Timeout for each individual request, in seconds
    #[clap(long)]
    pub request_timeout_s: Option<u64>,

    /// Stop dispatching new iterations after this many seconds
    #[clap(long)]
    pub duration: Option<u64>,

    /// Append the run record to this file as a JSON line
    #[clap(long)]
    pub summary_file: Option<PathBuf>,

    /// Use this run id instead of generating one
    #[clap(long)]
    pub run_id: Option<String>,

    /// Do not show a progress bar on the CLI.
    ///
    /// This is recommended for CI/CD environments where the progress bar isn't being looked at by anyone and is just adding noise to the logs.
    #[clap(long, default_value = "false")]
    pub no_progress: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let cli = CacheTunnelCli::try_parse_from([
            "apify_cache",
            "--virtual-users",
            "3",
            "--nonce-policy",
            "per-iteration",
            "--delay-after-last-fetch",
            "false",
            "--no-progress",
        ])
        .unwrap();

        assert_eq!(Some(3), cli.virtual_users);
        assert_eq!(Some(NoncePolicy::PerIteration), cli.nonce_policy);
        assert_eq!(Some(false), cli.delay_after_last_fetch);
        assert!(cli.no_progress);
        assert_eq!(None, cli.iterations);
    }

    #[test]
    fn rejects_unknown_nonce_policy() {
        assert!(CacheTunnelCli::try_parse_from(["apify_cache", "--nonce-policy", "sometimes"]).is_err());
    }
}
