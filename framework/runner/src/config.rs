use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use cache_tunnel_core::prelude::InvalidInputError;
use cache_tunnel_instruments::DEFAULT_REQUEST_TIMEOUT;
use serde::Deserialize;

use crate::cli::CacheTunnelCli;

/// The csvapi deployment that the benchmark was written against.
pub const DEFAULT_API_BASE_URL: &str = "https://csvapi.data.gouv.fr";
/// A CSV resource on data.gouv.fr that the API is asked to parse.
pub const DEFAULT_RESOURCE_URL: &str =
    "https://www.data.gouv.fr/fr/datasets/r/e3d83ab3-dc52-4c99-abaf-8a38050cc68c";
pub const DEFAULT_VIRTUAL_USERS: usize = 10;
pub const DEFAULT_TOTAL_ITERATIONS: usize = 20;
pub const DEFAULT_FETCH_COUNT: usize = 10;
pub const DEFAULT_INTER_REQUEST_DELAY: Duration = Duration::from_millis(100);

/// How the nonce used to build the cache key changes between iterations.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum NoncePolicy {
    /// Every iteration of the run uses the run nonce, so only the first apify call in the run
    /// should miss the cache.
    #[default]
    #[display("shared")]
    Shared,
    /// Each iteration gets its own nonce, derived from the run nonce, the virtual user and the
    /// iteration index. Every apify call should miss the cache.
    #[display("per_iteration")]
    PerIteration,
}

impl NoncePolicy {
    pub fn nonce_for(&self, run_nonce: &str, virtual_user: usize, iteration: usize) -> String {
        match self {
            NoncePolicy::Shared => run_nonce.to_string(),
            NoncePolicy::PerIteration => format!("{run_nonce}-{virtual_user}-{iteration}"),
        }
    }
}

/// The validated configuration of a run. Only [RunConfigBuilder::build] can create one, and it
/// cannot be changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    virtual_user_count: usize,
    total_iterations: usize,
    inter_request_delay: Duration,
    fetch_count_per_iteration: usize,
    base_resource_url: String,
    api_base_url: String,
    fetch_url: Option<String>,
    nonce: String,
    nonce_policy: NoncePolicy,
    delay_after_last_fetch: bool,
    request_timeout: Duration,
    deadline: Option<Duration>,
}

impl RunConfig {
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder::default()
    }

    pub fn virtual_user_count(&self) -> usize {
        self.virtual_user_count
    }

    pub fn total_iterations(&self) -> usize {
        self.total_iterations
    }

    pub fn inter_request_delay(&self) -> Duration {
        self.inter_request_delay
    }

    pub fn fetch_count_per_iteration(&self) -> usize {
        self.fetch_count_per_iteration
    }

    pub fn base_resource_url(&self) -> &str {
        &self.base_resource_url
    }

    /// The API base URL without a trailing slash.
    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    /// The fixed resource endpoint, if one was configured.
    pub fn fetch_url(&self) -> Option<&str> {
        self.fetch_url.as_deref()
    }

    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    pub fn nonce_policy(&self) -> NoncePolicy {
        self.nonce_policy
    }

    pub fn delay_after_last_fetch(&self) -> bool {
        self.delay_after_last_fetch
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }
}

#[derive(Debug, Clone)]
pub struct RunConfigBuilder {
    virtual_user_count: usize,
    total_iterations: usize,
    inter_request_delay: Duration,
    fetch_count_per_iteration: usize,
    base_resource_url: String,
    api_base_url: String,
    fetch_url: Option<String>,
    nonce: Option<String>,
    nonce_policy: NoncePolicy,
    delay_after_last_fetch: bool,
    request_timeout: Duration,
    deadline: Option<Duration>,
}

impl Default for RunConfigBuilder {
    fn default() -> Self {
        Self {
            virtual_user_count: DEFAULT_VIRTUAL_USERS,
            total_iterations: DEFAULT_TOTAL_ITERATIONS,
            inter_request_delay: DEFAULT_INTER_REQUEST_DELAY,
            fetch_count_per_iteration: DEFAULT_FETCH_COUNT,
            base_resource_url: DEFAULT_RESOURCE_URL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            fetch_url: None,
            nonce: None,
            nonce_policy: NoncePolicy::default(),
            delay_after_last_fetch: true,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            deadline: None,
        }
    }
}

impl RunConfigBuilder {
    /// Start from the defaults, then apply the config file named on the command line (if any),
    /// then the command line flags.
    pub fn from_cli(cli: &CacheTunnelCli) -> anyhow::Result<Self> {
        let mut builder = Self::default();

        if let Some(path) = &cli.config {
            builder = RunConfigFile::load(path)?.apply(builder);
        }

        if let Some(url) = &cli.api_base_url {
            builder = builder.api_base_url(url);
        }
        if let Some(url) = &cli.resource_url {
            builder = builder.base_resource_url(url);
        }
        if let Some(url) = &cli.fetch_url {
            builder = builder.fetch_url(url);
        }
        if let Some(count) = cli.virtual_users {
            builder = builder.virtual_user_count(count);
        }
        if let Some(count) = cli.iterations {
            builder = builder.total_iterations(count);
        }
        if let Some(count) = cli.fetch_count {
            builder = builder.fetch_count_per_iteration(count);
        }
        if let Some(ms) = cli.delay_ms {
            builder = builder.inter_request_delay(Duration::from_millis(ms));
        }
        if let Some(delay) = cli.delay_after_last_fetch {
            builder = builder.delay_after_last_fetch(delay);
        }
        if let Some(nonce) = &cli.nonce {
            builder = builder.nonce(nonce);
        }
        if let Some(policy) = cli.nonce_policy {
            builder = builder.nonce_policy(policy);
        }
        if let Some(secs) = cli.request_timeout_s {
            builder = builder.request_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = cli.duration {
            builder = builder.deadline(Duration::from_secs(secs));
        }

        Ok(builder)
    }

    pub fn virtual_user_count(mut self, count: usize) -> Self {
        self.virtual_user_count = count;
        self
    }

    pub fn total_iterations(mut self, count: usize) -> Self {
        self.total_iterations = count;
        self
    }

    pub fn inter_request_delay(mut self, delay: Duration) -> Self {
        self.inter_request_delay = delay;
        self
    }

    pub fn fetch_count_per_iteration(mut self, count: usize) -> Self {
        self.fetch_count_per_iteration = count;
        self
    }

    pub fn base_resource_url(mut self, url: impl Into<String>) -> Self {
        self.base_resource_url = url.into();
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn fetch_url(mut self, url: impl Into<String>) -> Self {
        self.fetch_url = Some(url.into());
        self
    }

    /// Set the run nonce. When not set, the Unix timestamp at which the config is built is used.
    pub fn nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    pub fn nonce_policy(mut self, policy: NoncePolicy) -> Self {
        self.nonce_policy = policy;
        self
    }

    pub fn delay_after_last_fetch(mut self, delay: bool) -> Self {
        self.delay_after_last_fetch = delay;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Stop dispatching iterations once this much time has passed since the run started.
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn build(self) -> anyhow::Result<RunConfig> {
        if self.virtual_user_count == 0 {
            return Err(InvalidInputError::new("virtual user count must be positive").into());
        }
        if self.total_iterations == 0 {
            return Err(InvalidInputError::new("total iterations must be positive").into());
        }
        if self.fetch_count_per_iteration == 0 {
            return Err(InvalidInputError::new("fetch count per iteration must be positive").into());
        }
        if self.request_timeout.is_zero() {
            return Err(InvalidInputError::new("request timeout must be positive").into());
        }
        if self.deadline.is_some_and(|d| d.is_zero()) {
            return Err(InvalidInputError::new("deadline must be positive").into());
        }

        require_absolute_url("resource URL", &self.base_resource_url)?;
        require_absolute_url("API base URL", &self.api_base_url)?;
        if let Some(fetch_url) = &self.fetch_url {
            require_absolute_url("fetch URL", fetch_url)?;
        }

        let nonce = match self.nonce {
            Some(nonce) if nonce.is_empty() => {
                return Err(InvalidInputError::new("nonce must not be empty").into());
            }
            Some(nonce) => nonce,
            None => chrono::Utc::now().timestamp().to_string(),
        };

        Ok(RunConfig {
            virtual_user_count: self.virtual_user_count,
            total_iterations: self.total_iterations,
            inter_request_delay: self.inter_request_delay,
            fetch_count_per_iteration: self.fetch_count_per_iteration,
            base_resource_url: self.base_resource_url,
            api_base_url: self.api_base_url.trim_end_matches('/').to_string(),
            fetch_url: self.fetch_url,
            nonce,
            nonce_policy: self.nonce_policy,
            delay_after_last_fetch: self.delay_after_last_fetch,
            request_timeout: self.request_timeout,
            deadline: self.deadline,
        })
    }
}

fn require_absolute_url(name: &str, value: &str) -> anyhow::Result<()> {
    match url::Url::parse(value) {
        Ok(url) if url.has_host() => Ok(()),
        Ok(_) => Err(InvalidInputError::new(format!("{name} [{value}] has no host")).into()),
        Err(e) => Err(InvalidInputError::new(format!("{name} [{value}] is not a valid URL: {e}")).into()),
    }
}

/// A run configuration as written in a TOML file. Every field is optional and overrides the
/// built-in default.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfigFile {
    pub virtual_users: Option<usize>,
    pub iterations: Option<usize>,
    pub fetch_count: Option<usize>,
    pub inter_request_delay_ms: Option<u64>,
    pub delay_after_last_fetch: Option<bool>,
    pub resource_url: Option<String>,
    pub api_base_url: Option<String>,
    pub fetch_url: Option<String>,
    pub nonce: Option<String>,
    pub nonce_policy: Option<NoncePolicy>,
    pub request_timeout_s: Option<u64>,
    pub duration_s: Option<u64>,
}

impl RunConfigFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        toml::from_str(&content).map_err(|e| {
            InvalidInputError::new(format!("config file {} is invalid: {e}", path.display())).into()
        })
    }

    pub fn apply(self, mut builder: RunConfigBuilder) -> RunConfigBuilder {
        if let Some(count) = self.virtual_users {
            builder = builder.virtual_user_count(count);
        }
        if let Some(count) = self.iterations {
            builder = builder.total_iterations(count);
        }
        if let Some(count) = self.fetch_count {
            builder = builder.fetch_count_per_iteration(count);
        }
        if let Some(ms) = self.inter_request_delay_ms {
            builder = builder.inter_request_delay(Duration::from_millis(ms));
        }
        if let Some(delay) = self.delay_after_last_fetch {
            builder = builder.delay_after_last_fetch(delay);
        }
        if let Some(url) = self.resource_url {
            builder = builder.base_resource_url(url);
        }
        if let Some(url) = self.api_base_url {
            builder = builder.api_base_url(url);
        }
        if let Some(url) = self.fetch_url {
            builder = builder.fetch_url(url);
        }
        if let Some(nonce) = self.nonce {
            builder = builder.nonce(nonce);
        }
        if let Some(policy) = self.nonce_policy {
            builder = builder.nonce_policy(policy);
        }
        if let Some(secs) = self.request_timeout_s {
            builder = builder.request_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.duration_s {
            builder = builder.deadline(Duration::from_secs(secs));
        }

        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn invalid(result: anyhow::Result<RunConfig>) -> InvalidInputError {
        result
            .unwrap_err()
            .downcast::<InvalidInputError>()
            .expect("Expected an invalid input error")
    }

    #[test]
    fn defaults_match_the_reference_benchmark() {
        let config = RunConfig::builder().nonce("2").build().unwrap();

        assert_eq!(10, config.virtual_user_count());
        assert_eq!(20, config.total_iterations());
        assert_eq!(10, config.fetch_count_per_iteration());
        assert_eq!(Duration::from_millis(100), config.inter_request_delay());
        assert!(config.delay_after_last_fetch());
        assert_eq!(NoncePolicy::Shared, config.nonce_policy());
        assert_eq!(None, config.deadline());
        assert_eq!(Duration::from_secs(60), config.request_timeout());
        assert_eq!(DEFAULT_REQUEST_TIMEOUT, config.request_timeout());
        assert_eq!("2", config.nonce());
    }

    #[test]
    fn nonce_defaults_to_timestamp() {
        let before = chrono::Utc::now().timestamp();
        let config = RunConfig::builder().build().unwrap();
        let after = chrono::Utc::now().timestamp();

        let nonce = config.nonce().parse::<i64>().unwrap();
        assert!(nonce >= before && nonce <= after);
    }

    #[test]
    fn rejects_zero_counts() {
        invalid(RunConfig::builder().virtual_user_count(0).build());
        invalid(RunConfig::builder().total_iterations(0).build());
        invalid(RunConfig::builder().fetch_count_per_iteration(0).build());
    }

    #[test]
    fn rejects_bad_urls() {
        let err = invalid(RunConfig::builder().api_base_url("/relative").build());
        assert!(err.message().contains("API base URL"));

        invalid(RunConfig::builder().base_resource_url("not a url").build());
        invalid(RunConfig::builder().fetch_url("mailto:someone@example.com").build());
    }

    #[test]
    fn rejects_empty_nonce() {
        let err = invalid(RunConfig::builder().nonce("").build());
        assert_eq!("nonce must not be empty", err.message());
    }

    #[test]
    fn zero_delay_is_allowed() {
        let config = RunConfig::builder()
            .inter_request_delay(Duration::ZERO)
            .build()
            .unwrap();

        assert_eq!(Duration::ZERO, config.inter_request_delay());
    }

    #[test]
    fn trailing_slash_is_removed_from_api_base() {
        let config = RunConfig::builder()
            .api_base_url("http://localhost:8001/")
            .build()
            .unwrap();

        assert_eq!("http://localhost:8001", config.api_base_url());
    }

    #[test]
    fn per_iteration_nonce_is_deterministic() {
        assert_eq!("run", NoncePolicy::Shared.nonce_for("run", 3, 4));
        assert_eq!("run-3-4", NoncePolicy::PerIteration.nonce_for("run", 3, 4));
        assert_eq!(
            NoncePolicy::PerIteration.nonce_for("run", 1, 12),
            NoncePolicy::PerIteration.nonce_for("run", 1, 12)
        );
    }

    #[test]
    fn cli_overrides_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
virtual_users = 4
iterations = 8
inter_request_delay_ms = 250
delay_after_last_fetch = false
nonce_policy = "per_iteration"
api_base_url = "http://localhost:8001"
"#
        )
        .unwrap();

        let cli = CacheTunnelCli::try_parse_from([
            "apify_cache",
            "--config",
            file.path().to_str().unwrap(),
            "--iterations",
            "12",
            "--nonce",
            "abc",
        ])
        .unwrap();

        let config = RunConfigBuilder::from_cli(&cli).unwrap().build().unwrap();

        assert_eq!(4, config.virtual_user_count());
        assert_eq!(12, config.total_iterations());
        assert_eq!(Duration::from_millis(250), config.inter_request_delay());
        assert!(!config.delay_after_last_fetch());
        assert_eq!(NoncePolicy::PerIteration, config.nonce_policy());
        assert_eq!("http://localhost:8001", config.api_base_url());
        assert_eq!("abc", config.nonce());
    }

    #[test]
    fn cli_can_restore_trailing_delay_disabled_in_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "delay_after_last_fetch = false").unwrap();
        let path = file.path().to_str().unwrap();

        let from_file = CacheTunnelCli::try_parse_from(["apify_cache", "--config", path]).unwrap();
        let config = RunConfigBuilder::from_cli(&from_file).unwrap().build().unwrap();
        assert!(!config.delay_after_last_fetch());

        let overridden = CacheTunnelCli::try_parse_from([
            "apify_cache",
            "--config",
            path,
            "--delay-after-last-fetch",
            "true",
        ])
        .unwrap();
        let config = RunConfigBuilder::from_cli(&overridden).unwrap().build().unwrap();
        assert!(config.delay_after_last_fetch());
    }

    #[test]
    fn unknown_config_keys_are_invalid_input() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "agents = 3").unwrap();

        let err = RunConfigFile::load(file.path()).unwrap_err();
        assert!(err.is::<InvalidInputError>());
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(RunConfigFile::load(&dir.path().join("missing.toml")).is_err());
    }
}
