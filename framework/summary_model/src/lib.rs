use itertools::Itertools;
use serde::{Deserialize, Serialize};
use sha3::Digest;
use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

/// The logical role of a request within an iteration.
///
/// Statistics are always keyed by role so that the cache-populating calls can be compared with the
/// cache-reading calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestRole {
    /// `GET {api}/apify?url=...`, parses the resource and fills the cache slot
    Apify,
    /// `GET {api}/apify?analysis=yes&url=...`, same slot with profiling enabled
    Analyze,
    /// Read of the fixed resource endpoint
    Fetch,
}

impl RequestRole {
    pub const ALL: [RequestRole; 3] = [RequestRole::Apify, RequestRole::Analyze, RequestRole::Fetch];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestRole::Apify => "apify",
            RequestRole::Analyze => "analyze",
            RequestRole::Fetch => "fetch",
        }
    }
}

impl Display for RequestRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latency statistics in milliseconds.
///
/// Percentiles use the nearest-rank method, so every reported value is one of the samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub min_ms: f64,
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

impl LatencySummary {
    /// Summarise a set of latency samples. Returns `None` when there are no samples.
    pub fn from_durations(samples: &[Duration]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let sorted = samples
            .iter()
            .map(|d| d.as_micros() as f64 / 1000.0)
            .sorted_by(|a, b| a.total_cmp(b))
            .collect::<Vec<_>>();

        let mean_ms = sorted.iter().sum::<f64>() / sorted.len() as f64;

        Some(Self {
            min_ms: sorted[0],
            mean_ms,
            p50_ms: nearest_rank(&sorted, 50.0),
            p95_ms: nearest_rank(&sorted, 95.0),
            p99_ms: nearest_rank(&sorted, 99.0),
            max_ms: sorted[sorted.len() - 1],
        })
    }
}

fn nearest_rank(sorted: &[f64], percentile: f64) -> f64 {
    let rank = ((percentile / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Aggregate counts for all requests made in one [RequestRole].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleSummary {
    /// Number of requests issued
    pub total: usize,
    /// Requests that completed with a 2xx status
    pub successes: usize,
    /// Requests that did not succeed, for any reason
    pub errors: usize,
    /// The subset of [RoleSummary::errors] that never got a response
    pub transport_errors: usize,
    /// Count of responses by status code. Transport failures are not included.
    pub status_counts: BTreeMap<u16, usize>,
    /// Total response body bytes read
    pub body_bytes: u64,
    /// Latency of the successful requests
    pub latency: Option<LatencySummary>,
}

impl RoleSummary {
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }

        self.successes as f64 / self.total as f64
    }
}

/// Aggregated outcome of a run, keyed by [RequestRole].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// The number of iterations that were recorded
    pub iterations: usize,
    /// Statistics for each role. Every role is present, even if no requests were made.
    pub roles: BTreeMap<RequestRole, RoleSummary>,
    /// Wall time of whole iterations, including the delays between calls. `None` if no iteration
    /// was recorded.
    #[serde(default)]
    pub iteration_latency: Option<LatencySummary>,
}

impl RunSummary {
    pub fn role(&self, role: RequestRole) -> Option<&RoleSummary> {
        self.roles.get(&role)
    }

    /// The number of requests made for a role
    pub fn count(&self, role: RequestRole) -> usize {
        self.role(role).map(|r| r.total).unwrap_or_default()
    }

    /// The number of successful requests made for a role
    pub fn successes(&self, role: RequestRole) -> usize {
        self.role(role).map(|r| r.successes).unwrap_or_default()
    }

    pub fn total_requests(&self) -> usize {
        self.roles.values().map(|r| r.total).sum()
    }

    pub fn total_errors(&self) -> usize {
        self.roles.values().map(|r| r.errors).sum()
    }
}

/// The shape a run was configured with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunShape {
    pub virtual_user_count: usize,
    pub planned_iterations: usize,
    pub fetch_count_per_iteration: usize,
    pub inter_request_delay_ms: u64,
}

/// Record of a run, as stored after the run has finished.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    /// The unique run id
    ///
    /// Chosen by the runner unless provided on the command line.
    pub run_id: String,
    /// The name of the scenario that was run
    pub scenario_name: String,
    /// The time the run started
    ///
    /// This is a Unix timestamp in seconds.
    pub started_at: i64,
    /// How long the run took, from the first virtual user starting to the last one finishing
    pub wall_time_ms: u64,
    /// Whether the run was stopped early by its deadline or by the user.
    ///
    /// A cancelled run has fewer than [RunShape::planned_iterations] recorded but the counts that
    /// are present are consistent with each other.
    pub cancelled: bool,
    pub shape: RunShape,
    /// Settings that change the meaning of the results, such as the nonce policy.
    pub settings: HashMap<String, String>,
    /// The version of Cache Tunnel that was used for this run
    pub cache_tunnel_version: String,
    pub summary: RunSummary,
}

impl RunRecord {
    pub fn new(
        run_id: String,
        scenario_name: String,
        started_at: i64,
        shape: RunShape,
        cache_tunnel_version: String,
    ) -> Self {
        Self {
            run_id,
            scenario_name,
            started_at,
            wall_time_ms: 0,
            cancelled: false,
            shape,
            settings: HashMap::with_capacity(0),
            cache_tunnel_version,
            summary: RunSummary::default(),
        }
    }

    /// Add a setting
    pub fn add_setting(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.settings.insert(key.into(), value.into());
    }

    /// Attach the results of the run
    pub fn set_outcome(&mut self, summary: RunSummary, wall_time: Duration, cancelled: bool) {
        self.summary = summary;
        self.wall_time_ms = wall_time.as_millis() as u64;
        self.cancelled = cancelled;
    }

    /// Compute a fingerprint for this run record
    ///
    /// The fingerprint identifies the configuration used to run the scenario, so that runs which
    /// can be compared share a fingerprint. It uses the
    ///     - Scenario name
    ///     - Run shape
    ///     - Settings
    ///     - Cache Tunnel version
    ///
    /// The fingerprint is computed using [sha3::Sha3_256].
    pub fn fingerprint(&self) -> String {
        let mut hasher = sha3::Sha3_256::new();
        Digest::update(&mut hasher, self.scenario_name.as_bytes());
        Digest::update(&mut hasher, (self.shape.virtual_user_count as u64).to_le_bytes());
        Digest::update(&mut hasher, (self.shape.planned_iterations as u64).to_le_bytes());
        Digest::update(
            &mut hasher,
            (self.shape.fetch_count_per_iteration as u64).to_le_bytes(),
        );
        Digest::update(&mut hasher, self.shape.inter_request_delay_ms.to_le_bytes());
        self.settings
            .iter()
            .sorted_by_key(|(k, _)| k.to_owned())
            .for_each(|(k, v)| {
                Digest::update(&mut hasher, k.as_bytes());
                Digest::update(&mut hasher, v.as_bytes());
            });
        Digest::update(&mut hasher, self.cache_tunnel_version.as_bytes());

        format!("{:x}", hasher.finalize())
    }
}

/// Append the run record to a file
///
/// The record will be serialized to JSON and output as a single line followed by a newline. The
/// recommended file extension is `.jsonl`.
pub fn append_run_record(run_record: &RunRecord, path: PathBuf) -> anyhow::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)?;
    store_run_record(run_record, &mut file)?;
    file.write_all("\n".as_bytes())?;
    Ok(())
}

/// Serialize the run record to a writer
pub fn store_run_record<W: Write>(run_record: &RunRecord, writer: &mut W) -> anyhow::Result<()> {
    serde_json::to_writer(writer, run_record)?;
    Ok(())
}

/// Load run records from a file
///
/// The file should contain one JSON object per line. This is the format produced by
/// [append_run_record].
pub fn load_run_records(path: PathBuf) -> anyhow::Result<Vec<RunRecord>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut runs = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let run: RunRecord = serde_json::from_str(&line)?;
        runs.push(run);
    }
    Ok(runs)
}
