use std::sync::Arc;

use anyhow::Context;
use cache_tunnel_instruments::print_summary;
use cache_tunnel_summary_model::{append_run_record, RunRecord, RunShape};

use crate::definition::{IterationBehaviour, ScenarioDefinitionBuilder};
use crate::executor::Executor;
use crate::monitor::start_monitor;
use crate::progress::start_progress;
use crate::scheduler::VirtualUserScheduler;
use crate::shutdown::start_shutdown_listener;

/// Run a scenario from start to finish: build the configuration, run every virtual user, print
/// the summary and store the run record if a summary file was requested.
pub fn run<B: IterationBehaviour>(
    definition: ScenarioDefinitionBuilder<B>,
) -> anyhow::Result<RunRecord> {
    let definition = definition.build()?;

    log::info!("Running scenario: {}", definition.name);

    let executor = Arc::new(Executor::new()?);
    let shutdown_handle = start_shutdown_listener(&executor);

    let run_id = definition
        .run_id
        .clone()
        .unwrap_or_else(|| nanoid::nanoid!());
    let started_at = chrono::Utc::now().timestamp();
    let config = definition.config.clone();

    let scheduler =
        VirtualUserScheduler::with_executor(config.clone(), executor, shutdown_handle.clone());

    if !definition.no_progress {
        start_progress(
            config.total_iterations(),
            config.deadline(),
            scheduler.metrics().clone(),
            shutdown_handle.new_listener(),
        );
    }

    // Ready to start the virtual users so start the resource monitor to report high usage by the
    // harness which might lead to a misleading outcome.
    start_monitor(shutdown_handle.new_listener());

    let result = scheduler.run_scenario(Arc::new(definition.behaviour));

    // Stop the background threads.
    shutdown_handle.shutdown();

    let summary = result?;
    print_summary(&summary);

    let mut record = RunRecord::new(
        run_id,
        definition.name,
        started_at,
        RunShape {
            virtual_user_count: config.virtual_user_count(),
            planned_iterations: config.total_iterations(),
            fetch_count_per_iteration: config.fetch_count_per_iteration(),
            inter_request_delay_ms: config.inter_request_delay().as_millis() as u64,
        },
        env!("CARGO_PKG_VERSION").to_string(),
    );
    record.add_setting("api_base_url", config.api_base_url());
    record.add_setting("resource_url", config.base_resource_url());
    if let Some(fetch_url) = config.fetch_url() {
        record.add_setting("fetch_url", fetch_url);
    }
    record.add_setting("nonce", config.nonce());
    record.add_setting("nonce_policy", config.nonce_policy().to_string());
    record.add_setting(
        "delay_after_last_fetch",
        config.delay_after_last_fetch().to_string(),
    );
    record.set_outcome(
        summary,
        scheduler.wall_time().unwrap_or_default(),
        scheduler.was_cancelled(),
    );

    log::info!(
        "Run {} finished in {}ms, fingerprint {}",
        record.run_id,
        record.wall_time_ms,
        record.fingerprint()
    );

    if let Some(path) = definition.summary_file {
        append_run_record(&record, path.clone())
            .with_context(|| format!("Failed to write run record to {}", path.display()))?;
    }

    Ok(record)
}
