use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;

use cache_tunnel_core::prelude::DelegatedShutdownListener;
use cache_tunnel_instruments::MetricsAggregator;
use indicatif::{ProgressBar, ProgressState, ProgressStyle};

/// Displays a progress bar of completed iterations while the run is in progress.
pub(crate) fn start_progress(
    total_iterations: usize,
    deadline: Option<Duration>,
    metrics: Arc<MetricsAggregator>,
    mut shutdown_listener: DelegatedShutdownListener,
) {
    let spawned = std::thread::Builder::new().name("progress".to_string()).spawn(move || {
        let style = match ProgressStyle::with_template(
            "{spinner:.green} [{wide_bar:.cyan/blue}] {pos}/{len} iterations [{elapsed_precise} / {deadline}]",
        ) {
            Ok(style) => style,
            Err(e) => {
                log::warn!("Not showing progress, invalid progress style: {e}");
                return;
            }
        };

        let pb = ProgressBar::new(total_iterations as u64);
        pb.set_style(
            style
                .with_key("deadline", move |_state: &ProgressState, w: &mut dyn Write| {
                    let _ = match deadline {
                        Some(deadline) => {
                            let secs = deadline.as_secs();
                            write!(w, "{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
                        }
                        None => write!(w, "--:--:--"),
                    };
                })
                .progress_chars("#>-"),
        );

        loop {
            if shutdown_listener.should_shutdown() || metrics.is_completed() {
                log::trace!("Progress thread shutting down");
                pb.finish_and_clear();
                break;
            }

            pb.set_position(metrics.iterations_recorded() as u64);
            std::thread::sleep(Duration::from_millis(250));
        }
    });

    if let Err(e) = spawned {
        log::warn!("Failed to start progress thread: {e}");
    }
}
