use cache_tunnel_summary_model::{LatencySummary, RunSummary};
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct RoleRow {
    role: String,
    total: usize,
    successes: usize,
    errors: usize,
    #[tabled(display = "percent")]
    success_rate: f64,
    #[tabled(display = "latency")]
    mean_ms: Option<f64>,
    #[tabled(display = "latency")]
    p50_ms: Option<f64>,
    #[tabled(display = "latency")]
    p95_ms: Option<f64>,
    #[tabled(display = "latency")]
    p99_ms: Option<f64>,
    #[tabled(display = "latency")]
    min_ms: Option<f64>,
    #[tabled(display = "latency")]
    max_ms: Option<f64>,
}

fn percent(n: &f64) -> String {
    format!("{:.1}%", n * 100.0)
}

fn latency(n: &Option<f64>) -> String {
    match n {
        Some(n) => format!("{:.2}", n),
        None => "-".to_string(),
    }
}

/// Render the per-role statistics of a run as a table.
pub fn summary_table(summary: &RunSummary) -> String {
    let rows = summary
        .roles
        .iter()
        .map(|(role, s)| {
            let pick = |f: fn(&LatencySummary) -> f64| s.latency.as_ref().map(f);
            RoleRow {
                role: role.to_string(),
                total: s.total,
                successes: s.successes,
                errors: s.errors,
                success_rate: s.success_rate(),
                mean_ms: pick(|l| l.mean_ms),
                p50_ms: pick(|l| l.p50_ms),
                p95_ms: pick(|l| l.p95_ms),
                p99_ms: pick(|l| l.p99_ms),
                min_ms: pick(|l| l.min_ms),
                max_ms: pick(|l| l.max_ms),
            }
        })
        .collect::<Vec<_>>();

    let mut table = Table::new(rows);
    table.with(Style::modern());

    table.to_string()
}

pub fn print_summary(summary: &RunSummary) {
    println!("\nSummary of {} iterations", summary.iterations);
    println!("{}", summary_table(summary));
    if let Some(iteration) = &summary.iteration_latency {
        println!(
            "Iteration wall time (ms): mean {:.2}, p50 {:.2}, p95 {:.2}, max {:.2}",
            iteration.mean_ms, iteration.p50_ms, iteration.p95_ms, iteration.max_ms
        );
    }
}
