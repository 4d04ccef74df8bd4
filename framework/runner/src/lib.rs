mod cli;
mod config;
mod context;
mod definition;
mod executor;
mod init;
mod monitor;
mod progress;
mod run;
mod scheduler;
mod shutdown;
mod state;
mod types;

pub mod prelude {
    pub use crate::cli::CacheTunnelCli;
    pub use crate::config::{NoncePolicy, RunConfig, RunConfigBuilder, RunConfigFile};
    pub use crate::context::VirtualUserContext;
    pub use crate::definition::{BehaviourFactory, IterationBehaviour, ScenarioDefinitionBuilder};
    pub use crate::executor::Executor;
    pub use crate::init::init;
    pub use crate::run::run;
    pub use crate::scheduler::{iteration_shares, VirtualUserScheduler};
    pub use crate::state::{RunState, RunStateMachine};
    pub use crate::types::CacheTunnelResult;

    pub use cache_tunnel_core::prelude::*;
    pub use cache_tunnel_instruments::{
        IterationResult, MetricsAggregator, RequestOutcome, RequestRole, RunSummary,
        TransportErrorKind,
    };
    pub use cache_tunnel_summary_model::RunRecord;
}
