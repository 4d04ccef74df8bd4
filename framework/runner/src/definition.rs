use std::path::PathBuf;

use cache_tunnel_core::prelude::InvalidInputError;
use cache_tunnel_instruments::IterationResult;

use crate::cli::CacheTunnelCli;
use crate::config::{RunConfig, RunConfigBuilder};
use crate::context::VirtualUserContext;
use crate::init::init;

/// The work one virtual user does in one iteration.
///
/// A single instance is shared by every virtual user, so any state must be safe to share.
/// Failures are part of the result, an iteration always produces a result.
pub trait IterationBehaviour: Send + Sync + 'static {
    fn run_iteration(&self, ctx: &mut VirtualUserContext) -> IterationResult;
}

/// Creates the behaviour once the run configuration is known.
pub type BehaviourFactory<B> = fn(&RunConfig) -> anyhow::Result<B>;

/// The builder for a scenario definition.
///
/// This must be used at the start of a scenario binary to define the scenario that you want to run.
pub struct ScenarioDefinitionBuilder<B: IterationBehaviour> {
    /// The name of the scenario.
    ///
    /// Recommended value is `env!("CARGO_PKG_NAME")`.
    name: String,
    /// Parsed command line arguments, used to build the [RunConfig].
    cli: CacheTunnelCli,
    behaviour_factory: Option<BehaviourFactory<B>>,
}

pub struct ScenarioDefinition<B: IterationBehaviour> {
    pub name: String,
    pub config: RunConfig,
    pub behaviour: B,
    pub run_id: Option<String>,
    pub summary_file: Option<PathBuf>,
    pub no_progress: bool,
}

impl<B: IterationBehaviour> ScenarioDefinitionBuilder<B> {
    /// Initialise logging and parse the command line, then create the builder.
    pub fn new_with_init(name: &str) -> Self {
        Self::new(name, init())
    }

    /// Create the builder from an already parsed command line.
    pub fn new(name: &str, cli: CacheTunnelCli) -> Self {
        Self {
            name: name.to_string(),
            cli,
            behaviour_factory: None,
        }
    }

    pub fn use_behaviour(mut self, factory: BehaviourFactory<B>) -> Self {
        self.behaviour_factory = Some(factory);
        self
    }

    pub(crate) fn build(self) -> anyhow::Result<ScenarioDefinition<B>> {
        let config = RunConfigBuilder::from_cli(&self.cli)?.build()?;

        let factory = self.behaviour_factory.ok_or_else(|| {
            InvalidInputError::new(format!("no behaviour defined for scenario {}", self.name))
        })?;
        let behaviour = factory(&config)?;

        Ok(ScenarioDefinition {
            name: self.name,
            config,
            behaviour,
            run_id: self.cli.run_id,
            summary_file: self.cli.summary_file,
            no_progress: self.cli.no_progress,
        })
    }
}
