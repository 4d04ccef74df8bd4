use apify_cache::IterationScript;
use cache_tunnel_runner::prelude::*;
use http_client_instrumented::prelude::HttpClient;

fn main() -> CacheTunnelResult<()> {
    let builder = ScenarioDefinitionBuilder::<IterationScript<HttpClient>>::new_with_init(env!(
        "CARGO_PKG_NAME"
    ))
    .use_behaviour(|config| Ok(IterationScript::new(HttpClient::new(config.request_timeout()))));

    run(builder)?;

    Ok(())
}
