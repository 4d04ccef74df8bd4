/// Recommended error type for your scenario `main` function and any shared code around the
/// behaviour. Setup errors are returned through this type so you can use `?` to propagate them.
pub type CacheTunnelResult<T> = anyhow::Result<T>;
