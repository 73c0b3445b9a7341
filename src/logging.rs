use anyhow::Context as _;

/// Installs the stderr subscriber. `RUST_LOG` wins; otherwise `-v` raises this
/// crate to debug and `-vv` to trace while dependencies stay at warn.
pub fn init(verbose: u8) -> anyhow::Result<()> {
    let fallback = match verbose {
        0 => "warn,bookpages=info",
        1 => "warn,bookpages=debug",
        _ => "info,bookpages=trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(fallback))
        .context("build log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("initialize tracing subscriber: {err}"))?;

    Ok(())
}
