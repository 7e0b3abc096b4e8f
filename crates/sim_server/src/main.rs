use anyhow::Context;
use sim_backend::SimConfig;
use sim_server::{args, logging, runtime};

fn main() -> anyhow::Result<()> {
    let args = args::parse_args()?;

    let config_path = match args.config_path.clone() {
        Some(path) => path,
        None => SimConfig::default_path().context("Could not determine config directory")?,
    };
    let config = SimConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load settings from {}", config_path.display()))?;

    logging::init(args.verbose, &config.log_filter)?;

    tracing::info!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    tracing::info!("Loaded settings from {}", config_path.display());

    let runtime = runtime::create_runtime(&config.runtime).context("Failed to build Tokio runtime")?;
    runtime.block_on(sim_server::run(config, args.ticks))
}
