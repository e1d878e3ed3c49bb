use clap::Parser;
use cli::{Cli, Commands};

mod cli;
mod config;
mod logging;
mod serve;
mod shell;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = config::load_config(cli.config.as_deref())?;
    tracing::debug!(?config, "Loaded config");
    let emulator = config.build_emulator()?;

    match cli.command {
        Commands::Serve {
            port,
            remote,
            interval,
        } => {
            let port = port.or(config.server.enabled.then_some(config.server.port));
            let remote = remote
                .as_deref()
                .map(cli::parse_remote)
                .transpose()?
                .or_else(|| {
                    config
                        .remote
                        .address
                        .filter(|_| config.remote.auto_connect)
                        .map(|address| (address, config.remote.port))
                });
            let options = serve::ServeOptions {
                port,
                remote,
                interval_ms: interval.unwrap_or(config.remote.interval_ms),
            };
            serve::run(emulator, options).await
        }
        Commands::Shell => shell::run(emulator).await,
    }
}
