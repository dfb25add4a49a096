use std::env;

use clap::Parser;
use cli::{Cli, Command};
use config::load_config;
use futures::{FutureExt, future::BoxFuture};
use tokio::signal;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking;
use tracing_subscriber::{Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod config;
mod global;
mod local;
mod middleware;
mod server;
mod stub;
mod worker;

#[cfg(test)]
mod test_support;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut config = load_config(&cli.config)?;
    config.apply_overrides(|key| env::var(key).ok())?;
    cli.command.apply(&mut config);
    config.validate()?;

    let (nb, _guard) = non_blocking(std::io::stdout());

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(nb)
                .with_target(false)
                .with_filter(LevelFilter::from(config.log_level)),
        )
        .init();

    let role: BoxFuture<'static, anyhow::Result<()>> = match cli.command {
        Command::Server => server::run(config).boxed(),
        Command::Worker { drain, .. } => worker::run(config, drain).boxed(),
        Command::Stub { .. } => stub::run(config.stub).boxed(),
    };

    tokio::select! {
        r = role => {
            if let Err(e) = r {
                tracing::error!("exited with error: {e:#}");
                return Err(e);
            }
        },
        _ = signal::ctrl_c() => {
            tracing::info!("shutting down...");
        },
    }

    Ok(())
}
