mod cli;
mod execute;

use anyhow::Result;
use clap::Parser;
use phpvm::Paths;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};
use crate::cli::CLI;

fn main() -> Result<()> {
    let paths = Paths::discover();
    std::fs::create_dir_all(paths.log_dir())?;
    let file_appender = tracing_appender::rolling::never(paths.log_dir(), "phpvm.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("phpvm=info")))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .without_time()
                .with_filter(LevelFilter::WARN),
        )
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .init();

    let cli = CLI::parse();
    execute::execute(cli)
}
