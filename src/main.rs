mod app;
mod cli;
mod config;
mod credentials;
mod db;
mod dom;
mod engine;
mod hijack;
mod launcher;
mod mapping;
mod notice;
mod paths;
mod playback_info;
mod resolver;
mod scanner;
#[cfg(test)]
mod test_support;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    init_tracing(cli.verbose);
    app::run(cli)
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("jellympv=debug")
    } else {
        EnvFilter::try_from_env("JELLYMPV_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
