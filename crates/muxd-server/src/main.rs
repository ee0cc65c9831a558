use clap::Parser;
use muxd_core::{config, logging};

mod app;
mod cli;
mod handler;
mod signal;

#[tokio::main]
async fn main() {
    let args = cli::Args::parse();

    if args.log_stderr {
        logging::init_stderr_logging();
    } else if let Err(err) = logging::init_file_logging() {
        logging::init_stderr_logging();
        tracing::warn!("file logging unavailable ({err:#}), logging to stderr");
    }

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("muxd error: {err:#}");
            std::process::exit(1);
        }
    };

    if let Err(err) = app::run(config).await {
        eprintln!("muxd error: {err:#}");
        std::process::exit(1);
    }
}

fn load_config(args: &cli::Args) -> anyhow::Result<config::MuxdConfig> {
    let mut cfg = match &args.config {
        Some(path) => config::load_or_init_at(path)?,
        None => config::load_or_init()?,
    };
    if let Some(port) = args.port {
        cfg.http_port = port;
    }
    Ok(cfg)
}
