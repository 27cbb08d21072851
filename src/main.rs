use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dmxp_capture::config::AppConfig;
use dmxp_capture::sources::producers_from_config;
use dmxp_capture::{ConsumerWriter, SharedBuffer};

/// Capture bytes from files, serial ports and sockets into a CSV file.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dmxp_capture=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    if let Err(e) = run(&args) {
        error!("fatal error: {e:#}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let config = AppConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    let buffer = Arc::new(
        SharedBuffer::new(config.buffer.to_options()).context("creating shared buffer")?,
    );
    let producers = producers_from_config(&config, &buffer);

    let writer = ConsumerWriter::new(config.csv.to_settings(), Arc::clone(&buffer))?;
    writer.start()?;

    for producer in &producers {
        if let Err(e) = producer.start() {
            warn!(producer = producer.name(), error = %e, "failed to start producer");
        }
    }

    let stop = Arc::new(AtomicBool::new(false));
    let stop_for_handler = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        stop_for_handler.store(true, Ordering::SeqCst);
    })
    .context("installing Ctrl+C handler")?;

    let stop_for_stdin = Arc::clone(&stop);
    thread::Builder::new()
        .name("stdin-watch".to_string())
        .spawn(move || {
            let mut line = String::new();
            // EOF (no terminal attached) is not a stop request.
            if matches!(std::io::stdin().lock().read_line(&mut line), Ok(n) if n > 0) {
                stop_for_stdin.store(true, Ordering::SeqCst);
            }
        })
        .context("spawning stdin watcher")?;

    info!(
        producers = producers.len(),
        "streaming started, press Enter or send SIGINT/SIGTERM to stop"
    );
    while !stop.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(100));
    }

    for producer in &producers {
        if let Err(e) = producer.stop() {
            warn!(producer = producer.name(), error = %e, "producer ended with error");
        }
    }
    buffer.shutdown();
    writer.stop()?;

    info!("shutdown complete");
    Ok(())
}
