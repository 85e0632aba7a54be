use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use thicket_engine::{Engine, ThicketConfig};
use thicket_scripting_host::setup_restart_signal;

#[derive(Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Directory containing script sources (overrides config)
    #[arg(short, long)]
    script_dir: Option<PathBuf>,

    /// Tick interval in milliseconds (overrides config)
    #[arg(short, long)]
    tick_interval_ms: Option<u64>,

    /// Stop after this many ticks (runs until Ctrl-C when unset)
    #[arg(long)]
    ticks: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match ThicketConfig::load() {
        Ok(cfg) => {
            info!("loaded existing config");
            cfg
        }
        Err(_) => {
            let path = ThicketConfig::create_example()?;
            info!("no config found, created example at {}", path.display());
            ThicketConfig::default()
        }
    };

    if let Some(dir) = cli.script_dir {
        config.scripting.script_dir = Some(dir);
    }
    if let Some(interval) = cli.tick_interval_ms {
        config.tick_interval_ms = interval;
    }

    info!("starting thicket host...");
    let mut engine = Engine::new(&config)?;
    let mut restart_rx = setup_restart_signal();

    let mut ticker = tokio::time::interval(Duration::from_millis(config.tick_interval_ms));
    let mut ticks_run: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if restart_rx.has_changed().unwrap_or(false) {
                    restart_rx.borrow_and_update();
                    engine.restart_scripts();
                }

                engine.tick();
                ticks_run += 1;

                if cli.ticks.is_some_and(|max| ticks_run >= max) {
                    info!("completed {} tick(s)", ticks_run);
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    engine.shutdown();
    Ok(())
}
