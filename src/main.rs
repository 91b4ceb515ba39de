use std::io::Write;

use anyhow::Result;
use clap::Parser as ClapParser;
use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;
use log::LevelFilter;

use cli::analyze::cmd_analyze;
use cli::command::{Cli, Commands, LogFormat};
use cli::loopback::cmd_loopback;

mod cli;
mod input;
mod report;
mod wav;

/// Builds the logger for `cli`. With progress bars the log lines are routed
/// through `multi` so they print above the bars.
fn init_logging(cli: &Cli, multi: &MultiProgress) -> Result<()> {
    let level = cli.loglevel.to_level_filter();

    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(level);
    if cli.progress && level < LevelFilter::Trace {
        // The core logs every frame at debug level
        builder.filter_module("celt", level.min(LevelFilter::Info));
    }

    match cli.log_format {
        LogFormat::Plain => {
            builder
                .format_timestamp_millis()
                .format_target(level >= LevelFilter::Debug);
        }
        LogFormat::Json => {
            builder.format(|buf, record| {
                let line = serde_json::json!({
                    "ts": buf.timestamp_millis().to_string(),
                    "lvl": record.level().as_str(),
                    "target": record.target(),
                    "msg": record.args().to_string(),
                });
                writeln!(buf, "{line}")
            });
        }
    }

    if cli.progress {
        LogWrapper::new(multi.clone(), builder.build()).try_init()?;
    } else {
        builder.try_init()?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let multi = MultiProgress::new();
    init_logging(&cli, &multi)?;
    log::debug!(
        "celtd {} on celt {}",
        env!("CARGO_PKG_VERSION"),
        env!("CELT_VERSION")
    );

    let progress = cli.progress.then_some(&multi);
    match &cli.command {
        Commands::Analyze(args) => cmd_analyze(args, &cli, progress),
        Commands::Loopback(args) => cmd_loopback(args, &cli, progress),
    }
}
