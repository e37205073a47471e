use anyhow::Result;
use clap::Parser as ClapParser;
use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;

use cli::check::cmd_check;
use cli::command::{Cli, Commands, LogFormat};
use cli::export::cmd_export;
use cli::info::cmd_info;

mod cli;
mod input;

/// Installs the logger. Log lines are routed through `multi` when progress
/// bars are shown so the two do not interleave.
fn init_logging(cli: &Cli, multi: &MultiProgress) -> Result<bool> {
    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(cli.loglevel.to_level_filter());

    match cli.log_format {
        LogFormat::Plain => {
            builder.format_timestamp_secs();
        }
        LogFormat::Json => {
            builder.format(|buf, record| {
                use std::io::Write;
                writeln!(
                    buf,
                    "{{\"ts\":\"{}\",\"lvl\":\"{}\",\"target\":\"{}\",\"msg\":{:?}}}",
                    buf.timestamp(),
                    record.level(),
                    record.target(),
                    record.args().to_string()
                )
            });
        }
    }

    if cli.progress {
        LogWrapper::new(multi.clone(), builder.build()).try_init()?;
    } else {
        builder.try_init()?;
    }

    Ok(cli.progress)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let multi = MultiProgress::new();
    let pb = init_logging(&cli, &multi)?.then_some(&multi);

    match cli.command {
        Commands::Info(ref args) => cmd_info(args, &cli, pb),
        Commands::Export(ref args) => cmd_export(args, &cli, pb),
        Commands::Check(ref args) => cmd_check(args, &cli, pb),
    }
}
