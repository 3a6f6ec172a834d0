// Rollsync - recording alignment and speed divergence
// Module declarations

use clap::Parser;

pub mod align;
pub mod audio;
pub mod cli;
pub mod commands;
pub mod correspondence;
pub mod events;
pub mod midi;
pub mod pipeline;
pub mod state;
pub mod velocity;

use cli::{Cli, Command};
use commands::CommandResult;

/// Log to stderr at `info` unless `RUST_LOG` says otherwise
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

/// Parse the command line and run the requested subcommand
pub fn run() -> CommandResult<()> {
    let cli = Cli::parse();
    let data_dir = cli.data_dir.as_deref();

    match &cli.command {
        Command::Compare(args) => {
            let outcome = commands::compare(data_dir, args)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&outcome.report)?);
            } else {
                println!("{}", outcome.report.headline());
                println!("run {} -> {}", outcome.run.id, outcome.report_path.display());
            }
        }
        Command::Runs(args) => {
            let runs = commands::list_runs(data_dir, args)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&runs)?);
            } else {
                for run in runs {
                    println!(
                        "{}  {}  {:<10}  {:<8}  {} vs {}",
                        run.id,
                        run.created_at.format("%Y-%m-%d %H:%M:%S"),
                        run.status.as_str(),
                        run.modality,
                        run.reference_path,
                        run.target_path
                    );
                }
            }
        }
        Command::Show(args) => {
            let run = commands::show_run(data_dir, args)?;
            println!("{}", serde_json::to_string_pretty(&run)?);
        }
    }

    Ok(())
}
