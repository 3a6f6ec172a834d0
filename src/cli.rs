// Command-line interface
// Argument parsing for the compare, runs and show subcommands

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::pipeline::{ConfigError, PipelineConfig};

#[derive(Debug, Parser)]
#[command(name = "rollsync", version)]
#[command(about = "Align two recordings of the same performance and measure their speed divergence")]
pub struct Cli {
    /// Data root for the run registry, cache and reports
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Compare a target recording against a reference
    Compare(CompareArgs),

    /// List registered runs
    Runs(RunsArgs),

    /// Show one run and its artifacts
    Show(ShowArgs),
}

#[derive(Debug, Args)]
pub struct CompareArgs {
    /// Reference recording (.mid, .midi or .wav)
    pub reference: PathBuf,

    /// Target recording (.mid, .midi or .wav)
    pub target: PathBuf,

    /// JSON pipeline configuration
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Label to register the run under
    #[arg(long)]
    pub run_id: Option<String>,

    /// Report destination
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Append stage progress to this JSONL file
    #[arg(long)]
    pub trace: Option<PathBuf>,

    /// Recompute every artifact instead of reusing cached ones
    #[arg(long)]
    pub no_cache: bool,

    /// Reference ticks between velocity samples
    #[arg(long)]
    pub sample_interval: Option<u64>,

    /// Microseconds per beat replacing every MIDI tempo event
    #[arg(long)]
    pub tempo: Option<u32>,

    /// Ticks per beat replacing the MIDI files' own
    #[arg(long)]
    pub ticks_per_beat: Option<u16>,

    /// Print the full report as JSON instead of a summary
    #[arg(long)]
    pub json: bool,
}

impl CompareArgs {
    /// The configuration file, if any, with command-line flags applied on top
    pub fn to_config(&self) -> Result<PipelineConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::default(),
        };

        if self.run_id.is_some() {
            config.run_id = self.run_id.clone();
        }
        if self.sample_interval.is_some() {
            config.velocity.sample_interval = self.sample_interval;
        }
        if self.tempo.is_some() {
            config.tempo_override = self.tempo;
        }
        if self.ticks_per_beat.is_some() {
            config.ticks_per_beat_override = self.ticks_per_beat;
        }

        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Args)]
pub struct RunsArgs {
    /// Only runs with this label
    #[arg(long)]
    pub label: Option<String>,

    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Run UUID
    pub id: String,
}
