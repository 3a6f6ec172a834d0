// CLI commands
// Each subcommand opens the data root and drives the library

use std::path::{Path, PathBuf};

use serde::Serialize;
use uuid::Uuid;

use crate::cli::{CompareArgs, RunsArgs, ShowArgs};
use crate::pipeline::{run_pipeline, Inputs, PipelineContext, PipelineOutcome, Tracer};
use crate::state::{self, ArtifactCache, DbConnection, Run, RunWithArtifacts};

#[derive(Debug, Serialize)]
pub struct CommandError {
    message: String,
}

impl<E: std::fmt::Display> From<E> for CommandError {
    fn from(error: E) -> Self {
        CommandError {
            message: error.to_string(),
        }
    }
}

impl CommandError {
    pub fn message(&self) -> &str {
        &self.message
    }
}

pub type CommandResult<T> = Result<T, CommandError>;

/// Data root and registry for a command
fn open_state(data_dir: Option<&Path>) -> CommandResult<(PathBuf, DbConnection)> {
    let root = match data_dir {
        Some(dir) => dir.to_path_buf(),
        None => state::get_app_data_dir()?,
    };
    let db = state::open_db(&root)?;
    Ok((root, db))
}

pub fn compare(data_dir: Option<&Path>, args: &CompareArgs) -> CommandResult<PipelineOutcome> {
    let config = args.to_config()?;
    let (root, db) = open_state(data_dir)?;

    let cache = if args.no_cache {
        ArtifactCache::write_only(db, &root)?
    } else {
        ArtifactCache::new(db, &root)?
    };
    let ctx = PipelineContext {
        root,
        cache,
        tracer: Tracer::new(args.trace.clone()),
    };
    let inputs = Inputs {
        reference: args.reference.clone(),
        target: args.target.clone(),
        output: args.out.clone(),
    };

    let outcome = run_pipeline(&inputs, &config, &ctx)?;
    Ok(outcome)
}

pub fn list_runs(data_dir: Option<&Path>, args: &RunsArgs) -> CommandResult<Vec<Run>> {
    let (_, db) = open_state(data_dir)?;
    let runs = state::list_runs(&db, args.label.as_deref())?;
    Ok(runs)
}

pub fn show_run(data_dir: Option<&Path>, args: &ShowArgs) -> CommandResult<RunWithArtifacts> {
    let id = Uuid::parse_str(&args.id).map_err(|e| CommandError {
        message: format!("Invalid run id {}: {}", args.id, e),
    })?;
    let (_, db) = open_state(data_dir)?;

    state::get_run_with_artifacts(&db, &id)?.ok_or_else(|| CommandError {
        message: format!("No run with id {}", id),
    })
}
