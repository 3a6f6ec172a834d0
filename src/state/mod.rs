// State management module
// Run registry in SQLite plus content-keyed artifact files

pub mod cache;
pub mod db;
pub mod models;
pub mod queries;
pub mod storage;

pub use cache::{cache_key, ArtifactCache, ArtifactRecord, CacheError, SCHEMA_TAG};
pub use db::{init_db, open_db, open_in_memory, DbConnection, DbError};
pub use models::{Artifact, ArtifactKind, Run, RunStatus, RunWithArtifacts};
pub use queries::{
    create_artifact, create_run, find_artifact, get_artifacts_for_run, get_run,
    get_run_with_artifacts, list_runs, update_run_status, NewRun,
};
pub use storage::{calculate_sha256, get_app_data_dir, get_run_dir, hash_file, StorageError};
