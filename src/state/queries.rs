// Database CRUD operations
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use super::db::{DbConnection, DbResult};
use super::models::{Artifact, ArtifactKind, Run, RunStatus, RunWithArtifacts};

const RUN_COLUMNS: &str = "id, created_at, label, modality, reference_path, reference_sha256,
     target_path, target_sha256, pipeline_version, status";

const ARTIFACT_COLUMNS: &str = "id, run_id, created_at, kind, cache_key, path, sha256, bytes";

/// Inputs identifying a new run
#[derive(Debug, Clone)]
pub struct NewRun {
    pub label: String,
    pub modality: String,
    pub reference_path: String,
    pub reference_sha256: String,
    pub target_path: String,
    pub target_sha256: String,
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn uuid_at(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let text: String = row.get(idx)?;
    Uuid::parse_str(&text).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn time_at(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn run_from_row(row: &Row) -> rusqlite::Result<Run> {
    let status: String = row.get(9)?;
    Ok(Run {
        id: uuid_at(row, 0)?,
        created_at: time_at(row, 1)?,
        label: row.get(2)?,
        modality: row.get(3)?,
        reference_path: row.get(4)?,
        reference_sha256: row.get(5)?,
        target_path: row.get(6)?,
        target_sha256: row.get(7)?,
        pipeline_version: row.get(8)?,
        status: RunStatus::parse(&status)
            .ok_or_else(|| conversion_error(9, format!("unknown run status '{}'", status)))?,
    })
}

fn artifact_from_row(row: &Row) -> rusqlite::Result<Artifact> {
    let kind: String = row.get(3)?;
    Ok(Artifact {
        id: uuid_at(row, 0)?,
        run_id: uuid_at(row, 1)?,
        created_at: time_at(row, 2)?,
        kind: ArtifactKind::parse(&kind)
            .ok_or_else(|| conversion_error(3, format!("unknown artifact kind '{}'", kind)))?,
        cache_key: row.get(4)?,
        path: row.get(5)?,
        sha256: row.get(6)?,
        bytes: row.get(7)?,
    })
}

// ==================== RUN QUERIES ====================

/// Register a new run in the pending state
pub fn create_run(db: &DbConnection, new_run: NewRun) -> DbResult<Run> {
    let run = Run {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        label: new_run.label,
        modality: new_run.modality,
        reference_path: new_run.reference_path,
        reference_sha256: new_run.reference_sha256,
        target_path: new_run.target_path,
        target_sha256: new_run.target_sha256,
        pipeline_version: env!("CARGO_PKG_VERSION").to_string(),
        status: RunStatus::Pending,
    };

    let conn = db.lock()?;
    conn.execute(
        &format!("INSERT INTO runs ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)", RUN_COLUMNS),
        params![
            run.id.to_string(),
            run.created_at.to_rfc3339(),
            run.label,
            run.modality,
            run.reference_path,
            run.reference_sha256,
            run.target_path,
            run.target_sha256,
            run.pipeline_version,
            run.status.as_str(),
        ],
    )?;

    Ok(run)
}

pub fn get_run(db: &DbConnection, id: &Uuid) -> DbResult<Option<Run>> {
    let conn = db.lock()?;
    let mut stmt = conn.prepare(&format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS))?;
    Ok(stmt.query_row([id.to_string()], run_from_row).optional()?)
}

/// Runs newest first, optionally only those registered under `label`
pub fn list_runs(db: &DbConnection, label: Option<&str>) -> DbResult<Vec<Run>> {
    let conn = db.lock()?;

    let runs = match label {
        Some(label) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM runs WHERE label = ?1 ORDER BY rowid DESC",
                RUN_COLUMNS
            ))?;
            let rows = stmt.query_map([label], run_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()?
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM runs ORDER BY rowid DESC",
                RUN_COLUMNS
            ))?;
            let rows = stmt.query_map([], run_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()?
        }
    };

    Ok(runs)
}

pub fn update_run_status(db: &DbConnection, run_id: &Uuid, status: RunStatus) -> DbResult<()> {
    let conn = db.lock()?;
    conn.execute(
        "UPDATE runs SET status = ?1 WHERE id = ?2",
        params![status.as_str(), run_id.to_string()],
    )?;
    Ok(())
}

// ==================== ARTIFACT QUERIES ====================

/// Record a derived file against a run
pub fn create_artifact(
    db: &DbConnection,
    run_id: Uuid,
    kind: ArtifactKind,
    cache_key: String,
    path: String,
    sha256: String,
    bytes: i64,
) -> DbResult<Artifact> {
    let artifact = Artifact {
        id: Uuid::new_v4(),
        run_id,
        created_at: Utc::now(),
        kind,
        cache_key,
        path,
        sha256,
        bytes,
    };

    let conn = db.lock()?;
    conn.execute(
        &format!("INSERT INTO artifacts ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)", ARTIFACT_COLUMNS),
        params![
            artifact.id.to_string(),
            artifact.run_id.to_string(),
            artifact.created_at.to_rfc3339(),
            artifact.kind.as_str(),
            artifact.cache_key,
            artifact.path,
            artifact.sha256,
            artifact.bytes,
        ],
    )?;

    Ok(artifact)
}

pub fn get_artifacts_for_run(db: &DbConnection, run_id: &Uuid) -> DbResult<Vec<Artifact>> {
    let conn = db.lock()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM artifacts WHERE run_id = ?1 ORDER BY rowid",
        ARTIFACT_COLUMNS
    ))?;

    let artifacts = stmt
        .query_map([run_id.to_string()], artifact_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(artifacts)
}

/// Most recent artifact of `kind` computed under `cache_key`, from any run
pub fn find_artifact(db: &DbConnection, kind: ArtifactKind, cache_key: &str) -> DbResult<Option<Artifact>> {
    let conn = db.lock()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM artifacts WHERE kind = ?1 AND cache_key = ?2
         ORDER BY rowid DESC LIMIT 1",
        ARTIFACT_COLUMNS
    ))?;

    Ok(stmt
        .query_row(params![kind.as_str(), cache_key], artifact_from_row)
        .optional()?)
}

pub fn get_run_with_artifacts(db: &DbConnection, run_id: &Uuid) -> DbResult<Option<RunWithArtifacts>> {
    let Some(run) = get_run(db, run_id)? else {
        return Ok(None);
    };
    let artifacts = get_artifacts_for_run(db, run_id)?;
    Ok(Some(RunWithArtifacts { run, artifacts }))
}
