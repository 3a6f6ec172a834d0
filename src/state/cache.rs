// Artifact cache
// Content-keyed JSON records for alignments, warp paths and correspondences

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use super::db::{DbConnection, DbError};
use super::models::{Artifact, ArtifactKind};
use super::queries::{create_artifact, find_artifact};
use super::storage::{calculate_sha256, get_cache_dir, read_file, store_file, StorageError};

/// Bumped whenever a cached payload changes shape
pub const SCHEMA_TAG: &str = "rollsync-artifact-v1";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Database error: {0}")]
    Db(#[from] DbError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// On-disk form of a cached artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRecord<T> {
    pub schema: String,
    pub kind: ArtifactKind,
    pub cache_key: String,
    pub payload: T,
}

/// Compute the cache key of an artifact
///
/// Hashes the kind, the schema tag, the identities of the inputs (in order)
/// and the JSON form of whatever configuration affects the artifact.
pub fn cache_key<C: Serialize>(kind: ArtifactKind, inputs: &[&str], config: &C) -> Result<String, CacheError> {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(SCHEMA_TAG.as_bytes());
    for input in inputs {
        hasher.update([0u8]);
        hasher.update(input.as_bytes());
    }
    hasher.update([0u8]);
    hasher.update(serde_json::to_vec(config)?);
    Ok(hex::encode(hasher.finalize()))
}

/// Registry-backed store of derived artifacts
pub struct ArtifactCache {
    db: DbConnection,
    dir: PathBuf,
    enabled: bool,
}

impl ArtifactCache {
    /// Cache records under `root/cache`, indexed in `db`
    pub fn new(db: DbConnection, root: &Path) -> Result<Self, CacheError> {
        Ok(ArtifactCache {
            db,
            dir: get_cache_dir(root)?,
            enabled: true,
        })
    }

    /// A cache that never hits but still records what it stores
    pub fn write_only(db: DbConnection, root: &Path) -> Result<Self, CacheError> {
        Ok(ArtifactCache {
            enabled: false,
            ..Self::new(db, root)?
        })
    }

    pub fn db(&self) -> &DbConnection {
        &self.db
    }

    /// Load a cached payload, or `None` on a miss
    ///
    /// A record that is missing, altered since it was written, or tagged with
    /// another schema, kind or key counts as a miss.
    pub fn load<T: DeserializeOwned>(&self, kind: ArtifactKind, key: &str) -> Result<Option<T>, CacheError> {
        if !self.enabled {
            return Ok(None);
        }

        let Some(artifact) = find_artifact(&self.db, kind, key)? else {
            return Ok(None);
        };

        let path = Path::new(&artifact.path);
        let bytes = match read_file(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("Cached {} at {} is unreadable ({}), recomputing", kind.as_str(), artifact.path, e);
                return Ok(None);
            }
        };

        if calculate_sha256(&bytes) != artifact.sha256 {
            log::warn!("Cached {} at {} has changed on disk, recomputing", kind.as_str(), artifact.path);
            return Ok(None);
        }

        let record: ArtifactRecord<T> = match serde_json::from_slice(&bytes) {
            Ok(record) => record,
            Err(e) => {
                log::warn!("Cached {} at {} does not parse ({}), recomputing", kind.as_str(), artifact.path, e);
                return Ok(None);
            }
        };

        if record.schema != SCHEMA_TAG || record.kind != kind || record.cache_key != key {
            log::warn!("Cached {} at {} has a stale header, recomputing", kind.as_str(), artifact.path);
            return Ok(None);
        }

        log::info!("Loaded cached {} ({})", kind.as_str(), short(key));
        Ok(Some(record.payload))
    }

    /// Write a payload record and register it against `run_id`
    pub fn store<T: Serialize>(
        &self,
        run_id: Uuid,
        kind: ArtifactKind,
        key: &str,
        payload: &T,
    ) -> Result<Artifact, CacheError> {
        let record = ArtifactRecord {
            schema: SCHEMA_TAG.to_string(),
            kind,
            cache_key: key.to_string(),
            payload,
        };
        let bytes = serde_json::to_vec(&record)?;
        let filename = format!("{}-{}.json", kind.as_str(), key);
        let (path, sha256) = store_file(&self.dir, &filename, &bytes)?;

        log::info!("Cached {} ({}) at {}", kind.as_str(), short(key), path.display());

        Ok(create_artifact(
            &self.db,
            run_id,
            kind,
            key.to_string(),
            path.to_string_lossy().into_owned(),
            sha256,
            bytes.len() as i64,
        )?)
    }

    /// Load a payload, or compute and store it on a miss
    ///
    /// Returns the payload and whether it came from the cache.
    pub fn load_or_compute<T, E, F>(
        &self,
        run_id: Uuid,
        kind: ArtifactKind,
        key: &str,
        compute: F,
    ) -> Result<(T, bool), E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: FnOnce() -> Result<T, E>,
    {
        if let Some(payload) = self.load(kind, key)? {
            return Ok((payload, true));
        }

        let payload = compute()?;
        self.store(run_id, kind, key, &payload)?;
        Ok((payload, false))
    }
}

fn short(key: &str) -> &str {
    &key[..key.len().min(12)]
}
