// File system layout for runs and cached artifacts
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to get app data directory")]
    NoAppDataDir,
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Default data root: the platform data directory plus `rollsync`
pub fn get_app_data_dir() -> StorageResult<PathBuf> {
    let data_dir = dirs::data_dir().ok_or(StorageError::NoAppDataDir)?;
    let app_dir = data_dir.join("rollsync");
    fs::create_dir_all(&app_dir)?;
    Ok(app_dir)
}

/// Directory holding the outputs of one run
pub fn get_run_dir(root: &Path, run_id: &Uuid) -> StorageResult<PathBuf> {
    let run_dir = root.join("runs").join(run_id.to_string());
    fs::create_dir_all(&run_dir)?;
    Ok(run_dir)
}

/// Directory holding content-keyed artifact records
pub fn get_cache_dir(root: &Path) -> StorageResult<PathBuf> {
    let cache_dir = root.join("cache");
    fs::create_dir_all(&cache_dir)?;
    Ok(cache_dir)
}

/// Write `data` to `dir/filename`, returning the path and its SHA-256
pub fn store_file(dir: &Path, filename: &str, data: &[u8]) -> StorageResult<(PathBuf, String)> {
    fs::create_dir_all(dir)?;
    let file_path = dir.join(filename);
    fs::write(&file_path, data)?;
    Ok((file_path, calculate_sha256(data)))
}

pub fn read_file(path: &Path) -> StorageResult<Vec<u8>> {
    Ok(fs::read(path)?)
}

/// SHA-256 of a file's contents
pub fn hash_file(path: &Path) -> StorageResult<String> {
    Ok(calculate_sha256(&fs::read(path)?))
}

pub fn calculate_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
