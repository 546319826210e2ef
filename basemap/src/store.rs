//! Versioned storage of raw payloads and their rendered documents.
//!
//! Versions live at `<root>/<project>/<project>_v<N>.json`; only the newest
//! `keep_versions` files are kept per project.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::decoder::RawPayload;
use crate::errors::StoreError;

pub type StoreResult<T> = Result<T, StoreError>;

static PROJECT_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/base/([a-zA-Z0-9]+)").expect("project url pattern"));
static PROJECT_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,128}$").expect("project id pattern"));

/// Project identifier embedded in a vendor URL (`.../base/<token>?...`).
pub fn project_id_from_url(url: &str) -> Option<String> {
    PROJECT_URL
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// One stored version of a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredVersion {
    pub project: String,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub payload: RawPayload,
    /// Rendered documents keyed by file name.
    #[serde(default)]
    pub documents: IndexMap<String, String>,
}

/// Persistence used by `sync`: fetch the previous payload, store the next one.
pub trait SnapshotStore {
    fn latest(&self, project: &str) -> StoreResult<Option<StoredVersion>>;

    fn save(
        &self,
        project: &str,
        payload: &RawPayload,
        documents: IndexMap<String, String>,
    ) -> StoreResult<StoredVersion>;

    fn versions(&self, project: &str) -> StoreResult<Vec<u32>>;
}

/// Directory-backed [`SnapshotStore`].
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    keep_versions: usize,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>, keep_versions: usize) -> Self {
        Self {
            root: root.into(),
            keep_versions: keep_versions.max(1),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn project_dir(&self, project: &str) -> StoreResult<PathBuf> {
        if !PROJECT_ID.is_match(project) {
            return Err(StoreError::InvalidProject(project.to_string()));
        }
        Ok(self.root.join(project))
    }

    fn version_path(&self, project: &str, version: u32) -> StoreResult<PathBuf> {
        Ok(self.project_dir(project)?.join(format!("{project}_v{version}.json")))
    }

    fn load(&self, path: &Path) -> StoreResult<StoredVersion> {
        let content = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
        serde_json::from_str(&content).map_err(|e| StoreError::json(path, e))
    }

    fn prune(&self, project: &str) -> StoreResult<()> {
        let versions = self.versions(project)?;
        if versions.len() <= self.keep_versions {
            return Ok(());
        }
        let excess = versions.len() - self.keep_versions;
        for version in &versions[..excess] {
            let path = self.version_path(project, *version)?;
            fs::remove_file(&path).map_err(|e| StoreError::io(&path, e))?;
            log::debug!("pruned {}", path.display());
        }
        Ok(())
    }
}

impl SnapshotStore for FileStore {
    fn latest(&self, project: &str) -> StoreResult<Option<StoredVersion>> {
        match self.versions(project)?.last() {
            Some(version) => {
                let path = self.version_path(project, *version)?;
                self.load(&path).map(Some)
            }
            None => Ok(None),
        }
    }

    fn save(
        &self,
        project: &str,
        payload: &RawPayload,
        documents: IndexMap<String, String>,
    ) -> StoreResult<StoredVersion> {
        let dir = self.project_dir(project)?;
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

        let version = self.versions(project)?.last().map_or(1, |v| v + 1);
        let stored = StoredVersion {
            project: project.to_string(),
            version,
            created_at: Utc::now(),
            payload: payload.clone(),
            documents,
        };

        let path = self.version_path(project, version)?;
        let content = serde_json::to_string_pretty(&stored).map_err(|e| StoreError::json(&path, e))?;
        fs::write(&path, content).map_err(|e| StoreError::io(&path, e))?;
        log::info!("stored {project} version {version} at {}", path.display());

        self.prune(project)?;
        Ok(stored)
    }

    /// Stored version numbers, ascending.
    fn versions(&self, project: &str) -> StoreResult<Vec<u32>> {
        let dir = self.project_dir(project)?;
        let mut versions = Vec::new();

        if !dir.exists() {
            return Ok(versions);
        }

        let prefix = format!("{project}_v");
        let entries = fs::read_dir(&dir).map_err(|e| StoreError::io(&dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&dir, e))?;
            let path = entry.path();

            if let Some(filename) = path.file_name().and_then(|n| n.to_str())
                && let Some(rest) = filename.strip_prefix(&prefix)
                && let Some(number) = rest.strip_suffix(".json")
                && let Ok(version) = number.parse::<u32>()
            {
                versions.push(version);
            }
        }

        versions.sort_unstable();
        Ok(versions)
    }
}
