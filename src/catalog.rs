//! Append-only JSON-lines catalog of published dictionaries.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, TrainerError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Version id; unix timestamp of the training run.
    pub id: i64,
    pub project: String,
    pub sha256: String,
    pub public_url: String,
    pub backup_url: String,
}

/// What the dashboard hands out for a dictionary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryInfo {
    pub id: i64,
    pub url: String,
    pub sha256: String,
}

impl From<&CatalogEntry> for DictionaryInfo {
    fn from(e: &CatalogEntry) -> Self {
        Self { id: e.id, url: e.public_url.clone(), sha256: e.sha256.clone() }
    }
}

pub struct Catalog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl Catalog {
    pub fn open<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn add_entry(&self, entry: &CatalogEntry) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| TrainerError::Worker("catalog lock poisoned".to_string()))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", serde_json::to_string(entry)?)?;
        Ok(())
    }

    pub fn entries(&self) -> Result<Vec<CatalogEntry>> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut entries = Vec::new();
        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<CatalogEntry>(&line) {
                Ok(e) => entries.push(e),
                Err(e) => warn!("Ignoring unreadable catalog line {}: {}", n + 1, e),
            }
        }
        Ok(entries)
    }

    /// Highest version of a project.
    pub fn latest(&self, project: &str) -> Result<DictionaryInfo> {
        self.entries()?
            .iter()
            .filter(|e| e.project == project)
            .max_by_key(|e| e.id)
            .map(DictionaryInfo::from)
            .ok_or_else(|| TrainerError::NotFound(format!("no dictionary for project {}", project)))
    }

    pub fn version(&self, project: &str, id: i64) -> Result<DictionaryInfo> {
        self.entries()?
            .iter()
            .find(|e| e.project == project && e.id == id)
            .map(DictionaryInfo::from)
            .ok_or_else(|| TrainerError::NotFound(format!("no dictionary {} for project {}", id, project)))
    }
}
