// =============================================================================
// Point-in-time snapshot store
// =============================================================================
//
// Immutable, timestamped records of scan output for audit and replay. The
// in-memory registry is authoritative; when a directory is configured each
// snapshot is also persisted as pretty JSON with the atomic tmp + rename
// pattern so a crash mid-write never corrupts an existing file.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// One stored snapshot. The payload is an opaque JSON mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

pub struct SnapshotStore {
    dir: Option<PathBuf>,
    items: RwLock<HashMap<String, Snapshot>>,
}

impl SnapshotStore {
    /// In-memory only.
    pub fn ephemeral() -> Self {
        Self {
            dir: None,
            items: RwLock::new(HashMap::new()),
        }
    }

    /// Backed by a directory of `<id>.json` files.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create snapshot dir {}", dir.display()))?;
        Ok(Self {
            dir: Some(dir),
            items: RwLock::new(HashMap::new()),
        })
    }

    pub fn create_snapshot(&self, id: &str, payload: serde_json::Value) -> Result<Snapshot> {
        let snapshot = Snapshot {
            id: id.to_string(),
            created_at: Utc::now(),
            payload,
        };

        if let Some(dir) = &self.dir {
            let path = dir.join(format!("{id}.json"));
            let tmp = dir.join(format!("{id}.json.tmp"));
            let content = serde_json::to_string_pretty(&snapshot)
                .context("failed to serialize snapshot")?;
            std::fs::write(&tmp, &content)
                .with_context(|| format!("failed to write {}", tmp.display()))?;
            std::fs::rename(&tmp, &path)
                .with_context(|| format!("failed to rename into {}", path.display()))?;
            debug!(id, path = %path.display(), "snapshot persisted");
        }

        self.items.write().insert(id.to_string(), snapshot.clone());
        Ok(snapshot)
    }

    pub fn get_snapshot(&self, id: &str) -> Option<Snapshot> {
        self.items.read().get(id).cloned()
    }

    /// Snapshots whose id starts with `filter` (empty filter = all), newest
    /// first.
    pub fn list_snapshots(&self, filter: &str) -> Vec<Snapshot> {
        let mut out: Vec<Snapshot> = self
            .items
            .read()
            .values()
            .filter(|s| s.id.starts_with(filter))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }

    pub fn delete_snapshot(&self, id: &str) -> bool {
        let removed = self.items.write().remove(id).is_some();
        if removed {
            if let Some(dir) = &self.dir {
                let path = dir.join(format!("{id}.json"));
                if let Err(e) = std::fs::remove_file(&path) {
                    warn!(id, error = %e, "failed to remove snapshot file");
                }
            }
        }
        removed
    }

    /// Load whatever the configured directory already holds.
    pub fn load_existing(&self) -> Result<usize> {
        let Some(dir) = &self.dir else {
            return Ok(0);
        };
        let mut loaded = 0usize;
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("failed to read snapshot dir {}", dir.display()))?
        {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match std::fs::read_to_string(&path)
                .map_err(anyhow::Error::from)
                .and_then(|text| serde_json::from_str::<Snapshot>(&text).map_err(Into::into))
            {
                Ok(snapshot) => {
                    self.items.write().insert(snapshot.id.clone(), snapshot);
                    loaded += 1;
                }
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable snapshot"),
            }
        }
        info!(loaded, "existing snapshots loaded");
        Ok(loaded)
    }

    /// Delete snapshots older than the retention window. Returns how many
    /// were removed.
    pub fn cleanup(&self, retention_days: i64) -> usize {
        let cutoff = Utc::now() - Duration::days(retention_days);
        let expired: Vec<String> = self
            .items
            .read()
            .values()
            .filter(|s| s.created_at < cutoff)
            .map(|s| s.id.clone())
            .collect();
        for id in &expired {
            self.delete_snapshot(id);
        }
        if !expired.is_empty() {
            info!(removed = expired.len(), retention_days, "snapshot cleanup");
        }
        expired.len()
    }

    pub fn count(&self) -> usize {
        self.items.read().len()
    }
}
