use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Pids recorded for one started service. Advisory only: liveness is
/// always derived from port occupancy, never from this record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRecord {
    #[serde(rename = "primaryPid", skip_serializing_if = "Option::is_none")]
    pub primary_pid: Option<u32>,
    #[serde(rename = "logTailPid", skip_serializing_if = "Option::is_none")]
    pub log_tail_pid: Option<u32>,
    #[serde(rename = "secondaryPid", skip_serializing_if = "Option::is_none")]
    pub secondary_pid: Option<u32>,
}

impl ProcessRecord {
    pub fn pids(&self) -> impl Iterator<Item = u32> {
        [self.primary_pid, self.log_tail_pid, self.secondary_pid]
            .into_iter()
            .flatten()
    }
}

/// On-disk pid bookkeeping, one JSON file per service name.
#[derive(Clone, Debug)]
pub struct PidLedger {
    dir: PathBuf,
}

impl PidLedger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Ledger rooted in the per-user data directory.
    pub fn open_default() -> anyhow::Result<Self> {
        let dirs = directories_next::ProjectDirs::from("", "", "stackman")
            .ok_or_else(|| anyhow::anyhow!("unable to determine a per-user data directory"))?;
        Ok(Self::new(dirs.data_local_dir().join("pids")))
    }

    pub fn record_path(&self, service: &str) -> PathBuf {
        self.dir.join(format!("{service}.json"))
    }

    pub fn save(&self, service: &str, record: &ProcessRecord) -> anyhow::Result<()> {
        write_json(&self.record_path(service), record)
    }

    /// Missing or malformed records read as `None`; corruption must
    /// never block a start or stop.
    pub fn load(&self, service: &str) -> Option<ProcessRecord> {
        let path = self.record_path(service);
        let data = std::fs::read(&path).ok()?;
        match serde_json::from_slice(&data) {
            Ok(record) => Some(record),
            Err(err) => {
                tracing::warn!("ignoring malformed pid record {}: {err}", path.display());
                None
            }
        }
    }

    /// Idempotent: deleting an absent record is success.
    pub fn delete(&self, service: &str) {
        let _ = std::fs::remove_file(self.record_path(service));
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    atomic_write(path, &bytes)
}

fn atomic_write(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp = path.to_path_buf();
    tmp.set_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    if path.exists() {
        let _ = std::fs::remove_file(path);
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_load_delete_round_trip() {
        let temp = tempfile::tempdir().unwrap();
        let ledger = PidLedger::new(temp.path().join("pids"));

        let record = ProcessRecord {
            primary_pid: Some(4242),
            log_tail_pid: Some(4243),
            secondary_pid: None,
        };
        ledger.save("admin", &record).unwrap();
        assert_eq!(ledger.load("admin"), Some(record));

        ledger.delete("admin");
        assert_eq!(ledger.load("admin"), None);
        // Deleting again is fine.
        ledger.delete("admin");
    }

    #[test]
    fn missing_and_malformed_records_read_as_none() {
        let temp = tempfile::tempdir().unwrap();
        let ledger = PidLedger::new(temp.path());

        assert_eq!(ledger.load("never-started"), None);

        std::fs::write(ledger.record_path("broken"), b"{not json").unwrap();
        assert_eq!(ledger.load("broken"), None);
    }

    #[test]
    fn serializes_with_wire_field_names() {
        let record = ProcessRecord {
            primary_pid: Some(1),
            log_tail_pid: None,
            secondary_pid: Some(3),
        };
        let json = serde_json::to_value(record).unwrap();
        assert_eq!(json["primaryPid"], 1);
        assert_eq!(json["secondaryPid"], 3);
        assert!(json.get("logTailPid").is_none());
    }
}
