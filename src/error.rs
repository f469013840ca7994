use std::path::PathBuf;
use std::time::Duration;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Supervisor-level failures surfaced to the caller.
///
/// Probe, ledger, and kill failures are absorbed where they occur
/// (empty result, no record, idempotent kill) and never show up here.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{service} is already running on port {port}")]
    AlreadyRunning { service: String, port: u16 },

    #[error("directory not found for {service}: {}", path.display())]
    DirectoryNotFound { service: String, path: PathBuf },

    #[error("{name} not found. Ensure it is installed and on your PATH.\nTried:\n{}",
        tried.iter().map(|p| format!("  - {}", p.display())).collect::<Vec<_>>().join("\n"))]
    ExecutableNotFound { name: String, tried: Vec<PathBuf> },

    #[error("failed to start {service}: port {port} is not listening after {}ms", waited.as_millis())]
    StartTimeout {
        service: String,
        port: u16,
        waited: Duration,
    },

    #[error("failed to spawn {what} for {service}: {source}")]
    Spawn {
        service: String,
        what: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("stop failed for {}",
        failures.iter().map(|(s, e)| format!("{s} ({e})")).collect::<Vec<_>>().join(", "))]
    BulkStop { failures: Vec<(String, String)> },
}
