use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Error, Result};

/// Install directories probed when a binary is not on PATH.
const WELL_KNOWN_DIRS: &[&str] = &["/opt/homebrew/bin", "/usr/local/bin", "/usr/bin"];

/// Resolves absolute paths for external binaries (`php`, `npm`).
///
/// Resolutions are memoized for the process lifetime; the cache lives
/// on the locator itself so callers decide how widely it is shared.
#[derive(Debug, Default)]
pub struct ExecutableLocator {
    cache: Mutex<BTreeMap<String, PathBuf>>,
}

impl ExecutableLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        if let Some(hit) = self.cache.lock().expect("locator cache poisoned").get(name) {
            return Ok(hit.clone());
        }

        let mut tried = Vec::new();

        if let Some(path) = find_on_path(name) {
            return Ok(self.remember(name, path));
        }

        for dir in WELL_KNOWN_DIRS {
            let candidate = Path::new(dir).join(name);
            if candidate.is_file() {
                return Ok(self.remember(name, candidate));
            }
            tried.push(candidate);
        }

        Err(Error::ExecutableNotFound {
            name: name.to_string(),
            tried,
        })
    }

    fn remember(&self, name: &str, path: PathBuf) -> PathBuf {
        tracing::debug!("resolved {name} to {}", path.display());
        self.cache
            .lock()
            .expect("locator cache poisoned")
            .insert(name.to_string(), path.clone());
        path
    }
}

fn find_on_path(binary: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(binary);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_a_common_binary() {
        let locator = ExecutableLocator::new();
        let path = locator.resolve("sh").unwrap();
        assert!(path.is_absolute());
        // Second call is served from the cache.
        assert_eq!(locator.resolve("sh").unwrap(), path);
    }

    #[test]
    fn missing_binary_reports_tried_locations() {
        let locator = ExecutableLocator::new();
        let err = locator.resolve("definitely-not-installed-anywhere").unwrap_err();
        match err {
            Error::ExecutableNotFound { name, tried } => {
                assert_eq!(name, "definitely-not-installed-anywhere");
                assert!(!tried.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
