use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Environment applied to every spawned server process.
pub const SERVER_ENV: &[(&str, &str)] = &[
    ("XDEBUG_SESSION", "1"),
    ("XDEBUG_CONFIG", "log_level=0"),
    ("PHP_CLI_SERVER_WORKERS", "3"),
];

/// Extra directories appended to PATH for spawned children.
pub const SPAWN_PATH_EXTENSION: &str = "/opt/homebrew/bin:/usr/local/bin";

const DEFAULT_LOG_FILE: &str = "storage/logs/laravel.log";

/// One configured service. Immutable for the process lifetime.
#[derive(Clone, Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub display_name: String,
    pub port: u16,
    pub root: PathBuf,
    /// Also run the asset watcher (`npm run dev`) alongside the server.
    #[serde(default)]
    pub asset_watcher: bool,
    /// Extra environment for the server process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Overrides the default `php -S` server argv.
    #[serde(default)]
    pub command: Option<Vec<String>>,
    /// Log file tailed while the service runs, relative to `root`.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl ServiceConfig {
    pub fn log_file(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE))
    }

    /// Default server argv when no `command` override is configured.
    pub fn server_args(&self) -> Vec<String> {
        vec![
            "-S".to_string(),
            format!("0.0.0.0:{}", self.port),
            "-t".to_string(),
            "./public".to_string(),
            "-dxdebug.mode=debug".to_string(),
            "-dxdebug.start_with_request=trigger".to_string(),
            "-dxdebug.client_port=9003".to_string(),
            "-dxdebug.client_host=0.0.0.0".to_string(),
        ]
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct StackConfig {
    pub services: Vec<ServiceConfig>,
}

impl StackConfig {
    pub fn find(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn service_names(&self) -> Vec<&str> {
        self.services.iter().map(|s| s.name.as_str()).collect()
    }
}

pub fn load_stack_config(path: &Path) -> anyhow::Result<StackConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|err| anyhow::anyhow!("unable to read {}: {err}", path.display()))?;
    let config: StackConfig = serde_yaml_bw::from_str(&contents)
        .map_err(|err| anyhow::anyhow!("invalid config {}: {err}", path.display()))?;
    validate(&config)?;
    Ok(config)
}

/// Locate the stack config: explicit flag, then ./stack.yaml, then the
/// per-user config directory.
pub fn resolve_config_path(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    let local = PathBuf::from("stack.yaml");
    if local.exists() {
        return Ok(local);
    }
    if let Some(dirs) = directories_next::ProjectDirs::from("", "", "stackman") {
        let candidate = dirs.config_dir().join("stack.yaml");
        if candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(anyhow::anyhow!(
        "no stack.yaml found; pass --config or create one in the current directory"
    ))
}

fn validate(config: &StackConfig) -> anyhow::Result<()> {
    if config.services.is_empty() {
        return Err(anyhow::anyhow!("config has no services"));
    }
    let mut names = BTreeSet::new();
    let mut ports = BTreeSet::new();
    for service in &config.services {
        validate_name(&service.name)?;
        if !names.insert(service.name.as_str()) {
            return Err(anyhow::anyhow!("duplicate service name '{}'", service.name));
        }
        if service.port == 0 {
            return Err(anyhow::anyhow!(
                "service '{}' has port 0; a fixed port is required",
                service.name
            ));
        }
        if !ports.insert(service.port) {
            return Err(anyhow::anyhow!(
                "port {} is configured for more than one service",
                service.port
            ));
        }
        if let Some(command) = &service.command
            && command.is_empty()
        {
            return Err(anyhow::anyhow!(
                "service '{}' has an empty command override",
                service.name
            ));
        }
    }
    Ok(())
}

fn validate_name(name: &str) -> anyhow::Result<()> {
    if name.is_empty() {
        return Err(anyhow::anyhow!("service name cannot be empty"));
    }
    if !name
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Err(anyhow::anyhow!(
            "invalid service name '{}'; use alphanumeric, '-' or '_'",
            name
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> anyhow::Result<StackConfig> {
        let config: StackConfig = serde_yaml_bw::from_str(yaml)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn parses_full_service_list() {
        let config = parse(
            r#"
services:
  - name: admin
    display_name: Admin
    port: 3001
    root: /srv/admin
  - name: users
    display_name: Users
    port: 3002
    root: /srv/users
    asset_watcher: true
    env:
      APP_DEBUG: "1"
"#,
        )
        .unwrap();
        assert_eq!(config.services.len(), 2);
        assert!(!config.services[0].asset_watcher);
        assert!(config.services[1].asset_watcher);
        assert_eq!(config.services[1].env["APP_DEBUG"], "1");
        assert_eq!(
            config.find("users").unwrap().log_file(),
            PathBuf::from("storage/logs/laravel.log")
        );
    }

    #[test]
    fn rejects_duplicate_ports() {
        let err = parse(
            r#"
services:
  - name: a
    display_name: A
    port: 3001
    root: /srv/a
  - name: b
    display_name: B
    port: 3001
    root: /srv/b
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("3001"));
    }

    #[test]
    fn rejects_bad_names() {
        assert!(validate_name("admin").is_ok());
        assert!(validate_name("cms_v2").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("bad name").is_err());
    }

    #[test]
    fn server_args_bind_all_interfaces() {
        let config = parse(
            r#"
services:
  - name: admin
    display_name: Admin
    port: 3001
    root: /srv/admin
"#,
        )
        .unwrap();
        let args = config.services[0].server_args();
        assert_eq!(args[0], "-S");
        assert_eq!(args[1], "0.0.0.0:3001");
    }
}
