use std::time::Duration;

use crate::config::{SERVER_ENV, ServiceConfig};
use crate::error::{Error, Result};
use crate::ledger::{PidLedger, ProcessRecord};
use crate::locator::ExecutableLocator;
use crate::probe::PortProbe;
use crate::process::{self, SpawnSpec};

/// Polling budget while waiting for a started service's port.
const START_POLL_INTERVAL: Duration = Duration::from_millis(500);
const START_POLL_ATTEMPTS: u32 = 10;

/// Pause before re-checking the port after a kill sweep.
const STOP_SETTLE: Duration = Duration::from_millis(500);

/// Pause between the stop and start halves of a restart.
const RESTART_SETTLE: Duration = Duration::from_secs(1);

type SleepFn = Box<dyn Fn(Duration) + Send + Sync>;

/// Orchestrates start/stop/restart for the configured service set.
///
/// Holds no state about the services themselves: liveness is derived
/// from port occupancy on every call, and the pid ledger on disk is
/// the only thing that survives a supervisor restart.
pub struct Supervisor<P: PortProbe> {
    probe: P,
    locator: ExecutableLocator,
    ledger: PidLedger,
    sleep: SleepFn,
}

impl<P: PortProbe> Supervisor<P> {
    pub fn new(probe: P, locator: ExecutableLocator, ledger: PidLedger) -> Self {
        Self {
            probe,
            locator,
            ledger,
            sleep: Box::new(|d| std::thread::sleep(d)),
        }
    }

    /// Replaces the real sleep so tests can fake time.
    pub fn with_sleep(mut self, sleep: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.sleep = Box::new(sleep);
        self
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    pub fn ledger(&self) -> &PidLedger {
        &self.ledger
    }

    /// Starts a service and waits for its port to come up.
    ///
    /// On `StartTimeout` the spawned processes are left running for
    /// diagnosis; a follow-up `stop` cleans them up via the ledger.
    pub fn start(&self, service: &ServiceConfig) -> Result<()> {
        if self.probe.is_listening(service.port) {
            return Err(Error::AlreadyRunning {
                service: service.display_name.clone(),
                port: service.port,
            });
        }
        if !service.root.is_dir() {
            return Err(Error::DirectoryNotFound {
                service: service.display_name.clone(),
                path: service.root.clone(),
            });
        }

        let server_argv = match &service.command {
            Some(argv) => argv.clone(),
            None => {
                let php = self.locator.resolve("php")?;
                let mut argv = vec![php.display().to_string()];
                argv.extend(service.server_args());
                argv
            }
        };
        let watcher_argv = if service.asset_watcher {
            let npm = self.locator.resolve("npm")?;
            Some(vec![
                npm.display().to_string(),
                "run".to_string(),
                "dev".to_string(),
            ])
        } else {
            None
        };

        // Log tail is best-effort; the server starts without it.
        let log_tail_pid = self.spawn_log_tail(service);

        let server_spec = SpawnSpec::new(server_argv, &service.root)
            .envs(SERVER_ENV.iter().map(|(k, v)| (*k, *v)))
            .envs(service.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        let primary_pid =
            process::spawn_detached(&server_spec).map_err(|source| Error::Spawn {
                service: service.display_name.clone(),
                what: "server",
                source,
            })?;
        tracing::info!(
            "spawned {} server (pid {primary_pid}) on port {}",
            service.name,
            service.port
        );

        let secondary_pid = match watcher_argv {
            Some(argv) => {
                let spec = SpawnSpec::new(argv, &service.root);
                Some(
                    process::spawn_detached(&spec).map_err(|source| Error::Spawn {
                        service: service.display_name.clone(),
                        what: "asset watcher",
                        source,
                    })?,
                )
            }
            None => None,
        };

        let record = ProcessRecord {
            primary_pid: Some(primary_pid),
            log_tail_pid,
            secondary_pid,
        };
        if let Err(err) = self.ledger.save(&service.name, &record) {
            tracing::warn!("unable to record pids for {}: {err}", service.name);
        }

        self.wait_for_port(service)
    }

    /// Stops a service. Idempotent: nothing to stop is success.
    pub fn stop(&self, service: &ServiceConfig) -> Result<()> {
        for pid in self.probe.listening_pids(service.port) {
            tracing::debug!("killing pid {pid} on port {}", service.port);
            process::kill_pid(pid);
        }

        // The tail and watcher processes do not hold the port; the
        // ledger is the only way to find them.
        if let Some(record) = self.ledger.load(&service.name) {
            for pid in record.pids() {
                if process::process_exists(pid) {
                    tracing::debug!("killing recorded pid {pid} for {}", service.name);
                    process::kill_pid(pid);
                }
            }
        }

        self.ledger.delete(&service.name);

        // A supervising parent may respawn a worker after the first
        // sweep; settle, re-check, and sweep once more.
        (self.sleep)(STOP_SETTLE);
        if self.probe.is_listening(service.port) {
            for pid in self.probe.listening_pids(service.port) {
                process::kill_pid(pid);
            }
        }

        tracing::info!("stopped {}", service.name);
        Ok(())
    }

    pub fn restart(&self, service: &ServiceConfig) -> Result<()> {
        self.stop(service)?;
        (self.sleep)(RESTART_SETTLE);
        self.start(service)
    }

    /// Starts services in configured order; the first failure aborts
    /// the remainder.
    pub fn start_all(&self, services: &[ServiceConfig]) -> Result<()> {
        for service in services {
            if let Err(err) = self.start(service) {
                tracing::error!("failed to start {}: {err}", service.name);
                return Err(err);
            }
        }
        Ok(())
    }

    /// Stops every service concurrently; failures are collected so no
    /// service's stop attempt is skipped because of another's.
    pub fn stop_all(&self, services: &[ServiceConfig]) -> Result<()> {
        let results: Vec<(String, Result<()>)> = std::thread::scope(|scope| {
            let handles: Vec<_> = services
                .iter()
                .map(|service| {
                    scope.spawn(move || (service.name.clone(), self.stop(service)))
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("stop worker panicked"))
                .collect()
        });

        let failures: Vec<(String, String)> = results
            .into_iter()
            .filter_map(|(name, result)| result.err().map(|err| (name, err.to_string())))
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::BulkStop { failures })
        }
    }

    fn spawn_log_tail(&self, service: &ServiceConfig) -> Option<u32> {
        let spec = SpawnSpec::new(
            vec![
                "tail".to_string(),
                "-f".to_string(),
                service.log_file().display().to_string(),
            ],
            &service.root,
        );
        match process::spawn_detached(&spec) {
            Ok(pid) => Some(pid),
            Err(err) => {
                tracing::warn!("log tail for {} did not start: {err}", service.name);
                None
            }
        }
    }

    fn wait_for_port(&self, service: &ServiceConfig) -> Result<()> {
        for _ in 0..START_POLL_ATTEMPTS {
            (self.sleep)(START_POLL_INTERVAL);
            if self.probe.is_listening(service.port) {
                tracing::info!("{} is listening on port {}", service.name, service.port);
                return Ok(());
            }
        }
        Err(Error::StartTimeout {
            service: service.display_name.clone(),
            port: service.port,
            waited: START_POLL_INTERVAL * START_POLL_ATTEMPTS,
        })
    }
}
