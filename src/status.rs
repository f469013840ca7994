use serde::Serialize;

use crate::config::ServiceConfig;
use crate::probe::PortProbe;

/// Point-in-time view of one service, derived from the OS socket
/// table on every call. Running means the configured port is in
/// LISTEN state; the pid is whichever process owns the port right
/// now, which need not be one this supervisor spawned.
#[derive(Clone, Debug, Serialize)]
pub struct ServiceStatus {
    pub name: String,
    pub display_name: String,
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub port: u16,
}

pub fn status_of<P: PortProbe + ?Sized>(probe: &P, service: &ServiceConfig) -> ServiceStatus {
    let running = probe.is_listening(service.port);
    let pid = if running {
        probe.listening_pids(service.port).first().copied()
    } else {
        None
    };
    ServiceStatus {
        name: service.name.clone(),
        display_name: service.display_name.clone(),
        running,
        pid,
        port: service.port,
    }
}

/// Probes every service concurrently; results come back in configured
/// order.
pub fn status_of_all<P: PortProbe>(probe: &P, services: &[ServiceConfig]) -> Vec<ServiceStatus> {
    std::thread::scope(|scope| {
        let handles: Vec<_> = services
            .iter()
            .map(|service| scope.spawn(move || status_of(probe, service)))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("status worker panicked"))
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    struct FixedProbe {
        bound: Vec<(u16, u32)>,
    }

    impl PortProbe for FixedProbe {
        fn is_listening(&self, port: u16) -> bool {
            self.bound.iter().any(|(p, _)| *p == port)
        }

        fn listening_pids(&self, port: u16) -> Vec<u32> {
            self.bound
                .iter()
                .filter(|(p, _)| *p == port)
                .map(|(_, pid)| *pid)
                .collect()
        }
    }

    fn service(name: &str, port: u16) -> ServiceConfig {
        ServiceConfig {
            name: name.to_string(),
            display_name: name.to_uppercase(),
            port,
            root: "/tmp".into(),
            asset_watcher: false,
            env: BTreeMap::new(),
            command: None,
            log_file: None,
        }
    }

    #[test]
    fn running_service_reports_owning_pid() {
        let probe = FixedProbe {
            bound: vec![(3001, 4242)],
        };
        let status = status_of(&probe, &service("admin", 3001));
        assert!(status.running);
        assert_eq!(status.pid, Some(4242));
        assert_eq!(status.port, 3001);
    }

    #[test]
    fn stopped_service_has_no_pid() {
        let probe = FixedProbe { bound: vec![] };
        let status = status_of(&probe, &service("admin", 3001));
        assert!(!status.running);
        assert_eq!(status.pid, None);
    }

    #[test]
    fn all_statuses_preserve_configured_order() {
        let probe = FixedProbe {
            bound: vec![(3002, 7)],
        };
        let services = vec![
            service("admin", 3001),
            service("users", 3002),
            service("cms", 3004),
        ];
        let statuses = status_of_all(&probe, &services);
        let names: Vec<_> = statuses.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["admin", "users", "cms"]);
        assert!(!statuses[0].running);
        assert!(statuses[1].running);
        assert_eq!(statuses[1].pid, Some(7));
    }

    #[test]
    fn status_serializes_without_null_pid() {
        let probe = FixedProbe { bound: vec![] };
        let json = serde_json::to_value(status_of(&probe, &service("admin", 3001))).unwrap();
        assert_eq!(json["running"], false);
        assert!(json.get("pid").is_none());
    }
}
