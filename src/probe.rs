use std::ffi::OsString;
use std::process::Command;

/// Directories appended to PATH so the socket tools are found even
/// when the caller's environment is minimal.
const TOOL_PATH_EXTENSION: &str = "/usr/sbin:/sbin";

/// Point-in-time view of a TCP port's listening state.
///
/// Implementations must never fail: port state is polled repeatedly
/// and fate-shares with status display, so tool breakage degrades to
/// "not listening" / "no pids" instead of an error.
pub trait PortProbe: Send + Sync {
    fn is_listening(&self, port: u16) -> bool;

    /// Pids of every process holding the port in LISTEN state, empty
    /// if none or if the listing tool is unavailable.
    fn listening_pids(&self, port: u16) -> Vec<u32>;
}

/// Probes via `lsof`, falling back to a `netstat` scan when `lsof` is
/// missing or errors. The fallback cannot name pids, only occupancy.
#[derive(Debug, Default)]
pub struct SocketToolProbe;

impl SocketToolProbe {
    pub fn new() -> Self {
        Self
    }

    fn lsof_pids(&self, port: u16) -> Option<Vec<u32>> {
        let output = Command::new("lsof")
            .args(["-i", &format!(":{port}"), "-sTCP:LISTEN", "-t"])
            .env("PATH", extended_path())
            .output()
            .ok()?;
        // lsof exits non-zero when nothing matches; only an empty
        // stdout distinguishes "no listener" from tool failure here.
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() && stdout.trim().is_empty() {
            return if lsof_ran_but_found_nothing(&output.stderr) {
                Some(Vec::new())
            } else {
                None
            };
        }
        Some(parse_pid_lines(&stdout))
    }

    fn netstat_says_listening(&self, port: u16) -> bool {
        let output = match Command::new("netstat")
            .arg("-an")
            .env("PATH", extended_path())
            .output()
        {
            Ok(output) => output,
            Err(_) => return false,
        };
        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .lines()
            .any(|line| line_shows_listener(line, port))
    }
}

impl PortProbe for SocketToolProbe {
    fn is_listening(&self, port: u16) -> bool {
        match self.lsof_pids(port) {
            Some(pids) => !pids.is_empty(),
            None => self.netstat_says_listening(port),
        }
    }

    fn listening_pids(&self, port: u16) -> Vec<u32> {
        self.lsof_pids(port).unwrap_or_default()
    }
}

fn extended_path() -> OsString {
    let mut path = std::env::var_os("PATH").unwrap_or_default();
    path.push(":");
    path.push(TOOL_PATH_EXTENSION);
    path
}

fn parse_pid_lines(stdout: &str) -> Vec<u32> {
    stdout
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect()
}

/// lsof exits 1 both for "no match" and for real failures; a usage or
/// permission message on stderr marks the latter.
fn lsof_ran_but_found_nothing(stderr: &[u8]) -> bool {
    stderr.is_empty()
}

/// Matches both BSD (`*.3001`) and Linux (`0.0.0.0:3001`) netstat
/// address columns.
fn line_shows_listener(line: &str, port: u16) -> bool {
    if !line.contains("LISTEN") {
        return false;
    }
    let dotted = format!(".{port}");
    let colon = format!(":{port}");
    line.split_whitespace().any(|column| {
        column.ends_with(&dotted) || column.ends_with(&colon)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_one_pid_per_line() {
        assert_eq!(parse_pid_lines("123\n456\n"), vec![123, 456]);
        assert_eq!(parse_pid_lines("  789  \n"), vec![789]);
        assert_eq!(parse_pid_lines(""), Vec::<u32>::new());
        assert_eq!(parse_pid_lines("garbage\n42\n"), vec![42]);
    }

    #[test]
    fn netstat_line_matching() {
        assert!(line_shows_listener(
            "tcp4  0  0  *.3001  *.*  LISTEN",
            3001
        ));
        assert!(line_shows_listener(
            "tcp   0  0 0.0.0.0:3001  0.0.0.0:*  LISTEN",
            3001
        ));
        assert!(!line_shows_listener(
            "tcp   0  0 0.0.0.0:8080  0.0.0.0:*  LISTEN",
            3001
        ));
        assert!(!line_shows_listener(
            "tcp   0  0 0.0.0.0:3001  0.0.0.0:*  ESTABLISHED",
            3001
        ));
    }

    #[test]
    fn unbound_port_reports_not_listening() {
        // Port 1 requires root to bind, so nothing should own it.
        let probe = SocketToolProbe::new();
        assert!(!probe.is_listening(1));
        assert!(probe.listening_pids(1).is_empty());
    }
}
