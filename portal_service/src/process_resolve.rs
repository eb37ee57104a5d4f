use std::time::Duration;

use tokio::{process::Command, time::timeout};

use crate::config::GLOBAL_CONFIG;
use crate::error::*;

pub const UNKNOWN_PROCESS: &str = "unknown";

// Daemons that listen on TCP but never serve a page worth previewing.
// Anything not matched here is treated as likely-web and handed to the web
// probe, which makes the final call.
const NON_WEB_HINTS: &[&str] = &[
    "postgres",
    "mysqld",
    "mariadb",
    "redis-server",
    "mongod",
    "memcached",
    "etcd",
    "beam.smp",
];

#[derive(Debug, Clone)]
pub struct ListenerInfo {
    pub pid: Option<u32>,
    pub name: String,
    pub likely_web: bool,
}

impl ListenerInfo {
    pub fn unknown() -> Self {
        Self {
            pid: None,
            name: UNKNOWN_PROCESS.to_owned(),
            likely_web: true,
        }
    }
}

pub fn is_likely_web(name: &str) -> bool {
    let name = name.to_lowercase();
    !NON_WEB_HINTS.iter().any(|hint| name.contains(hint))
}

/// Find the process listening on `port` via `lsof`. Callers decide what a
/// failure means; the enrichment pipeline maps it to `ListenerInfo::unknown`.
pub async fn resolve_listener(port: u16) -> Result<ListenerInfo, SimpleError> {
    let wait = Duration::from_millis(GLOBAL_CONFIG.origin.subprocess_timeout_ms);
    let output = timeout(wait, Command::new("lsof")
        .args(&["-i", &format!(":{}", port), "-sTCP:LISTEN", "-n", "-P"])
        .output()).await??;

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_lsof_listing(&stdout).ok_or_else(|| SimpleError::new("no listener in lsof output"))
}

pub fn parse_lsof_listing(output: &str) -> Option<ListenerInfo> {
    // First line is the column header; the first data row is the listener.
    let line = output.lines().nth(1)?;
    let mut parts = line.split_whitespace();
    let name = parts.next()?.to_owned();
    let pid = parts.next().and_then(|part| part.parse().ok());
    let likely_web = is_likely_web(&name);
    Some(ListenerInfo { pid, name, likely_web })
}

#[cfg(test)]
mod tests {
    use super::*;

    const NODE_LISTING: &str = "\
COMMAND   PID USER   FD   TYPE             DEVICE SIZE/OFF NODE NAME
node    48121  dev   23u  IPv4 0xa1b2c3d4      0t0  TCP 127.0.0.1:3000 (LISTEN)
";
    const POSTGRES_LISTING: &str = "\
COMMAND    PID USER   FD   TYPE             DEVICE SIZE/OFF NODE NAME
postgres   812  dev    7u  IPv4 0xdeadbeef      0t0  TCP 127.0.0.1:5432 (LISTEN)
";

    #[test]
    fn parses_name_and_pid() {
        let info = parse_lsof_listing(NODE_LISTING).unwrap();
        assert_eq!(info.name, "node");
        assert_eq!(info.pid, Some(48121));
        assert!(info.likely_web);
    }

    #[test]
    fn database_daemons_are_not_web() {
        let info = parse_lsof_listing(POSTGRES_LISTING).unwrap();
        assert_eq!(info.name, "postgres");
        assert!(!info.likely_web);
    }

    #[test]
    fn empty_output_resolves_to_nothing() {
        assert!(parse_lsof_listing("").is_none());
        assert!(parse_lsof_listing("COMMAND   PID USER\n").is_none());
    }

    #[test]
    fn unresolved_listener_defaults_to_web() {
        let info = ListenerInfo::unknown();
        assert_eq!(info.name, UNKNOWN_PROCESS);
        assert_eq!(info.pid, None);
        assert!(info.likely_web);
    }

    #[test]
    fn deny_list_matches_substrings_case_insensitively() {
        assert!(!is_likely_web("Redis-Server"));
        assert!(!is_likely_web("mysqld_safe"));
        assert!(is_likely_web("node"));
        assert!(is_likely_web("python3.11"));
    }
}
