use std::{collections::HashMap, sync::Arc, sync::atomic::{AtomicBool, Ordering}, time::{Duration, Instant}};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::{process::Command, sync::RwLock, time::timeout};

use crate::config::GLOBAL_CONFIG;
use crate::error::*;

const SERVICE_MANAGER_PROCESS: &str = "launchd";
const CONTAINER_RUNTIMES: &[&str] = &["docker", "containerd", "podman"];
const TERMINAL_SHELLS: &[&str] = &["sh", "bash", "zsh", "fish", "dash", "tcsh"];
const TERMINAL_HOSTS: &[&str] = &["tmux", "screen", "terminal", "iterm", "login"];

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum OriginKind {
    ServiceManager,
    Container,
    Terminal,
    Unknown,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Origin {
    pub kind: OriginKind,
    pub label: String,
    pub parent_process_name: String,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
}

impl Origin {
    pub fn unknown() -> Self {
        Self {
            kind: OriginKind::Unknown,
            label: String::new(),
            parent_process_name: String::new(),
            command: String::new(),
            start_time: None,
        }
    }
}

#[async_trait]
pub trait JobLister: Send + Sync {
    async fn list_jobs(&self) -> Result<HashMap<u32, String>, SimpleError>;
}

/// Shells out to `launchctl list`: one row per registered job, with "-" in
/// the PID column for jobs without a live process.
pub struct LaunchctlLister;

#[async_trait]
impl JobLister for LaunchctlLister {
    async fn list_jobs(&self) -> Result<HashMap<u32, String>, SimpleError> {
        let wait = Duration::from_millis(GLOBAL_CONFIG.origin.subprocess_timeout_ms);
        let output = timeout(wait, Command::new("launchctl").arg("list").output()).await??;
        Ok(parse_job_listing(&String::from_utf8_lossy(&output.stdout)))
    }
}

pub fn parse_job_listing(output: &str) -> HashMap<u32, String> {
    output.lines().skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let pid = parts.next()?.parse().ok()?;
            let label = parts.nth(1)?.to_owned();
            Some((pid, label))
        })
        .collect()
}

struct CacheState {
    entries: HashMap<u32, String>,
    last_refresh: Option<Instant>,
}

/// PID → job-label map from the service manager. The listing walks the full
/// process table, so it is refreshed at most once per TTL window; lookups
/// that race a refresh read the previous entries.
pub struct ServiceManagerCache {
    lister: Box<dyn JobLister>,
    state: RwLock<CacheState>,
    refreshing: AtomicBool,
    ttl: Duration,
}

impl ServiceManagerCache {
    pub fn new(lister: Box<dyn JobLister>, ttl: Duration) -> Self {
        Self {
            lister,
            state: RwLock::new(CacheState {
                entries: HashMap::new(),
                last_refresh: None,
            }),
            refreshing: AtomicBool::new(false),
            ttl,
        }
    }

    pub async fn lookup(&self, pid: u32) -> Option<String> {
        if self.is_stale().await && !self.refreshing.swap(true, Ordering::SeqCst) {
            self.refresh().await;
            self.refreshing.store(false, Ordering::SeqCst);
        }
        let state = self.state.read().await;
        state.entries.get(&pid).cloned()
    }

    async fn is_stale(&self) -> bool {
        let state = self.state.read().await;
        state.last_refresh.map_or(true, |at| at.elapsed() >= self.ttl)
    }

    async fn refresh(&self) {
        // The listing runs outside the lock; the whole map is swapped in one
        // write so readers never observe a half-built refresh.
        match self.lister.list_jobs().await {
            Ok(entries) => {
                let mut state = self.state.write().await;
                state.entries = entries;
                state.last_refresh = Some(Instant::now());
            }
            Err(err) => {
                log::warn!("Failed to list service manager jobs: {}", err.msg);
                let mut state = self.state.write().await;
                state.last_refresh = Some(Instant::now());
            }
        }
    }
}

#[derive(Clone)]
pub struct OriginResolver {
    cache: Arc<ServiceManagerCache>,
}

impl OriginResolver {
    pub fn new(cache: Arc<ServiceManagerCache>) -> Self {
        Self { cache }
    }

    /// Best effort on every step: a failed subprocess degrades the affected
    /// field to empty/absent instead of failing the lookup.
    pub async fn resolve(&self, pid: u32) -> Origin {
        if let Some(label) = self.cache.lookup(pid).await {
            return Origin {
                kind: OriginKind::ServiceManager,
                label,
                parent_process_name: SERVICE_MANAGER_PROCESS.to_owned(),
                command: String::new(),
                start_time: None,
            };
        }

        let command = ps_field(pid, "command=").await.unwrap_or_default();
        let start_time = match ps_field(pid, "lstart=").await {
            Some(lstart) => parse_start_time(&lstart),
            None => None,
        };
        let parent_name = match ps_field(pid, "ppid=").await.and_then(|raw| raw.parse::<u32>().ok()) {
            Some(ppid) => ps_field(ppid, "comm=").await
                .map(|comm| basename(&comm))
                .unwrap_or_default(),
            None => String::new(),
        };

        let kind = classify_parent(&parent_name);
        let label = match kind {
            OriginKind::Unknown => String::new(),
            _ => parent_name.clone(),
        };
        Origin { kind, label, parent_process_name: parent_name, command, start_time }
    }
}

async fn ps_field(pid: u32, field: &str) -> Option<String> {
    let wait = Duration::from_millis(GLOBAL_CONFIG.origin.subprocess_timeout_ms);
    let result = timeout(wait, Command::new("ps")
        .args(&["-p", &pid.to_string(), "-o", field])
        .output()).await;
    match result {
        Ok(Ok(output)) if output.status.success() => {
            let text = String::from_utf8_lossy(&output.stdout).trim().to_owned();
            if text.is_empty() { None } else { Some(text) }
        }
        _ => None,
    }
}

fn basename(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_owned()
}

pub fn classify_parent(parent_name: &str) -> OriginKind {
    let name = basename(parent_name).to_lowercase();
    if name.is_empty() {
        return OriginKind::Unknown;
    }
    if name.contains(SERVICE_MANAGER_PROCESS) {
        return OriginKind::ServiceManager;
    }
    if CONTAINER_RUNTIMES.iter().any(|runtime| name.contains(runtime)) {
        return OriginKind::Container;
    }
    if TERMINAL_SHELLS.iter().any(|shell| name == *shell)
        || TERMINAL_HOSTS.iter().any(|host| name.contains(host)) {
        return OriginKind::Terminal;
    }
    OriginKind::Unknown
}

const WEEKDAYS_ABBR: &[&str] = &["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
const WEEKDAYS_LOCAL: &[&str] = &["月", "火", "水", "木", "金", "土", "日"];

lazy_static! {
    static ref CLOCK_TOKEN: Regex = Regex::new(r"^(\d{1,2}):(\d{2}):\d{2}$").unwrap();
}

/// Reduce a `ps -o lstart=` timestamp to "HH:MM". The weekday token anchors
/// the parse; both English and local abbreviated forms are accepted, anything
/// else is reported as absent rather than guessed at.
pub fn parse_start_time(lstart: &str) -> Option<String> {
    let tokens: Vec<&str> = lstart.split_whitespace().collect();
    let anchor = tokens.iter().position(|token| {
        WEEKDAYS_ABBR.contains(token) || WEEKDAYS_LOCAL.iter().any(|day| token.contains(day))
    })?;

    if tokens.len() >= anchor + 5 {
        let window = tokens[anchor..anchor + 5].join(" ");
        if let Ok(parsed) = NaiveDateTime::parse_from_str(&window, "%a %b %e %H:%M:%S %Y") {
            return Some(parsed.format("%H:%M").to_string());
        }
    }
    tokens[anchor..].iter().find_map(|token| {
        CLOCK_TOKEN.captures(token).map(|cap| format!("{:0>2}:{}", &cap[1], &cap[2]))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingLister {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl JobLister for CountingLister {
        async fn list_jobs(&self) -> Result<HashMap<u32, String>, SimpleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut jobs = HashMap::new();
            jobs.insert(42, "com.example.devserver".to_owned());
            Ok(jobs)
        }
    }

    fn counting_cache(ttl: Duration) -> (ServiceManagerCache, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = ServiceManagerCache::new(
            Box::new(CountingLister { calls: calls.clone() }),
            ttl,
        );
        (cache, calls)
    }

    #[tokio::test]
    async fn lookups_within_ttl_share_one_listing() {
        let (cache, calls) = counting_cache(Duration::from_secs(5));
        assert_eq!(cache.lookup(42).await.as_deref(), Some("com.example.devserver"));
        assert_eq!(cache.lookup(7).await, None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn lookups_across_ttl_refresh_again() {
        let (cache, calls) = counting_cache(Duration::from_millis(20));
        cache.lookup(42).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        cache.lookup(42).await;
        assert!(calls.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn job_listing_skips_dead_jobs() {
        let listing = "\
PID\tStatus\tLabel
435\t0\tcom.apple.Finder
-\t0\tcom.example.idle
9120\t0\tcom.example.devserver
";
        let jobs = parse_job_listing(listing);
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs.get(&9120).map(String::as_str), Some("com.example.devserver"));
        assert_eq!(jobs.get(&435).map(String::as_str), Some("com.apple.Finder"));
    }

    #[test]
    fn english_lstart_parses_to_clock_time() {
        assert_eq!(
            parse_start_time("Thu Apr 10 13:22:01 2025"),
            Some("13:22".to_owned())
        );
    }

    #[test]
    fn localized_weekday_anchors_the_fallback_scan() {
        assert_eq!(
            parse_start_time("木 4/10 9:05:33 2025"),
            Some("09:05".to_owned())
        );
    }

    #[test]
    fn unparseable_timestamps_are_absent() {
        assert_eq!(parse_start_time(""), None);
        assert_eq!(parse_start_time("not a timestamp"), None);
        assert_eq!(parse_start_time("Thu nothing here"), None);
    }

    #[test]
    fn parent_classification() {
        assert_eq!(classify_parent("launchd"), OriginKind::ServiceManager);
        assert_eq!(classify_parent("com.docker.backend"), OriginKind::Container);
        assert_eq!(classify_parent("/bin/zsh"), OriginKind::Terminal);
        assert_eq!(classify_parent("tmux"), OriginKind::Terminal);
        assert_eq!(classify_parent("node"), OriginKind::Unknown);
        assert_eq!(classify_parent(""), OriginKind::Unknown);
    }
}
