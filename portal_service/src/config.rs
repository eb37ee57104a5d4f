use lazy_static::lazy_static;
use serde::Deserialize;

use crate::error::*;

#[derive(Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub listen: String,
    pub scan: ScannerConfig,
    pub web: WebProbeConfig,
    pub origin: OriginConfig,
}

#[derive(Deserialize, Clone)]
#[serde(default)]
pub struct ScannerConfig {
    pub port_start: u16,
    pub port_end: u16,
    pub probe_timeout_ms: u64,
    pub max_tasks: usize,
}

#[derive(Deserialize, Clone)]
#[serde(default)]
pub struct WebProbeConfig {
    pub fetch_timeout_ms: u64,
    pub browser_timeout_ms: u64,
    pub settle_ms: u64,
}

#[derive(Deserialize, Clone)]
#[serde(default)]
pub struct OriginConfig {
    pub cache_ttl_ms: u64,
    pub subprocess_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8888".to_owned(),
            scan: ScannerConfig::default(),
            web: WebProbeConfig::default(),
            origin: OriginConfig::default(),
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            port_start: 3000,
            port_end: 9999,
            probe_timeout_ms: 100,
            max_tasks: 1024,
        }
    }
}

impl Default for WebProbeConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: 500,
            browser_timeout_ms: 5000,
            settle_ms: 500,
        }
    }
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: 5000,
            subprocess_timeout_ms: 1000,
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self, SimpleError> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }
}

lazy_static! {
    pub static ref GLOBAL_CONFIG: Config = {
        match Config::from_file("config.json") {
            Ok(config) => config,
            Err(_) => Config::default(),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_tunable() {
        let config = Config::default();
        assert_eq!(config.scan.port_start, 3000);
        assert_eq!(config.scan.port_end, 9999);
        assert_eq!(config.scan.probe_timeout_ms, 100);
        assert_eq!(config.web.fetch_timeout_ms, 500);
        assert_eq!(config.web.browser_timeout_ms, 5000);
        assert_eq!(config.web.settle_ms, 500);
        assert_eq!(config.origin.cache_ttl_ms, 5000);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let config: Config = serde_json::from_str(r#"{"listen": "127.0.0.1:9000", "scan": {"port_end": 4000}}"#).unwrap();
        assert_eq!(config.listen, "127.0.0.1:9000");
        assert_eq!(config.scan.port_start, 3000);
        assert_eq!(config.scan.port_end, 4000);
        assert_eq!(config.origin.cache_ttl_ms, 5000);
    }
}
