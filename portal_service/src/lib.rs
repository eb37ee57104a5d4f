pub mod error;
mod config;
mod enrich;
mod origin;
mod port_scan;
mod process_resolve;
mod web_probe;

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::Receiver;

use error::*;
use origin::{LaunchctlLister, ServiceManagerCache};

pub use config::{Config, GLOBAL_CONFIG};
pub use enrich::{EnrichmentPipeline, PortRecord, ScanEvent, STREAM_DONE};
pub use origin::{Origin, OriginKind};
pub use process_resolve::UNKNOWN_PROCESS;

/// One service instance per process: the enrichment pipeline plus the shared
/// service-manager cache behind it. Cloning shares both.
#[derive(Clone)]
pub struct PortalService {
    pipeline: EnrichmentPipeline,
    own_port: Option<u16>,
}

impl PortalService {
    pub fn start(listen: &str) -> Result<Self, SimpleError> {
        let cache = Arc::new(ServiceManagerCache::new(
            Box::new(LaunchctlLister),
            Duration::from_millis(GLOBAL_CONFIG.origin.cache_ttl_ms),
        ));
        Ok(Self {
            pipeline: EnrichmentPipeline::new(cache)?,
            own_port: listen.parse::<SocketAddr>().ok().map(|addr| addr.port()),
        })
    }

    pub fn config(&self) -> &'static Config {
        &GLOBAL_CONFIG
    }

    /// One-shot scan cycle, all enrichment completed before returning.
    pub async fn scan(&self) -> Vec<PortRecord> {
        self.pipeline.scan(self.own_port).await
    }

    /// Incremental scan cycle; see `EnrichmentPipeline::stream_scan`.
    pub fn stream_scan(&self, known: HashSet<u16>) -> Receiver<ScanEvent> {
        self.pipeline.stream_scan(known, self.own_port)
    }
}
