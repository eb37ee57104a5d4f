use std::{collections::HashSet, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::{sync::mpsc::{channel, Receiver, Sender}, task};

use crate::config::GLOBAL_CONFIG;
use crate::error::*;
use crate::origin::{Origin, OriginResolver, ServiceManagerCache};
use crate::port_scan;
use crate::process_resolve::{self, ListenerInfo};
use crate::web_probe::WebProbe;

/// Payload of the terminal stream event, distinguishable from any record.
pub const STREAM_DONE: &str = "done";

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PortRecord {
    pub port: u16,
    pub process: String,
    pub is_web: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    pub origin: Origin,
}

pub enum ScanEvent {
    Record(PortRecord),
    Done,
}

#[derive(Clone)]
pub struct EnrichmentPipeline {
    origin: OriginResolver,
    web: WebProbe,
}

impl EnrichmentPipeline {
    pub fn new(cache: Arc<ServiceManagerCache>) -> Result<Self, SimpleError> {
        Ok(Self {
            origin: OriginResolver::new(cache),
            web: WebProbe::new()?,
        })
    }

    /// Attach process, origin and web-preview metadata to one open port.
    /// Sub-step failures degrade to unknown/absent fields; this never fails.
    pub async fn enrich_port(&self, port: u16) -> PortRecord {
        let listener = process_resolve::resolve_listener(port).await
            .unwrap_or_else(|_| ListenerInfo::unknown());
        let origin = match listener.pid {
            Some(pid) => self.origin.resolve(pid).await,
            None => Origin::unknown(),
        };
        let page = match listener.likely_web {
            true => self.web.probe(port).await,
            false => Default::default(),
        };
        PortRecord {
            port,
            process: listener.name,
            is_web: listener.likely_web,
            title: page.title,
            thumbnail: page.thumbnail,
            origin,
        }
    }

    /// Full scan cycle: discover, then enrich each port in ascending order.
    pub async fn scan(&self, own_port: Option<u16>) -> Vec<PortRecord> {
        let ports = open_ports(own_port).await;
        let mut records = Vec::with_capacity(ports.len());
        for port in ports {
            records.push(self.enrich_port(port).await);
        }
        records
    }

    /// Incremental scan cycle: records are pushed onto the returned channel
    /// as each enrichment completes, ports the client has not seen before
    /// first. A `Done` event follows the last record, then the channel
    /// closes.
    pub fn stream_scan(&self, known: HashSet<u16>, own_port: Option<u16>) -> Receiver<ScanEvent> {
        let (sender, receiver) = channel(16);
        let pipeline = self.clone();
        task::spawn(async move {
            pipeline.run_stream(known, own_port, sender).await;
        });
        receiver
    }

    async fn run_stream(self, known: HashSet<u16>, own_port: Option<u16>, sender: Sender<ScanEvent>) {
        let ports = open_ports(own_port).await;
        for port in partition_known(&ports, &known) {
            let record = self.enrich_port(port).await;
            if sender.send(ScanEvent::Record(record)).await.is_err() {
                // Consumer hung up; the rest of the work is for nobody.
                log::debug!("Scan stream consumer dropped, aborting cycle");
                return;
            }
        }
        sender.send(ScanEvent::Done).await.log_error_consume("scan-stream");
    }
}

async fn open_ports(own_port: Option<u16>) -> Vec<u16> {
    let scan = &GLOBAL_CONFIG.scan;
    let ports = port_scan::scan_ports(
        scan.port_start,
        scan.port_end,
        Duration::from_millis(scan.probe_timeout_ms),
        scan.max_tasks,
    ).await;
    exclude_own_port(ports, own_port)
}

/// The dashboard must not list itself.
pub fn exclude_own_port(mut ports: Vec<u16>, own_port: Option<u16>) -> Vec<u16> {
    if let Some(own) = own_port {
        ports.retain(|port| *port != own);
    }
    ports
}

/// Reorder a scan result against the client's previously seen ports:
/// unfamiliar ports surface first, familiar ones follow, each side keeping
/// its incoming order.
pub fn partition_known(ports: &[u16], known: &HashSet<u16>) -> Vec<u16> {
    let (new_ports, old_ports): (Vec<u16>, Vec<u16>) = ports.iter()
        .copied()
        .partition(|port| !known.contains(port));
    new_ports.into_iter().chain(old_ports).collect()
}
