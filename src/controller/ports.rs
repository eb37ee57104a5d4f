use std::collections::HashSet;
use std::convert::Infallible;

use actix_web::{HttpResponse, get, web::{Data, Query, ServiceConfig, scope}};
use bytes::Bytes;
use futures::stream;
use lportal::{PortRecord, PortalService, ScanEvent, STREAM_DONE};
use serde::{Deserialize, Serialize};

use crate::misc::responder::{ApiResult, Response};

#[derive(Serialize)]
struct PortList {
    ports: Vec<PortRecord>,
}

#[derive(Deserialize)]
struct StreamQuery {
    known: Option<String>,
}

#[get("")]
async fn scan_all(service: Data<PortalService>) -> ApiResult<PortList> {
    let ports = service.scan().await;
    Ok(Response(PortList { ports }))
}

#[get("/stream")]
async fn scan_stream(query: Query<StreamQuery>, service: Data<PortalService>) -> HttpResponse {
    let known = parse_known(query.known.as_deref());
    let receiver = service.stream_scan(known);

    // Dropping the response body drops the receiver, which tells the
    // pipeline to abandon the rest of the cycle.
    let body = stream::unfold(receiver, |mut receiver| async move {
        receiver.recv().await
            .map(|event| (Ok::<_, Infallible>(sse_frame(&event)), receiver))
    });

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(body)
}

fn sse_frame(event: &ScanEvent) -> Bytes {
    match event {
        ScanEvent::Record(record) => {
            let json = serde_json::to_string(record).unwrap_or_else(|_| "{}".to_owned());
            Bytes::from(format!("data: {}\n\n", json))
        }
        ScanEvent::Done => Bytes::from(format!("data: {}\n\n", STREAM_DONE)),
    }
}

fn parse_known(known: Option<&str>) -> HashSet<u16> {
    known.unwrap_or("")
        .split(',')
        .filter_map(|part| part.trim().parse().ok())
        .collect()
}

pub fn config(cfg: &mut ServiceConfig) {
    cfg.service(scope("/ports")
        .service(scan_stream)
        .service(scan_all)
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_list_parses_leniently() {
        let known = parse_known(Some("3000, 8080,nonsense,,70000"));
        let expected: HashSet<u16> = [3000, 8080].iter().copied().collect();
        assert_eq!(known, expected);
        assert!(parse_known(None).is_empty());
    }

    #[test]
    fn terminal_frame_is_a_fixed_sentinel() {
        let frame = sse_frame(&ScanEvent::Done);
        assert_eq!(&frame[..], &b"data: done\n\n"[..]);
    }
}
