use std::time::Duration;

use actix_web::{get, post, web::ServiceConfig};
use serde::Serialize;
use tokio::{task, time::sleep};

use crate::misc::responder::{ApiResult, Response};

#[derive(Serialize)]
struct HealthStatus {
    status: &'static str,
}

#[derive(Serialize)]
struct StopAck {
    stopping: bool,
}

#[get("/health")]
async fn health() -> ApiResult<HealthStatus> {
    Ok(Response(HealthStatus { status: "ok" }))
}

#[post("/control/stop")]
async fn stop() -> ApiResult<StopAck> {
    log::info!("Stop requested, shutting down shortly");
    task::spawn(async {
        // Leave the acknowledgement time to reach the client.
        sleep(Duration::from_millis(500)).await;
        std::process::exit(0);
    });
    Ok(Response(StopAck { stopping: true }))
}

pub fn config(cfg: &mut ServiceConfig) {
    cfg.service(health).service(stop);
}
