mod controller;
mod error;
mod misc;

use actix_web::{App, HttpServer, web::Data};
use clap::Parser;
use lportal::PortalService;

#[derive(Parser)]
#[clap(name = "lportal", about = "Dashboard of locally listening services")]
struct Args {
    /// Listen address, overrides config.json
    #[clap(short, long)]
    listen: Option<String>,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();

    let args = Args::parse();
    let listen = args.listen.unwrap_or_else(|| lportal::GLOBAL_CONFIG.listen.clone());
    let service = PortalService::start(&listen).expect("Failed to start portal service");

    log::info!("Serving dashboard on http://{}", listen);

    HttpServer::new(move || {
        App::new()
            .app_data(Data::new(service.clone()))
            .configure(controller::config)
    })
    .bind(&listen)?
    .run()
    .await
}
