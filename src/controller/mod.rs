mod control;
mod ports;
mod web_statics;

use actix_web::web::{scope, ServiceConfig};

pub fn config(cfg: &mut ServiceConfig) {
    cfg.service(scope("/api")
        .configure(ports::config)
        .configure(control::config)
    ).service(scope("")
        .configure(web_statics::config)
    );
}
