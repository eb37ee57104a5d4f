use actix_files as fs;
use actix_web::web::ServiceConfig;

pub fn config(cfg: &mut ServiceConfig) {
    let files = fs::Files::new("/", "./web/dist")
        .index_file("index.html")
        .use_last_modified(false);
    cfg.service(files);
}
