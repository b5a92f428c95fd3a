mod handlers;

use actix_files::Files;
use actix_web::{middleware, web, App, HttpServer};
use rail_dispatch::ledger::{ActionLedger, JsonLinesLog};
use rail_dispatch::{DispatchError, DispatchSettings, SectionController, Topology};
use std::env;
use std::path::Path;
use std::sync::Arc;

fn load_section() -> Result<SectionController, DispatchError> {
    let topology_path = env::var("DISPATCH_TOPOLOGY").unwrap_or_else(|_| "topology.json".to_string());
    let topology = Topology::from_file(Path::new(&topology_path))?;
    log::info!(
        "Loaded topology {topology_path}: {} nodes, {} segments",
        topology.node_count(),
        topology.segment_count()
    );

    let settings = match env::var("DISPATCH_SETTINGS") {
        Ok(path) => DispatchSettings::from_file(Path::new(&path))?,
        Err(_) => DispatchSettings::default(),
    };

    let ledger = match env::var("DISPATCH_LEDGER") {
        Ok(path) => ActionLedger::with_log(Box::new(JsonLinesLog::open(&path)?))?,
        Err(_) => {
            log::warn!("DISPATCH_LEDGER not set, decisions will not survive a restart");
            ActionLedger::in_memory()
        }
    };

    Ok(SectionController::new(
        Arc::new(topology),
        settings,
        ledger,
        handlers::now(),
    ))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Get port from environment or default to 8080
    let port = env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(8080);

    let section = match load_section() {
        Ok(section) => web::Data::new(section),
        Err(e) => {
            log::error!("Failed to start dispatch core: {e}");
            return Err(std::io::Error::other(e));
        }
    };

    log::info!("Starting server on 0.0.0.0:{port}");

    HttpServer::new(move || {
        App::new()
            .app_data(section.clone())
            .wrap(middleware::Compress::default())
            .wrap(middleware::Logger::default())
            .service(web::scope("/api").configure(handlers::configure))
            .service(Files::new("/", "./dist").index_file("index.html"))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
