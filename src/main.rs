use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use config::{Config, Storage};
use log::{error, info, warn};
use std::sync::Arc;
use store::{LedgerStore, MemoryLedgerStore, MongoLedgerStore};

use crate::auth::SessionKeys;

mod auth;
mod balance;
mod config;
mod error;
mod intake;
mod queries;
mod routes;
mod schemas;
mod settlement;
mod store;

async fn open_store(storage: &Storage) -> std::io::Result<Arc<dyn LedgerStore>> {
    match storage {
        Storage::Mongo { uri, database } => {
            info!("Using MongoDB storage");
            let store = MongoLedgerStore::connect(uri, database)
                .await
                .map_err(std::io::Error::other)?;
            Ok(Arc::new(store))
        }
        Storage::Memory => {
            warn!("Using in-memory storage, nothing survives a restart");
            Ok(Arc::new(MemoryLedgerStore::new()))
        }
    }
}

fn cors(origin: Option<&str>) -> Cors {
    match origin {
        Some(origin) => Cors::default()
            .allowed_origin(origin)
            .allowed_methods(vec!["GET", "POST"])
            .allow_any_header()
            .max_age(3600),
        None => Cors::default(),
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("{err}");
            std::process::exit(1);
        }
    };

    let store = open_store(&config.storage).await?;
    let keys = SessionKeys::new(&config.session_secret, config.session_ttl_hours);
    let cors_origin = config.cors_origin.clone();

    info!("Listening on {}:{}", config.bind_addr, config.port);
    HttpServer::new(move || {
        App::new()
            .wrap(cors(cors_origin.as_deref()))
            .wrap(Logger::default())
            .app_data(web::Data::from(store.clone()))
            .app_data(web::Data::new(keys.clone()))
            .configure(routes::configure)
    })
    .bind((config.bind_addr, config.port))?
    .run()
    .await
}
