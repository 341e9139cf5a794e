use std::{io, sync::Arc};

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use tracing::{info, warn};
use wepay_split::{
    auth::TokenSigner, config::Config, mongo::MongoLedger, routes, telemetry, InMemoryLedger,
    LedgerStore,
};

#[actix_web::main]
async fn main() -> io::Result<()> {
    telemetry::init();

    let config = Config::from_env().map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;

    let store: Arc<dyn LedgerStore> = match &config.mongodb_uri {
        Some(uri) => Arc::new(
            MongoLedger::connect(uri, &config.database)
                .await
                .map_err(io::Error::other)?,
        ),
        None => {
            warn!("MONGODB_URI not set; the ledger is kept in memory only");
            Arc::new(InMemoryLedger::new())
        }
    };
    let signer = TokenSigner::new(&config.token_secret, config.token_ttl).map_err(io::Error::other)?;

    let store = web::Data::from(store);
    let signer = web::Data::new(signer);

    info!(bind = %config.bind, "starting server");
    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .app_data(store.clone())
            .app_data(signer.clone())
            .configure(routes::configure)
    })
    .bind(config.bind)?
    .run()
    .await
}
