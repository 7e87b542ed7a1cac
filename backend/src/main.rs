use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use diesel::prelude::*;

mod auth;
mod config;
mod db;
mod error;
mod handlers;
mod models;
mod outbox;
mod pricing;
mod proposal;
mod schedule;
mod schema;
mod status;
#[cfg(test)]
mod test_support;

use outbox::{HttpQueueTrigger, NoopQueueTrigger, Outbox, QueueTrigger};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let config = config::AppConfig::load()?;
    log::info!(
        "Loaded config: listening on {}:{}, queue worker {:?}",
        config.host,
        config.port,
        config.queue_processor_url
    );

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    let pool = db::establish_pool(&config.database_url, config.db_pool_size)
        .map_err(|e| format!("Failed to connect to database: {}", e))?;
    let test_query: i32 = diesel::select(diesel::dsl::sql::<diesel::sql_types::Integer>("1"))
        .get_result(&mut pool.get()?)?;
    log::info!("Database test query result: {}", test_query);

    let store = Arc::new(db::PgStore::new(pool));
    let trigger: Arc<dyn QueueTrigger> = match &config.queue_processor_url {
        Some(url) => Arc::new(HttpQueueTrigger::new(
            url,
            Duration::from_secs(config.queue_trigger_timeout_secs),
        )?),
        None => {
            log::warn!("QUEUE_PROCESSOR_URL not set, sync items wait for worker polling");
            Arc::new(NoopQueueTrigger)
        }
    };
    let outbox = Outbox::new(store.clone(), trigger);
    let proposals = proposal::ProposalService::new(store, outbox)
        .with_missing_availability(config.missing_availability);

    log::info!("Starting server on {}", addr);

    let app = handlers::router(handlers::AppState { config, proposals });
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app.into_make_service()).await?;

    Ok(())
}
