use std::sync::Arc;

use actix_web::web::Data;
use actix_web::{App, HttpServer};
use tokio::sync::watch;
use tracing::{error, info, warn};

use sync_service::handlers::{self, AppState};
use sync_service::search::bulk::{BulkConfig, BulkDispatcher, EsBulkTransport};
use sync_service::workers::{retry_worker, sync_worker, DlqBulkListener};
use sync_service::{db, search, Config};

const BIND_ADDR: (&str, u16) = ("0.0.0.0", 8080);

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sync_service=info,actix_web=info".into()),
        )
        .init();

    dotenvy::dotenv().ok();
    sync_service::metrics::register_all();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    info!("connecting to Postgres...");
    let db = match db::init_pool(&config.postgres_dsn).await {
        Ok(pool) => pool,
        Err(e) => {
            error!(error = %e, "failed to connect to Postgres");
            std::process::exit(1);
        }
    };

    if let Err(e) = db::MIGRATOR.run(&db).await {
        error!(error = %e, "database migration failed");
        std::process::exit(1);
    }
    info!("database migrated");

    if let Err(e) = db::seed::seed(&db).await {
        warn!(error = %e, "seeding sample data failed");
    }

    info!("connecting to Elasticsearch...");
    let es = match search::connect(&config.elastic_url) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "failed to build Elasticsearch client");
            std::process::exit(1);
        }
    };
    if let Err(e) = search::ensure_indexes(&es).await {
        error!(error = %e, "search index bootstrap failed");
        std::process::exit(1);
    }
    info!("search indexes ready");

    // One dispatcher for the whole process; closed exactly once below.
    let dispatcher = BulkDispatcher::new(
        Arc::new(EsBulkTransport::new(es)),
        Arc::new(DlqBulkListener::new(db.clone())),
        BulkConfig::default(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sync_handle = tokio::spawn(sync_worker::run(
        db.clone(),
        dispatcher.clone(),
        shutdown_rx.clone(),
    ));
    let retry_handle = tokio::spawn(retry_worker::run(
        db.clone(),
        dispatcher.clone(),
        shutdown_rx,
    ));

    let state = Data::new(AppState {
        db: db.clone(),
        dispatcher: dispatcher.clone(),
    });

    info!("admin server listening on {}:{}", BIND_ADDR.0, BIND_ADDR.1);
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(handlers::configure)
    })
    .bind(BIND_ADDR)?
    .run()
    .await?;

    // actix returned after SIGINT/SIGTERM; wind the pipeline down: workers
    // finish their current iteration, then the dispatcher's blocking flush.
    info!("shutting down workers");
    let _ = shutdown_tx.send(true);
    let _ = sync_handle.await;
    let _ = retry_handle.await;
    dispatcher.close().await;
    info!("bulk dispatcher closed, exiting");

    Ok(())
}
