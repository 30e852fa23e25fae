use std::path::Path;
use std::sync::Arc;

use axum::http::HeaderValue;
use axum::Router;
use envconfig::Envconfig;
use eyre::Result;
use futures::future::{select, Either};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use dedup_core::{MemoryStore, OutputMode, OutputWriter, PgStore, Pipeline, SharedStore};

use config::Config;
use handlers::AppState;

mod api;
mod config;
mod handlers;
mod janitor;
mod metrics;

fn setup_tracing() {
    let log_layer = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(log_layer).init();
}

async fn listen(app: Router, bind: String) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;

    axum::serve(listener, app).await?;

    Ok(())
}

async fn connect_store(config: &Config) -> Result<SharedStore> {
    if config.use_memory_store {
        warn!("using in-memory identifier store, nothing will survive a restart");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let store = PgStore::new(&config.database_url, config.max_pg_connections)
        .await
        .expect("failed to connect to postgres");

    if config.run_migrations {
        sqlx::migrate!("../migrations").run(store.pool()).await?;
    }

    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();
    info!("Starting up...");

    let config = Config::init_from_env().expect("failed to load configuration from env");
    config.pipeline.validate()?;
    if config.output_sweep_interval.0.is_zero() {
        eyre::bail!("OUTPUT_SWEEP_INTERVAL must be positive");
    }

    let store = connect_store(&config).await?;

    let uploads_dir = Path::new(&config.uploads_dir);
    tokio::fs::create_dir_all(uploads_dir).await?;

    let mode = if config.split_output {
        OutputMode::Split
    } else {
        OutputMode::NewOnly
    };
    let output = OutputWriter::new(
        uploads_dir,
        "/uploads",
        config.pipeline.max_rows_per_column,
    );
    let sweeper = output.clone();
    let state = AppState {
        pipeline: Arc::new(Pipeline::new(store, &config.pipeline, output, mode)),
        force_csv_output: config.force_csv_output,
    };

    let allowed_origin: HeaderValue = config.cors_allowed_origin.parse()?;
    let app = handlers::router(
        state,
        uploads_dir,
        config.max_body_size,
        allowed_origin,
        config.export_prometheus,
    );

    let bind = config.bind();
    info!(bind = %bind, "listening");
    let http_server = Box::pin(listen(app, bind));

    let retention = config.output_retention.0;
    if retention.is_zero() {
        info!("output retention disabled, run directories are kept");
        return http_server.await;
    }
    let sweep_loop = Box::pin(janitor::sweep_loop(
        sweeper,
        retention,
        config.output_sweep_interval.0,
    ));

    match select(http_server, sweep_loop).await {
        Either::Left((listen_result, _)) => listen_result,
        Either::Right((_, _)) => {
            error!("output sweep task exited");
            Ok(())
        }
    }
}
