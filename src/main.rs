use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::middleware;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::trace::TraceLayer;

use filevault::{
    config::{AppConfig, CliArgs},
    db::connection,
    filestore::build_file_store,
    jobs::{
        self, CleanupHandler, EmailHandler, JobBroker, JobProcessor, JobScheduler, TaskMux,
        ThumbnailHandler,
    },
    logging::init_tracing,
    mailer::{Mailer, NoopMailer, SmtpMailer},
    middleware::{catch_panic_layer, json_error_middleware, RateLimiter},
    routes::router,
    services::ServiceContext,
    state::AppState,
};

const SHUTDOWN_DRAIN_DEADLINE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        tracing::error!("server failed: {err:?}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = CliArgs::parse();
    let mut cfg = AppConfig::from_env().context("failed to load config")?;
    cfg.limiter = cli.limiter();
    init_tracing(&cfg.logging, &cfg.general);

    let store = build_file_store(&cfg.storage)?;
    let db = connection::connect(&cfg.database).await?;
    let pg_pool = db.get_postgres_connection_pool().clone();

    let shutdown = CancellationToken::new();
    let tracker = TaskTracker::new();
    let (broker, receivers) = JobBroker::new();

    let jwt = filevault::auth::jwt::JwtKeys::from_secret(&cfg.auth.jwt_secret);
    let api_key_prefix =
        filevault::services::short_project_prefix(&cfg.general.project_name);

    let mailer: Arc<dyn Mailer> = if cfg.general.environment == "testing" {
        Arc::new(NoopMailer)
    } else {
        Arc::new(SmtpMailer::new(&cfg.mail)?)
    };

    let services = ServiceContext::new(
        &db,
        Arc::clone(&store),
        broker.clone(),
        jwt,
        api_key_prefix,
        tracker.clone(),
        cfg.storage.max_upload_size,
    );

    let mux = TaskMux::new()
        .handle(
            jobs::TASK_GENERATE_THUMBNAIL,
            Arc::new(ThumbnailHandler::new(services.file())),
        )
        .handle(jobs::TASK_SEND_EMAIL, Arc::new(EmailHandler::new(mailer)))
        .handle(
            jobs::TASK_CLEANUP_EXPIRED,
            Arc::new(CleanupHandler::new(services.file(), db.clone())),
        );
    let processor = JobProcessor::new(mux, broker.clone(), receivers, shutdown.clone());
    let processor_handle = tokio::spawn(processor.run());

    let mut scheduler = JobScheduler::new(broker.clone(), shutdown.clone());
    jobs::register_default_schedule(&mut scheduler)?;
    let scheduler_handle = tokio::spawn(scheduler.run());

    let limiter = Arc::new(RateLimiter::new(
        cfg.limiter.rps,
        cfg.limiter.burst,
        cfg.limiter.enabled,
    ));
    tokio::spawn(Arc::clone(&limiter).sweep_loop(shutdown.clone()));

    let port = cfg.general.port;
    let environment = cfg.general.environment.clone();
    let state = AppState::new(cfg, db, services, limiter, tracker.clone(), Some(pg_pool));

    let app = router(Arc::clone(&state))
        .layer(middleware::from_fn(json_error_middleware))
        .layer(catch_panic_layer())
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, environment = %environment, "server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(wait_for_signal(shutdown.clone()))
    .await?;

    tracing::info!("completing background tasks");
    shutdown.cancel();
    tracker.close();
    if tokio::time::timeout(SHUTDOWN_DRAIN_DEADLINE, tracker.wait())
        .await
        .is_err()
    {
        tracing::warn!("background tasks did not drain before the deadline");
    }
    let _ = processor_handle.await;
    let _ = scheduler_handle.await;

    tracing::info!("graceful shutdown complete");
    Ok(())
}

async fn wait_for_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
    shutdown.cancel();
}
