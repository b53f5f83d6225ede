use case_flow::{InMemorySessionStorage, PostgresSessionStorage, SessionStorage, spawn_eviction};
use diagnosis_service::{
    CaseRecord, ConsultationManager, Ports, ServiceConfig, create_app, create_flow_runner,
    telemetry::init_tracing,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };

    let ttl = chrono::Duration::seconds(i64::try_from(config.session_ttl_secs)?);
    let session_storage: Arc<dyn SessionStorage<CaseRecord>> = match &config.database_url {
        Some(database_url) => {
            info!("Using PostgreSQL session storage");
            match PostgresSessionStorage::connect(database_url).await {
                Ok(storage) => Arc::new(storage.with_ttl(ttl)),
                Err(e) => {
                    error!(error = %e, "Failed to connect to PostgreSQL. Falling back to in-memory storage.");
                    Arc::new(InMemorySessionStorage::with_ttl(ttl))
                }
            }
        }
        None => {
            info!("Using in-memory session storage (set DATABASE_URL to use PostgreSQL)");
            Arc::new(InMemorySessionStorage::with_ttl(ttl))
        }
    };

    // sweep a few times per TTL window
    let sweep_every = Duration::from_secs((config.session_ttl_secs / 4).max(30));
    spawn_eviction(session_storage.clone(), sweep_every);

    let ports = Ports::from_config(&config);
    let runner = create_flow_runner(&ports, session_storage, config.max_steps)?;
    let consultations = ConsultationManager::new(runner);

    let lock_table = consultations.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_every);
        loop {
            ticker.tick().await;
            let pruned = lock_table.prune_idle_locks();
            if pruned > 0 {
                info!(pruned, "Pruned idle conversation locks");
            }
        }
    });

    let app = create_app(consultations);

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    let addr = listener.local_addr()?;

    info!(%addr, max_steps = config.max_steps, "Diagnostic consultation service starting");
    info!("Start a consultation: POST http://{}/diagnose/start", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
