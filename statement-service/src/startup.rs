//! Application startup and lifecycle management.

use crate::config::{CooldownBackend, StatementServiceConfig};
use crate::handlers;
use crate::services::{
    init_metrics, AdminService, BankProvider, Clock, CooldownStore, Database, InMemoryCooldown,
    MonobankClient, RedisCooldown, StatementEngine, StatementFetcher, Store, SystemClock,
};
use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::request_id_middleware;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: StatementServiceConfig,
    pub store: Arc<dyn Store>,
    pub engine: StatementEngine,
    pub admin: AdminService,
}

impl AppState {
    /// Wires the engine and admin operations over the given collaborators.
    pub fn new(
        config: StatementServiceConfig,
        store: Arc<dyn Store>,
        provider: Arc<dyn BankProvider>,
        cooldown: Arc<dyn CooldownStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let fetcher = StatementFetcher::new(provider.clone(), config.provider.page_pause);
        let engine = StatementEngine::new(
            store.clone(),
            provider,
            cooldown,
            fetcher,
            clock,
            config.report.timezone,
        );
        let admin = AdminService::new(store.clone());
        Self {
            config,
            store,
            engine,
            admin,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .route("/users", post(handlers::register_user))
        .route("/accounts", get(handlers::list_accounts))
        .route("/balances", get(handlers::list_balances))
        .route("/statements/text", post(handlers::statement_text))
        .route("/statements/report", post(handlers::statement_report))
        .route("/admin/users/:user_id/role", put(handlers::set_user_role))
        .route(
            "/admin/users/:user_id/accounts/:account_id",
            put(handlers::set_account_permissions).delete(handlers::revoke_account),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

fn cooldown_store(config: &StatementServiceConfig) -> Result<Arc<dyn CooldownStore>, AppError> {
    let window = config.cooldown.window_secs;
    match (config.cooldown.backend, &config.cooldown.redis_url) {
        (CooldownBackend::Redis, Some(url)) => {
            tracing::info!(window_secs = window, "Using Redis cool-down store");
            Ok(Arc::new(RedisCooldown::new(url, window)?))
        }
        (CooldownBackend::Redis, None) => Err(AppError::ConfigError(anyhow::anyhow!(
            "REDIS_URL is required when COOLDOWN_BACKEND=redis"
        ))),
        (CooldownBackend::Memory, _) => {
            tracing::info!(window_secs = window, "Using in-process cool-down store");
            Ok(Arc::new(InMemoryCooldown::with_system_clock(window)))
        }
    }
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    pub async fn build(config: StatementServiceConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true).await
    }

    /// Build the application without running migrations.
    pub async fn build_without_migrations(
        config: StatementServiceConfig,
    ) -> Result<Self, AppError> {
        Self::build_internal(config, false).await
    }

    async fn build_internal(
        config: StatementServiceConfig,
        run_migrations: bool,
    ) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        if run_migrations {
            db.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
        }

        let provider: Arc<dyn BankProvider> = Arc::new(MonobankClient::new(config.provider.clone()));
        let cooldown = cooldown_store(&config)?;
        let state = AppState::new(
            config.clone(),
            Arc::new(db),
            provider,
            cooldown,
            Arc::new(SystemClock),
        );

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Statement service listener bound");

        Ok(Self {
            port,
            listener,
            router: build_router(state),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(self.listener, self.router).await
    }
}
