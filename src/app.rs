/*
 * Responsibility
 * - Config読み込み → 依存生成 (pool / hasher / policy / identity) → Router 組み立て
 * - Middleware の適用 (auth → session → http の順で外側へ)
 * - axum::serve() で起動
 */
use std::{panic, process, sync::Arc};

use anyhow::{Context, Result};
use axum::{Router, middleware::from_fn_with_state, routing::get};
use sqlx::postgres::PgPoolOptions;
use tower_sessions::{MemoryStore, SessionManagerLayer, SessionStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api;
use crate::config::Config;
use crate::middleware;
use crate::repos::user_repo::PgIdentityStore;
use crate::services::auth::{
    AuthChain, CasbinPolicyStore, PasswordHasher, PolicyEnforcer, PolicyStore, SessionResolver,
};
use crate::services::identity::{IdentityService, IdentityStore};
use crate::state::AppState;

fn init_tracing() {
    // Prefer RUST_LOG if set; otherwise use a sensible default.
    // Ex:
    // RUST_LOG=info,elternabend=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        tracing::error!(?info, "panic");

        // development: crash the whole process so we notice immediately.
        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<()> {
    init_tracing();
    let config = Config::from_env().context("loading configuration")?;
    init_panic_hook(!config.app_env.is_production());

    tracing::info!(
        "starting API in {:?} mode on {}",
        config.app_env,
        config.addr
    );

    let state = build_state(&config).await?;
    let app = build_router(state, &config);

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("binding {}", config.addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Production wiring: Postgres identities and the Casbin policy files.
async fn build_state(config: &Config) -> Result<AppState> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("connecting to database")?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("running migrations")?;

    let policies = CasbinPolicyStore::load(&config.rbac_model_path, &config.rbac_policy_path)
        .await
        .context("loading RBAC policy")?;

    assemble_state(
        config,
        Arc::new(PgIdentityStore::new(pool)),
        Arc::new(policies),
    )
    .await
}

/// Build the shared state over the given backends. Seeds the configured
/// administrator when it does not exist yet.
pub async fn assemble_state(
    config: &Config,
    identities: Arc<dyn IdentityStore>,
    policies: Arc<dyn PolicyStore>,
) -> Result<AppState> {
    tracing::info!(
        identity_store = identities.backend_name(),
        policy_store = policies.backend_name(),
        "building application state"
    );

    let hasher = Arc::new(PasswordHasher::new(config.hash.clone())?);
    let service = IdentityService::new(
        Arc::clone(&identities),
        hasher,
        config.teacher_password_length,
    )
    .await?;

    if let Some(seed) = &config.admin_seed
        && service.ensure_admin(&seed.username, &seed.password).await?
    {
        tracing::info!(username = %seed.username, "seeded administrator");
    }

    let chain = AuthChain::new(
        SessionResolver::new(identities),
        PolicyEnforcer::new(policies),
    );

    Ok(AppState::new(Arc::new(service), Arc::new(chain)))
}

pub fn build_router(state: AppState, config: &Config) -> Router {
    build_router_with_sessions(state, config, MemoryStore::default())
}

/// `build_router` over a caller-supplied session store.
pub fn build_router_with_sessions<S>(state: AppState, config: &Config, store: S) -> Router
where
    S: SessionStore + Clone,
{
    async fn home() -> &'static str {
        "elternabend"
    }

    let sessions = SessionManagerLayer::new(store)
        .with_name(config.session_name.clone())
        .with_secure(config.app_env.is_production());

    let router = Router::new()
        .route("/", get(home))
        .nest("/api/v1", api::v1::routes())
        // every route, the fallback included, passes the authorization chain
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth::access::authorize,
        ))
        .layer(sessions)
        .with_state(state);

    middleware::http::apply(router, config)
}
