use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tickerscore_core::domain::analysis::{AnalysisPayload, SavedAnalysis};
use tickerscore_core::error::AnalysisError;
use tickerscore_core::provider::AnalysisProvider;
use tickerscore_core::session::{ResponseOutcome, Session};
use tickerscore_core::share::{score_tier, ScoreTier};
use tickerscore_core::storage::{
    FileKeyValueStore, KeyValueStore, PgKeyValueStore, SavedAnalysisStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = tickerscore_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let kv: Arc<dyn KeyValueStore> = match settings.database_url.as_deref() {
        Some(db_url) => match PgKeyValueStore::connect(db_url).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                sentry_anyhow::capture_anyhow(&e);
                tracing::error!(
                    error = %e,
                    dir = %settings.store_dir.display(),
                    "postgres store unavailable; falling back to file store"
                );
                Arc::new(FileKeyValueStore::new(&settings.store_dir))
            }
        },
        None => Arc::new(FileKeyValueStore::new(&settings.store_dir)),
    };
    let store = SavedAnalysisStore::open(kv).await;

    let provider: Arc<dyn AnalysisProvider> =
        match tickerscore_core::provider::from_settings(&settings) {
            Ok(provider) => provider,
            Err(e) => {
                sentry_anyhow::capture_anyhow(&e);
                tracing::error!(error = %e, "analysis provider not configured; requests will fail");
                Arc::new(UnconfiguredProvider {
                    reason: e.to_string(),
                })
            }
        };

    tracing::info!(
        provider = provider.provider_name(),
        saved = store.len(),
        "engine ready"
    );

    let state = AppState {
        session: Arc::new(Mutex::new(Session::new())),
        store: Arc::new(Mutex::new(store)),
        provider,
    };

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/session", get(get_session))
        .route("/analysis", post(post_analysis))
        .route("/session/save", post(post_save))
        .route("/session/reset", post(post_reset))
        .route("/session/browsing", post(post_toggle_browsing))
        .route("/session/share", get(get_share))
        .route("/saved", get(list_saved))
        .route("/saved/:id", get(get_saved).delete(delete_saved))
        .route("/saved/:id/load", post(post_load_saved))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    // Lock order when both are held: session, then store.
    session: Arc<Mutex<Session>>,
    store: Arc<Mutex<SavedAnalysisStore>>,
    provider: Arc<dyn AnalysisProvider>,
}

/// Stands in for a provider whose configuration failed at startup.
struct UnconfiguredProvider {
    reason: String,
}

#[async_trait::async_trait]
impl AnalysisProvider for UnconfiguredProvider {
    fn provider_name(&self) -> &'static str {
        "unconfigured"
    }

    async fn fetch_analysis(&self, _symbol: &str) -> anyhow::Result<AnalysisPayload> {
        anyhow::bail!("analysis provider is not configured: {}", self.reason)
    }
}

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    symbol: String,
}

#[derive(Debug, Serialize)]
struct SavedId {
    id: String,
}

#[derive(Debug, Serialize)]
struct ShareText {
    text: String,
}

#[derive(Debug, Serialize)]
struct SavedItem {
    #[serde(flatten)]
    entry: SavedAnalysis,
    tier: ScoreTier,
}

#[derive(Debug, Serialize)]
struct BrowsingState {
    browsing_saved: bool,
}

async fn get_session(State(state): State<AppState>) -> Json<Session> {
    Json(state.session.lock().await.clone())
}

async fn post_analysis(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<Session>, StatusCode> {
    let (token, symbol) = {
        let mut session = state.session.lock().await;
        let token = session.submit(&req.symbol).map_err(status_for)?;
        (token, session.symbol().to_string())
    };

    // The cycle runs in its own task so it still reaches Success or Failed if
    // this request is dropped. The session lock is not held across the fetch,
    // letting a newer submit supersede this one.
    let session = Arc::clone(&state.session);
    let provider = Arc::clone(&state.provider);
    let cycle = tokio::spawn(async move {
        let response = provider.fetch_analysis(&symbol).await;
        if let Err(e) = &response {
            sentry_anyhow::capture_anyhow(e);
        }

        let mut session = session.lock().await;
        if session.complete(token, response) == ResponseOutcome::Discarded {
            tracing::info!(%symbol, "response superseded by a newer request");
        }
        session.clone()
    });

    let session = cycle.await.map_err(|e| {
        tracing::error!(error = %e, "analysis task failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(session))
}

async fn post_save(State(state): State<AppState>) -> Result<(StatusCode, Json<SavedId>), StatusCode> {
    let session = state.session.lock().await;
    let mut store = state.store.lock().await;
    let id = session.save(&mut store).await.ok_or(StatusCode::CONFLICT)?;
    Ok((StatusCode::CREATED, Json(SavedId { id })))
}

async fn post_reset(State(state): State<AppState>) -> Json<Session> {
    let mut session = state.session.lock().await;
    session.reset();
    Json(session.clone())
}

async fn post_toggle_browsing(State(state): State<AppState>) -> Json<BrowsingState> {
    let browsing_saved = state.session.lock().await.toggle_browsing_saved();
    Json(BrowsingState { browsing_saved })
}

async fn get_share(State(state): State<AppState>) -> Result<Json<ShareText>, StatusCode> {
    let text = state
        .session
        .lock()
        .await
        .share_text()
        .ok_or(StatusCode::CONFLICT)?;
    Ok(Json(ShareText { text }))
}

async fn list_saved(State(state): State<AppState>) -> Json<Vec<SavedItem>> {
    let store = state.store.lock().await;
    Json(
        store
            .list()
            .iter()
            .map(|entry| SavedItem {
                tier: score_tier(entry.result.total_score),
                entry: entry.clone(),
            })
            .collect(),
    )
}

async fn get_saved(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SavedAnalysis>, StatusCode> {
    let store = state.store.lock().await;
    let entry = store.load(&id).cloned().ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(entry))
}

async fn delete_saved(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    state.store.lock().await.delete(&id).await;
    StatusCode::NO_CONTENT
}

async fn post_load_saved(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, StatusCode> {
    let entry = {
        let store = state.store.lock().await;
        store.load(&id).cloned().ok_or(StatusCode::NOT_FOUND)?
    };

    let mut session = state.session.lock().await;
    session.load_saved(&entry);
    Ok(Json(session.clone()))
}

fn status_for(err: AnalysisError) -> StatusCode {
    match err {
        AnalysisError::Validation(_) => StatusCode::BAD_REQUEST,
        AnalysisError::Provider(_) | AnalysisError::Schema { .. } => StatusCode::BAD_GATEWAY,
        AnalysisError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &tickerscore_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
