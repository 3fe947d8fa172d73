//! HTTP surface of the planner.
//!
//! Identity comes from headers set by the authenticating proxy (see
//! [`User`](crate::library::context::User)); every request then resolves
//! the caller's active library and runs against it.
//!
//! | Route | Methods |
//! |-------|---------|
//! | `/dish…`, `/ingredient…`, `/menu…` | GET, POST, PUT, DELETE |
//! | `/search` | POST |
//! | `/tags`, `/users`, `/libraries`, `/backup` | GET |
//! | `/restore`, `/deletelib` | POST |
//! | `/share/{access}/email/{address}`, `/shareAccept/{token}`, `/switch/{key}` | GET |

pub mod handlers;
pub mod paths;
pub mod respond;

use crate::cache::ResponseCache;
use crate::config::Config;
use crate::error::PlannerResult;
use crate::library::backup::Backup;
use crate::library::context::{RequestContext, User};
use crate::mail::{LogMailer, Mailer, SmtpMailer};
use crate::store::Store;
use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub struct AppState {
    pub store: Store,
    pub cache: Arc<ResponseCache>,
    pub mailer: Arc<dyn Mailer>,
    pub config: Config,
    /// Imported into every library created on first visit.
    pub seed: Option<Backup>,
}

impl AppState {
    pub fn new(
        store: Store,
        mailer: Arc<dyn Mailer>,
        config: Config,
        seed: Option<Backup>,
    ) -> Arc<Self> {
        Arc::new(AppState {
            store,
            cache: Arc::new(ResponseCache::new()),
            mailer,
            config,
            seed,
        })
    }

    pub async fn from_config(config: Config) -> PlannerResult<Arc<Self>> {
        let store = Store::connect(&config.database_url).await?;

        let mailer: Arc<dyn Mailer> = match &config.smtp_host {
            Some(host) => Arc::new(SmtpMailer::new(host)?),
            None => {
                info!("No SMTP relay configured, invitations will only be logged");
                Arc::new(LogMailer)
            }
        };

        let seed = config
            .seed_path
            .as_deref()
            .map(Backup::from_file)
            .transpose()?;
        if let Some(path) = &config.seed_path {
            info!("Seeding new libraries from {}", path.display());
        }

        Ok(AppState::new(store, mailer, config, seed))
    }

    pub async fn context(&self, user: User) -> PlannerResult<RequestContext> {
        RequestContext::resolve(&self.store, &self.cache, user, self.seed.as_ref()).await
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/users", get(handlers::users))
        .route("/search", post(handlers::search))
        .route("/tags", get(handlers::all_tags))
        .route("/backup", get(handlers::backup))
        .route("/restore", post(handlers::restore))
        .route("/share/{access}/email/{address}", get(handlers::share))
        .route("/shareAccept/{token}", get(handlers::share_accept))
        .route("/libraries", get(handlers::libraries))
        .route("/switch/{key}", get(handlers::switch))
        .route("/deletelib", post(handlers::delete_library))
        .fallback(handlers::resource)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(config: Config) -> PlannerResult<()> {
    info!("Initializing state...");
    let state = AppState::from_config(config).await?;
    let app = build_router(Arc::clone(&state));

    let address = format!("0.0.0.0:{}", state.config.port);
    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                warn!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
