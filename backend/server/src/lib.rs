//! Documentation of a public nomination voting service.
//!
//! Visitors see every nomination and cast at most one vote per nomination. Votes are
//! keyed on the caller's network address.
//!
//!
//!
//! # General Infrastructure
//! - Single stateless HTTP service, any number of replicas
//! - Redis is the only shared state, replicas never coordinate in-process
//! - Optional reverse proxy in front, set `TRUST_FORWARDED_FOR=true` only then
//!
//!
//!
//! # Voting Schemes
//!
//! `VOTE_SCHEME` picks what a ballot points at.
//!
//! - `candidate`: `POST /votes` with `{"candidateId": 12}`, the catalog nests candidates
//!   with their counts under each nomination
//! - `nomination`: `POST /votes` with `{"nominationId": 3}`, the catalog carries counts on
//!   the nominations themselves
//!
//! Either way the voter gets one ballot per nomination. See [`target`] and [`ledger`].
//!
//!
//!
//! # Notes
//!
//! ## Integrity
//! The ledger checks for prior votes before committing, but those reads alone would let two
//! simultaneous requests both pass. The commit is a single Redis script guarded by a
//! (voter, nomination) index, so only one of them lands and the tally moves exactly once.
//!
//! ## Identity
//! Network address is best effort. Shared NATs collide and proxies can be spoofed. This is
//! accepted, there is no login.
//!
//!
//!
//! # Setup
//!
//! Seed the catalog.
//! ```sh
//! cargo run -p seed -- catalog.json --redis-url redis://localhost:6379
//! ```
//!
//! Run the server.
//! ```sh
//! REDIS_URL=redis://localhost:6379 RUST_LOG=info cargo run -p voting
//! ```
//!
//! Run without Redis.
//! ```sh
//! STORE_BACKEND=memory CATALOG_PATH=catalog.json cargo run -p voting
//! ```
//!
//!
//!
//! # Environment
//!
//! | Variable | Default |
//! |---|---|
//! | `RUST_PORT` | `1111` |
//! | `REDIS_URL` | `redis://redis:6379`, or `/run/secrets/REDIS_URL` |
//! | `STORE_BACKEND` | `redis` |
//! | `CATALOG_PATH` | unset, memory backend only |
//! | `VOTE_SCHEME` | `candidate` |
//! | `VOTE_DEADLINE` | unset, RFC 3339 |
//! | `TRUST_FORWARDED_FOR` | `false` |
//! | `CORS_MAX_AGE_SECS` | `86400` |
use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Router,
    http::{Method, header::CONTENT_TYPE},
    routing::get,
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod catalog;
pub mod config;
pub mod database;
pub mod error;
pub mod ledger;
pub mod models;
pub mod routes;
pub mod state;
pub mod store;
pub mod target;
pub mod utils;

use config::Config;
use routes::{catalog_handler, method_not_allowed, preflight_handler, vote_handler};
use state::State;

pub fn router(state: Arc<State>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(state.config.cors_max_age));

    Router::new()
        .route(
            "/votes",
            get(catalog_handler)
                .post(vote_handler)
                .options(preflight_handler)
                .fallback(method_not_allowed),
        )
        .layer(cors)
        .with_state(state)
}

pub async fn start_server() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Loading config...");
    let config = Config::load()?;

    info!("Initializing state...");
    let state = State::new(config).await?;

    info!("Starting server...");

    let address = format!("0.0.0.0:{}", state.config.port);
    let app = router(state);

    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
