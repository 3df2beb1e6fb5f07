//! Polling service: create polls, cast one vote per voter per poll, read tallies.
//!
//! # Layout
//! - [`db`]: the `PollStore` trait with Postgres and SQLite implementations.
//!   The `(poll_id, user_id)` uniqueness constraint lives in the schema.
//! - [`ledger`]: casting votes against the store's atomic insert-and-increment.
//! - [`catalog`]: creating and reading polls.
//! - [`handlers`] / [`routes`]: the JSON-over-HTTP surface.
//!
//! # Running
//!
//! ```sh
//! DATABASE_URL=sqlite://vibe_check.db RUST_LOG=vibe_poll=debug cargo run
//! ```
//!
//! ```sh
//! curl -X POST localhost:3030/polls -H 'content-type: application/json' \
//!     -d '{"question":"Tabs or spaces?","options":["Tabs","Spaces"]}'
//! curl -X POST localhost:3030/polls/1/vote -H 'content-type: application/json' \
//!     -d '{"user_id":"alice","option_id":2}'
//! curl localhost:3030/polls/1
//! ```
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
use tokio::{net::TcpListener, signal::ctrl_c};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod models;
pub mod routes;
pub mod state;

use config::Config;
use error::Result;
use state::AppState;

pub async fn start_server() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("vibe_poll=info,tower_http=info"));
    fmt().with_env_filter(filter).init();

    let config = Config::load()?;

    info!("Connecting to database...");
    let store = db::connect(&config).await?;
    let state = AppState::new(store, &config);

    let app = routes::create_routes(state);

    let address = config.address();
    info!("Binding to {address}");
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
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
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
}
