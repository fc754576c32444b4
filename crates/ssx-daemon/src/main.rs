//! ssx-daemon entry point.
//!
//! Serves the ERP order update endpoint and the external shipment feed
//! endpoint. Orders live in Postgres when SSX_DATABASE_URL is set, otherwise
//! in memory (optionally seeded from SSX_ORDERS_FILE). The feed serves
//! SSX_SHIPMENTS_FILE, if given, plus anything POSTed at runtime.

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use ssx_daemon::{routes, state};
use ssx_db::{MemoryStore, OrderStore, PgStore};
use ssx_feed::ShipmentCatalog;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

const ENV_ADDR: &str = "SSX_DAEMON_ADDR";
const ENV_ORDERS_FILE: &str = "SSX_ORDERS_FILE";
const ENV_SHIPMENTS_FILE: &str = "SSX_SHIPMENTS_FILE";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience).
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let (orders, backend) = order_store().await?;
    let shipments = Arc::new(match env_path(ENV_SHIPMENTS_FILE) {
        Some(p) => ShipmentCatalog::from_json_file(&p)
            .with_context(|| format!("load {ENV_SHIPMENTS_FILE}"))?,
        None => ShipmentCatalog::default(),
    });
    info!(backend, shipments = shipments.len(), "state ready");

    let shared = Arc::new(state::AppState::new(orders, shipments));

    let app = routes::build_router(shared).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8080)));
    info!("ssx-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("server crashed")?;

    Ok(())
}

async fn order_store() -> anyhow::Result<(Arc<dyn OrderStore>, &'static str)> {
    let fixture = match env_path(ENV_ORDERS_FILE) {
        Some(p) => ssx_db::load_orders_fixture(&p)?,
        None => Vec::new(),
    };

    if std::env::var(ssx_db::ENV_DB_URL).is_ok() {
        let pool = ssx_db::connect_from_env().await?;
        ssx_db::migrate(&pool).await?;
        let store = PgStore::new(pool);
        let seeded = ssx_db::seed_orders(&store, &fixture)
            .await
            .context("seed orders")?;
        info!(seeded, "using postgres order store");
        return Ok((Arc::new(store), "postgres"));
    }

    info!(seeded = fixture.len(), "using in-memory order store");
    Ok((Arc::new(MemoryStore::with_orders(fixture)), "memory"))
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var(var)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var(ENV_ADDR).ok()?.parse().ok()
}
