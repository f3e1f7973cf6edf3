use std::{net::SocketAddr, path::Path, sync::Arc};

use anyhow::Context;
use crud::CatalogSet;
use storage::{SqliteSessionStore, Storage};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod api;
mod app_state;
mod config;
mod resources;

use api::build_router;
use app_state::AppState;
use config::{load_settings, prepare_database_url, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings()?;
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let state = build_state(storage, &settings)?;
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings
        .server_bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", settings.server_bind))?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_state(storage: Storage, settings: &Settings) -> anyhow::Result<AppState> {
    let mut catalogs = CatalogSet::new(settings.default_locale.as_str());
    let loaded = catalogs
        .load_dir(Path::new(&settings.translations_dir))
        .with_context(|| format!("failed to load translations from '{}'", settings.translations_dir))?;
    info!(loaded, locales = ?catalogs.locales(), "translation catalogs ready");

    let sessions = Arc::new(SqliteSessionStore::new(storage.clone()));
    let mut state = AppState::new(storage.clone(), sessions, catalogs);
    let options = resources::controller_options(settings);
    for controller in resources::build_controllers(&storage, &options) {
        info!(controller = controller.name(), "controller registered");
        state.register(controller);
    }
    Ok(state)
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
