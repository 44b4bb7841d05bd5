use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod evidence;
mod store;

use config::Config;
use dbus_interface::{AppState, AttendanceService};
use store::AttendanceStore;

const BUS_NAME: &str = "org.rollcall.Attendance1";
const OBJECT_PATH: &str = "/org/rollcall/Attendance1";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollcalld starting");

    let config = Config::from_env();
    let session_bus = config.session_bus;

    let store = AttendanceStore::open(&config.db_path).await?;
    tracing::info!(path = %config.db_path.display(), "attendance store opened");

    let engine = engine::spawn_engine(&config, store.clone(), tokio::runtime::Handle::current())?;

    let state = Arc::new(Mutex::new(AppState {
        config,
        engine,
        store,
    }));
    let service = AttendanceService { state };

    let builder = if session_bus {
        tracing::info!("serving on the session bus (development mode)");
        zbus::connection::Builder::session()?
    } else {
        zbus::connection::Builder::system()?
    };

    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await?;

    tracing::info!(bus = BUS_NAME, "rollcalld ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("rollcalld shutting down");

    Ok(())
}
