//! Timeclock Server
//!
//! HTTP API that pairs kiosks and records their punches.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;

use timeclock_server::auth::hash_pin;
use timeclock_server::config::ServerConfig;
use timeclock_server::server::{AppState, build_router};
use timeclock_server::settings::SettingsCache;
use timeclock_server::storage::ServerDatabase;

#[derive(Parser, Debug)]
#[command(name = "timeclock-server")]
#[command(version, about = "Timeclock server - kiosk pairing and punch processing")]
struct Args {
    /// Path to `SQLite` database file.
    #[arg(long, env = "TIMECLOCK_DB_PATH", global = true)]
    db_path: Option<PathBuf>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "TIMECLOCK_LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server.
    Serve(ServeArgs),

    /// Add an employee with an argon2-hashed PIN.
    AddEmployee {
        #[arg(long)]
        name: String,
        #[arg(long, env = "TIMECLOCK_EMPLOYEE_PIN")]
        pin: String,
    },

    /// Store one tunable setting.
    SetSetting { key: String, value: String },

    /// Print the effective tunables.
    ListSettings,
}

#[derive(clap::Args, Debug)]
struct ServeArgs {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:8080", env = "TIMECLOCK_ADDR")]
    addr: SocketAddr,

    /// Path to the kiosk registry (TOML).
    #[arg(long, env = "TIMECLOCK_CONFIG")]
    config: PathBuf,

    /// Directory for stored evidence photos.
    #[arg(long, env = "TIMECLOCK_PHOTO_DIR")]
    photo_dir: Option<PathBuf>,

    /// Hard cap on a `/photo_upload` request body, in bytes.
    #[arg(long, default_value_t = 16 * 1024 * 1024)]
    max_upload_bytes: usize,

    /// Seconds between settings reloads.
    #[arg(long, default_value_t = 30)]
    settings_refresh_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    timeclock_core::tracing_init::init_tracing("timeclock_server=info,tower_http=info", args.log_json);

    let db_path = match &args.db_path {
        Some(path) => path.clone(),
        None => default_data_dir()?.join("server.db"),
    };
    info!(path = %db_path.display(), "Opening server database");
    let db = ServerDatabase::open(&db_path).await?;

    match args.command {
        Some(Command::Serve(serve_args)) => serve(db, serve_args).await,
        Some(Command::AddEmployee { name, pin }) => add_employee(&db, &name, &pin).await,
        Some(Command::SetSetting { key, value }) => set_setting(db, &key, &value).await,
        Some(Command::ListSettings) => list_settings(db).await,
        None => Err(anyhow::anyhow!(
            "no command given; run `timeclock-server serve --config <path>`"
        )),
    }
}

async fn serve(db: ServerDatabase, args: ServeArgs) -> anyhow::Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %args.addr,
        "Starting timeclock-server"
    );

    let config = ServerConfig::load(&args.config)?;
    let photo_dir = match args.photo_dir {
        Some(dir) => dir,
        None => default_data_dir()?.join("photos"),
    };
    info!(kiosks = config.kiosks.len(), photo_dir = %photo_dir.display(), "Loaded configuration");

    let state = AppState::new(db, &config, photo_dir).await?;
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let refresh = state
        .settings
        .spawn_refresh(Duration::from_secs(args.settings_refresh_secs), shutdown_rx);

    let app = build_router(state, args.max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(args.addr).await?;
    info!(addr = %args.addr, "Server listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received shutdown signal");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    let _ = refresh.await;
    info!("Server stopped");
    Ok(())
}

async fn add_employee(db: &ServerDatabase, name: &str, pin: &str) -> anyhow::Result<()> {
    let tunables = SettingsCache::load(db.clone()).await?.snapshot().await;
    if !tunables.is_valid_pin(pin) {
        anyhow::bail!("PIN must be {} digits", tunables.pin_length);
    }
    let credential = hash_pin(pin).map_err(|e| anyhow::anyhow!("Failed to hash PIN: {e}"))?;
    let employee = db.create_employee(name, &credential).await?;
    info!(employee_id = employee.id, name, "Employee added");
    Ok(())
}

async fn set_setting(db: ServerDatabase, key: &str, value: &str) -> anyhow::Result<()> {
    let cache = SettingsCache::load(db).await?;
    cache.update(key, value).await?;
    info!(key, value, "Setting stored");
    Ok(())
}

#[allow(clippy::print_stdout)]
async fn list_settings(db: ServerDatabase) -> anyhow::Result<()> {
    let tunables = SettingsCache::load(db).await?.snapshot().await;
    println!("{}", toml::to_string_pretty(&*tunables)?);
    Ok(())
}

fn default_data_dir() -> anyhow::Result<PathBuf> {
    timeclock_core::config::default_data_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".timeclock")))
        .map(|p| p.join("server"))
        .ok_or_else(|| anyhow::anyhow!("Cannot determine data directory"))
}
