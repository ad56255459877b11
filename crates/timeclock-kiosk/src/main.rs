//! Timeclock Kiosk
//!
//! Command-line front end for a kiosk: pairing, punching and the sync loop.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use timeclock_core::PunchAction;
use tracing::info;

use timeclock_kiosk::config::default_data_dir;
use timeclock_kiosk::{Kiosk, KioskConfig, KioskError, SubmitOutcome};

#[derive(Parser, Debug)]
#[command(name = "timeclock-kiosk")]
#[command(version, about = "Timeclock kiosk - offline punch queue and background sync")]
struct Args {
    /// Base URL of the timeclock server.
    #[arg(long, env = "TIMECLOCK_SERVER_URL", global = true, default_value = "http://127.0.0.1:8080")]
    server_url: String,

    /// Code this kiosk is registered under.
    #[arg(long, env = "TIMECLOCK_KIOSK_CODE", global = true)]
    kiosk_code: Option<String>,

    /// Directory for queues, credentials and cached settings.
    #[arg(long, env = "TIMECLOCK_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Request timeout in seconds.
    #[arg(long, env = "TIMECLOCK_REQUEST_TIMEOUT", global = true, default_value_t = 10)]
    request_timeout: u64,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "TIMECLOCK_LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pair this kiosk with the server.
    Pair {
        #[arg(long, env = "TIMECLOCK_PAIRING_CODE")]
        code: String,
    },

    /// Record a punch.
    Punch {
        /// `in` or `out`.
        action: String,
        #[arg(long, env = "TIMECLOCK_PIN")]
        pin: String,
    },

    /// Queue an evidence photo for a recorded punch.
    Photo {
        #[arg(long)]
        event_uuid: String,
        /// `in` or `out`.
        #[arg(long)]
        action: String,
        #[arg(long)]
        file: PathBuf,
        #[arg(long, default_value = "image/jpeg")]
        content_type: String,
    },

    /// Revoke this kiosk's pairing with the manager PIN.
    Revoke {
        #[arg(long, env = "TIMECLOCK_MANAGER_PIN")]
        manager_pin: String,
    },

    /// Print the status indicator and queue counts as JSON.
    Status,

    /// Deliver everything that is due, once.
    Sync,

    /// Run the background sync loop until interrupted. SIGHUP syncs now.
    Run,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    timeclock_core::tracing_init::init_tracing("timeclock_kiosk=info", args.log_json);

    let kiosk_code = args
        .kiosk_code
        .clone()
        .context("--kiosk-code (or TIMECLOCK_KIOSK_CODE) is required")?;
    let data_dir = match &args.data_dir {
        Some(dir) => dir.clone(),
        None => default_data_dir()
            .context("Cannot determine data directory")?
            .join(&kiosk_code),
    };
    let mut config = KioskConfig::new(&args.server_url, kiosk_code, data_dir);
    config.request_timeout = Duration::from_secs(args.request_timeout);

    let kiosk = Kiosk::open(&config).await?;

    match args.command {
        Command::Pair { code } => pair(&kiosk, &code).await,
        Command::Punch { action, pin } => punch(&kiosk, &action, &pin).await,
        Command::Photo {
            event_uuid,
            action,
            file,
            content_type,
        } => photo(&kiosk, &event_uuid, &action, &file, &content_type).await,
        Command::Revoke { manager_pin } => revoke(&kiosk, &manager_pin).await,
        Command::Status => status(&kiosk),
        Command::Sync => sync(&kiosk).await,
        Command::Run => run(&kiosk).await,
    }
}

fn parse_action(raw: &str) -> anyhow::Result<PunchAction> {
    raw.parse()
        .map_err(|_| anyhow::anyhow!("action must be `in` or `out`, got {raw:?}"))
}

/// Turn a kiosk error into the message shown at the kiosk.
fn user_error(e: &KioskError) -> anyhow::Error {
    anyhow::anyhow!("{}", e.user_message())
}

#[allow(clippy::print_stdout)]
async fn pair(kiosk: &Kiosk, code: &str) -> anyhow::Result<()> {
    let version = kiosk.pair(code).await.map_err(|e| user_error(&e))?;
    println!("Paired (pairing version {version}).");
    Ok(())
}

#[allow(clippy::print_stdout)]
async fn punch(kiosk: &Kiosk, action: &str, pin: &str) -> anyhow::Result<()> {
    let action = parse_action(action)?;
    let receipt = kiosk.punch(action, pin).await.map_err(|e| user_error(&e))?;
    println!("{}", receipt.message);
    println!("event_uuid: {}", receipt.event_uuid);
    match receipt.outcome {
        SubmitOutcome::Rejected(code) => anyhow::bail!("punch rejected: {code}"),
        SubmitOutcome::Accepted | SubmitOutcome::Queued => Ok(()),
    }
}

#[allow(clippy::print_stdout)]
async fn photo(
    kiosk: &Kiosk,
    event_uuid: &str,
    action: &str,
    file: &std::path::Path,
    content_type: &str,
) -> anyhow::Result<()> {
    let action = parse_action(action)?;
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let outcome = kiosk
        .capture_photo(event_uuid, action, content_type, &bytes)
        .await
        .map_err(|e| user_error(&e))?;
    match outcome {
        SubmitOutcome::Accepted => println!("Photo uploaded."),
        SubmitOutcome::Queued => println!("Photo saved. It will be uploaded later."),
        SubmitOutcome::Rejected(code) => anyhow::bail!("photo rejected: {}", code.user_message()),
    }
    Ok(())
}

#[allow(clippy::print_stdout)]
async fn revoke(kiosk: &Kiosk, manager_pin: &str) -> anyhow::Result<()> {
    let version = kiosk.revoke(manager_pin).await.map_err(|e| user_error(&e))?;
    println!("Pairing revoked (server pairing version {version}).");
    Ok(())
}

#[allow(clippy::print_stdout)]
fn status(kiosk: &Kiosk) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&kiosk.status())?);
    Ok(())
}

#[allow(clippy::print_stdout)]
async fn sync(kiosk: &Kiosk) -> anyhow::Result<()> {
    let summary = kiosk.sync_now().await?;
    let status = kiosk.status();
    println!(
        "{}: {} punches delivered, {} photos delivered, {} pending, {} dead",
        status.state.label(),
        summary.punches.delivered,
        summary.photos.delivered,
        status.punches.pending() + status.photos.pending(),
        status.punches.dead + status.photos.dead,
    );
    Ok(())
}

async fn run(kiosk: &Kiosk) -> anyhow::Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        kiosk = kiosk.kiosk_code(),
        "Starting timeclock-kiosk"
    );
    let tasks = kiosk.start();
    let mut status = kiosk.subscribe_status();

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    #[cfg(unix)]
    let mut sighup = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())?;

    loop {
        #[cfg(unix)]
        let (sigterm_future, sighup_future) = (sigterm.recv(), sighup.recv());
        #[cfg(not(unix))]
        let (sigterm_future, sighup_future) = (
            std::future::pending::<Option<()>>(),
            std::future::pending::<Option<()>>(),
        );

        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                info!(
                    state = current.state.label(),
                    pending_punches = current.punches.pending(),
                    pending_photos = current.photos.pending(),
                    dead = current.punches.dead + current.photos.dead,
                    message = current.last_message.as_deref().unwrap_or(""),
                    "Status"
                );
            }
            _ = sighup_future => {
                info!("Received SIGHUP, syncing now");
                tasks.sync_soon();
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
            _ = sigterm_future => {
                info!("Received SIGTERM");
                break;
            }
        }
    }

    tasks.shutdown().await;
    info!("Kiosk stopped");
    Ok(())
}
