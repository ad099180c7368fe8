//! Operator tool for the clinic queue database.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use clinic_queue_lib::announcement::AnnouncementBoard;
use clinic_queue_lib::clock::{Clock, SystemClock};
use clinic_queue_lib::config::{self, BookingConfig};
use clinic_queue_lib::db;
use clinic_queue_lib::lifecycle::BookingService;
use clinic_queue_lib::notify::{LogNotifier, Notifier};
use clinic_queue_lib::profile::ProfileService;
use clinic_queue_lib::queue::QueueManager;
use clinic_queue_lib::worklist;

#[derive(Parser, Debug)]
#[command(author, version, about = "Clinic appointment queue maintenance", long_about = None)]
struct Args {
    /// Database file (defaults to ~/ClinicQueue/clinic.db)
    #[arg(long)]
    db: Option<PathBuf>,

    /// JSON config overrides (defaults to ~/ClinicQueue/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rebuild the processing queue and print the new order
    Refresh,
    /// Print queue length and per-priority counts
    Stats,
    /// Print the appointment the doctor should process next
    Next,
    /// Print the doctor's dashboard counters
    Dashboard,
    /// Remove appointments soft-deleted before today
    Purge,
    /// List patient profiles, those awaiting a reply first, with totals
    Profiles,
    /// Publish a clinic announcement
    Announce {
        title: String,
        #[arg(default_value = "")]
        content: String,
    },
}

fn main() -> ExitCode {
    clinic_queue_lib::init_tracing();
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let booking = BookingConfig::load(&args.config.unwrap_or_else(config::config_path))?;
    let db_path = args.db.unwrap_or_else(config::database_path);
    tracing::info!(version = config::APP_VERSION, db = %db_path.display(), "Opening clinic database");
    let conn = db::open_database(&db_path)?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let queue = Arc::new(QueueManager::in_memory(clock.clone(), booking.snapshot_ttl()));
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
    let board = AnnouncementBoard::new(clock.clone(), booking.max_announcements);
    let profiles = ProfileService::new(clock.clone(), notifier.clone());
    let service = BookingService::new(queue.clone(), clock, notifier, booking);

    let output = match args.command {
        Command::Refresh => serde_json::to_string_pretty(&queue.refresh_queue(&conn)?)?,
        Command::Stats => serde_json::to_string_pretty(&queue.get_queue_stats(&conn)?)?,
        Command::Next => serde_json::to_string_pretty(&queue.get_next_appointment(&conn)?)?,
        Command::Dashboard => serde_json::to_string_pretty(&worklist::dashboard_counts(&conn)?)?,
        Command::Purge => {
            let removed = service.purge_expired_deleted(&conn)?;
            serde_json::to_string_pretty(&serde_json::json!({ "removed": removed }))?
        }
        Command::Profiles => serde_json::to_string_pretty(&serde_json::json!({
            "stats": profiles.stats(&conn)?,
            "profiles": profiles.doctor_profiles(&conn)?,
        }))?,
        Command::Announce { title, content } => {
            serde_json::to_string_pretty(&board.publish(&conn, &title, &content)?)?
        }
    };
    println!("{output}");
    Ok(())
}
