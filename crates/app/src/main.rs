use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use services::host::SimulatedHost;
use services::{Clock, RecorderConfig, StatisticsConfig, StatisticsError, TelemetryServices};
use storage::local::FileLocalStore;
use storage::repository::Storage;
use storage::rest::RestConfig;
use telemetry_core::model::UserId;
use telemetry_core::statistics::UserStatistics;
use tracing::{info, warn};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidUserId { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidUserId { raw } => write!(f, "invalid --user value: {raw:?}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- simulate [--db <sqlite_url>] [--user <id>] [--snapshot-dir <dir>] [--verbose]");
    eprintln!("  cargo run -p app -- stats    [--db <sqlite_url>] [--user <id>] [--verbose]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite://telemetry.sqlite3");
    eprintln!("  --snapshot-dir .telemetry");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  TELEMETRY_DB_URL, TELEMETRY_USER_ID, TELEMETRY_SNAPSHOT_DIR");
    eprintln!("  TELEMETRY_REST_URL + TELEMETRY_REST_KEY  (use the hosted store instead of SQLite)");
    eprintln!("  RUST_LOG                                 (overrides --verbose)");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Simulate,
    Stats,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "simulate" => Some(Self::Simulate),
            "stats" => Some(Self::Stats),
            _ => None,
        }
    }
}

struct Args {
    db_url: String,
    user_id: Option<UserId>,
    snapshot_dir: PathBuf,
    verbose: bool,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("TELEMETRY_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://telemetry.sqlite3".into(), normalize_sqlite_url);
        let mut user_id = match std::env::var("TELEMETRY_USER_ID") {
            Ok(raw) => Some(UserId::new(raw.clone()).map_err(|_| ArgsError::InvalidUserId { raw })?),
            Err(_) => None,
        };
        let mut snapshot_dir = std::env::var("TELEMETRY_SNAPSHOT_DIR")
            .map_or_else(|_| PathBuf::from(".telemetry"), PathBuf::from);
        let mut verbose = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--user" => {
                    let value = require_value(args, "--user")?;
                    user_id = Some(
                        UserId::new(value.clone())
                            .map_err(|_| ArgsError::InvalidUserId { raw: value })?,
                    );
                }
                "--snapshot-dir" => {
                    snapshot_dir = PathBuf::from(require_value(args, "--snapshot-dir")?);
                }
                "--verbose" | "-v" => verbose = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            user_id,
            snapshot_dir,
            verbose,
        })
    }
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

async fn open_storage(db_url: &str) -> Result<Storage, Box<dyn std::error::Error>> {
    if let Some(config) = RestConfig::from_env() {
        info!(base_url = %config.base_url, "using hosted REST store");
        return Ok(Storage::rest(config)?);
    }
    prepare_sqlite_file(db_url)?;
    info!(db_url, "using sqlite store");
    Ok(Storage::sqlite(db_url).await?)
}

/// Walk a short browsing session through the simulated host.
async fn simulate(services: &TelemetryServices, host: &SimulatedHost, user_id: Option<UserId>) {
    let recorder = services.recorder();
    recorder.identify(user_id);

    host.set_title("Dashboard");
    if let Err(err) = recorder.start().settle().await {
        warn!(error = %err, "initial flush incomplete");
    }

    host.set_title("Course catalogue");
    host.push("/courses?sort=popular");
    host.set_title("Rust 101");
    host.push("/courses/rust-101");
    recorder.track_course_enrollment("rust-101", "Rust 101").detach();
    recorder
        .track_video_play("intro", "Welcome to Rust", Some("rust-101"))
        .detach();
    host.replace("/courses/rust-101#syllabus");

    host.hide();
    host.show();
    host.back();
    recorder.track_download("cheatsheet", "Ownership cheat sheet", "pdf").detach();

    let page_views = recorder.page_views().len();
    if let Err(err) = recorder.unload().settle().await {
        warn!(error = %err, "final flush incomplete");
    }
    println!(
        "session {} recorded {page_views} page views over {} ms",
        recorder.session_id(),
        recorder.duration_ms()
    );
}

async fn report_statistics(
    services: &TelemetryServices,
    user_id: &UserId,
) -> Result<(), Box<dyn std::error::Error>> {
    let statistics: UserStatistics = match services
        .statistics()
        .calculate_user_statistics(user_id)
        .await
    {
        Ok(statistics) => statistics,
        Err(StatisticsError::ProfileWrite { statistics, source }) => {
            warn!(%user_id, error = %source, "statistics not stored on profile");
            *statistics
        }
        Err(err) => return Err(err.into()),
    };
    println!("{}", serde_json::to_string_pretty(&statistics)?);
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    let cmd = match argv.first().map(String::as_str) {
        None => Command::Simulate,
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with('-') => Command::Simulate,
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    if !argv.is_empty() && !argv[0].starts_with('-') {
        argv.remove(0);
    }

    let parsed = Args::parse(&mut argv.into_iter()).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;
    init_logging(parsed.verbose);

    let storage = open_storage(&parsed.db_url).await?;
    let host = SimulatedHost::new("/dashboard").with_referrer("https://search.example.com/");
    let services = TelemetryServices::new(
        &storage,
        Arc::new(FileLocalStore::new(parsed.snapshot_dir.clone())),
        Arc::new(host.clone()),
        Clock::default(),
        RecorderConfig::default(),
        StatisticsConfig::default(),
    );

    match cmd {
        Command::Simulate => {
            simulate(&services, &host, parsed.user_id.clone()).await;
            if let Some(user_id) = &parsed.user_id {
                report_statistics(&services, user_id).await?;
            }
            Ok(())
        }
        Command::Stats => {
            let user_id = parsed.user_id.ok_or(ArgsError::MissingValue { flag: "--user" })?;
            report_statistics(&services, &user_id).await
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
