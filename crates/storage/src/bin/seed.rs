use std::fmt;

use telemetry_core::model::{EnrollmentId, EnrollmentRecord, UserId};
use storage::sqlite::SqliteRepository;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    user_id: UserId,
    courses: u32,
    first_id: u64,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidUserId { raw: String },
    InvalidCourses { raw: String },
    InvalidFirstId { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidUserId { raw } => write!(f, "invalid --user value: {raw:?}"),
            ArgsError::InvalidCourses { raw } => write!(f, "invalid --courses value: {raw}"),
            ArgsError::InvalidFirstId { raw } => write!(f, "invalid --first-id value: {raw}"),
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

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("TELEMETRY_DB_URL")
            .unwrap_or_else(|_| "sqlite://telemetry.sqlite3?mode=rwc".into());
        let raw_user = std::env::var("TELEMETRY_USER_ID").unwrap_or_else(|_| "demo-learner".into());
        let mut user_id =
            UserId::new(raw_user.clone()).map_err(|_| ArgsError::InvalidUserId { raw: raw_user })?;
        let mut courses = 4;
        let mut first_id = 1;

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--user" => {
                    let value = require_value(&mut args, "--user")?;
                    user_id = UserId::new(value.clone())
                        .map_err(|_| ArgsError::InvalidUserId { raw: value })?;
                }
                "--courses" => {
                    let value = require_value(&mut args, "--courses")?;
                    courses = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidCourses { raw: value.clone() })?;
                }
                "--first-id" => {
                    let value = require_value(&mut args, "--first-id")?;
                    first_id = value
                        .parse::<u64>()
                        .map_err(|_| ArgsError::InvalidFirstId { raw: value.clone() })?;
                }
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
            courses,
            first_id,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite://telemetry.sqlite3?mode=rwc)");
    eprintln!("  --user <id>               Learner to seed (default: demo-learner)");
    eprintln!("  --courses <n>             Number of enrollments to upsert (default: 4)");
    eprintln!("  --first-id <id>           Id of the first enrollment row (default: 1)");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  TELEMETRY_DB_URL, TELEMETRY_USER_ID");
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let repo = SqliteRepository::connect(&args.db_url).await?;
    repo.migrate().await?;
    repo.insert_profile(&args.user_id).await?;

    // (progress %, hours, score); `None` mimics courses the learner has not engaged with.
    let samples: [(f64, Option<f64>, Option<f64>); 4] = [
        (100.0, Some(14.0), Some(91.0)),
        (60.0, Some(7.5), Some(74.0)),
        (100.0, Some(9.0), Some(88.0)),
        (5.0, None, None),
    ];
    for i in 0..args.courses {
        let idx = usize::try_from(i).unwrap_or(0) % samples.len();
        let (progress_percent, hours_spent, score) = samples[idx];
        let record = EnrollmentRecord {
            id: EnrollmentId::new(args.first_id + u64::from(i)),
            user_id: args.user_id.clone(),
            progress_percent,
            hours_spent,
            score,
        };
        repo.upsert_enrollment(&record).await?;
    }

    println!(
        "Seeded profile {} with {} enrollments into {}",
        args.user_id, args.courses, args.db_url
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
