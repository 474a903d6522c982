use chrono::NaiveDateTime;
use clap::Parser;
use log::{error, info, LevelFilter};
use otp_isochrones::{config, points, IsochroneError, OtpClient};
use std::path::PathBuf;

#[derive(Parser, Clone)]
#[command(version, about)]
struct Args {
    /// Base address of the OpenTripPlanner server
    #[clap(long, env("OTP_BASE_URL"), default_value = "http://localhost:8080")]
    base_url: String,
    /// CSV table of origins with ID, X (longitude) and Y (latitude) columns
    #[clap(short('p'), long("points"), env("OTP_POINTS"), default_value = "centers.csv")]
    points: PathBuf,
    #[clap(long, env("OTP_POINTS_DELIMITER"), default_value_t = ',')]
    delimiter: char,
    /// Departure date and time, e.g. 2024-08-27T08:30:00
    #[clap(long, env("OTP_DEPARTURE"), default_value = "2024-08-27T08:30:00", value_parser = parse_departure)]
    departure: NaiveDateTime,
    /// Directory under which the per-configuration directories are created
    #[clap(short('o'), long, env("OTP_OUTPUT_ROOT"), default_value = ".")]
    output_root: PathBuf,
    /// JSON file of query configurations replacing the built-in ones
    #[clap(long, env("OTP_PROFILES"))]
    profiles: Option<PathBuf>,
    #[clap(short('l'), long("log-level"), env("OTP_LOG_LEVEL"), default_value_t, value_enum)]
    log_level: LogLevel,
}

#[derive(clap::ValueEnum, Clone, Default)]
enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Off => Self::Off,
            LogLevel::Error => Self::Error,
            LogLevel::Warn => Self::Warn,
            LogLevel::Info => Self::Info,
            LogLevel::Debug => Self::Debug,
            LogLevel::Trace => Self::Trace,
        }
    }
}

fn parse_departure(text: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S")
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    env_logger::builder()
        .filter_level(args.log_level.clone().into())
        .parse_default_env() // Allow overriding log level through RUST_LOG env var
        .init();

    if let Err(e) = run(args).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), IsochroneError> {
    if !args.delimiter.is_ascii() {
        return Err(IsochroneError::InvalidConfig {
            name: "points".to_string(),
            message: format!("delimiter '{}' is not a single ASCII character", args.delimiter),
        });
    }
    let points = points::load_points(&args.points, args.delimiter as u8)?;

    let profiles = match &args.profiles {
        Some(path) => config::load_profiles(path)?,
        None => config::default_profiles(args.departure),
    };
    let profiles = profiles
        .into_iter()
        .map(|profile| profile.with_output_root(&args.output_root))
        .collect::<Vec<_>>();
    for profile in profiles.iter() {
        profile.validate()?;
    }

    let client = OtpClient::new(&args.base_url);
    info!("requesting isochrones from '{}'", client.isochrone_url());
    let summaries = otp_isochrones::run_batch(&client, &points, &profiles).await;

    let failed = summaries.iter().map(|s| s.failed).sum::<usize>();
    let written = summaries.iter().map(|s| s.written).sum::<usize>();
    info!("batch finished: {} files written, {} failures", written, failed);
    Ok(())
}
