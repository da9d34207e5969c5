//! PISA's logger: an `env_logger` wrapper — a JSON or human-readable
//! formatter, optional color, optional file duplication, and a
//! [`RotatingLogger`] handle the operator CLI's health surface can read
//! recent lines from without re-attaching a subscriber.

mod rotating;

use std::{env, fs, io::Write, sync::Arc, thread};

use ansi_term::Colour;
use chrono::SecondsFormat;
use env_logger::{Builder as LogBuilder, Formatter};
use lazy_static::lazy_static;
use log::{LevelFilter, Record};
use parking_lot::Mutex;
use regex::Regex;
use std::sync::Weak;

pub use rotating::RotatingLogger;

/// Logging configuration.
#[derive(Debug, PartialEq, Clone)]
pub struct Config {
    pub mode: Option<String>,
    pub color: bool,
    pub file: Option<String>,
    pub json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mode: None,
            color: true,
            file: None,
            json: true,
        }
    }
}

lazy_static! {
    static ref ROTATING_LOGGER: Mutex<Weak<RotatingLogger>> = Mutex::new(Weak::new());
}

fn escape(text: &str) -> String {
    text.replace('\n', "\\n").replace('\r', "\\r").replace('"', "\\\"")
}

/// Initializes the process-wide logger, returning a handle to its
/// [`RotatingLogger`] for the health surface. Calling this twice returns
/// the existing handle rather than erroring (`bin/pisa` may call it once
/// from `main` and once from a test harness).
pub fn setup_log(config: &Config) -> Result<Arc<RotatingLogger>, String> {
    let mut levels = String::new();
    let mut builder = LogBuilder::new();
    builder.filter(Some("hyper"), LevelFilter::Warn);
    builder.filter(Some("tokio_reactor"), LevelFilter::Warn);
    builder.filter(None, LevelFilter::Info);

    if let Ok(env_levels) = env::var("RUST_LOG") {
        levels.push_str(&env_levels);
        levels.push(',');
        builder.parse(&env_levels);
    }

    if let Some(ref mode) = config.mode {
        levels.push_str(mode);
        builder.parse(mode);
    }

    let isatty = atty::is(atty::Stream::Stderr);
    let enable_color = config.color && isatty;
    let enable_json = config.json;
    let logs = Arc::new(RotatingLogger::new(levels));
    let logger = logs.clone();

    let maybe_file = match config.file.as_ref() {
        Some(path) => Some(
            fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(path)
                .map_err(|e| format!("cannot write to log file {path}: {e}"))?,
        ),
        None => None,
    };

    let format = move |buf: &mut Formatter, record: &Record| {
        let name = thread::current().name().map(str::to_string).unwrap_or_default();
        let formatted = if enable_json {
            let timestamp = chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
            format!(
                "{{\"@timestamp\":\"{}\",\"service\":\"{}\",\"level\":\"{}\",\"target\":\"{}\",\"message\":\"{}\"}}",
                timestamp,
                name,
                record.level(),
                record.target(),
                escape(&record.args().to_string())
            )
        } else {
            let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
            format!(
                "{} {} {} {}  {}",
                Colour::Black.bold().paint(timestamp),
                Colour::Blue.bold().paint(name),
                record.level(),
                record.target(),
                record.args()
            )
        };

        let plain = kill_color(&formatted);

        if let Some(mut file) = maybe_file.as_ref() {
            let _ = file.write_all(plain.as_bytes());
            let _ = file.write_all(b"\n");
        }
        logger.append(plain.clone());

        let output = if enable_color { formatted } else { plain };
        writeln!(buf, "{output}")
    };

    builder.format(format);
    builder
        .try_init()
        .map(|_| {
            *ROTATING_LOGGER.lock() = Arc::downgrade(&logs);
            logs
        })
        .or_else(|err| {
            ROTATING_LOGGER
                .lock()
                .upgrade()
                .ok_or_else(|| format!("{err:?}"))
        })
}

fn kill_color(s: &str) -> String {
    lazy_static! {
        static ref RE: Regex = Regex::new("\x1b\\[[^m]+m").unwrap();
    }
    RE.replace_all(s, "").to_string()
}
