//! Plumbing shared by the reader binaries.
//!
//! Every binary prints exactly one line: the reading on stdout, or a diagnostic on stderr.
//! Logging goes to stderr as well and is quiet unless `RUST_LOG` asks for more.

use clap::{Args, Parser};
use core::fmt;
use log::{debug, warn};
use std::ffi::OsString;
use std::process::{self, ExitCode};
use std::time::Duration;

use crate::line_protocol::{Point, DEFAULT_MEASUREMENT};
use crate::retry::{
    Exhausted, ExhaustionPolicy, RetryPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY,
};

/// Written as the host tag when the lookup fails.
pub const UNKNOWN_HOST: &str = "unknown";

/// Options every reader accepts.
#[derive(Args, Clone, Debug, PartialEq)]
pub struct CommonArgs {
    /// Total read attempts before giving up
    #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS,
          value_parser = clap::value_parser!(u8).range(1..))]
    pub attempts: u8,

    /// Pause between attempts, in milliseconds
    #[arg(long, default_value_t = DEFAULT_RETRY_DELAY.as_millis() as u64)]
    pub retry_delay_ms: u64,

    /// Line-protocol measurement name
    #[arg(long, default_value = DEFAULT_MEASUREMENT)]
    pub measurement: String,
}

impl CommonArgs {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.attempts, Duration::from_millis(self.retry_delay_ms))
            .unwrap_or_default()
    }
}

/// Rewrites single-dash long flags such as `-dhtpin` into `--dhtpin`.
///
/// Short flags (`-h`), negative numbers (`-5`) and anything already double-dashed pass through.
/// The first item is the program name and is never touched.
pub fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    args.into_iter()
        .enumerate()
        .map(|(i, arg)| {
            let arg = arg.into();
            if i == 0 {
                return arg;
            }
            match arg.to_str() {
                Some(text) if is_single_dash_long(text) => OsString::from(format!("-{}", text)),
                _ => arg,
            }
        })
        .collect()
}

fn is_single_dash_long(arg: &str) -> bool {
    let mut chars = arg.chars();
    chars.next() == Some('-')
        && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.next().is_some()
}

/// Parses normalized arguments, mapping clap's outcomes onto the readers' exit codes.
///
/// Usage errors exit with 1; help and version output exit with 0.
pub fn try_parse_from<T, I, S>(args: I) -> Result<T, clap::Error>
where
    T: Parser,
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    T::try_parse_from(normalize_args(args))
}

/// Parses the process arguments, exiting on error or after printing help.
pub fn parse_args<T: Parser>() -> T {
    match try_parse_from(std::env::args_os()) {
        Ok(args) => args,
        Err(err) => {
            let code = if err.use_stderr() { 1 } else { 0 };
            // Nothing useful to do if the terminal is gone.
            let _ = err.print();
            process::exit(code);
        }
    }
}

/// Logs to stderr at `warn` unless `RUST_LOG` says otherwise.
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
}

pub fn hostname() -> String {
    match ::hostname::get() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(err) => {
            warn!("hostname lookup failed: {}", err);
            UNKNOWN_HOST.to_string()
        }
    }
}

/// Accepts `0x38`, `0X38` or `56`.
pub fn parse_address(value: &str) -> Result<u8, String> {
    let value = value.trim();
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|err| format!("invalid I2C address {:?}: {}", value, err))
}

/// Writes the point as the single line on stdout.
pub fn emit(point: &Point) {
    println!("{}", point);
}

/// Prints `message` on stderr and returns a failing exit code.
pub fn fail(message: impl fmt::Display) -> ExitCode {
    eprintln!("Error: {}", message);
    ExitCode::FAILURE
}

/// The stderr diagnostic for a spent retry budget, or `None` when `policy` stays quiet.
pub fn exhaustion_message<E: fmt::Display>(
    sensor: &str,
    exhausted: &Exhausted<E>,
    policy: ExhaustionPolicy,
) -> Option<String> {
    match policy {
        ExhaustionPolicy::Report => Some(format!("failed to read {}: {}", sensor, exhausted)),
        ExhaustionPolicy::Silent => {
            debug!("giving up on {} silently: {}", sensor, exhausted);
            None
        }
    }
}

/// Applies `policy` once a reader has used up its attempts.
pub fn exhausted<E: fmt::Display>(
    sensor: &str,
    exhausted: &Exhausted<E>,
    policy: ExhaustionPolicy,
) -> ExitCode {
    match exhaustion_message(sensor, exhausted, policy) {
        Some(message) => fail(message),
        None => ExitCode::SUCCESS,
    }
}
