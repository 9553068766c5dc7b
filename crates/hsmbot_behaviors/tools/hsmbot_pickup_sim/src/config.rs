use std::env;
use std::time::Duration;

use hsmbot_behaviors::{MAX_TIME_SCALE, MIN_TIME_SCALE};

pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_MOTION_MS: u64 = 300;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Camera frames without the marker before a good one shows up.
    pub misses: usize,
    /// Conflict code the simulated planner reports on every start check.
    pub conflict: Option<String>,
    pub invalid_pose: bool,
    pub hidden_cube: bool,
    /// Logical seconds per wall-clock second.
    pub time_scale: f64,
    /// Logical duration of every simulated motion.
    pub motion: Duration,
    pub log_level: String,
}

impl Config {
    pub fn from_args() -> Self {
        Self::from_args_iter(env::args())
    }

    pub fn from_args_iter<I, S>(iter: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut misses = env::var("HSMBOT_MISSES")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0);
        let mut conflict = env::var("HSMBOT_CONFLICT").ok().filter(|v| !v.is_empty());
        let mut invalid_pose = false;
        let mut hidden_cube = false;
        let mut time_scale = env::var("HSMBOT_TIME_SCALE")
            .ok()
            .and_then(parse_scale)
            .unwrap_or(1.0);
        let mut motion_ms = env::var("HSMBOT_MOTION_MS")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_MOTION_MS);
        let mut log_level =
            env::var("HSMBOT_LOG").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string());

        let mut args = iter.into_iter();
        let _ = args.next();
        while let Some(arg) = args.next() {
            let arg = arg.as_ref();
            match arg {
                "-h" | "--help" => {
                    print_usage();
                    std::process::exit(0);
                }
                "--misses" => {
                    if let Some(n) = args.next().and_then(|v| v.as_ref().parse().ok()) {
                        misses = n;
                    }
                }
                "--conflict" => {
                    if let Some(value) = args.next() {
                        conflict = Some(value.as_ref().to_string());
                    }
                }
                "--invalid-pose" => invalid_pose = true,
                "--hidden-cube" => hidden_cube = true,
                "--time-scale" => {
                    if let Some(scale) = args.next().and_then(|v| parse_scale(v.as_ref().to_string())) {
                        time_scale = scale;
                    }
                }
                "--motion-ms" => {
                    if let Some(ms) = args.next().and_then(|v| v.as_ref().parse().ok()) {
                        motion_ms = ms;
                    }
                }
                "--log-level" => {
                    if let Some(value) = args.next() {
                        log_level = value.as_ref().to_string();
                    }
                }
                _ if arg.starts_with("--misses=") => {
                    if let Ok(n) = arg["--misses=".len()..].parse() {
                        misses = n;
                    }
                }
                _ if arg.starts_with("--conflict=") => {
                    conflict = Some(arg["--conflict=".len()..].to_string());
                }
                _ if arg.starts_with("--time-scale=") => {
                    if let Some(scale) = parse_scale(arg["--time-scale=".len()..].to_string()) {
                        time_scale = scale;
                    }
                }
                _ if arg.starts_with("--log-level=") => {
                    log_level = arg["--log-level=".len()..].to_string();
                }
                _ => {}
            }
        }

        Self {
            misses,
            conflict,
            invalid_pose,
            hidden_cube,
            time_scale,
            motion: Duration::from_millis(motion_ms),
            log_level,
        }
    }
}

fn print_usage() {
    println!(
        "hsmbot_pickup_sim [--misses <n>] [--conflict <code>] [--invalid-pose] [--hidden-cube] \
         [--time-scale <x>] [--motion-ms <ms>] [--log-level <filter>]"
    );
}

/// Scale factors the runner accepts; anything else is ignored.
fn parse_scale(value: String) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|s| (MIN_TIME_SCALE..=MAX_TIME_SCALE).contains(s))
}
