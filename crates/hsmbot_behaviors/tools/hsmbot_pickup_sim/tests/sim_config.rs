use std::env;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use hsmbot_pickup_sim::config::{Config, DEFAULT_LOG_LEVEL, DEFAULT_MOTION_MS};

fn env_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(())).lock().expect("lock")
}

fn clear_env() {
    for key in [
        "HSMBOT_MISSES",
        "HSMBOT_CONFLICT",
        "HSMBOT_TIME_SCALE",
        "HSMBOT_MOTION_MS",
        "HSMBOT_LOG",
    ] {
        env::remove_var(key);
    }
}

#[test]
fn defaults_without_args_or_env() {
    let _guard = env_lock();
    clear_env();

    let config = Config::from_args_iter(["bin"]);
    assert_eq!(config.misses, 0);
    assert_eq!(config.conflict, None);
    assert!(!config.invalid_pose);
    assert!(!config.hidden_cube);
    assert_eq!(config.time_scale, 1.0);
    assert_eq!(config.motion, Duration::from_millis(DEFAULT_MOTION_MS));
    assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
}

#[test]
fn flags_override_env() {
    let _guard = env_lock();
    clear_env();
    env::set_var("HSMBOT_MISSES", "1");
    env::set_var("HSMBOT_LOG", "warn");

    let config = Config::from_args_iter([
        "bin",
        "--misses",
        "4",
        "--conflict=blocked",
        "--invalid-pose",
        "--time-scale",
        "8",
        "--log-level=debug",
    ]);
    assert_eq!(config.misses, 4);
    assert_eq!(config.conflict.as_deref(), Some("blocked"));
    assert!(config.invalid_pose);
    assert_eq!(config.time_scale, 8.0);
    assert_eq!(config.log_level, "debug");

    clear_env();
}

#[test]
fn env_fills_in_missing_flags() {
    let _guard = env_lock();
    clear_env();
    env::set_var("HSMBOT_CONFLICT", "cliff");
    env::set_var("HSMBOT_MOTION_MS", "40");

    let config = Config::from_args_iter(["bin", "--hidden-cube"]);
    assert_eq!(config.conflict.as_deref(), Some("cliff"));
    assert_eq!(config.motion, Duration::from_millis(40));
    assert!(config.hidden_cube);

    clear_env();
}

#[test]
fn bad_time_scale_keeps_the_previous_value() {
    let _guard = env_lock();
    clear_env();
    env::set_var("HSMBOT_TIME_SCALE", "-2");

    let config = Config::from_args_iter(["bin", "--time-scale", "0"]);
    assert_eq!(config.time_scale, 1.0);

    let config = Config::from_args_iter(["bin", "--time-scale=inf"]);
    assert_eq!(config.time_scale, 1.0);

    let config = Config::from_args_iter(["bin", "--time-scale", "1e300"]);
    assert_eq!(config.time_scale, 1.0);

    env::set_var("HSMBOT_TIME_SCALE", "1000");
    let config = Config::from_args_iter(["bin"]);
    assert_eq!(config.time_scale, 1000.0);

    clear_env();
}
