use changewatch::Settings;
use changewatch::config::WatchBackend;
use std::env;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_env_overrides_file_and_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("changewatch.toml");
    fs::write(
        &config_path,
        r#"
poll_interval = 5
backend = "native"

[process_log]
log = true
file = "process.log"
"#,
    )
    .unwrap();

    unsafe {
        // Double underscore separates nested levels
        env::set_var("CW_POLL_INTERVAL", "42");
        env::set_var("CW_PROCESS_LOG__VERBOSE", "true");
    }

    let settings = Settings::load_from(&config_path).unwrap();

    unsafe {
        env::remove_var("CW_POLL_INTERVAL");
        env::remove_var("CW_PROCESS_LOG__VERBOSE");
    }

    assert_eq!(settings.poll_interval, 42, "env beats the file");
    assert_eq!(settings.backend, WatchBackend::Native, "file beats defaults");
    assert!(settings.process_log.log);
    assert!(settings.process_log.verbose);
    assert_eq!(settings.tick_ms, 1000);
    assert!(settings.watchers.is_empty());
}
