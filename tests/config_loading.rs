// tests/config_loading.rs

use std::io::Write;
use std::time::Duration;

use taskhost::config::{Options, load_and_validate};
use taskhost::demo;
use taskhost::engine::Service;
use taskhost::errors::ServiceError;
use taskhost::patterns::OneShot;
use taskhost_test_utils::ConfigFileBuilder;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn file_options_reach_the_demo_tasks() {
    let file = write_config(
        r#"
[service]
name = "edge"
join_poll_interval_ms = 250

[options]
Heartbeat_interval = 2.5
"EchoQueue-concurrency" = 2
ClockPoller_persist = false
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();
    assert_eq!(cfg.service.name, "edge");
    assert_eq!(cfg.service.join_poll_interval(), Duration::from_millis(250));

    let service = demo::service(&cfg).unwrap();
    assert_eq!(service.name(), "edge");
    assert_eq!(service.join_poll_interval(), Duration::from_millis(250));

    let queue = service.effective_options("EchoQueue").unwrap();
    assert_eq!(queue.get::<i64>("concurrency").unwrap(), Some(2));

    let heartbeat = service.effective_options("Heartbeat").unwrap();
    assert_eq!(heartbeat.get::<f64>("interval").unwrap(), Some(2.5));

    // The file overrides the registration default of `true`.
    let clock = service.effective_options("ClockPoller").unwrap();
    assert_eq!(clock.get::<bool>("persist").unwrap(), Some(false));
}

#[test]
fn registration_defaults_apply_without_a_file() {
    let service = demo::service(&Default::default()).unwrap();
    let clock = service.effective_options("ClockPoller").unwrap();
    assert_eq!(clock.get::<bool>("persist").unwrap(), Some(true));
    assert_eq!(service.name(), "taskhost");
}

#[test]
fn command_line_overrides_win_over_the_file() {
    let file = write_config("[options]\nHeartbeat_interval = 2.5\n");
    let overrides = Options::from_assignments(["--Heartbeat-interval=0.5"]).unwrap();
    let cfg = load_and_validate(file.path())
        .unwrap()
        .with_overrides(overrides);

    let service = demo::service(&cfg).unwrap();
    let heartbeat = service.effective_options("Heartbeat").unwrap();
    assert_eq!(heartbeat.get::<f64>("interval").unwrap(), Some(0.5));
}

#[test]
fn zero_join_poll_interval_is_rejected() {
    let file = write_config("[service]\njoin_poll_interval_ms = 0\n");
    let err = load_and_validate(file.path()).unwrap_err();
    assert!(
        matches!(&err, ServiceError::Config(msg) if msg.contains("join_poll_interval_ms")),
        "{err}"
    );
}

#[test]
fn table_valued_option_is_rejected() {
    let file = write_config("[options.Heartbeat]\ninterval = 1\n");
    let err = load_and_validate(file.path()).unwrap_err();
    assert!(matches!(err, ServiceError::Config(msg) if msg.contains("Heartbeat")));
}

#[test]
fn malformed_toml_is_reported() {
    let file = write_config("[service\nname = ");
    assert!(matches!(
        load_and_validate(file.path()),
        Err(ServiceError::Toml(_))
    ));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_and_validate(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ServiceError::Io(_)));
}

#[test]
fn builder_matches_file_semantics() {
    let cfg = ConfigFileBuilder::new()
        .service_name("built")
        .option("--EchoQueue-concurrency", 3)
        .build();
    assert_eq!(cfg.options.get("EchoQueue_concurrency"), Some(&toml::Value::Integer(3)));

    let err = ConfigFileBuilder::new().service_name("  ").try_build().unwrap_err();
    assert!(matches!(err, ServiceError::Config(_)));
}

#[test]
fn hyphenated_task_names_accept_both_flag_spellings() {
    let file = write_config(
        r#"
[options]
"echo-queue-interval" = 5
echo-queue_retries = 2
Clock_sync_interval = 7
Clok_interval = 1
"#,
    );
    let cfg = load_and_validate(file.path()).unwrap();

    let mut svc = Service::from_config(&cfg);
    for name in ["echo-queue", "Clock", "Clock_sync"] {
        svc.register(OneShot::spec(name, |_ctx| Ok(()))).unwrap();
    }

    let echo = svc.effective_options("echo-queue").unwrap();
    assert_eq!(echo.get::<i64>("interval").unwrap(), Some(5));
    assert_eq!(echo.get::<i64>("retries").unwrap(), Some(2));

    let clock = svc.effective_options("Clock").unwrap();
    assert_eq!(clock.iter().count(), 0);
    let sync = svc.effective_options("Clock_sync").unwrap();
    assert_eq!(sync.get::<i64>("interval").unwrap(), Some(7));

    assert_eq!(svc.unclaimed_options(), vec!["Clok_interval"]);
}
