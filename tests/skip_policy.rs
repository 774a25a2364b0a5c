// tests/skip_policy.rs

//! A skipped task is absent: dependents that can live without it look it
//! up optionally and carry on, dependents that require it are skipped too.

use std::time::Duration;

use taskhost::engine::Service;
use taskhost::{TaskExit, TaskState};
use taskhost_test_utils::{EventLog, Published, Recording, init_tracing};

fn service() -> Service {
    Service::new("skip").with_join_poll_interval(Duration::from_millis(20))
}

#[test]
fn optional_dependent_runs_without_skipped_dependency() {
    init_tracing();
    let log = EventLog::new();
    let mut svc = service();
    svc.register(Recording::new("Gpu", &log).skip_on_init("no device").spec())
        .unwrap();
    svc.register(Recording::new("Renderer", &log).uses("Gpu").spec())
        .unwrap();

    svc.start_all().unwrap();

    assert_eq!(svc.state_of("Gpu"), Some(TaskState::Stopped));
    assert_eq!(
        svc.exit_of("Gpu"),
        Some(TaskExit::Skipped("no device".to_string()))
    );
    assert!(log.contains("missing:Renderer:Gpu"));
    assert_eq!(svc.state_of("Renderer"), Some(TaskState::Running));
    assert_eq!(svc.running_tasks(), ["Renderer"]);
    assert_eq!(svc.lookup::<Published>("Gpu"), None);

    let report = svc.stop_all();
    assert_eq!(log.with_kind("hook"), ["Renderer"]);
    assert!(report.is_clean());
}

#[test]
fn optional_dependent_sees_dependency_when_present() {
    let log = EventLog::new();
    let mut svc = service();
    svc.register(Recording::new("Gpu", &log).spec()).unwrap();
    svc.register(Recording::new("Renderer", &log).uses("Gpu").spec())
        .unwrap();

    svc.start_all().unwrap();
    assert!(log.contains("saw:Renderer:Gpu"));
    assert_eq!(
        svc.lookup::<Published>("Gpu"),
        Some(Published("Gpu".to_string()))
    );
    svc.stop_all();
}

#[test]
fn required_dependency_cascades_the_skip() {
    init_tracing();
    let log = EventLog::new();
    let mut svc = service();
    svc.register(Recording::new("Gpu", &log).skip_on_init("no device").spec())
        .unwrap();
    svc.register(Recording::new("Renderer", &log).requires("Gpu").spec())
        .unwrap();
    svc.register(Recording::new("Ui", &log).requires("Renderer").spec())
        .unwrap();
    svc.register(Recording::new("Logger", &log).spec()).unwrap();

    svc.start_all().unwrap();

    for name in ["Gpu", "Renderer", "Ui"] {
        assert_eq!(svc.state_of(name), Some(TaskState::Stopped), "{name}");
    }
    assert!(matches!(
        svc.exit_of("Renderer"),
        Some(TaskExit::Skipped(reason)) if reason.contains("Gpu")
    ));
    assert!(matches!(
        svc.exit_of("Ui"),
        Some(TaskExit::Skipped(reason)) if reason.contains("Renderer")
    ));
    assert_eq!(svc.running_tasks(), ["Logger"]);
    assert!(log.with_kind("run").iter().all(|n| n == "Logger"));

    svc.stop_all();
    assert_eq!(log.with_kind("hook"), ["Logger"]);
}
