// tests/queue.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use taskhost::config::Options;
use taskhost::engine::Service;
use taskhost::patterns::{QueueConsumer, QueueHandle, SubmitError, WorkHandler};
use taskhost::{LoopHost, TaskSpec};
use taskhost_test_utils::{init_tracing, wait_until};
use tokio::sync::Semaphore;

/// Tracks how many items are in flight and holds each one until the gate
/// lets it through.
#[derive(Clone)]
struct Meter {
    started: Arc<AtomicUsize>,
    running: Arc<AtomicUsize>,
    max_running: Arc<AtomicUsize>,
    done: Arc<AtomicUsize>,
    gate: Arc<Semaphore>,
    work: Duration,
}

impl Meter {
    fn new(work: Duration, open: bool) -> Self {
        Self {
            started: Arc::default(),
            running: Arc::default(),
            max_running: Arc::default(),
            done: Arc::default(),
            gate: Arc::new(Semaphore::new(if open { Semaphore::MAX_PERMITS } else { 0 })),
            work,
        }
    }

    fn done(&self) -> usize {
        self.done.load(Ordering::SeqCst)
    }

    fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

impl WorkHandler for Meter {
    type Item = u32;

    fn handle(self: Arc<Self>, item: u32) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(async move {
            self.started.fetch_add(1, Ordering::SeqCst);
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);

            let _pass = self.gate.acquire().await?;
            tokio::time::sleep(self.work).await;

            self.running.fetch_sub(1, Ordering::SeqCst);
            self.done.fetch_add(1, Ordering::SeqCst);
            anyhow::ensure!(item % 2 == 0 || item < 100, "odd item {item}");
            Ok(())
        })
    }
}

fn start(meter: &Meter, concurrency: i64) -> (Service, QueueHandle<u32>) {
    let handler = meter.clone();
    let mut svc = Service::new("queue")
        .with_join_poll_interval(Duration::from_millis(20))
        .with_options(Options::new().with("Meter_concurrency", concurrency));
    svc.register(TaskSpec::of::<LoopHost>()).unwrap();
    svc.register(TaskSpec::new("Meter", move || QueueConsumer::new(handler.clone())).on_loop())
        .unwrap();
    svc.start_all().unwrap();

    let handle = svc.lookup::<QueueHandle<u32>>("Meter").unwrap();
    (svc, handle)
}

#[test]
fn never_more_than_concurrency_items_in_flight() {
    init_tracing();
    let meter = Meter::new(Duration::from_millis(30), true);
    let (mut svc, queue) = start(&meter, 3);
    assert_eq!(queue.capacity(), 3);

    for item in 0..10 {
        queue.submit_blocking(item).unwrap();
    }
    assert!(wait_until(Duration::from_secs(5), || meter.done() == 10));

    let max = meter.max_running.load(Ordering::SeqCst);
    assert!(max <= 3, "saw {max} items in flight");
    assert!(max >= 2, "items never overlapped");
    svc.stop_all();
}

#[test]
fn producers_are_pushed_back_once_buffer_is_full() {
    init_tracing();
    let meter = Meter::new(Duration::ZERO, false);
    let (mut svc, queue) = start(&meter, 2);

    queue.try_submit(1).unwrap();
    queue.try_submit(2).unwrap();
    assert!(wait_until(Duration::from_secs(5), || meter.started() == 2));

    // Both permits are held by blocked items; the buffer takes two more.
    queue.try_submit(3).unwrap();
    queue.try_submit(4).unwrap();
    match queue.try_submit(5) {
        Err(SubmitError::Full(5)) => {}
        other => panic!("expected Full(5), got {other:?}"),
    }
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(meter.started(), 2);

    meter.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    assert!(wait_until(Duration::from_secs(5), || meter.done() == 4));
    svc.stop_all();
}

#[test]
fn failing_items_do_not_stop_the_consumer() {
    let meter = Meter::new(Duration::ZERO, true);
    let (mut svc, queue) = start(&meter, 2);

    for item in [101, 102, 103, 104] {
        queue.submit_blocking(item).unwrap();
    }
    assert!(wait_until(Duration::from_secs(5), || meter.done() == 4));
    assert_eq!(svc.exit_of("Meter"), None);

    let report = svc.stop_all();
    assert!(report.is_clean());
}

#[test]
fn stop_waits_for_in_flight_items_then_closes_the_queue() {
    init_tracing();
    let meter = Meter::new(Duration::from_millis(100), true);
    let (mut svc, queue) = start(&meter, 2);

    queue.submit_blocking(1).unwrap();
    queue.submit_blocking(2).unwrap();
    assert!(wait_until(Duration::from_secs(5), || meter.started() == 2));

    let report = svc.stop_all();
    assert!(report.is_clean());
    assert_eq!(meter.done(), 2);
    assert!(queue.is_closed());
    assert!(matches!(queue.try_submit(3), Err(SubmitError::Closed(3))));
}

#[test]
fn concurrency_defaults_to_handler_constant() {
    let meter = Meter::new(Duration::ZERO, true);
    let handler = meter.clone();
    let mut svc = Service::new("queue");
    svc.register(TaskSpec::of::<LoopHost>()).unwrap();
    svc.register(TaskSpec::new("Meter", move || QueueConsumer::new(handler.clone())).on_loop())
        .unwrap();
    svc.start_all().unwrap();

    let queue = svc.lookup::<QueueHandle<u32>>("Meter").unwrap();
    assert_eq!(queue.capacity(), <Meter as WorkHandler>::CONCURRENCY);
    svc.stop_all();
}
