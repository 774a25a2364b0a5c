// src/patterns/poller.rs

//! Polling value cache.
//!
//! A thread-owned periodic task around a single `fetch`. Every iteration
//! fetches, reports a change if the value differs from the cached one, then
//! caches it and marks the cache ready. With `persist` enabled, the value is
//! also written to `<persist_dir>/__<task>.state` after every successful
//! fetch and read back at initialisation, so a restart starts out ready.
//!
//! Options: `interval` (seconds), `persist` (bool), `persist_dir` (path,
//! default the OS temp dir).

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::Context;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::errors::TaskError;
use crate::fs::{FileSystem, RealFileSystem};
use crate::patterns::cadence::Cadence;
use crate::task::{RunLoop, Task, TaskContext, TaskSpec, short_type_name};

/// The user side of a [`Poller`].
pub trait Fetch: Send + 'static {
    type Value: Clone + PartialEq + fmt::Debug + Send + Sync + 'static;

    /// Used when no `interval` option is set.
    const INTERVAL: Duration = Duration::from_secs(60);

    fn initialize(&mut self, ctx: &TaskContext) -> Result<(), TaskError> {
        let _ = ctx;
        Ok(())
    }

    fn fetch(&mut self, ctx: &TaskContext) -> anyhow::Result<Self::Value>;

    /// Called when a fetched value differs from the cached one. `old` is
    /// `None` until the first value is known.
    fn on_value_changed(&mut self, old: Option<&Self::Value>, new: &Self::Value) {
        debug!(?old, ?new, "value changed");
    }
}

/// Serialisation used for the persisted state file.
pub trait Codec<T>: Send + Sync + 'static {
    fn encode(&self, value: &T) -> anyhow::Result<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> anyhow::Result<T>;
}

/// JSON via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<T> Codec<T> for JsonCodec
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T) -> anyhow::Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(&self, bytes: &[u8]) -> anyhow::Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

struct Shared<V> {
    value: Mutex<Option<V>>,
    ready: Condvar,
}

/// Read side of a [`Poller`]; published under the poller's task name.
pub struct PollerHandle<V> {
    shared: Arc<Shared<V>>,
}

impl<V> Clone for PollerHandle<V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for PollerHandle<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollerHandle")
            .field("value", &*self.lock())
            .finish()
    }
}

impl<V> PollerHandle<V> {
    fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                value: Mutex::new(None),
                ready: Condvar::new(),
            }),
        }
    }

    /// Whether at least one value is known. Never goes back to `false`.
    pub fn is_ready(&self) -> bool {
        self.lock().is_some()
    }

    /// Replace the cached value, returning the previous one.
    fn store(&self, new: V) -> Option<V> {
        let old = self.lock().replace(new);
        self.shared.ready.notify_all();
        old
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<V>> {
        self.shared
            .value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<V: Clone> PollerHandle<V> {
    /// The cached value, without waiting.
    pub fn current(&self) -> Option<V> {
        self.lock().clone()
    }

    /// Wait up to `timeout` for the cache to become ready, then return
    /// whatever is cached. `Duration::MAX` waits indefinitely.
    ///
    /// The value may lag behind a fetch that is in progress.
    pub fn value(&self, timeout: Duration) -> Option<V> {
        let deadline = Instant::now().checked_add(timeout);
        let mut value = self.lock();

        while value.is_none() {
            value = match deadline {
                None => self
                    .shared
                    .ready
                    .wait(value)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    self.shared
                        .ready
                        .wait_timeout(value, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
        value.clone()
    }
}

/// Periodic fetch-compare-publish task.
pub struct Poller<F: Fetch, C = JsonCodec> {
    fetcher: F,
    codec: C,
    fs: Arc<dyn FileSystem>,
    handle: PollerHandle<F::Value>,
    cadence: Option<Cadence>,
    state_file: Option<PathBuf>,
}

impl<F: Fetch> Poller<F, JsonCodec> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            codec: JsonCodec,
            fs: Arc::new(RealFileSystem),
            handle: PollerHandle::new(),
            cadence: None,
            state_file: None,
        }
    }

    /// Spec named after the fetcher type.
    pub fn spec() -> TaskSpec
    where
        F: Default,
        F::Value: Serialize + DeserializeOwned,
    {
        TaskSpec::new(short_type_name::<F>(), || Poller::new(F::default()))
    }
}

impl<F: Fetch, C: Codec<F::Value>> Poller<F, C> {
    pub fn with_codec<C2: Codec<F::Value>>(self, codec: C2) -> Poller<F, C2> {
        Poller {
            fetcher: self.fetcher,
            codec,
            fs: self.fs,
            handle: self.handle,
            cadence: self.cadence,
            state_file: self.state_file,
        }
    }

    pub fn with_file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    /// Handle to this poller's cache; the same one it publishes.
    pub fn handle(&self) -> PollerHandle<F::Value> {
        self.handle.clone()
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Where the value is persisted, once initialised with `persist` on.
    pub fn state_file(&self) -> Option<&Path> {
        self.state_file.as_deref()
    }

    /// One iteration: fetch, compare, cache, persist.
    pub fn poll_once(&mut self, ctx: &TaskContext) -> anyhow::Result<()> {
        let new = self.fetcher.fetch(ctx)?;
        let cached = self.handle.current();
        if cached.as_ref() != Some(&new) {
            self.fetcher.on_value_changed(cached.as_ref(), &new);
        }
        self.handle.store(new.clone());

        if let Some(path) = &self.state_file {
            let bytes = self.codec.encode(&new).context("encoding polled value")?;
            self.fs
                .write(path, &bytes)
                .with_context(|| format!("persisting polled value to {}", path.display()))?;
        }
        Ok(())
    }

    fn restore(&self, path: &Path) {
        if !self.fs.exists(path) {
            debug!(path = %path.display(), "no persisted value; cold start");
            return;
        }

        let restored = self
            .fs
            .read(path)
            .and_then(|bytes| self.codec.decode(&bytes));
        match restored {
            Ok(value) => {
                info!(path = %path.display(), ?value, "restored persisted value");
                self.handle.store(value);
            }
            Err(err) => warn!(
                path = %path.display(),
                error = %format!("{err:#}"),
                "ignoring unreadable persisted value; cold start"
            ),
        }
    }
}

impl<F: Fetch, C: Codec<F::Value>> Task for Poller<F, C> {
    fn initialize(&mut self, ctx: &TaskContext) -> Result<(), TaskError> {
        let options = ctx.options();
        self.cadence = Some(Cadence::from_options(options, F::INTERVAL)?);

        if options.get_or::<bool>("persist", false)? {
            let dir = match options.get::<String>("persist_dir")? {
                Some(dir) => PathBuf::from(dir),
                None => std::env::temp_dir(),
            };
            let path = dir.join(format!("__{}.state", ctx.name()));
            self.restore(&path);
            self.state_file = Some(path);
        }

        self.fetcher.initialize(ctx)?;
        ctx.publish(self.handle.clone());
        Ok(())
    }

    fn run(mut self: Box<Self>, ctx: TaskContext) -> RunLoop {
        let cadence = self
            .cadence
            .unwrap_or_else(|| Cadence::new(F::INTERVAL));

        RunLoop::blocking(move || {
            while !ctx.should_stop() {
                let started = Instant::now();
                self.poll_once(&ctx)?;
                if let Some(left) = cadence.remaining(started.elapsed()) {
                    ctx.stop().sleep(left);
                }
            }
            Ok(())
        })
    }
}
