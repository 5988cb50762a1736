//! Repeated callbacks
//!
//! [`CallbackScheduler`] is the arena of periodic handlers keyed by id. It
//! only computes which handlers are due; the server processing loop fires
//! them one at a time between requests, so callbacks never run
//! concurrently with each other or with request handling.

use crate::server::Server;
use async_trait::async_trait;
use opcua_core::{StatusCode, UaResult};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Work fired on every tick of a repeated callback
#[async_trait]
pub trait RepeatedCallbackHandler: Send + Sync {
    /// Run one tick
    ///
    /// An error is logged by the loop and does not stop the callback.
    async fn on_tick(&self, server: &Arc<Server>, id: u64) -> UaResult<()>;
}

/// Adapter for a synchronous closure
pub struct FnCallback<F>(F);

impl<F> FnCallback<F>
where
    F: Fn(&Arc<Server>, u64) -> UaResult<()> + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> RepeatedCallbackHandler for FnCallback<F>
where
    F: Fn(&Arc<Server>, u64) -> UaResult<()> + Send + Sync + 'static,
{
    async fn on_tick(&self, server: &Arc<Server>, id: u64) -> UaResult<()> {
        (self.0)(server, id)
    }
}

struct ScheduledEntry {
    interval: Duration,
    next_due: Instant,
    handler: Arc<dyn RepeatedCallbackHandler>,
}

/// Periodic timer registry
pub struct CallbackScheduler {
    entries: BTreeMap<u64, ScheduledEntry>,
    next_id: u64,
}

impl Default for CallbackScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl CallbackScheduler {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Register a handler
    ///
    /// # Arguments
    /// * `interval` - Period between firings
    /// * `first_delay` - Delay before the first firing
    /// * `handler` - The work to fire
    /// * `now` - Reference point for the first deadline
    ///
    /// # Returns
    /// The nonzero id of the new entry
    ///
    /// # Errors
    /// `BadInvalidArgument` for a zero interval
    pub fn add(
        &mut self,
        interval: Duration,
        first_delay: Duration,
        handler: Arc<dyn RepeatedCallbackHandler>,
        now: Instant,
    ) -> UaResult<u64> {
        if interval.is_zero() {
            return Err(StatusCode::BAD_INVALID_ARGUMENT.into());
        }
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(
            id,
            ScheduledEntry {
                interval,
                next_due: now + first_delay,
                handler,
            },
        );
        Ok(id)
    }

    /// Change the period of an entry; the next firing is one new period from `now`
    pub fn change_interval(&mut self, id: u64, interval: Duration, now: Instant) -> UaResult<()> {
        if interval.is_zero() {
            return Err(StatusCode::BAD_INVALID_ARGUMENT.into());
        }
        let entry = self.entries.get_mut(&id).ok_or(StatusCode::BAD_NOT_FOUND)?;
        entry.interval = interval;
        entry.next_due = now + interval;
        Ok(())
    }

    pub fn remove(&mut self, id: u64) -> UaResult<()> {
        self.entries
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StatusCode::BAD_NOT_FOUND.into())
    }

    pub fn contains(&self, id: u64) -> bool {
        self.entries.contains_key(&id)
    }

    /// Drop every entry; ids are not reused
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn interval(&self, id: u64) -> Option<Duration> {
        self.entries.get(&id).map(|e| e.interval)
    }

    /// Handlers due at `now`, with their deadlines advanced
    ///
    /// Deadlines advance by whole periods so the phase is kept. An entry
    /// that fell more than a period behind fires once and restarts from
    /// `now`.
    pub fn due(&mut self, now: Instant) -> Vec<(u64, Arc<dyn RepeatedCallbackHandler>)> {
        let mut fired = Vec::new();
        for (id, entry) in self.entries.iter_mut() {
            if entry.next_due > now {
                continue;
            }
            entry.next_due += entry.interval;
            if entry.next_due <= now {
                entry.next_due = now + entry.interval;
            }
            fired.push((*id, entry.handler.clone()));
        }
        fired
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.values().map(|e| e.next_due).min()
    }
}

impl fmt::Debug for CallbackScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackScheduler")
            .field("entries", &self.entries.keys().collect::<Vec<_>>())
            .field("next_id", &self.next_id)
            .finish()
    }
}

/// Shared scheduler plus the notifier that wakes the processing loop
#[derive(Clone, Debug)]
pub struct SchedulerHandle {
    scheduler: Arc<Mutex<CallbackScheduler>>,
    wake: Arc<Notify>,
}

impl SchedulerHandle {
    pub(crate) fn new(wake: Arc<Notify>) -> Self {
        Self {
            scheduler: Arc::new(Mutex::new(CallbackScheduler::new())),
            wake,
        }
    }

    pub fn add(
        &self,
        interval: Duration,
        first_delay: Duration,
        handler: Arc<dyn RepeatedCallbackHandler>,
    ) -> UaResult<u64> {
        let id = self
            .scheduler
            .lock()
            .add(interval, first_delay, handler, Instant::now())?;
        self.wake.notify_one();
        Ok(id)
    }

    pub fn change_interval(&self, id: u64, interval: Duration) -> UaResult<()> {
        self.scheduler
            .lock()
            .change_interval(id, interval, Instant::now())?;
        self.wake.notify_one();
        Ok(())
    }

    pub fn remove(&self, id: u64) -> UaResult<()> {
        self.scheduler.lock().remove(id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.scheduler.lock().contains(id)
    }

    pub(crate) fn clear(&self) {
        self.scheduler.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.scheduler.lock().len()
    }

    pub(crate) fn due(&self, now: Instant) -> Vec<(u64, Arc<dyn RepeatedCallbackHandler>)> {
        self.scheduler.lock().due(now)
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.lock().next_deadline()
    }
}

/// A periodic callback owned by user code
///
/// The callback is `Unstarted` (id 0) until [`RepeatedCallback::start`]
/// registers it with the server's scheduler. Dropping a running callback
/// stops it.
pub struct RepeatedCallback {
    scheduler: SchedulerHandle,
    handler: Arc<dyn RepeatedCallbackHandler>,
    interval_ms: u64,
    id: u64,
    last_error: StatusCode,
}

impl RepeatedCallback {
    pub const DEFAULT_INTERVAL_MS: u64 = 1000;

    /// Callback with the default interval
    pub fn new(server: &Server, handler: impl RepeatedCallbackHandler + 'static) -> Self {
        Self::with_interval(server, Self::DEFAULT_INTERVAL_MS, handler)
    }

    pub fn with_interval(
        server: &Server,
        interval_ms: u64,
        handler: impl RepeatedCallbackHandler + 'static,
    ) -> Self {
        Self::from_handler(server.scheduler().clone(), interval_ms, Arc::new(handler))
    }

    /// Callback over a synchronous closure
    pub fn from_fn<F>(server: &Server, interval_ms: u64, f: F) -> Self
    where
        F: Fn(&Arc<Server>, u64) -> UaResult<()> + Send + Sync + 'static,
    {
        Self::with_interval(server, interval_ms, FnCallback::new(f))
    }

    pub(crate) fn from_handler(
        scheduler: SchedulerHandle,
        interval_ms: u64,
        handler: Arc<dyn RepeatedCallbackHandler>,
    ) -> Self {
        Self {
            scheduler,
            handler,
            interval_ms,
            id: 0,
            last_error: StatusCode::GOOD,
        }
    }

    /// Start firing every interval; a no-op while running
    pub fn start(&mut self) -> UaResult<()> {
        self.start_with_delay(self.interval_ms)
    }

    /// Start with an explicit delay before the first firing
    pub fn start_with_delay(&mut self, first_delay_ms: u64) -> UaResult<()> {
        if self.is_running() {
            self.last_error = StatusCode::GOOD;
            return Ok(());
        }
        let result = self.scheduler.add(
            Duration::from_millis(self.interval_ms),
            Duration::from_millis(first_delay_ms),
            self.handler.clone(),
        );
        match result {
            Ok(id) => {
                self.id = id;
                self.last_error = StatusCode::GOOD;
                log::debug!("Repeated callback {} started every {} ms", id, self.interval_ms);
                Ok(())
            }
            Err(e) => {
                self.last_error = e.status_code();
                Err(e)
            }
        }
    }

    /// Change the period; a running callback keeps its id
    pub fn change_interval(&mut self, interval_ms: u64) -> UaResult<()> {
        if interval_ms == 0 {
            self.last_error = StatusCode::BAD_INVALID_ARGUMENT;
            return Err(StatusCode::BAD_INVALID_ARGUMENT.into());
        }
        if self.is_running() {
            if let Err(e) = self
                .scheduler
                .change_interval(self.id, Duration::from_millis(interval_ms))
            {
                self.last_error = e.status_code();
                return Err(e);
            }
        }
        self.interval_ms = interval_ms;
        self.last_error = StatusCode::GOOD;
        Ok(())
    }

    /// Deregister and return to `Unstarted`
    pub fn stop(&mut self) -> UaResult<()> {
        if self.id != 0 && self.scheduler.remove(self.id).is_ok() {
            log::debug!("Repeated callback {} stopped", self.id);
        }
        self.id = 0;
        self.last_error = StatusCode::GOOD;
        Ok(())
    }

    /// Scheduler id, 0 while not started
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Check if the scheduler still holds this callback
    ///
    /// Turns false when the server terminates, even without `stop`.
    pub fn is_running(&self) -> bool {
        self.id != 0 && self.scheduler.contains(self.id)
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    pub fn last_error(&self) -> StatusCode {
        self.last_error
    }
}

impl Drop for RepeatedCallback {
    fn drop(&mut self) {
        if self.id != 0 && self.scheduler.remove(self.id).is_ok() {
            log::debug!("Repeated callback {} dropped", self.id);
        }
    }
}

impl fmt::Debug for RepeatedCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepeatedCallback")
            .field("id", &self.id)
            .field("interval_ms", &self.interval_ms)
            .field("last_error", &self.last_error)
            .finish()
    }
}
