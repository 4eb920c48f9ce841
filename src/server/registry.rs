//! Live connection tracking and idle-timeout enforcement
//!
//! Every accepted connection registers here and gets back a [`Registration`]
//! guard. The connection task owns its own state; the registry only keeps the
//! shared [`Activity`] cell (last-activity time and timeout) plus a close
//! signal, which is all the periodic sweep needs.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// How often the sweeper looks for idle connections
pub const SWEEP_PERIOD: Duration = Duration::from_secs(1);

/// Identity of a registered connection
pub type ConnectionId = u64;

/// Activity timestamps shared between a connection and the sweeper.
///
/// Values are stored as milliseconds since `origin` in atomics so the sweep
/// can read them without locking and without torn values.
#[derive(Debug)]
pub struct Activity {
    origin: Instant,
    last_ms: AtomicU64,
    /// 0 means no timeout
    timeout_ms: AtomicU64,
}

impl Activity {
    pub fn new(now: Instant) -> Self {
        Self {
            origin: now,
            last_ms: AtomicU64::new(0),
            timeout_ms: AtomicU64::new(0),
        }
    }

    /// Records activity at `now`.
    pub fn touch(&self, now: Instant) {
        let ms = millis(now.saturating_duration_since(self.origin));
        self.last_ms.store(ms, Ordering::Relaxed);
    }

    pub fn last_activity(&self) -> Instant {
        self.origin + Duration::from_millis(self.last_ms.load(Ordering::Relaxed))
    }

    /// Sets the idle timeout; `None` or a zero duration disables it.
    pub fn set_timeout(&self, timeout: Option<Duration>) {
        // Sub-millisecond timeouts still count as timeouts.
        let ms = timeout.map_or(0, |t| if t.is_zero() { 0 } else { millis(t).max(1) });
        self.timeout_ms.store(ms, Ordering::Relaxed);
    }

    pub fn timeout(&self) -> Option<Duration> {
        match self.timeout_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// True when a timeout is set and more than that has passed since the
    /// last activity.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.timeout()
            .is_some_and(|timeout| now.saturating_duration_since(self.last_activity()) > timeout)
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Debug)]
struct Entry {
    activity: Arc<Activity>,
    close: Arc<Notify>,
}

/// The set of live connections.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: Mutex<HashMap<ConnectionId, Entry>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection, active as of `now`.
    ///
    /// The connection stays registered until the returned guard is dropped.
    pub fn register(self: &Arc<Self>, now: Instant) -> Registration {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let activity = Arc::new(Activity::new(now));
        let close = Arc::new(Notify::new());

        self.entries.lock().insert(
            id,
            Entry {
                activity: Arc::clone(&activity),
                close: Arc::clone(&close),
            },
        );

        tracing::trace!(connection = id, "Registered connection");

        Registration {
            id,
            registry: Arc::clone(self),
            activity,
            close,
        }
    }

    /// Removes a connection. Returns false if it was not registered.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        let removed = self.entries.lock().remove(&id).is_some();
        if removed {
            tracing::trace!(connection = id, "Unregistered connection");
        }
        removed
    }

    /// Signals every connection idle for longer than its timeout to close.
    ///
    /// Closed connections unregister themselves when their task ends, so an
    /// entry may be signalled on more than one sweep. Returns how many
    /// connections were signalled.
    pub fn sweep(&self, now: Instant) -> usize {
        let entries = self.entries.lock();
        let mut closed = 0;

        for (id, entry) in entries.iter() {
            if entry.activity.is_expired(now) {
                tracing::debug!(
                    connection = id,
                    timeout = ?entry.activity.timeout(),
                    "Closing idle connection"
                );
                entry.close.notify_one();
                closed += 1;
            }
        }

        closed
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.entries.lock().contains_key(&id)
    }

    /// Number of live connections
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Membership of one connection in a [`ConnectionRegistry`].
///
/// Dropping it unregisters the connection.
#[derive(Debug)]
pub struct Registration {
    id: ConnectionId,
    registry: Arc<ConnectionRegistry>,
    activity: Arc<Activity>,
    close: Arc<Notify>,
}

impl Registration {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn activity(&self) -> &Arc<Activity> {
        &self.activity
    }

    /// Completes once the sweeper has asked this connection to close.
    ///
    /// A close request made while nobody is waiting is kept, so it is not
    /// lost between polls.
    pub async fn closed(&self) {
        self.close.notified().await;
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}

/// Spawns the background task that sweeps `registry` every [`SWEEP_PERIOD`].
pub fn spawn_sweeper(registry: Arc<ConnectionRegistry>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let closed = registry.sweep(Instant::now());
            if closed > 0 {
                tracing::debug!(closed, live = registry.len(), "Idle sweep");
            }
        }
    })
}
