//! Connection registry.
//!
//! Maps device names to live sessions and guarantees that at most one
//! dial is in flight per name:
//!
//! 1. a shared-lock lookup answers the common case (session exists);
//! 2. on a miss, the exclusive lock is taken and the map re-checked;
//! 3. if still absent, one dial runs *while holding the exclusive lock*,
//!    the session is inserted, the lock released, and a supervisor spawned.
//!
//! Callers that arrive while a dial is in flight queue on the lock and
//! observe its outcome: the new session on success, the same failure
//! otherwise. A caller arriving after a failure starts a fresh dial.
//!
//! Every supervised device also holds a `Lifeline`: a child of the
//! fleet generation token that outlives the map entry while the
//! supervisor reconnects. Removing the device cancels it, so a redial in
//! flight can never reinstall a device the host asked to forget.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::CoreError;
use crate::forwarder::{self, EventSink};
use crate::model::DeviceAddress;
use crate::retry::RetryPolicy;
use crate::session::{Dialer, Session};
use crate::supervisor::Supervisor;

/// A supervisor's claim on a device name.
struct Lifeline {
    id: u64,
    cancel: CancellationToken,
    address: DeviceAddress,
}

/// Everything behind the registry lock.
struct Fleet<S> {
    sessions: HashMap<String, Arc<S>>,
    /// One per supervised name, connected or reconnecting.
    lifelines: HashMap<String, Lifeline>,
    next_lifeline: u64,
    /// Cancelled when the fleet is drained; supervisors of that generation
    /// stop redialing.
    cancel: CancellationToken,
}

impl<S> Fleet<S> {
    /// Claim `name` for a new supervisor, cutting any previous one loose.
    fn claim(&mut self, name: &str, address: &DeviceAddress) -> (u64, CancellationToken) {
        self.next_lifeline += 1;
        let lifeline = Lifeline {
            id: self.next_lifeline,
            cancel: self.cancel.child_token(),
            address: address.clone(),
        };
        let claim = (lifeline.id, lifeline.cancel.clone());
        if let Some(stale) = self.lifelines.insert(name.to_owned(), lifeline) {
            stale.cancel.cancel();
        }
        claim
    }
}

/// Completed dial count and last failure per device name. Dropped once a
/// dial succeeds or the device is removed.
#[derive(Debug, Default)]
struct DialOutcome {
    completed: u64,
    failure: Option<String>,
}

pub struct Registry<D: Dialer> {
    pub(crate) dialer: D,
    pub(crate) retry: RetryPolicy,
    shutdown_timeout: Duration,
    sink: EventSink,
    fleet: RwLock<Fleet<D::Session>>,
    dials: DashMap<String, DialOutcome>,
}

impl<D: Dialer> Registry<D> {
    pub fn new(dialer: D, retry: RetryPolicy, shutdown_timeout: Duration, sink: EventSink) -> Self {
        Self {
            dialer,
            retry,
            shutdown_timeout,
            sink,
            fleet: RwLock::new(Fleet {
                sessions: HashMap::new(),
                lifelines: HashMap::new(),
                next_lifeline: 0,
                cancel: CancellationToken::new(),
            }),
            dials: DashMap::new(),
        }
    }

    // ── Lookup / creation ────────────────────────────────────────────

    /// Return the session for `name`, dialing `address` if there is none.
    pub async fn get_or_create(
        self: &Arc<Self>,
        name: &str,
        address: &DeviceAddress,
    ) -> Result<Arc<D::Session>, CoreError> {
        let seen = self.completed_dials(name);

        if let Some(session) = self.get(name).await {
            return Ok(session);
        }

        let mut fleet = self.fleet.write().await;
        if let Some(session) = fleet.sessions.get(name) {
            return Ok(Arc::clone(session));
        }
        if let Some(reason) = self.failure_since(name, seen) {
            return Err(connection_failed(name, address, reason));
        }

        tracing::info!(device = %name, %address, "connecting to reader");
        let session = match self.dialer.dial(name, address).await {
            Ok(session) => {
                self.record_dial(name, None);
                Arc::new(session)
            }
            Err(e) => {
                let reason = e.to_string();
                self.record_dial(name, Some(reason.clone()));
                tracing::warn!(device = %name, %address, error = %e, "dial failed");
                return Err(connection_failed(name, address, reason));
            }
        };

        self.attach(&mut fleet, name, &session);
        let (lifeline, cancel) = fleet.claim(name, address);
        drop(fleet);

        Supervisor::new(name, address.clone(), Arc::clone(self), lifeline, cancel)
            .spawn(Arc::clone(&session));
        Ok(session)
    }

    pub async fn get(&self, name: &str) -> Option<Arc<D::Session>> {
        self.fleet
            .read()
            .await
            .sessions
            .get(name)
            .map(Arc::clone)
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.fleet.read().await.sessions.contains_key(name)
    }

    pub async fn len(&self) -> usize {
        self.fleet.read().await.sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// The address `name` is connected to, or being reconnected to.
    pub async fn address_of(&self, name: &str) -> Option<DeviceAddress> {
        self.fleet
            .read()
            .await
            .lifelines
            .get(name)
            .map(|lifeline| lifeline.address.clone())
    }

    /// Whether a supervisor still answers for `name`.
    pub async fn is_supervised(&self, name: &str) -> bool {
        self.fleet.read().await.lifelines.contains_key(name)
    }

    /// Addresses of every supervised device, reconnecting ones included.
    pub async fn addresses(&self) -> Vec<DeviceAddress> {
        self.fleet
            .read()
            .await
            .lifelines
            .values()
            .map(|lifeline| lifeline.address.clone())
            .collect()
    }

    // ── Removal ──────────────────────────────────────────────────────

    /// Remove `name`, stop its supervisor and close its session gracefully
    /// in the background. A supervisor in the middle of reconnecting stops
    /// without reinstalling the device.
    ///
    /// Returns `false` if nothing was registered or supervised under `name`.
    pub async fn remove(&self, name: &str) -> bool {
        let (session, lifeline) = {
            let mut fleet = self.fleet.write().await;
            let lifeline = fleet.lifelines.remove(name);
            if let Some(lifeline) = &lifeline {
                lifeline.cancel.cancel();
            }
            (fleet.sessions.remove(name), lifeline)
        };
        self.dials.remove(name);

        let Some(session) = session else {
            if lifeline.is_some() {
                tracing::info!(device = %name, "removing reconnecting reader");
            }
            return lifeline.is_some();
        };
        tracing::info!(device = %name, "removing reader session");
        let name = name.to_owned();
        let grace = self.shutdown_timeout;
        tokio::spawn(async move {
            stop_session(&name, session.as_ref(), false, grace).await;
        });
        true
    }

    /// Drop the lifeline of a supervisor that stopped on its own, unless a
    /// newer supervisor has claimed the name since.
    pub(crate) async fn retire(&self, name: &str, lifeline: u64) {
        let mut fleet = self.fleet.write().await;
        if fleet.lifelines.get(name).is_some_and(|l| l.id == lifeline) {
            fleet.lifelines.remove(name);
        }
    }

    /// Remove `name` only if it still maps to exactly `session`.
    pub(crate) async fn remove_if_same(&self, name: &str, session: &Arc<D::Session>) -> bool {
        let mut fleet = self.fleet.write().await;
        match fleet.sessions.get(name) {
            Some(current) if Arc::ptr_eq(current, session) => {
                fleet.sessions.remove(name);
                true
            }
            _ => false,
        }
    }

    /// Install a redialed session unless the slot was filled meanwhile or
    /// the supervisor's lifeline was cut (device removed or fleet drained).
    /// On refusal the session is closed.
    pub(crate) async fn install(
        &self,
        name: &str,
        session: D::Session,
        cancel: &CancellationToken,
    ) -> Option<Arc<D::Session>> {
        let session = Arc::new(session);
        let mut fleet = self.fleet.write().await;
        if cancel.is_cancelled() || fleet.sessions.contains_key(name) {
            drop(fleet);
            tracing::debug!(device = %name, "discarding redialed session");
            if let Err(e) = session.close().await {
                if !e.is_closed() {
                    tracing::warn!(device = %name, error = %e, "failed to close discarded session");
                }
            }
            return None;
        }
        self.attach(&mut fleet, name, &session);
        Some(session)
    }

    // ── Shutdown ─────────────────────────────────────────────────────

    /// Drain the registry and close every session.
    ///
    /// The map is swapped for an empty one under the lock, so new commands
    /// start a fresh generation. With `force == false` each session gets a
    /// graceful close (bounded by the shutdown timeout, falling back to a
    /// forceful close) and this call waits for all of them; with
    /// `force == true` sessions are closed forcefully and this call returns
    /// without waiting.
    pub async fn stop_all(&self, force: bool) {
        let drained = {
            let mut fleet = self.fleet.write().await;
            fleet.cancel.cancel();
            fleet.cancel = CancellationToken::new();
            fleet.lifelines.clear();
            std::mem::take(&mut fleet.sessions)
        };
        tracing::info!(sessions = drained.len(), force, "stopping all reader sessions");

        let grace = self.shutdown_timeout;
        let tasks: Vec<_> = drained
            .into_iter()
            .map(|(name, session)| {
                tokio::spawn(async move {
                    stop_session(&name, session.as_ref(), force, grace).await;
                })
            })
            .collect();

        if force {
            return;
        }
        for result in futures_util::future::join_all(tasks).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "session close task failed");
            }
        }
    }

    // ── Internals ────────────────────────────────────────────────────

    fn attach(&self, fleet: &mut Fleet<D::Session>, name: &str, session: &Arc<D::Session>) {
        forwarder::spawn(name.to_owned(), session.subscribe(), self.sink.clone());
        fleet.sessions.insert(name.to_owned(), Arc::clone(session));
    }

    fn completed_dials(&self, name: &str) -> u64 {
        self.dials.get(name).map_or(0, |outcome| outcome.completed)
    }

    /// The failure of a dial that completed after the caller arrived.
    fn failure_since(&self, name: &str, seen: u64) -> Option<String> {
        let outcome = self.dials.get(name)?;
        if outcome.completed > seen {
            outcome.failure.clone()
        } else {
            None
        }
    }

    /// A success drops the record: waiters find the session in the map, and
    /// a later caller that read a stale count only dials for itself.
    fn record_dial(&self, name: &str, failure: Option<String>) {
        let Some(failure) = failure else {
            self.dials.remove(name);
            return;
        };
        let mut outcome = self.dials.entry(name.to_owned()).or_default();
        outcome.completed += 1;
        outcome.failure = Some(failure);
    }
}

fn connection_failed(name: &str, address: &DeviceAddress, reason: String) -> CoreError {
    CoreError::ConnectionFailed {
        device: name.to_owned(),
        address: address.to_string(),
        reason,
    }
}

/// Close one session: graceful first unless `force`, forceful as fallback.
/// An already-closed session counts as closed.
pub(crate) async fn stop_session<S: Session>(name: &str, session: &S, force: bool, grace: Duration) {
    if !force {
        match tokio::time::timeout(grace, session.shutdown(grace)).await {
            Ok(Ok(())) => {
                tracing::debug!(device = %name, "session shut down");
                return;
            }
            Ok(Err(e)) if e.is_closed() => return,
            Ok(Err(e)) => {
                tracing::warn!(device = %name, error = %e, "graceful shutdown failed, forcing close");
            }
            Err(_) => {
                tracing::warn!(device = %name, "graceful shutdown timed out, forcing close");
            }
        }
    }
    match session.close().await {
        Ok(()) => tracing::debug!(device = %name, "session closed"),
        Err(e) if e.is_closed() => {}
        Err(e) => tracing::error!(device = %name, error = %e, "failed to close session"),
    }
}

impl<D: Dialer> std::fmt::Debug for Registry<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("retry", &self.retry)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish_non_exhaustive()
    }
}

// ── Tests ────────────────────────────────────────────────────────────
