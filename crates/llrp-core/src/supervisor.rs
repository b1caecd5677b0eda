//! Per-device connection supervisor.
//!
//! One task per registered session. It occupies the session until the
//! connection ends, then decides whether the end was intentional. An
//! unexpected drop removes the stale entry and redials under the
//! registry's retry policy; an intentional close, a refusal the reader
//! will not take back, or removal of the device ends the task.
//!
//! ```text
//!   Dialing ──ok──▶ Connected ──drop──▶ Reconnecting ──▶ Dialing
//!      │                │
//!      └─fatal─▶ Removed ◀─closed/refused─┘
//! ```

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::model::DeviceAddress;
use crate::registry::Registry;
use crate::retry::RetryError;
use crate::session::{Dialer, Session};

type ApiError = llrp_api::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Dialing,
    Connected,
    Reconnecting,
    Removed,
}

/// Where a supervisor goes once `occupy` returns.
///
/// `Ok` and `ClientClosed` mean somebody closed the session on purpose. A
/// greeting that refuses the connection for good ends supervision too,
/// since redialing would only be refused again. Anything else is a drop
/// worth recovering from.
pub fn after_occupy(result: &Result<(), ApiError>) -> SupervisorState {
    match result {
        Ok(()) => SupervisorState::Removed,
        Err(e) if e.is_closed() => SupervisorState::Removed,
        Err(e @ ApiError::ConnectionAttemptFailed(_)) if !e.is_transient() => {
            SupervisorState::Removed
        }
        Err(_) => SupervisorState::Reconnecting,
    }
}

pub(crate) struct Supervisor<D: Dialer> {
    name: String,
    address: DeviceAddress,
    registry: Arc<Registry<D>>,
    lifeline: u64,
    /// Cut when the device is removed or the fleet drained.
    cancel: CancellationToken,
    /// Consecutive drops of short-lived sessions.
    streak: u32,
}

impl<D: Dialer> Supervisor<D> {
    pub(crate) fn new(
        name: &str,
        address: DeviceAddress,
        registry: Arc<Registry<D>>,
        lifeline: u64,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            name: name.to_owned(),
            address,
            registry,
            lifeline,
            cancel,
            streak: 0,
        }
    }

    pub(crate) fn spawn(self, session: Arc<D::Session>) -> JoinHandle<()> {
        tokio::spawn(self.run(session))
    }

    async fn run(mut self, mut session: Arc<D::Session>) {
        let mut state = SupervisorState::Connected;
        loop {
            tracing::trace!(device = %self.name, ?state, "supervisor state");
            state = match state {
                SupervisorState::Connected => self.occupy(&session).await,
                SupervisorState::Reconnecting => self.reconnecting(&session).await,
                SupervisorState::Dialing => match self.redial().await {
                    Some(next) => {
                        session = next;
                        SupervisorState::Connected
                    }
                    None => SupervisorState::Removed,
                },
                SupervisorState::Removed => break,
            };
        }
        self.registry.retire(&self.name, self.lifeline).await;
        tracing::debug!(device = %self.name, "supervisor stopped");
    }

    async fn occupy(&mut self, session: &Arc<D::Session>) -> SupervisorState {
        let started = Instant::now();
        let result = session.occupy().await;
        let next = after_occupy(&result);

        match (&result, next) {
            (Err(e), SupervisorState::Reconnecting) => {
                tracing::error!(device = %self.name, error = %e, "reader connection dropped");
            }
            (Err(e @ ApiError::ConnectionAttemptFailed(_)), _) => {
                tracing::error!(device = %self.name, error = %e, "reader refused the connection, giving up");
            }
            _ => tracing::info!(device = %self.name, "reader connection closed"),
        }

        if started.elapsed() >= self.registry.retry.max_delay {
            self.streak = 0;
        } else {
            self.streak = self.streak.saturating_add(1);
        }

        if next == SupervisorState::Removed {
            self.registry.remove_if_same(&self.name, session).await;
            if result.is_err() {
                close_quietly(&self.name, session.as_ref()).await;
            }
        }
        next
    }

    /// Drop the stale entry, then back off if sessions keep dying young.
    async fn reconnecting(&self, session: &Arc<D::Session>) -> SupervisorState {
        self.registry.remove_if_same(&self.name, session).await;
        close_quietly(&self.name, session.as_ref()).await;

        if self.streak > 1 {
            let delay = self.registry.retry.delay_for(self.streak - 2);
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return SupervisorState::Removed,
                () = tokio::time::sleep(delay) => {}
            }
        }
        if self.cancel.is_cancelled() {
            return SupervisorState::Removed;
        }
        SupervisorState::Dialing
    }

    async fn redial(&self) -> Option<Arc<D::Session>> {
        tracing::info!(device = %self.name, address = %self.address, "reconnecting to reader");
        let registry = &self.registry;
        let (name, address) = (self.name.as_str(), &self.address);

        let result = registry
            .retry
            .retry_some(
                &self.cancel,
                move || registry.dialer.dial(name, address),
                ApiError::is_transient,
            )
            .await;

        match result {
            Ok(fresh) => {
                let installed = registry
                    .install(&self.name, fresh, &self.cancel)
                    .await;
                if installed.is_some() {
                    tracing::info!(device = %self.name, "reader reconnected");
                }
                installed
            }
            Err(RetryError::Cancelled) => None,
            Err(e) => {
                tracing::error!(device = %self.name, error = %e, "giving up on reader");
                None
            }
        }
    }
}

async fn close_quietly<S: Session>(name: &str, session: &S) {
    if let Err(e) = session.close().await {
        if !e.is_closed() {
            tracing::warn!(device = %name, error = %e, "failed to close dropped session");
        }
    }
}

impl<D: Dialer> std::fmt::Debug for Supervisor<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("streak", &self.streak)
            .finish_non_exhaustive()
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use llrp_api::ConnectionAttemptStatus;

    use super::*;
    use crate::forwarder::EventSink;
    use crate::retry::RetryPolicy;
    use crate::session::fake::{FakeDial, FakeDialer};

    fn registry(dialer: FakeDialer) -> Arc<Registry<FakeDialer>> {
        registry_with(dialer, Duration::from_millis(5))
    }

    /// A registry whose redials wait at least `initial_delay` after a failure.
    fn registry_with(dialer: FakeDialer, initial_delay: Duration) -> Arc<Registry<FakeDialer>> {
        let (tx, _) = mpsc::channel(8);
        Arc::new(Registry::new(
            dialer,
            RetryPolicy {
                initial_delay,
                max_delay: initial_delay * 4,
                max_attempts: None,
            },
            Duration::from_secs(1),
            EventSink::new(tx),
        ))
    }

    fn addr() -> DeviceAddress {
        DeviceAddress::new("10.0.0.5", 5084)
    }

    async fn wait_until<F: Fn() -> bool>(check: F) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[test]
    fn intentional_close_ends_supervision() {
        assert_eq!(after_occupy(&Ok(())), SupervisorState::Removed);
        assert_eq!(
            after_occupy(&Err(ApiError::ClientClosed)),
            SupervisorState::Removed
        );
    }

    #[test]
    fn unexpected_end_triggers_reconnect() {
        assert_eq!(
            after_occupy(&Err(ApiError::ConnectionLost)),
            SupervisorState::Reconnecting
        );
        let reset = ApiError::Io(std::io::Error::from(std::io::ErrorKind::ConnectionReset));
        assert_eq!(after_occupy(&Err(reset)), SupervisorState::Reconnecting);
    }

    #[test]
    fn refusal_for_good_ends_supervision() {
        let refused = ApiError::ConnectionAttemptFailed(ConnectionAttemptStatus::from_code(3));
        assert_eq!(after_occupy(&Err(refused)), SupervisorState::Removed);
    }

    #[test]
    fn refusal_while_another_client_holds_the_reader_is_retried() {
        let busy = ApiError::ConnectionAttemptFailed(ConnectionAttemptStatus::from_code(2));
        assert_eq!(after_occupy(&Err(busy)), SupervisorState::Reconnecting);
    }

    #[tokio::test]
    async fn dropped_session_is_replaced() {
        let reg = registry(FakeDialer::default());
        let first = reg.get_or_create("R1", &addr()).await.unwrap();

        first.drop_connection();
        wait_until(|| reg.dialer.dial_count() == 2).await;

        let reg2 = Arc::clone(&reg);
        tokio::time::timeout(Duration::from_secs(2), async move {
            loop {
                if let Some(s) = reg2.get("R1").await {
                    if s.generation == 2 {
                        return;
                    }
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert!(first.is_closed());
    }

    #[tokio::test]
    async fn transient_dial_errors_are_retried() {
        // First dial accepts, the next two redials time out, the third works.
        let reg = registry(FakeDialer::with_script([
            FakeDial::Accept,
            FakeDial::TimeOut,
            FakeDial::TimeOut,
        ]));
        let first = reg.get_or_create("R1", &addr()).await.unwrap();
        first.drop_connection();

        wait_until(|| reg.dialer.dial_count() == 4).await;
        let reg2 = Arc::clone(&reg);
        tokio::time::timeout(Duration::from_secs(2), async move {
            while !reg2.contains("R1").await {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(reg.get("R1").await.unwrap().generation, 4);
    }

    #[tokio::test]
    async fn fatal_dial_error_removes_the_device() {
        let reg = registry(FakeDialer::with_script([FakeDial::Accept, FakeDial::Refuse]));
        let first = reg.get_or_create("R1", &addr()).await.unwrap();
        first.drop_connection();

        wait_until(|| reg.dialer.dial_count() == 2).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!reg.contains("R1").await);
        assert!(!reg.is_supervised("R1").await);
        assert_eq!(reg.dialer.dial_count(), 2);
    }

    #[tokio::test]
    async fn refused_connection_is_not_redialed() {
        let reg = registry(FakeDialer::default());
        let session = reg.get_or_create("R1", &addr()).await.unwrap();

        session.refuse_connection(ConnectionAttemptStatus::from_code(3));
        let reg2 = Arc::clone(&reg);
        tokio::time::timeout(Duration::from_secs(2), async move {
            while reg2.is_supervised("R1").await {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!reg.contains("R1").await);
        assert!(session.is_closed());
        assert_eq!(reg.dialer.dial_count(), 1);
    }

    #[tokio::test]
    async fn remove_during_reconnect_stops_the_redial() {
        // The first redial fails, leaving the supervisor in its backoff.
        let reg = registry_with(
            FakeDialer::with_script([FakeDial::Accept, FakeDial::TimeOut, FakeDial::TimeOut]),
            Duration::from_millis(200),
        );
        let session = reg.get_or_create("R1", &addr()).await.unwrap();
        session.drop_connection();
        wait_until(|| reg.dialer.dial_count() == 2).await;

        assert!(!reg.contains("R1").await);
        assert!(reg.remove("R1").await);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(reg.dialer.dial_count(), 2);
        assert!(!reg.contains("R1").await);
        assert!(!reg.is_supervised("R1").await);
        assert!(!reg.remove("R1").await);
    }

    #[tokio::test]
    async fn removal_cancels_a_redial_in_flight() {
        let reg = registry(FakeDialer {
            dial_delay: Duration::from_millis(100),
            ..FakeDialer::default()
        });
        let session = reg.get_or_create("R1", &addr()).await.unwrap();
        session.drop_connection();

        // Remove while the redial is still in flight.
        wait_until(|| reg.dialer.dial_count() == 2).await;
        assert!(reg.remove("R1").await);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(!reg.contains("R1").await);
        assert_eq!(reg.dialer.dial_count(), 2);
    }

    #[tokio::test]
    async fn a_fresh_dial_cuts_the_old_supervisor_loose() {
        let reg = registry_with(
            FakeDialer::with_script([FakeDial::Accept, FakeDial::TimeOut]),
            Duration::from_millis(200),
        );
        let first = reg.get_or_create("R1", &addr()).await.unwrap();
        first.drop_connection();
        wait_until(|| reg.dialer.dial_count() == 2).await;

        // A command dials the device itself during the backoff.
        let second = reg.get_or_create("R1", &addr()).await.unwrap();
        assert_eq!(second.generation, 3);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(reg.dialer.dial_count(), 3);
        assert!(Arc::ptr_eq(&reg.get("R1").await.unwrap(), &second));
        assert!(reg.is_supervised("R1").await);
    }

    #[tokio::test]
    async fn closed_session_is_not_redialed() {
        let reg = registry(FakeDialer::default());
        let session = reg.get_or_create("R1", &addr()).await.unwrap();

        session.close().await.unwrap();
        let reg2 = Arc::clone(&reg);
        tokio::time::timeout(Duration::from_secs(2), async move {
            while reg2.contains("R1").await {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(reg.dialer.dial_count(), 1);
    }

    #[tokio::test]
    async fn stop_all_halts_reconnect_loops() {
        let reg = registry(FakeDialer::with_script([
            FakeDial::Accept,
            FakeDial::TimeOut,
            FakeDial::TimeOut,
            FakeDial::TimeOut,
            FakeDial::TimeOut,
            FakeDial::TimeOut,
            FakeDial::TimeOut,
        ]));
        let session = reg.get_or_create("R1", &addr()).await.unwrap();
        session.drop_connection();
        wait_until(|| reg.dialer.dial_count() >= 2).await;

        reg.stop_all(true).await;
        let dials = reg.dialer.dial_count();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(reg.dialer.dial_count() <= dials + 1);
        assert!(!reg.contains("R1").await);
    }
}
