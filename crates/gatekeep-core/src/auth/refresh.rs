//! Background renewal of the access token.
//!
//! The scheduler follows the session store: while the session is
//! authenticated and holds a refresh token a single timer is armed; when it
//! fires the token pair is rotated through the Auth service. A rejected
//! refresh ends the session instead of being retried, since a refresh token
//! the service refused will not become valid before the next tick.
//!
//! Refreshes are single-flight: timer ticks and manual `refresh_now` calls
//! that overlap share one request. A refresh is never cancelled once sent;
//! if the session is cleared or replaced before it resolves, its result is
//! dropped by the store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::api::{AuthError, AuthGateway};

use super::store::SessionStore;

/// Where the scheduler is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No refreshable session, or no timer running
    Idle,
    /// Timer set; a refresh happens after `interval`
    Armed { interval: Duration },
    /// A refresh request is in flight
    Refreshing,
}

type SharedRefresh = Shared<BoxFuture<'static, Result<(), AuthError>>>;

struct Inner {
    store: Arc<SessionStore>,
    gateway: Arc<dyn AuthGateway>,
    interval: Duration,
    in_flight: Mutex<Option<SharedRefresh>>,
    // Id and abort handle of the one live timer task
    timer: Mutex<Option<(u64, AbortHandle)>>,
    next_timer_id: AtomicU64,
    state_tx: watch::Sender<SchedulerState>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Keeps the session's access token fresh.
/// Clone is cheap; clones share the same timer and in-flight refresh.
#[derive(Clone)]
pub struct RefreshScheduler {
    inner: Arc<Inner>,
}

impl RefreshScheduler {
    pub fn new(store: Arc<SessionStore>, gateway: Arc<dyn AuthGateway>, interval: Duration) -> Self {
        let (state_tx, _) = watch::channel(SchedulerState::Idle);
        Self {
            inner: Arc::new(Inner {
                store,
                gateway,
                interval,
                in_flight: Mutex::new(None),
                timer: Mutex::new(None),
                next_timer_id: AtomicU64::new(0),
                state_tx,
            }),
        }
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    pub fn state(&self) -> SchedulerState {
        *self.inner.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SchedulerState> {
        self.inner.state_tx.subscribe()
    }

    /// Start following the session store.
    ///
    /// The timer runs until the returned handle is dropped or stopped. Only
    /// one timer exists at a time: starting again replaces the previous one.
    pub fn start(&self) -> RefreshHandle {
        let mut timer = lock(&self.inner.timer);
        if let Some((old_id, old)) = timer.take() {
            debug!(timer_id = old_id, "Replacing existing refresh timer");
            old.abort();
        }

        let id = self.inner.next_timer_id.fetch_add(1, Ordering::Relaxed);
        let task = tokio::spawn(Inner::run_timer(Arc::clone(&self.inner)));
        *timer = Some((id, task.abort_handle()));
        debug!(timer_id = id, interval_secs = self.inner.interval.as_secs_f64(), "Refresh timer started");

        RefreshHandle {
            id,
            task,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Refresh now, joining a refresh that is already in flight.
    ///
    /// On rejection the session has already been logged out by the time
    /// this returns. Fails with `NotAuthenticated` when there is no
    /// refreshable session.
    pub async fn refresh_now(&self) -> Result<(), AuthError> {
        Inner::refresh_shared(&self.inner).await
    }
}

impl Inner {
    fn timer_active(&self) -> bool {
        lock(&self.timer).is_some()
    }

    fn set_state(&self, next: SchedulerState) {
        self.state_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    /// State after a refresh, or after the timer changes hands
    fn settle_state(&self) {
        let next = if self.timer_active() && self.store.status().is_refreshable() {
            SchedulerState::Armed {
                interval: self.interval,
            }
        } else {
            SchedulerState::Idle
        };
        self.set_state(next);
    }

    async fn run_timer(inner: Arc<Inner>) {
        let mut status_rx = inner.store.subscribe();
        loop {
            let armed = status_rx.borrow_and_update().is_refreshable();
            if !armed {
                inner.set_state(SchedulerState::Idle);
                if status_rx.changed().await.is_err() {
                    break;
                }
                continue;
            }

            inner.set_state(SchedulerState::Armed {
                interval: inner.interval,
            });
            tokio::select! {
                changed = status_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    debug!("Session changed, re-arming refresh timer");
                }
                () = tokio::time::sleep(inner.interval) => {
                    debug!("Refresh timer fired");
                    // Failures are handled inside the refresh itself
                    let _ = Inner::refresh_shared(&inner).await;
                }
            }
        }
        inner.set_state(SchedulerState::Idle);
    }

    fn refresh_shared(inner: &Arc<Inner>) -> SharedRefresh {
        let mut in_flight = lock(&inner.in_flight);
        if let Some(existing) = in_flight.as_ref() {
            debug!("Joining in-flight refresh");
            return existing.clone();
        }

        // Spawned so the request completes even if every waiter goes away.
        let task_inner = Arc::clone(inner);
        let task = tokio::spawn(async move {
            let result = task_inner.perform_refresh().await;
            *lock(&task_inner.in_flight) = None;
            task_inner.settle_state();
            result
        });

        let shared = async move {
            task.await.unwrap_or_else(|e| {
                error!(error = %e, "Refresh task failed");
                Err(AuthError::NetworkError(format!("refresh task failed: {}", e)))
            })
        }
        .boxed()
        .shared();

        *in_flight = Some(shared.clone());
        shared
    }

    async fn perform_refresh(&self) -> Result<(), AuthError> {
        let Some(ticket) = self.store.refresh_ticket() else {
            debug!("Nothing to refresh");
            return Err(AuthError::NotAuthenticated);
        };

        self.set_state(SchedulerState::Refreshing);

        let tokens = match self.gateway.refresh(ticket.refresh_token()).await {
            Ok(tokens) => tokens,
            Err(e) => {
                if self.store.logout_if_current(&ticket) {
                    let failures = self.store.record_authentication_error();
                    warn!(error = %e, failures, "Token refresh failed, session ended");
                } else {
                    debug!(error = %e, "Token refresh failed for a session that already ended");
                }
                return Err(e);
            }
        };

        match self.store.apply_refresh(&ticket, tokens) {
            Ok(true) => {
                info!("Access token refreshed");
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(e) => {
                error!(error = %e, "Failed to persist refreshed tokens, ending session");
                self.store.logout_if_current(&ticket);
                Err(AuthError::SessionStorage(e.to_string()))
            }
        }
    }
}

/// Owns the refresh timer. Dropping it cancels the timer; a refresh already
/// in flight still completes.
pub struct RefreshHandle {
    id: u64,
    task: JoinHandle<()>,
    inner: Arc<Inner>,
}

impl RefreshHandle {
    /// Cancel the timer
    pub fn stop(self) {}

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.task.abort();

        let mut timer = lock(&self.inner.timer);
        // A later start() may already have replaced this timer
        if timer.as_ref().is_some_and(|(id, _)| *id == self.id) {
            *timer = None;
            drop(timer);
            if *self.inner.state_tx.borrow() != SchedulerState::Refreshing {
                self.inner.set_state(SchedulerState::Idle);
            }
            debug!(timer_id = self.id, "Refresh timer stopped");
        }
    }
}
