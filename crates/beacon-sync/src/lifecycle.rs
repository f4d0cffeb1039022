//! # Auth Lifecycle
//!
//! Contract between the app's sign-in/sign-out flow and its consumers, and a
//! dispatcher that implements it.
//!
//! ## Dispatch Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sign_out(finalize)                                                     │
//! │                                                                         │
//! │  one deadline = now + callback_timeout, shared by every tier           │
//! │                                                                         │
//! │   priority 10   ┌───────┐ ┌───────┐                                     │
//! │   (tier 1)      │ hook  │ │ hook  │   spawned together, awaited as one  │
//! │                 └───┬───┘ └───┬───┘                                     │
//! │                     └────┬────┘                                         │
//! │                          ▼                                              │
//! │   priority 0    ┌───────┐                                               │
//! │   (tier 2)      │ hook  │             starts after tier 1 resolves      │
//! │                 └───┬───┘                                               │
//! │                     ▼                                                   │
//! │   session cleared, finalize.await                                      │
//! │                                                                         │
//! │  Hooks still running at the deadline are abandoned: their tasks keep   │
//! │  going, nobody waits for them. Tiers not yet started never run and     │
//! │  are counted as abandoned.                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Registering an authenticated hook while a session is active replays the
//! session to that hook immediately, so consumers bound after sign-in do not
//! miss it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::LifecycleSettings;

/// Priority used when the caller has no preference.
pub const DEFAULT_PRIORITY: i32 = 0;

/// Signed-in user as announced to hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
}

impl Session {
    pub fn new(user_id: impl Into<String>) -> Self {
        Session {
            user_id: user_id.into(),
        }
    }
}

/// Called after a user is authenticated.
pub type AuthenticatedHook = Arc<dyn Fn(Session) -> BoxFuture<'static, ()> + Send + Sync>;

/// Called before sign-out finalizes.
pub type LogoutHook = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Registration side of the auth lifecycle.
///
/// Higher priorities run first; hooks sharing a priority run concurrently.
#[async_trait]
pub trait AuthLifecycle: Send + Sync {
    async fn on_authenticated(&self, hook: AuthenticatedHook, priority: i32);

    async fn on_about_to_log_out(&self, hook: LogoutHook, priority: i32);
}

/// Outcome of one dispatch round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub completed: usize,
    /// Hooks that panicked.
    pub failed: usize,
    /// Hooks no longer awaited because the deadline passed.
    pub abandoned: usize,
}

// =============================================================================
// LifecycleDispatcher
// =============================================================================

struct Registered<H> {
    priority: i32,
    hook: H,
}

type Tier = (i32, Vec<BoxFuture<'static, ()>>);

#[derive(Default)]
struct DispatcherState {
    session: Option<Session>,
    /// Highest priority first; equal priorities in registration order.
    authenticated: Vec<Registered<AuthenticatedHook>>,
    logout: Vec<Registered<LogoutHook>>,
}

/// In-process implementation of [`AuthLifecycle`].
pub struct LifecycleDispatcher {
    state: Mutex<DispatcherState>,
    timeout: Duration,
}

impl Default for LifecycleDispatcher {
    fn default() -> Self {
        Self::from_settings(&LifecycleSettings::default())
    }
}

impl LifecycleDispatcher {
    pub fn new(timeout: Duration) -> Self {
        LifecycleDispatcher {
            state: Mutex::new(DispatcherState::default()),
            timeout,
        }
    }

    pub fn from_settings(settings: &LifecycleSettings) -> Self {
        Self::new(settings.callback_timeout())
    }

    /// Shared deadline budget for one dispatch round.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn current_session(&self) -> Option<Session> {
        self.state.lock().await.session.clone()
    }

    /// Records the session and runs every authenticated hook.
    pub async fn sign_in(&self, user_id: impl Into<String>) -> DispatchReport {
        let session = Session::new(user_id);

        let tiers = {
            let mut state = self.state.lock().await;
            state.session = Some(session.clone());
            tiers(&state.authenticated, |hook| hook(session.clone()))
        };

        info!(user_id = %session.user_id, "Session started");
        self.run_tiers(tiers).await
    }

    /// Runs logout hooks, clears the session, then awaits `finalize`.
    ///
    /// `finalize` runs even when hooks overrun the timeout.
    pub async fn sign_out<F>(&self, finalize: F) -> DispatchReport
    where
        F: Future<Output = ()>,
    {
        let tiers = {
            let state = self.state.lock().await;
            if state.session.is_some() {
                tiers(&state.logout, |hook| hook())
            } else {
                debug!("Sign-out without a session, skipping logout hooks");
                Vec::new()
            }
        };

        let report = self.run_tiers(tiers).await;

        self.state.lock().await.session = None;
        finalize.await;

        info!(
            completed = report.completed,
            failed = report.failed,
            abandoned = report.abandoned,
            "Session ended"
        );
        report
    }

    async fn run_tiers(&self, tiers: Vec<Tier>) -> DispatchReport {
        let deadline = Instant::now() + self.timeout;
        let mut report = DispatchReport::default();
        let mut tiers = tiers.into_iter();

        for (priority, hooks) in tiers.by_ref() {
            let mut running: FuturesUnordered<JoinHandle<()>> =
                hooks.into_iter().map(tokio::spawn).collect();

            loop {
                match tokio::time::timeout_at(deadline, running.next()).await {
                    Ok(Some(Ok(()))) => report.completed += 1,
                    Ok(Some(Err(err))) => {
                        warn!(priority, error = %err, "Lifecycle hook failed");
                        report.failed += 1;
                    }
                    Ok(None) => break,
                    Err(_) => {
                        warn!(
                            priority,
                            abandoned = running.len(),
                            timeout_ms = self.timeout.as_millis() as u64,
                            "Lifecycle hooks overran the shared timeout"
                        );
                        report.abandoned += running.len();
                        return skip_remaining(tiers, report);
                    }
                }
            }
        }

        report
    }
}

/// Drops tiers that had not started by the deadline. Their futures are
/// never polled, so lower priorities cannot run after finalize.
fn skip_remaining(tiers: impl Iterator<Item = Tier>, mut report: DispatchReport) -> DispatchReport {
    for (priority, hooks) in tiers {
        debug!(priority, skipped = hooks.len(), "Lifecycle tier not started before the deadline");
        report.abandoned += hooks.len();
    }
    report
}

fn tiers<H>(hooks: &[Registered<H>], mut start: impl FnMut(&H) -> BoxFuture<'static, ()>) -> Vec<Tier> {
    let mut tiers: Vec<Tier> = Vec::new();
    for registered in hooks {
        let future = start(&registered.hook);
        match tiers.last_mut() {
            Some((priority, group)) if *priority == registered.priority => group.push(future),
            _ => tiers.push((registered.priority, vec![future])),
        }
    }
    tiers
}

fn insert_by_priority<H>(hooks: &mut Vec<Registered<H>>, hook: H, priority: i32) {
    let position = hooks.partition_point(|r| r.priority >= priority);
    hooks.insert(position, Registered { priority, hook });
}

#[async_trait]
impl AuthLifecycle for LifecycleDispatcher {
    async fn on_authenticated(&self, hook: AuthenticatedHook, priority: i32) {
        let replay = {
            let mut state = self.state.lock().await;
            insert_by_priority(&mut state.authenticated, hook.clone(), priority);
            state.session.clone()
        };

        let Some(session) = replay else {
            return;
        };

        debug!(user_id = %session.user_id, "Replaying active session to late hook");
        let handle = tokio::spawn(hook(session));
        match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(error = %err, "Replayed lifecycle hook failed"),
            Err(_) => warn!("Replayed lifecycle hook overran the timeout"),
        }
    }

    async fn on_about_to_log_out(&self, hook: LogoutHook, priority: i32) {
        let mut state = self.state.lock().await;
        insert_by_priority(&mut state.logout, hook, priority);
    }
}

impl std::fmt::Debug for LifecycleDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleDispatcher")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
