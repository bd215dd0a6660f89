//! Single-flight token refresh.
//!
//! When a request comes back with an expired session, it is handed to the
//! [`RefreshCoordinator`]. The first such call starts a refresh cycle; calls
//! arriving while that cycle is in flight are queued behind it. Once the
//! refresh settles, queued calls are either replayed with the new access
//! token, in the order they joined, or all rejected together.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::json;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use super::credential::TokenPair;
use super::credential_store::CredentialStore;
use crate::envelope::{classify, Outcome, DEFAULT_AUTH_EXPIRED};
use crate::error::{Error, Result};
use crate::net::{RequestDescriptor, Transport};
use crate::notify::{AcknowledgeHook, Notifier, AUTH_FAILURE_TITLE};

/// Default refresh endpoint, relative to the base URL.
pub const DEFAULT_REFRESH_PATH: &str = "/auth/refresh";

/// A call suspended until the current refresh settles.
struct PendingCall {
    request: RequestDescriptor,
    reply: oneshot::Sender<Result<Outcome>>,
}

enum RefreshCycle {
    Idle,
    Refreshing { queue: VecDeque<PendingCall> },
}

/// What a caller does after inspecting the cycle state.
enum Admission {
    /// A refresh already finished; retry with this token.
    Retry(String),
    /// Wait for a cycle, starting it first if `start` is set.
    Wait {
        reply: oneshot::Receiver<Result<Outcome>>,
        start: bool,
    },
    /// Nothing to refresh with.
    NoSession,
}

struct Shared {
    state: Mutex<RefreshCycle>,
    store: Arc<CredentialStore>,
    transport: Arc<dyn Transport>,
    notifier: Arc<Notifier>,
    refresh_path: String,
    on_login_required: Option<AcknowledgeHook>,
    cycles: AtomicU64,
}

/// Coordinates token refreshes so that at most one is in flight.
#[derive(Clone)]
pub struct RefreshCoordinator {
    shared: Arc<Shared>,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<CredentialStore>,
        transport: Arc<dyn Transport>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(RefreshCycle::Idle),
                store,
                transport,
                notifier,
                refresh_path: DEFAULT_REFRESH_PATH.to_string(),
                on_login_required: None,
                cycles: AtomicU64::new(0),
            }),
        }
    }

    /// Override the refresh endpoint path. Only valid before first use.
    pub fn with_refresh_path(self, path: impl Into<String>) -> Self {
        self.rebuild(|shared| shared.refresh_path = path.into())
    }

    /// Hook run when the user acknowledges the session-ended dialog.
    pub fn with_login_hook(self, hook: Option<AcknowledgeHook>) -> Self {
        self.rebuild(|shared| shared.on_login_required = hook)
    }

    fn rebuild(self, f: impl FnOnce(&mut Shared)) -> Self {
        match Arc::try_unwrap(self.shared) {
            Ok(mut shared) => {
                f(&mut shared);
                Self {
                    shared: Arc::new(shared),
                }
            }
            Err(shared) => {
                warn!("Refresh coordinator already shared; configuration change ignored");
                Self { shared }
            }
        }
    }

    /// Recover a call that was answered with an expired session.
    ///
    /// `stale_token` is the access token the call was sent with. Returns the
    /// classified outcome of the retried call, or [`Error::AuthExpired`] if
    /// the session could not be recovered (the session has then been ended
    /// and the user notified).
    pub async fn handle_auth_expired(
        &self,
        request: RequestDescriptor,
        stale_token: Option<&str>,
    ) -> Result<Outcome> {
        let shared = &self.shared;
        let (reply_tx, reply_rx) = oneshot::channel();

        let admission = {
            let mut state = shared.lock_state()?;
            match &mut *state {
                RefreshCycle::Refreshing { queue } => {
                    queue.push_back(PendingCall {
                        request: request.clone(),
                        reply: reply_tx,
                    });
                    debug!(queued = queue.len(), path = %request.path, "Joined refresh queue");
                    Admission::Wait {
                        reply: reply_rx,
                        start: false,
                    }
                }
                RefreshCycle::Idle => match shared.store.access_token() {
                    Some(current) if Some(current.as_str()) != stale_token => {
                        Admission::Retry(current)
                    }
                    _ if shared.store.refresh_token().is_none() => Admission::NoSession,
                    _ => {
                        let mut queue = VecDeque::new();
                        queue.push_back(PendingCall {
                            request: request.clone(),
                            reply: reply_tx,
                        });
                        *state = RefreshCycle::Refreshing { queue };
                        Admission::Wait {
                            reply: reply_rx,
                            start: true,
                        }
                    }
                },
            }
        };

        match admission {
            Admission::Retry(token) => {
                debug!(path = %request.path, "Token already refreshed, retrying");
                let raw = shared.transport.execute(&request, Some(&token)).await;
                Ok(classify(raw))
            }
            Admission::NoSession => {
                shared.end_session(DEFAULT_AUTH_EXPIRED);
                Err(Error::AuthExpired(DEFAULT_AUTH_EXPIRED.to_string()))
            }
            Admission::Wait { reply, start } => {
                if start {
                    let cycle = shared.cycles.fetch_add(1, Ordering::Relaxed) + 1;
                    info!(cycle, "Session expired, refreshing token");
                    // Runs detached so a dropped caller cannot strand the queue.
                    tokio::spawn(Arc::clone(shared).run_cycle());
                }
                reply
                    .await
                    .unwrap_or_else(|_| Err(Error::AuthExpired(DEFAULT_AUTH_EXPIRED.to_string())))
            }
        }
    }

    /// Whether a refresh cycle is in flight.
    pub fn is_refreshing(&self) -> bool {
        self.shared
            .lock_state()
            .map(|state| matches!(*state, RefreshCycle::Refreshing { .. }))
            .unwrap_or(false)
    }

    /// Number of calls waiting on the current cycle.
    pub fn queued_calls(&self) -> usize {
        match self.shared.lock_state() {
            Ok(state) => match &*state {
                RefreshCycle::Refreshing { queue } => queue.len(),
                RefreshCycle::Idle => 0,
            },
            Err(_) => 0,
        }
    }

    /// Number of refresh cycles started so far.
    pub fn cycles_started(&self) -> u64 {
        self.shared.cycles.load(Ordering::Relaxed)
    }

    /// Clear the session and present the auth-failure dialog.
    pub(crate) fn end_session(&self, message: &str) {
        self.shared.end_session(message);
    }
}

/// Rejects the queue if the cycle task unwinds or is cancelled before
/// draining it. Disarmed once the cycle owns the queue.
struct CycleGuard {
    shared: Arc<Shared>,
    armed: bool,
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let queue = self.shared.drain();
        error!(queued = queue.len(), "Refresh cycle aborted, rejecting queued calls");
        for call in queue {
            let _ = call
                .reply
                .send(Err(Error::AuthExpired(DEFAULT_AUTH_EXPIRED.to_string())));
        }
    }
}

impl Shared {
    fn lock_state(&self) -> Result<MutexGuard<'_, RefreshCycle>> {
        self.state
            .lock()
            .map_err(|_| Error::Storage("refresh state lock poisoned".into()))
    }

    /// Swap the state back to idle and hand out whatever was queued.
    fn drain(&self) -> VecDeque<PendingCall> {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match std::mem::replace(&mut *state, RefreshCycle::Idle) {
            RefreshCycle::Refreshing { queue } => queue,
            RefreshCycle::Idle => VecDeque::new(),
        }
    }

    async fn run_cycle(self: Arc<Self>) {
        let mut guard = CycleGuard {
            shared: Arc::clone(&self),
            armed: true,
        };
        let refreshed = match self.request_refresh().await {
            Ok(tokens) => self.store.update_tokens(&tokens).map(|()| tokens),
            Err(e) => Err(e),
        };

        match refreshed {
            Ok(tokens) => {
                let queue = self.drain();
                guard.armed = false;
                info!(queued = queue.len(), "Token refreshed, replaying queued calls");
                self.replay(queue, tokens.access_token).await;
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, ending session");
                let message = match &e {
                    Error::AuthExpired(message) => message.clone(),
                    _ => DEFAULT_AUTH_EXPIRED.to_string(),
                };
                if let Err(e) = self.store.clear() {
                    error!(error = %e, "Failed to clear credential");
                }
                let queue = self.drain();
                guard.armed = false;
                self.notify_session_ended(&message);
                for call in queue {
                    let _ = call.reply.send(Err(Error::AuthExpired(message.clone())));
                }
            }
        }
    }

    async fn request_refresh(&self) -> Result<TokenPair> {
        let refresh_token = self
            .store
            .refresh_token()
            .ok_or_else(|| Error::AuthExpired(DEFAULT_AUTH_EXPIRED.to_string()))?;

        let request = RequestDescriptor::post(
            self.refresh_path.clone(),
            json!({ "refreshToken": refresh_token }),
        );
        let raw = self.transport.execute(&request, None).await;

        match classify(raw) {
            Outcome::Success(data) => {
                let tokens: TokenPair = serde_json::from_value(data)
                    .map_err(|e| Error::Decode(format!("refresh payload: {}", e)))?;
                if tokens.access_token.is_empty() {
                    return Err(Error::Decode("refresh payload has an empty accessToken".into()));
                }
                Ok(tokens)
            }
            Outcome::TransportError(message) => Err(Error::Transport(message)),
            other => Err(Error::AuthExpired(other.message().to_string())),
        }
    }

    /// Re-issue every queued call with `token`, in queue order.
    async fn replay(&self, queue: VecDeque<PendingCall>, token: String) {
        let token = token.as_str();
        let mut replays: FuturesUnordered<_> = queue
            .into_iter()
            .map(move |call| async move {
                let raw = self.transport.execute(&call.request, Some(token)).await;
                // The caller may have gone away; its answer is discarded.
                let _ = call.reply.send(Ok(classify(raw)));
            })
            .collect();
        while replays.next().await.is_some() {}
    }

    fn end_session(&self, message: &str) {
        if let Err(e) = self.store.clear() {
            error!(error = %e, "Failed to clear credential");
        }
        self.notify_session_ended(message);
    }

    fn notify_session_ended(&self, message: &str) {
        self.notifier
            .notify_auth_failure(AUTH_FAILURE_TITLE, message, self.on_login_required.clone());
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("refresh_path", &self.shared.refresh_path)
            .field("refreshing", &self.is_refreshing())
            .field("cycles", &self.cycles_started())
            .finish()
    }
}
