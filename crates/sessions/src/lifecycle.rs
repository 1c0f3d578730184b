//! Session lifecycle: start/end hooks and the one teardown path.
//!
//! Every way a session can die (client DELETE, transport close, expiry,
//! process shutdown) goes through [`SessionLifecycle::end_session`]:
//! end hook, then store removal, then transport close.  The first caller
//! claims the session; later callers see `Ok(false)`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use sg_domain::error::{Error, Result};
use sg_domain::trace::TraceEvent;
use sg_mcp::SessionTransport;

use crate::gate::InitTicket;
use crate::session::{Session, SessionData};
use crate::store::SessionStore;

/// Externally supplied callbacks run at the edges of a session's life.
#[async_trait]
pub trait SessionHooks: Send + Sync {
    /// Runs once, after the session is registered.  Tool calls that depend
    /// on what this installs must call `wait_until_initialized` first.
    async fn on_session_start(&self, _session: Arc<Session>) -> Result<()> {
        Ok(())
    }

    /// Runs once, before the session is removed.  A failure is reported to
    /// the caller but never keeps the session alive.
    async fn on_session_end(&self, _session: Arc<Session>) -> Result<()> {
        Ok(())
    }
}

/// Why a session is being torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    ClientTeardown,
    Expired,
    TransportClosed,
    Shutdown,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientTeardown => "client_teardown",
            Self::Expired => "expired",
            Self::TransportClosed => "transport_closed",
            Self::Shutdown => "shutdown",
        }
    }
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gate failure recorded when the start hook overruns its budget.
pub const START_HOOK_TIMED_OUT: &str = "start hook timed out";

const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(60);

pub struct SessionLifecycle {
    store: Arc<SessionStore>,
    hooks: Option<Arc<dyn SessionHooks>>,
    start_timeout: Duration,
    end_timeout: Duration,
}

impl SessionLifecycle {
    pub fn new(store: Arc<SessionStore>, hooks: Option<Arc<dyn SessionHooks>>) -> Self {
        Self {
            store,
            hooks,
            start_timeout: DEFAULT_HOOK_TIMEOUT,
            end_timeout: DEFAULT_HOOK_TIMEOUT,
        }
    }

    /// Bound the start and end hooks.  Teardown waits at most `start` for a
    /// pending start hook and at most `end` for the end hook.
    pub fn with_hook_timeouts(mut self, start: Duration, end: Duration) -> Self {
        self.start_timeout = start;
        self.end_timeout = end;
        self
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn has_hooks(&self) -> bool {
        self.hooks.is_some()
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Start
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Register a session the transport has just established.
    ///
    /// When a start hook exists the gate is moved to `InProgress` here,
    /// before the id is visible to the client, and the returned ticket must
    /// be handed to [`SessionLifecycle::begin_initialization`].
    pub fn register(
        &self,
        id: &str,
        transport: Arc<dyn SessionTransport>,
    ) -> Result<(Arc<Session>, Option<InitTicket>)> {
        let session = self.store.create_session(id, transport, SessionData::new())?;
        let ticket = if self.hooks.is_some() {
            InitTicket::claim(&session)
        } else {
            None
        };
        TraceEvent::SessionCreated {
            session_id: id.to_owned(),
        }
        .emit();
        Ok((session, ticket))
    }

    /// Run the start hook in the background and complete the gate with its
    /// outcome.  The returned handle resolves once the gate is complete.  A
    /// hook still running after the start timeout is aborted and the gate
    /// fails with [`START_HOOK_TIMED_OUT`].
    pub fn begin_initialization(&self, ticket: InitTicket) -> tokio::task::JoinHandle<()> {
        let hooks = self.hooks.clone();
        let limit = self.start_timeout;
        tokio::spawn(async move {
            let session = ticket.session().clone();
            let started = Instant::now();

            let outcome = match hooks {
                Some(hooks) => {
                    let s = session.clone();
                    // A panicking hook must still complete the gate.
                    let task = tokio::spawn(async move { hooks.on_session_start(s).await });
                    let abort = task.abort_handle();
                    match tokio::time::timeout(limit, task).await {
                        Ok(Ok(result)) => result.map_err(|e| e.to_string()),
                        Ok(Err(join)) => Err(format!("start hook panicked: {join}")),
                        Err(_) => {
                            abort.abort();
                            Err(START_HOOK_TIMED_OUT.to_owned())
                        }
                    }
                }
                None => Ok(()),
            };

            if let Err(e) = &outcome {
                tracing::error!(session_id = %session.id(), error = %e, "session start hook failed");
            }
            TraceEvent::SessionInitialized {
                session_id: session.id().to_owned(),
                ok: outcome.is_ok(),
                duration_ms: started.elapsed().as_millis() as u64,
            }
            .emit();
            ticket.complete(outcome);
        })
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // End
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Tear `session` down.
    ///
    /// Returns `Ok(true)` if this call performed the teardown, `Ok(false)` if
    /// another caller already had.  An end-hook failure is returned as
    /// [`Error::Hook`] after the session has been removed and its transport
    /// closed.
    pub async fn end_session(&self, session: &Arc<Session>, reason: EndReason) -> Result<bool> {
        if !session.claim_teardown() {
            return Ok(false);
        }
        let id = session.id().to_owned();

        // The end hook must observe whatever the start hook installed.
        match tokio::time::timeout(self.start_timeout, session.wait_until_initialized()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(session_id = %id, error = %e, "ending a session whose start hook failed");
            }
            Err(_) => {
                session.gate().complete(Err(START_HOOK_TIMED_OUT.to_owned()));
                tracing::warn!(session_id = %id, "start hook still running at teardown; proceeding");
            }
        }

        let hook_result = match &self.hooks {
            Some(hooks) => {
                let hooks = hooks.clone();
                let s = session.clone();
                let task = tokio::spawn(async move { hooks.on_session_end(s).await });
                let abort = task.abort_handle();
                match tokio::time::timeout(self.end_timeout, task).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(join)) => Err(Error::Hook(format!("end hook panicked: {join}"))),
                    Err(_) => {
                        abort.abort();
                        Err(Error::Hook("end hook timed out".into()))
                    }
                }
            }
            None => Ok(()),
        };

        self.store.delete_session(&id);

        if let Err(e) = session.transport().close().await {
            tracing::warn!(session_id = %id, error = %e, "transport close failed");
        }

        TraceEvent::SessionEnded {
            session_id: id.clone(),
            reason: reason.to_string(),
            hook_ok: hook_result.is_ok(),
        }
        .emit();

        match hook_result {
            Ok(()) => Ok(true),
            Err(e) => {
                tracing::warn!(session_id = %id, %reason, error = %e, "session end hook failed");
                match e {
                    e @ Error::Hook(_) => Err(e),
                    other => Err(Error::Hook(other.to_string())),
                }
            }
        }
    }

    /// [`SessionLifecycle::end_session`] by id.  `Ok(false)` if no such
    /// session is live.
    pub async fn end_session_by_id(&self, id: &str, reason: EndReason) -> Result<bool> {
        match self.store.peek(id) {
            Some(session) => self.end_session(&session, reason).await,
            None => Ok(false),
        }
    }

    /// End every live session.  Used on process shutdown.
    pub async fn shutdown_all(&self) -> usize {
        let ids = self.store.list_session_ids();
        let mut ended = 0;
        for id in ids {
            match self.end_session_by_id(&id, EndReason::Shutdown).await {
                Ok(true) => ended += 1,
                Ok(false) => {}
                Err(e) => {
                    ended += 1;
                    tracing::warn!(session_id = %id, error = %e, "shutdown teardown reported an error");
                }
            }
        }
        if ended > 0 {
            tracing::info!(sessions = ended, "sessions torn down on shutdown");
        }
        ended
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::DataKey;
    use crate::test_support::transport;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const HANDLE: DataKey<String> = DataKey::new("handle");

    #[derive(Default)]
    struct RecordingHooks {
        starts: AtomicUsize,
        ends: AtomicUsize,
        fail_start: bool,
        fail_end: bool,
        hang_start: bool,
        hang_end: bool,
        start_delay: Option<Duration>,
        saw_handle_at_end: AtomicUsize,
    }

    #[async_trait]
    impl SessionHooks for RecordingHooks {
        async fn on_session_start(&self, session: Arc<Session>) -> Result<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            if let Some(d) = self.start_delay {
                tokio::time::sleep(d).await;
            }
            if self.hang_start {
                std::future::pending::<()>().await;
            }
            if self.fail_start {
                return Err(Error::Hook("no browser".into()));
            }
            session.insert(HANDLE, "browser-1".to_string());
            Ok(())
        }

        async fn on_session_end(&self, session: Arc<Session>) -> Result<()> {
            self.ends.fetch_add(1, Ordering::SeqCst);
            if session.get(HANDLE).is_some() {
                self.saw_handle_at_end.fetch_add(1, Ordering::SeqCst);
            }
            if self.hang_end {
                std::future::pending::<()>().await;
            }
            if self.fail_end {
                return Err(Error::Hook("release failed".into()));
            }
            Ok(())
        }
    }

    fn lifecycle(hooks: RecordingHooks) -> (SessionLifecycle, Arc<RecordingHooks>) {
        let hooks = Arc::new(hooks);
        let store = Arc::new(SessionStore::new());
        (SessionLifecycle::new(store, Some(hooks.clone())), hooks)
    }

    #[tokio::test]
    async fn start_hook_gates_dependent_work() {
        let (lc, hooks) = lifecycle(RecordingHooks {
            start_delay: Some(Duration::from_millis(20)),
            ..Default::default()
        });
        let (session, ticket) = lc.register("s", transport("s")).unwrap();
        assert!(!session.gate().is_complete());

        lc.begin_initialization(ticket.unwrap());
        session.wait_until_initialized().await.unwrap();
        assert_eq!(session.get(HANDLE).unwrap().as_str(), "browser-1");
        assert_eq!(hooks.starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_start_hook_surfaces_to_waiters() {
        let (lc, _) = lifecycle(RecordingHooks {
            fail_start: true,
            ..Default::default()
        });
        let (session, ticket) = lc.register("s", transport("s")).unwrap();
        lc.begin_initialization(ticket.unwrap()).await.unwrap();
        let err = session.wait_until_initialized().await.unwrap_err();
        assert!(matches!(err, Error::Hook(msg) if msg.contains("no browser")));
        assert!(lc.store().has_session("s"), "start failure does not remove the session");
    }

    #[tokio::test]
    async fn without_hooks_there_is_no_ticket() {
        let lc = SessionLifecycle::new(Arc::new(SessionStore::new()), None);
        let (session, ticket) = lc.register("s", transport("s")).unwrap();
        assert!(ticket.is_none());
        session.wait_until_initialized().await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_registration_fails() {
        let (lc, _) = lifecycle(RecordingHooks::default());
        lc.register("s", transport("s")).unwrap();
        let Err(err) = lc.register("s", transport("s")) else {
            panic!("second registration of the same id must fail");
        };
        assert!(matches!(err, Error::DuplicateSession(_)));
    }

    #[tokio::test]
    async fn end_runs_hook_then_removes_then_closes() {
        let (lc, hooks) = lifecycle(RecordingHooks::default());
        let t = transport("s");
        let (session, ticket) = lc.register("s", t.clone()).unwrap();
        lc.begin_initialization(ticket.unwrap());

        assert!(lc.end_session(&session, EndReason::ClientTeardown).await.unwrap());
        assert_eq!(hooks.ends.load(Ordering::SeqCst), 1);
        assert_eq!(hooks.saw_handle_at_end.load(Ordering::SeqCst), 1);
        assert!(!lc.store().has_session("s"));
        assert_eq!(t.close_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_teardown_runs_once() {
        let (lc, hooks) = lifecycle(RecordingHooks::default());
        let t = transport("s");
        let (session, _) = lc.register("s", t.clone()).unwrap();
        let lc = Arc::new(lc);

        let a = {
            let (lc, s) = (lc.clone(), session.clone());
            tokio::spawn(async move { lc.end_session(&s, EndReason::ClientTeardown).await })
        };
        let b = {
            let (lc, s) = (lc.clone(), session.clone());
            tokio::spawn(async move { lc.end_session(&s, EndReason::TransportClosed).await })
        };
        let results = [a.await.unwrap().unwrap(), b.await.unwrap().unwrap()];
        assert_eq!(results.iter().filter(|r| **r).count(), 1);
        assert_eq!(hooks.ends.load(Ordering::SeqCst), 1);
        assert_eq!(t.close_count(), 1);
    }

    #[tokio::test]
    async fn end_hook_failure_still_removes() {
        let (lc, _) = lifecycle(RecordingHooks {
            fail_end: true,
            ..Default::default()
        });
        let t = transport("s");
        lc.register("s", t.clone()).unwrap();

        let err = lc
            .end_session_by_id("s", EndReason::ClientTeardown)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Hook(msg) if msg.contains("release failed")));
        assert!(!lc.store().has_session("s"));
        assert_eq!(t.close_count(), 1);
    }

    fn bounded(hooks: RecordingHooks) -> (SessionLifecycle, Arc<RecordingHooks>) {
        let (lc, hooks) = lifecycle(hooks);
        let lc = lc.with_hook_timeouts(Duration::from_secs(1), Duration::from_secs(1));
        (lc, hooks)
    }

    #[tokio::test(start_paused = true)]
    async fn hung_start_hook_times_out() {
        let (lc, _) = bounded(RecordingHooks {
            hang_start: true,
            ..Default::default()
        });
        let (session, ticket) = lc.register("s", transport("s")).unwrap();
        lc.begin_initialization(ticket.unwrap()).await.unwrap();

        let err = session.wait_until_initialized().await.unwrap_err();
        assert!(matches!(err, Error::Hook(msg) if msg == START_HOOK_TIMED_OUT));
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_does_not_wait_forever_for_start_hook() {
        let (lc, hooks) = bounded(RecordingHooks {
            hang_start: true,
            ..Default::default()
        });
        let t = transport("s");
        let (session, ticket) = lc.register("s", t.clone()).unwrap();
        // Keep the ticket alive so the gate stays in progress.
        let _ticket = ticket;

        let ended = tokio::time::timeout(
            Duration::from_secs(10),
            lc.end_session(&session, EndReason::ClientTeardown),
        )
        .await
        .expect("teardown finished");
        assert!(ended.unwrap());
        assert_eq!(hooks.ends.load(Ordering::SeqCst), 1);
        assert!(!lc.store().has_session("s"));
        assert_eq!(t.close_count(), 1);
        assert_eq!(
            session.gate().state(),
            crate::gate::InitState::Complete(Err(START_HOOK_TIMED_OUT.into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn hung_end_hook_still_removes() {
        let (lc, _) = bounded(RecordingHooks {
            hang_end: true,
            ..Default::default()
        });
        let t = transport("s");
        lc.register("s", t.clone()).unwrap();

        let err = lc
            .end_session_by_id("s", EndReason::Expired)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Hook(msg) if msg.contains("timed out")));
        assert!(!lc.store().has_session("s"));
        assert_eq!(t.close_count(), 1);
    }

    #[tokio::test]
    async fn end_unknown_is_noop() {
        let (lc, hooks) = lifecycle(RecordingHooks::default());
        assert!(!lc.end_session_by_id("ghost", EndReason::Expired).await.unwrap());
        assert_eq!(hooks.ends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn shutdown_ends_everything() {
        let (lc, hooks) = lifecycle(RecordingHooks::default());
        for id in ["a", "b", "c"] {
            lc.register(id, transport(id)).unwrap();
        }
        assert_eq!(lc.shutdown_all().await, 3);
        assert!(lc.store().is_empty());
        assert_eq!(hooks.ends.load(Ordering::SeqCst), 3);
    }
}
