//! Initialization gate: `NotStarted -> InProgress -> Complete`.
//!
//! The state lives in a `watch` channel so any number of callers can wait
//! for completion without polling.  Waiting on a gate nobody ever started
//! returns immediately: there is no initializer to wait for.

use std::sync::Arc;

use tokio::sync::watch;

use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitState {
    NotStarted,
    InProgress,
    /// Carries the initializer's outcome.  `Err` holds the failure message.
    Complete(Result<(), String>),
}

pub struct InitGate {
    state: watch::Sender<InitState>,
}

impl Default for InitGate {
    fn default() -> Self {
        Self::new()
    }
}

impl InitGate {
    pub fn new() -> Self {
        let (state, _) = watch::channel(InitState::NotStarted);
        Self { state }
    }

    pub fn state(&self) -> InitState {
        self.state.borrow().clone()
    }

    pub fn is_complete(&self) -> bool {
        matches!(*self.state.borrow(), InitState::Complete(_))
    }

    /// Move `NotStarted -> InProgress`.  Returns `false` if the gate had
    /// already left `NotStarted`.
    pub(crate) fn try_start(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == InitState::NotStarted {
                *state = InitState::InProgress;
                true
            } else {
                false
            }
        })
    }

    /// Move `InProgress -> Complete`.  Any other transition is refused.
    pub(crate) fn complete(&self, outcome: Result<(), String>) -> bool {
        self.state.send_if_modified(|state| {
            if *state == InitState::InProgress {
                *state = InitState::Complete(outcome);
                true
            } else {
                false
            }
        })
    }

    /// Suspend until the gate is no longer `InProgress` and return the
    /// initializer's outcome.
    pub async fn wait(&self) -> Result<(), String> {
        let mut rx = self.state.subscribe();
        let state = rx
            .wait_for(|s| *s != InitState::InProgress)
            .await
            .map_err(|_| "initialization gate dropped".to_string())?;
        match &*state {
            InitState::Complete(outcome) => outcome.clone(),
            _ => Ok(()),
        }
    }
}

/// Exclusive right to complete a session's gate.
///
/// Exactly one ticket exists per session that ever started initializing.
/// Dropping a ticket without completing it fails the gate, so waiters never
/// hang on an abandoned initializer.
pub struct InitTicket {
    session: Arc<Session>,
    done: bool,
}

impl InitTicket {
    /// Claim the gate of `session`.  `None` if it was already started.
    pub fn claim(session: &Arc<Session>) -> Option<Self> {
        session.gate().try_start().then(|| Self {
            session: session.clone(),
            done: false,
        })
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn complete(mut self, outcome: Result<(), String>) {
        self.done = true;
        self.session.gate().complete(outcome);
    }
}

impl Drop for InitTicket {
    fn drop(&mut self) {
        if !self.done {
            self.session
                .gate()
                .complete(Err("initialization abandoned".into()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn wait_before_start_returns_immediately() {
        let gate = InitGate::new();
        assert_eq!(gate.wait().await, Ok(()));
        assert_eq!(gate.state(), InitState::NotStarted);
    }

    #[test]
    fn transitions_only_move_forward() {
        let gate = InitGate::new();
        assert!(!gate.complete(Ok(())), "cannot complete before start");
        assert!(gate.try_start());
        assert!(!gate.try_start(), "second start refused");
        assert!(gate.complete(Ok(())));
        assert!(!gate.complete(Err("late".into())), "never re-entered");
        assert!(!gate.try_start());
        assert_eq!(gate.state(), InitState::Complete(Ok(())));
    }

    #[tokio::test]
    async fn waiters_wake_on_completion() {
        let gate = Arc::new(InitGate::new());
        gate.try_start();

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let g = gate.clone();
                tokio::spawn(async move { g.wait().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!gate.is_complete());
        gate.complete(Err("hook failed".into()));

        for w in waiters {
            assert_eq!(w.await.unwrap(), Err("hook failed".into()));
        }
    }

    #[tokio::test]
    async fn dropped_ticket_fails_the_gate() {
        let session = crate::test_support::session("s-1");
        let ticket = InitTicket::claim(&session).unwrap();
        assert!(InitTicket::claim(&session).is_none());
        drop(ticket);
        assert_eq!(
            session.gate().wait().await,
            Err("initialization abandoned".into())
        );
    }

    #[tokio::test]
    async fn completed_ticket_keeps_outcome() {
        let session = crate::test_support::session("s-2");
        InitTicket::claim(&session).unwrap().complete(Ok(()));
        assert_eq!(session.gate().wait().await, Ok(()));
    }
}
