//! Idle-session reclamation.
//!
//! The gateway calls [`ExpirySweeper::sweep`] after handshakes, GETs and
//! DELETEs; [`ExpirySweeper::spawn`] adds an optional periodic pass.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use sg_domain::trace::TraceEvent;

use crate::lifecycle::{EndReason, SessionLifecycle};

/// Outcome of one sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Ids removed by this sweep, including those whose end hook failed.
    pub reclaimed: Vec<String>,
    /// `(session id, error)` for every end hook that failed.
    pub failures: Vec<(String, String)>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.reclaimed.is_empty() && self.failures.is_empty()
    }
}

pub struct ExpirySweeper {
    lifecycle: Arc<SessionLifecycle>,
    max_age: Duration,
}

impl ExpirySweeper {
    pub fn new(lifecycle: Arc<SessionLifecycle>, max_age: Duration) -> Self {
        Self { lifecycle, max_age }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(Utc::now()).await
    }

    /// Reclaim every session idle longer than `max_age` as of `now`.  One
    /// failing teardown never stops the others, and each teardown is bounded
    /// by the lifecycle's hook timeouts, so a hung hook delays the pass
    /// without stalling it.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let expired = self
            .lifecycle
            .store()
            .expired_sessions_at(self.max_age, now);

        let mut report = SweepReport::default();
        for session in expired {
            let id = session.id().to_owned();
            match self.lifecycle.end_session(&session, EndReason::Expired).await {
                Ok(true) => report.reclaimed.push(id),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(session_id = %id, error = %e, "expired session teardown failed");
                    report.failures.push((id.clone(), e.to_string()));
                    report.reclaimed.push(id);
                }
            }
        }

        if !report.is_empty() {
            TraceEvent::SweepCompleted {
                reclaimed: report.reclaimed.len(),
                failed: report.failures.len(),
            }
            .emit();
        }
        report
    }

    /// Run [`ExpirySweeper::sweep`] every `every` until the runtime shuts
    /// down.
    pub fn spawn(self: Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it.
            interval.tick().await;
            loop {
                interval.tick().await;
                let report = self.sweep().await;
                if !report.reclaimed.is_empty() {
                    tracing::debug!(reclaimed = report.reclaimed.len(), "periodic sweep");
                }
            }
        })
    }
}
