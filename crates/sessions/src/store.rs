//! In-process session registry.
//!
//! All presence changes go through one `RwLock` over the map.  Sessions are
//! handed out as `Arc<Session>`, so the lock is never held across an await.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use sg_domain::error::{Error, Result};
use sg_mcp::SessionTransport;

use crate::session::{Session, SessionData};

struct Entry {
    /// Insertion sequence, used to list ids in creation order.
    seq: u64,
    session: Arc<Session>,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, Entry>,
    next_seq: u64,
}

#[derive(Default)]
pub struct SessionStore {
    inner: RwLock<Inner>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully built session.  Fails with [`Error::DuplicateSession`]
    /// if the id is live.
    pub fn add(&self, session: Session) -> Result<Arc<Session>> {
        let mut inner = self.inner.write();
        if inner.sessions.contains_key(session.id()) {
            return Err(Error::DuplicateSession(session.id().to_owned()));
        }
        session.touch();
        let session = Arc::new(session);
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.sessions.insert(
            session.id().to_owned(),
            Entry {
                seq,
                session: session.clone(),
            },
        );
        tracing::debug!(session_id = %session.id(), "session added");
        Ok(session)
    }

    pub fn create_session(
        &self,
        id: &str,
        transport: Arc<dyn SessionTransport>,
        initial: SessionData,
    ) -> Result<Arc<Session>> {
        self.add(Session::new(id, transport, initial))
    }

    /// Look a session up.  Counts as activity.
    pub fn get_session(&self, id: &str) -> Option<Arc<Session>> {
        let session = self.peek(id)?;
        session.touch();
        Some(session)
    }

    /// Look a session up without touching it.
    pub fn peek(&self, id: &str) -> Option<Arc<Session>> {
        self.inner.read().sessions.get(id).map(|e| e.session.clone())
    }

    /// Shallow-merge `partial` into the session's data.
    pub fn update_session(&self, id: &str, partial: SessionData) -> Result<Arc<Session>> {
        let inner = self.inner.read();
        let entry = inner
            .sessions
            .get(id)
            .ok_or_else(|| Error::SessionNotFound(id.to_owned()))?;
        entry.session.merge_data(partial);
        entry.session.touch();
        Ok(entry.session.clone())
    }

    /// Remove a session.  Returns whether it existed.  Does not close the
    /// transport or run hooks.
    pub fn delete_session(&self, id: &str) -> bool {
        let removed = self.inner.write().sessions.remove(id).is_some();
        if removed {
            tracing::debug!(session_id = %id, "session removed");
        }
        removed
    }

    pub fn has_session(&self, id: &str) -> bool {
        self.inner.read().sessions.contains_key(id)
    }

    /// Snapshot of live ids in insertion order.
    pub fn list_session_ids(&self) -> Vec<String> {
        let inner = self.inner.read();
        let mut entries: Vec<(u64, &String)> =
            inner.sessions.iter().map(|(id, e)| (e.seq, id)).collect();
        entries.sort_unstable_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, id)| id.clone()).collect()
    }

    /// Sessions idle for longer than `max_age`.  Read-only.
    pub fn expired_sessions(&self, max_age: std::time::Duration) -> Vec<Arc<Session>> {
        self.expired_sessions_at(max_age, Utc::now())
    }

    pub fn expired_sessions_at(
        &self,
        max_age: std::time::Duration,
        now: DateTime<Utc>,
    ) -> Vec<Arc<Session>> {
        let Some(cutoff) = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| now.checked_sub_signed(age))
        else {
            return Vec::new();
        };

        let inner = self.inner.read();
        let mut expired: Vec<(u64, Arc<Session>)> = inner
            .sessions
            .values()
            .filter(|e| e.session.touched_at() < cutoff)
            .map(|e| (e.seq, e.session.clone()))
            .collect();
        expired.sort_unstable_by_key(|(seq, _)| *seq);
        expired.into_iter().map(|(_, s)| s).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::DataKey;
    use crate::test_support::transport;
    use std::time::Duration;

    const NAME: DataKey<String> = DataKey::new("name");
    const COUNT: DataKey<u32> = DataKey::new("count");

    fn store_with(ids: &[&str]) -> SessionStore {
        let store = SessionStore::new();
        for id in ids {
            store.create_session(id, transport(id), SessionData::new()).unwrap();
        }
        store
    }

    #[test]
    fn created_session_is_retrievable_and_unique() {
        let store = store_with(&["a"]);
        assert!(store.get_session("a").is_some());
        let err = store
            .create_session("a", transport("a"), SessionData::new())
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateSession(id) if id == "a"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn lookup_advances_touched_at() {
        let store = store_with(&["a"]);
        let created = store.peek("a").unwrap().touched_at();
        let first = store.get_session("a").unwrap().touched_at();
        let second = store.get_session("a").unwrap().touched_at();
        assert!(first >= created);
        assert!(second > first);
    }

    #[test]
    fn has_session_does_not_touch() {
        let store = store_with(&["a"]);
        let before = store.peek("a").unwrap().touched_at();
        assert!(store.has_session("a"));
        assert_eq!(store.peek("a").unwrap().touched_at(), before);
    }

    #[test]
    fn update_merges_and_rejects_unknown() {
        let store = SessionStore::new();
        store
            .create_session("a", transport("a"), SessionData::new().with(NAME, "x".into()))
            .unwrap();
        store
            .update_session("a", SessionData::new().with(COUNT, 2))
            .unwrap();
        let s = store.peek("a").unwrap();
        assert_eq!(s.get(NAME).unwrap().as_str(), "x");
        assert_eq!(*s.get(COUNT).unwrap(), 2);

        let err = store
            .update_session("missing", SessionData::new().with(COUNT, 1))
            .unwrap_err();
        assert!(matches!(err, Error::SessionNotFound(_)));
        assert_eq!(store.list_session_ids(), vec!["a".to_string()]);
    }

    #[test]
    fn delete_is_idempotent_and_leaves_transport_alone() {
        let store = SessionStore::new();
        let t = transport("a");
        store.create_session("a", t.clone(), SessionData::new()).unwrap();
        assert!(store.delete_session("a"));
        assert!(!store.delete_session("a"));
        assert!(!store.has_session("a"));
        assert_eq!(t.close_count(), 0);
    }

    #[test]
    fn ids_listed_in_insertion_order() {
        let store = store_with(&["c", "a", "b"]);
        assert_eq!(store.list_session_ids(), vec!["c", "a", "b"]);
        store.delete_session("a");
        store.create_session("a", transport("a"), SessionData::new()).unwrap();
        assert_eq!(store.list_session_ids(), vec!["c", "b", "a"]);
    }

    #[test]
    fn expired_sessions_matches_cutoff() {
        let store = store_with(&["old", "fresh"]);
        let max_age = Duration::from_secs(60);
        let now = Utc::now() + chrono::Duration::seconds(120);

        store.peek("fresh").unwrap().touch_at(now);
        let expired: Vec<String> = store
            .expired_sessions_at(max_age, now)
            .iter()
            .map(|s| s.id().to_owned())
            .collect();
        assert_eq!(expired, vec!["old".to_string()]);

        store.peek("old").unwrap().touch_at(now);
        assert!(store.expired_sessions_at(max_age, now).is_empty());
        assert_eq!(store.len(), 2, "expiry query never deletes");
    }

    #[test]
    fn huge_max_age_expires_nothing() {
        let store = store_with(&["a"]);
        assert!(store.expired_sessions(Duration::MAX).is_empty());
    }
}
