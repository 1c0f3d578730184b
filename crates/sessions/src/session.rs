use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};

use sg_domain::error::{Error, Result};
use sg_mcp::SessionTransport;

use crate::gate::InitGate;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Typed data bag
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A named slot in [`SessionData`] holding a value of type `T`.
///
/// Each collaborator declares the keys it owns as constants next to the code
/// that uses them, so two features cannot silently share a slot.
pub struct DataKey<T> {
    name: &'static str,
    _type: PhantomData<fn() -> T>,
}

impl<T> DataKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _type: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for DataKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for DataKey<T> {}

/// Open key/value state attached to a session.  The session layer never
/// looks inside the values.
#[derive(Clone, Default)]
pub struct SessionData {
    entries: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl SessionData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`SessionData::insert`].
    pub fn with<T: Any + Send + Sync>(mut self, key: DataKey<T>, value: T) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert<T: Any + Send + Sync>(&mut self, key: DataKey<T>, value: T) {
        self.entries.insert(key.name.to_owned(), Arc::new(value));
    }

    /// `None` when the slot is empty or holds a different type.
    pub fn get<T: Any + Send + Sync>(&self, key: DataKey<T>) -> Option<Arc<T>> {
        self.entries.get(key.name)?.clone().downcast::<T>().ok()
    }

    pub fn remove<T: Any + Send + Sync>(&mut self, key: DataKey<T>) -> Option<Arc<T>> {
        self.entries.remove(key.name)?.downcast::<T>().ok()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Shallow merge; keys in `other` overwrite ours.
    pub fn merge(&mut self, other: SessionData) {
        self.entries.extend(other.entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for SessionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.keys()).finish()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One live client session.
///
/// Shared as `Arc<Session>`; every mutable part sits behind its own lock so
/// no caller needs to hold the store lock while using a session.
pub struct Session {
    id: String,
    transport: Arc<dyn SessionTransport>,
    data: RwLock<SessionData>,
    created_at: DateTime<Utc>,
    touched_at: Mutex<DateTime<Utc>>,
    gate: InitGate,
    ending: AtomicBool,
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        transport: Arc<dyn SessionTransport>,
        data: SessionData,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            transport,
            data: RwLock::new(data),
            created_at: now,
            touched_at: Mutex::new(now),
            gate: InitGate::new(),
            ending: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn transport(&self) -> &Arc<dyn SessionTransport> {
        &self.transport
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn touched_at(&self) -> DateTime<Utc> {
        *self.touched_at.lock()
    }

    /// Record activity.  Each touch strictly advances the timestamp, even
    /// when the clock has not.
    pub fn touch(&self) -> DateTime<Utc> {
        self.touch_at(Utc::now())
    }

    pub(crate) fn touch_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let mut touched = self.touched_at.lock();
        let next = if now > *touched {
            now
        } else {
            *touched + Duration::nanoseconds(1)
        };
        *touched = next;
        next
    }

    pub fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.touched_at())
    }

    // ── data ─────────────────────────────────────────────────────────

    pub fn get<T: Any + Send + Sync>(&self, key: DataKey<T>) -> Option<Arc<T>> {
        self.data.read().get(key)
    }

    pub fn insert<T: Any + Send + Sync>(&self, key: DataKey<T>, value: T) {
        self.data.write().insert(key, value);
    }

    pub fn remove<T: Any + Send + Sync>(&self, key: DataKey<T>) -> Option<Arc<T>> {
        self.data.write().remove(key)
    }

    pub fn data(&self) -> SessionData {
        self.data.read().clone()
    }

    pub(crate) fn merge_data(&self, partial: SessionData) {
        self.data.write().merge(partial);
    }

    // ── initialization ───────────────────────────────────────────────

    pub fn gate(&self) -> &InitGate {
        &self.gate
    }

    /// Suspend until the start hook (if any) has finished.  A failed start
    /// hook surfaces here as [`Error::Hook`].
    pub async fn wait_until_initialized(&self) -> Result<()> {
        self.gate.wait().await.map_err(Error::Hook)
    }

    // ── teardown ─────────────────────────────────────────────────────

    /// Claim the right to tear this session down.  Only the first caller
    /// gets `true`.
    pub(crate) fn claim_teardown(&self) -> bool {
        self.ending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_ending(&self) -> bool {
        self.ending.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("touched_at", &self.touched_at())
            .field("gate", &self.gate.state())
            .field("data", &*self.data.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    const COUNTER: DataKey<u32> = DataKey::new("counter");
    const LABEL: DataKey<String> = DataKey::new("label");

    #[test]
    fn data_is_typed_by_key() {
        let mut data = SessionData::new().with(COUNTER, 3);
        data.insert(LABEL, "x".to_string());
        assert_eq!(*data.get(COUNTER).unwrap(), 3);
        assert_eq!(data.get(LABEL).unwrap().as_str(), "x");

        const WRONG: DataKey<String> = DataKey::new("counter");
        assert!(data.get(WRONG).is_none());
        assert_eq!(data.keys(), vec!["counter".to_string(), "label".to_string()]);
    }

    #[test]
    fn merge_overwrites_later_keys() {
        let mut base = SessionData::new().with(COUNTER, 1).with(LABEL, "a".to_string());
        base.merge(SessionData::new().with(COUNTER, 2));
        assert_eq!(*base.get(COUNTER).unwrap(), 2);
        assert_eq!(base.get(LABEL).unwrap().as_str(), "a");
        assert_eq!(base.len(), 2);
    }

    #[test]
    fn touch_strictly_advances() {
        let session = test_support::session("s");
        let first = session.touched_at();
        let stale = first - Duration::seconds(10);
        let second = session.touch_at(stale);
        assert!(second > first);
        let third = session.touch();
        assert!(third > second);
    }

    #[test]
    fn teardown_claimed_once() {
        let session = test_support::session("s");
        assert!(!session.is_ending());
        assert!(session.claim_teardown());
        assert!(!session.claim_teardown());
        assert!(session.is_ending());
    }

    #[test]
    fn session_data_accessors() {
        let session = test_support::session("s");
        session.insert(COUNTER, 7);
        assert_eq!(*session.get(COUNTER).unwrap(), 7);
        assert_eq!(*session.remove(COUNTER).unwrap(), 7);
        assert!(session.data().is_empty());
    }
}
