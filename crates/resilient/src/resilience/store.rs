//! Process-wide keyed state for stateful policies
//!
//! Circuit counters and token buckets are shared, mutable records looked up
//! by [`PolicyKey`]. Each record sits behind its own lock, so admission
//! checks against one key serialize while different keys never contend.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

static NEXT_ANONYMOUS: AtomicU64 = AtomicU64::new(1);

/// Identity of a keyed policy record
///
/// Binding a policy without a key mints a fresh anonymous identity, so two
/// decorated operations never share counters unless given the same name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PolicyKey {
    /// Caller-supplied shared key
    Named(Arc<str>),
    /// Identity of one protected operation
    Anonymous(u64),
}

impl PolicyKey {
    /// A shared key
    pub fn named<S: AsRef<str>>(name: S) -> Self {
        Self::Named(Arc::from(name.as_ref()))
    }

    /// A key no other binding will ever produce
    pub fn unique() -> Self {
        Self::Anonymous(NEXT_ANONYMOUS.fetch_add(1, Ordering::Relaxed))
    }

    /// Resolve an optional name, minting a unique key when absent
    pub fn resolve(name: Option<&str>) -> Self {
        name.map_or_else(Self::unique, Self::named)
    }
}

impl fmt::Display for PolicyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => write!(f, "'{name}'"),
            Self::Anonymous(id) => write!(f, "operation #{id}"),
        }
    }
}

/// Concurrent map of per-key records
pub struct KeyedStore<S> {
    records: DashMap<PolicyKey, Arc<Mutex<S>>>,
}

impl<S> KeyedStore<S> {
    pub fn new() -> Self {
        Self { records: DashMap::new() }
    }

    /// Fetch the record for `key`, creating it with `init` on first use
    ///
    /// The first caller fixes the record's initial state; later callers get
    /// the same record regardless of what their `init` would have built.
    pub fn get_or_insert_with<F>(&self, key: &PolicyKey, init: F) -> Arc<Mutex<S>>
    where
        F: FnOnce() -> S,
    {
        if let Some(existing) = self.records.get(key) {
            return Arc::clone(existing.value());
        }
        let entry = self.records.entry(key.clone()).or_insert_with(|| Arc::new(Mutex::new(init())));
        Arc::clone(entry.value())
    }

    pub fn contains(&self, key: &PolicyKey) -> bool {
        self.records.contains_key(key)
    }

    /// Drop the record for `key`; the next binding starts fresh
    pub fn remove(&self, key: &PolicyKey) -> bool {
        self.records.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<S> Default for KeyedStore<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> fmt::Debug for KeyedStore<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedStore").field("records", &self.records.len()).finish()
    }
}
