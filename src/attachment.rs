//! Invocation attachments.
//!
//! Two maps travel with an invocation: the public context data (string
//! keys, caller-controlled) and the private attachment map, which is
//! surfaced on the wire as a single entry under a reserved key. Response
//! attachments that the channel recognises are written into a shared
//! [`Attachments`] map owned by the caller.

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde_json::Value;

/// Reserved attachment keys.
pub mod keys {
    /// Response attachment carrying the server's weak-affinity hint.
    pub const WEAK_AFFINITY: &str = "jboss.weak-affinity";
    /// Wire key the whole private attachment map is nested under.
    pub const PRIVATE_ATTACHMENTS: &str = "jboss.private.attachments";
    /// Private attachment carrying the active transaction id.
    pub const TRANSACTION_ID: &str = "jboss.transaction.id";
    /// Legacy duplicate of the transaction id written on protocol
    /// versions 1 and 2.
    pub const TRANSACTION_PRIVATE_DATA: &str = "jboss.transaction.private-data";
}

/// Shared, thread-safe attachment map.
#[derive(Debug, Default)]
pub struct Attachments {
    inner: Mutex<BTreeMap<String, Value>>,
}

impl Attachments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an attachment, returning the previous value for the key.
    pub fn put(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.inner.lock().unwrap().insert(key.into(), value)
    }

    /// Fetch a copy of an attachment.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.lock().unwrap().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().unwrap().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }

    /// Copy of the whole map.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.inner.lock().unwrap().clone()
    }
}
