//! Invocation registry.
//!
//! Maps the 16-bit invocation id of every in-flight request to its
//! pending record. Ids are allocated by sampling the thread-local RNG
//! and retrying on collision; the 16-bit space is large against
//! realistic in-flight counts, so probing terminates quickly.
//!
//! The `closed` flag and the map live under one lock: once the flag is
//! set no insert can succeed, and closing drains every record so each
//! receives its closed notification exactly once.

use std::collections::HashMap;
use std::sync::Mutex;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::invocation::{InvocationEvent, ReceiverContext};
use crate::response::ResultProducer;

/// Reply delivered to a waiting session-open caller.
#[derive(Debug)]
pub(crate) enum SessionReply {
    /// A response frame arrived for the invocation id.
    Frame { opcode: u8, body: Bytes },
    /// The channel closed before any response arrived.
    Closed,
}

/// Delivery handle of a pending method invocation.
#[derive(Clone)]
pub(crate) struct MethodHandle {
    events: mpsc::UnboundedSender<InvocationEvent>,
    attachments: std::sync::Arc<crate::attachment::Attachments>,
}

impl MethodHandle {
    pub(crate) fn for_receiver(receiver: &ReceiverContext) -> Self {
        Self {
            events: receiver.events(),
            attachments: receiver.attachments(),
        }
    }

    pub(crate) fn attachments(&self) -> std::sync::Arc<crate::attachment::Attachments> {
        self.attachments.clone()
    }

    pub(crate) fn result_ready(&self, producer: ResultProducer) {
        let _ = self.events.send(InvocationEvent::ResultReady(producer));
    }

    pub(crate) fn proceed_async(&self) {
        let _ = self.events.send(InvocationEvent::ProceedAsync);
    }

    pub(crate) fn cancelled(&self) {
        let _ = self.events.send(InvocationEvent::Cancelled);
    }
}

/// Delivery handle of a pending session-open request.
#[derive(Clone)]
pub(crate) struct SessionHandle {
    reply: mpsc::UnboundedSender<SessionReply>,
}

impl SessionHandle {
    pub(crate) fn new(reply: mpsc::UnboundedSender<SessionReply>) -> Self {
        Self { reply }
    }

    pub(crate) fn deliver(&self, opcode: u8, body: Bytes) {
        let _ = self.reply.send(SessionReply::Frame { opcode, body });
    }

    pub(crate) fn closed(&self) {
        let _ = self.reply.send(SessionReply::Closed);
    }
}

/// One pending request.
#[derive(Clone)]
pub(crate) enum Invocation {
    Method(MethodHandle),
    Session(SessionHandle),
}

impl Invocation {
    /// Deliver the single closed notification.
    pub(crate) fn handle_closed(&self) {
        match self {
            Invocation::Method(handle) => handle.cancelled(),
            Invocation::Session(handle) => handle.closed(),
        }
    }

    /// Identity comparison, so removal by record cannot evict an
    /// unrelated record that reused the id.
    fn is_same(&self, other: &Invocation) -> bool {
        match (self, other) {
            (Invocation::Method(a), Invocation::Method(b)) => a.events.same_channel(&b.events),
            (Invocation::Session(a), Invocation::Session(b)) => a.reply.same_channel(&b.reply),
            _ => false,
        }
    }
}

struct Inner {
    closed: bool,
    map: HashMap<u16, Invocation>,
}

/// Concurrent map of in-flight invocation ids.
pub(crate) struct InvocationRegistry {
    inner: Mutex<Inner>,
}

impl InvocationRegistry {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                closed: false,
                map: HashMap::new(),
            }),
        }
    }

    /// Insert a record under a fresh id. Returns `None` once the channel
    /// is closed.
    pub(crate) fn allocate(&self, invocation: Invocation) -> Option<u16> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return None;
        }
        let id = loop {
            let candidate = rand::random::<u16>();
            if !inner.map.contains_key(&candidate) {
                break candidate;
            }
        };
        inner.map.insert(id, invocation);
        Some(id)
    }

    /// Remove and return whatever record holds `id`.
    pub(crate) fn remove(&self, id: u16) -> Option<Invocation> {
        self.inner.lock().unwrap().map.remove(&id)
    }

    /// Remove `id` only if it still holds `record`; returns whether the
    /// record was removed.
    pub(crate) fn remove_record(&self, id: u16, record: &Invocation) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.map.get(&id).is_some_and(|held| held.is_same(record)) {
            inner.map.remove(&id);
            true
        } else {
            false
        }
    }

    /// Copy of the record registered under `id`, if any.
    pub(crate) fn get(&self, id: u16) -> Option<Invocation> {
        self.inner.lock().unwrap().map.get(&id).cloned()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().unwrap().map.len()
    }

    /// Set the closed flag and drain every pending record.
    ///
    /// Callers deliver `handle_closed` to the returned records outside
    /// the lock.
    pub(crate) fn close(&self) -> Vec<Invocation> {
        let mut inner = self.inner.lock().unwrap();
        inner.closed = true;
        inner.map.drain().map(|(_, invocation)| invocation).collect()
    }
}
