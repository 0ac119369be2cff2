//! Caller-facing invocation surface.
//!
//! A method invocation is fire-and-forget from the submitting caller's
//! perspective: [`ClientChannel::process_invocation`](crate::ClientChannel::process_invocation)
//! writes the request and returns, and the outcome arrives later as
//! [`InvocationEvent`]s on the receiver context's event channel. The
//! terminal event carries a lazy [`ResultProducer`]; the caller decides
//! whether to decode it or throw it away.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::attachment::Attachments;
use crate::locator::{EjbLocator, MethodLocator};
use crate::response::ResultProducer;

/// Everything needed to write one method invocation.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    method: MethodLocator,
    locator: EjbLocator,
    parameters: Vec<Value>,
    context_data: BTreeMap<String, Value>,
    private_attachments: BTreeMap<String, Value>,
}

impl InvocationContext {
    pub fn new(method: MethodLocator, locator: impl Into<EjbLocator>) -> Self {
        Self {
            method,
            locator: locator.into(),
            parameters: Vec::new(),
            context_data: BTreeMap::new(),
            private_attachments: BTreeMap::new(),
        }
    }

    /// Append one parameter, in declaration order.
    pub fn parameter(mut self, value: Value) -> Self {
        self.parameters.push(value);
        self
    }

    /// Add one public context-data entry.
    pub fn context_entry(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context_data.insert(key.into(), value);
        self
    }

    /// Add one private attachment under a reserved key.
    pub fn private_attachment(mut self, key: impl Into<String>, value: Value) -> Self {
        self.private_attachments.insert(key.into(), value);
        self
    }

    pub fn method(&self) -> &MethodLocator {
        &self.method
    }

    pub fn locator(&self) -> &EjbLocator {
        &self.locator
    }

    pub fn parameters(&self) -> &[Value] {
        &self.parameters
    }

    pub fn context_data(&self) -> &BTreeMap<String, Value> {
        &self.context_data
    }

    pub fn private_attachments(&self) -> &BTreeMap<String, Value> {
        &self.private_attachments
    }
}

/// Outcome notifications for one method invocation.
#[derive(Debug)]
pub enum InvocationEvent {
    /// A terminal response arrived; decode or discard it through the
    /// producer.
    ResultReady(ResultProducer),
    /// The server will continue asynchronously. The caller may unblock;
    /// the real response still arrives later under the same id.
    ProceedAsync,
    /// The request was cancelled (channel closed before submission or
    /// before a response).
    Cancelled,
}

impl InvocationEvent {
    /// Resolve a terminal event into the invocation outcome, decoding
    /// the payload if one arrived. Returns `None` for
    /// [`ProceedAsync`](InvocationEvent::ProceedAsync), which is not
    /// terminal.
    pub fn into_result(self) -> Option<crate::error::Result<Value>> {
        match self {
            InvocationEvent::ResultReady(producer) => Some(producer.get_result()),
            InvocationEvent::ProceedAsync => None,
            InvocationEvent::Cancelled => Some(Err(crate::error::EjbwireError::Cancelled)),
        }
    }
}

/// Binds an invocation to its caller: the event channel outcomes are
/// delivered on, and the shared attachment map response attachments are
/// applied to.
pub struct ReceiverContext {
    invocation: InvocationContext,
    events: mpsc::UnboundedSender<InvocationEvent>,
    attachments: Arc<Attachments>,
}

impl ReceiverContext {
    /// Wrap an invocation, returning the receiving half of its event
    /// channel.
    pub fn new(invocation: InvocationContext) -> (Self, mpsc::UnboundedReceiver<InvocationEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        (
            Self {
                invocation,
                events,
                attachments: Arc::new(Attachments::new()),
            },
            receiver,
        )
    }

    pub fn invocation(&self) -> &InvocationContext {
        &self.invocation
    }

    /// The shared attachment map updated by recognised response
    /// attachments (notably the weak-affinity key).
    pub fn attachments(&self) -> Arc<Attachments> {
        self.attachments.clone()
    }

    pub(crate) fn events(&self) -> mpsc::UnboundedSender<InvocationEvent> {
        self.events.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::StatelessLocator;
    use serde_json::json;

    fn context() -> InvocationContext {
        let locator = StatelessLocator::new("", "shop", "CartBean", "").unwrap();
        InvocationContext::new(MethodLocator::new("ping", vec![]), locator)
    }

    #[test]
    fn test_builder_accumulates_in_order() {
        let ctx = context()
            .parameter(json!(1))
            .parameter(json!("two"))
            .context_entry("b", json!(2))
            .context_entry("a", json!(1));

        assert_eq!(ctx.parameters(), &[json!(1), json!("two")]);
        // sorted iteration keeps repeated encodings identical
        let keys: Vec<_> = ctx.context_data().keys().cloned().collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_receiver_context_event_channel() {
        let (ctx, mut events) = ReceiverContext::new(context());
        ctx.events().send(InvocationEvent::ProceedAsync).unwrap();
        assert!(matches!(
            events.recv().await,
            Some(InvocationEvent::ProceedAsync)
        ));
    }

    #[test]
    fn test_event_into_result() {
        assert!(InvocationEvent::ProceedAsync.into_result().is_none());
        assert!(matches!(
            InvocationEvent::Cancelled.into_result(),
            Some(Err(crate::error::EjbwireError::Cancelled))
        ));
    }
}
