//! The client channel.
//!
//! One [`ClientChannel`] per negotiated transport channel. The channel
//! owns the invocation registry, the write-credit counter and the codec
//! adapter, and a single spawned reader task that routes every inbound
//! frame to its pending invocation.
//!
//! Channels are obtained through [`RemoteConnection`], which performs
//! the version handshake at most once per connection and memoizes the
//! outcome: concurrent callers observe the same eventual channel or the
//! same failure. Repeating the handshake would desynchronise both peers,
//! so even a failed negotiation is never retried on the same connection.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use byteorder::WriteBytesExt;
use bytes::Bytes;
use tokio::sync::{mpsc, OnceCell};

use crate::codec::CodecAdapter;
use crate::credit::{CreditedFrame, WriteCredit};
use crate::error::{EjbwireError, Result};
use crate::invocation::ReceiverContext;
use crate::locator::{StatefulLocator, StatelessLocator};
use crate::protocol::{self, opcode};
use crate::registry::{Invocation, InvocationRegistry, MethodHandle, SessionHandle, SessionReply};
use crate::request;
use crate::response::{self, ExceptionResult, MethodCallResult, ResultProducer};
use crate::transport::{ChannelOpener, MessageChannel};

/// Default bound on how long a handshake may take.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for obtaining a client channel.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Name of the transport channel to open.
    pub channel_name: String,
    /// Short name of the object-graph codec to negotiate.
    pub codec_name: String,
    /// Highest protocol version to accept.
    pub max_version: u8,
    /// Bound on the whole handshake exchange.
    pub handshake_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            channel_name: protocol::CHANNEL_NAME.to_string(),
            codec_name: protocol::DEFAULT_CODEC.to_string(),
            max_version: protocol::LATEST_VERSION,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

/// A connection that can carry at most one client channel.
///
/// The first caller of [`client_channel`](RemoteConnection::client_channel)
/// triggers the handshake; everyone else awaits and shares its outcome.
pub struct RemoteConnection {
    opener: Box<dyn ChannelOpener>,
    config: ChannelConfig,
    channel: OnceCell<std::result::Result<Arc<ClientChannel>, String>>,
}

impl RemoteConnection {
    /// Wrap a connection with the default configuration.
    pub fn new(opener: impl ChannelOpener) -> Self {
        Self::with_config(opener, ChannelConfig::default())
    }

    /// Wrap a connection with an explicit configuration.
    pub fn with_config(opener: impl ChannelOpener, config: ChannelConfig) -> Self {
        Self {
            opener: Box::new(opener),
            config,
            channel: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Obtain the client channel, negotiating it on first use.
    pub async fn client_channel(&self) -> Result<Arc<ClientChannel>> {
        let outcome = self
            .channel
            .get_or_init(|| async {
                let attempt = tokio::time::timeout(
                    self.config.handshake_timeout,
                    ClientChannel::open(&*self.opener, &self.config),
                )
                .await;
                match attempt {
                    Ok(Ok(channel)) => Ok(channel),
                    Ok(Err(EjbwireError::Handshake(message))) => Err(message),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err(format!(
                        "no greeting within {:?}",
                        self.config.handshake_timeout
                    )),
                }
            })
            .await;
        match outcome {
            Ok(channel) => Ok(channel.clone()),
            Err(message) => Err(EjbwireError::Handshake(message.clone())),
        }
    }
}

/// One negotiated client channel.
pub struct ClientChannel {
    transport: MessageChannel,
    version: u8,
    adapter: CodecAdapter,
    registry: InvocationRegistry,
    credit: WriteCredit,
}

impl std::fmt::Debug for ClientChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientChannel")
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl ClientChannel {
    /// Open the protocol channel and run the handshake.
    ///
    /// Receives the single greeting message (first byte: the server's
    /// maximum version, remainder: padding), picks
    /// `min(server, max_version)` and replies with the chosen version
    /// followed by the codec tag.
    pub(crate) async fn open(
        opener: &dyn ChannelOpener,
        config: &ChannelConfig,
    ) -> Result<Arc<Self>> {
        let mut transport = opener.open_channel(&config.channel_name).await.map_err(|e| {
            EjbwireError::Handshake(format!(
                "failed to open channel {:?}: {e}",
                config.channel_name
            ))
        })?;
        let mut inbound = transport.take_inbound().ok_or_else(|| {
            EjbwireError::Handshake("channel inbound stream already claimed".to_string())
        })?;

        let greeting = inbound.recv().await.ok_or_else(|| {
            EjbwireError::Handshake("channel closed before the server greeting".to_string())
        })?;
        let server_version = greeting.first().copied().ok_or_else(|| {
            EjbwireError::Handshake("empty server greeting".to_string())
        })?;
        if server_version == 0 {
            return Err(EjbwireError::Handshake(
                "server offered protocol version 0".to_string(),
            ));
        }
        // the remainder of the greeting is padding, dropped with the frame
        let version = server_version
            .min(config.max_version)
            .min(protocol::LATEST_VERSION);

        let adapter = CodecAdapter::for_version(&config.codec_name, version).ok_or_else(|| {
            EjbwireError::Handshake(format!("no codec named {:?}", config.codec_name))
        })?;

        let reply = (|| {
            let mut frame = transport.write_message()?;
            frame.write_u8(version)?;
            frame.write_all(&protocol::codec_tag(&config.codec_name))?;
            frame.close()
        })();
        reply.map_err(|e| {
            EjbwireError::Handshake(format!("failed to send the version reply: {e}"))
        })?;

        tracing::debug!(version, codec = %config.codec_name, "client channel negotiated");

        let credit = WriteCredit::new(transport.initial_credit());
        let channel = Arc::new(Self {
            transport,
            version,
            adapter,
            registry: InvocationRegistry::new(),
            credit,
        });
        tokio::spawn(channel.clone().run(inbound));
        Ok(channel)
    }

    /// The negotiated protocol version.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Whether the transport has closed.
    pub fn is_closed(&self) -> bool {
        self.registry.is_closed()
    }

    /// Number of invocations currently awaiting a response.
    pub fn pending_invocations(&self) -> usize {
        self.registry.len()
    }

    /// Submit a method invocation.
    ///
    /// Fire-and-forget from the caller's perspective: this returns once
    /// the request is written (or has failed to be written); the outcome
    /// arrives on the receiver context's event channel. Distinct
    /// requests carry no ordering guarantee relative to each other.
    pub async fn process_invocation(&self, receiver: ReceiverContext) {
        let handle = MethodHandle::for_receiver(&receiver);
        let record = Invocation::Method(handle.clone());
        let Some(id) = self.registry.allocate(record.clone()) else {
            handle.cancelled();
            return;
        };
        tracing::debug!(
            id,
            bean = receiver.invocation().locator().bean_name(),
            method = receiver.invocation().method().method_name(),
            "submitting invocation"
        );

        let mut frame = match self.get_message_blocking().await {
            Ok(frame) => frame,
            Err(e) => {
                self.fail_submission(id, &record, &handle, e);
                return;
            }
        };
        if let Err(e) = request::write_invocation(&mut frame, id, &self.adapter, receiver.invocation())
        {
            frame.cancel();
            self.fail_submission(id, &record, &handle, e);
            return;
        }
        if frame.close().is_err() {
            self.fail_submission(id, &record, &handle, EjbwireError::ChannelClosed);
        }
    }

    /// Open a stateful session on the target bean.
    ///
    /// Suspends until the response (or transport closure) arrives.
    /// Dropping the returned future withdraws the pending invocation.
    pub async fn open_session(&self, stateless: StatelessLocator) -> Result<StatefulLocator> {
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel();
        let record = Invocation::Session(SessionHandle::new(reply_tx));
        let Some(id) = self.registry.allocate(record.clone()) else {
            return Err(EjbwireError::ChannelClosed);
        };
        let _guard = RemoveGuard {
            registry: &self.registry,
            id,
            record,
        };
        tracing::debug!(id, bean = stateless.bean_name(), "opening session");

        let mut frame = self.get_message_blocking().await?;
        if let Err(e) = request::write_open_session(&mut frame, id, &stateless) {
            frame.cancel();
            return Err(e);
        }
        frame.close().map_err(|_| EjbwireError::ChannelClosed)?;

        match reply_rx.recv().await {
            Some(SessionReply::Frame { opcode, body }) => {
                self.finish_open_session(opcode, &body, stateless)
            }
            Some(SessionReply::Closed) | None => Err(EjbwireError::ChannelClosed),
        }
    }

    /// Take one write-credit unit and allocate an outbound frame.
    ///
    /// Suspends while the credit counter is at zero; the unit returns to
    /// the counter when the frame is closed or cancelled.
    pub(crate) async fn get_message_blocking(&self) -> Result<CreditedFrame> {
        let permit = self.credit.acquire().await?;
        let frame = self
            .transport
            .write_message()
            .map_err(|_| EjbwireError::ChannelClosed)?;
        Ok(CreditedFrame::new(frame, permit))
    }

    fn fail_submission(
        &self,
        id: u16,
        record: &Invocation,
        handle: &MethodHandle,
        error: EjbwireError,
    ) {
        // deliver the failure only if closure has not already cancelled
        // the record
        if self.registry.remove_record(id, record) {
            handle.result_ready(ResultProducer::Failed(error));
        }
    }

    fn finish_open_session(
        &self,
        opcode_byte: u8,
        body: &Bytes,
        stateless: StatelessLocator,
    ) -> Result<StatefulLocator> {
        match opcode_byte {
            opcode::OPEN_SESSION_RESPONSE => {
                let opened = response::parse_session_opened(body, &self.adapter)?;
                Ok(StatefulLocator::new(
                    stateless,
                    opened.session_id,
                    opened.affinity,
                ))
            }
            opcode::APPLICATION_EXCEPTION => {
                Err(response::parse_session_exception(body, &self.adapter))
            }
            opcode::NO_SUCH_EJB => Err(EjbwireError::NoSuchEjb(response::read_error_message(body)?)),
            opcode::EJB_NOT_STATEFUL => {
                Err(EjbwireError::NotStateful(response::read_error_message(body)?))
            }
            other => Err(EjbwireError::Protocol(format!(
                "invalid session-open response opcode {other:#04x}"
            ))),
        }
    }

    /// Reader task: routes inbound frames until the transport closes,
    /// then broadcasts closure.
    async fn run(self: Arc<Self>, mut inbound: mpsc::UnboundedReceiver<Bytes>) {
        while let Some(frame) = inbound.recv().await {
            self.dispatch(frame);
        }
        self.credit.close();
        let drained = self.registry.close();
        tracing::debug!(
            pending = drained.len(),
            "transport closed; cancelling pending invocations"
        );
        for invocation in drained {
            invocation.handle_closed();
        }
    }

    fn dispatch(&self, frame: Bytes) {
        if frame.len() < protocol::FRAME_HEADER_LEN {
            tracing::warn!(len = frame.len(), "discarding truncated inbound frame");
            return;
        }
        let op = frame[0];
        let id = u16::from_be_bytes([frame[1], frame[2]]);
        let body = frame.slice(protocol::FRAME_HEADER_LEN..);

        if op == opcode::PROCEED_ASYNC_RESPONSE {
            // the record stays registered: the real response will still
            // arrive under the same id
            match self.registry.get(id) {
                Some(Invocation::Method(handle)) => handle.proceed_async(),
                Some(Invocation::Session(handle)) => handle.deliver(op, body),
                None => tracing::debug!(id, "discarding proceed-async for unknown invocation"),
            }
            return;
        }

        match self.registry.remove(id) {
            Some(Invocation::Method(handle)) => self.complete_method(&handle, op, body),
            Some(Invocation::Session(handle)) => handle.deliver(op, body),
            None => {
                tracing::debug!(id, opcode = op, "discarding response for unknown invocation")
            }
        }
    }

    fn complete_method(&self, handle: &MethodHandle, op: u8, body: Bytes) {
        let producer = match op {
            opcode::INVOCATION_RESPONSE => ResultProducer::Result(MethodCallResult::new(
                body,
                false,
                self.adapter.clone(),
                handle.attachments(),
            )),
            opcode::COMPRESSED_INVOCATION_MESSAGE => ResultProducer::Result(MethodCallResult::new(
                body,
                true,
                self.adapter.clone(),
                handle.attachments(),
            )),
            opcode::APPLICATION_EXCEPTION => {
                ResultProducer::Exception(ExceptionResult::new(body, self.adapter.clone()))
            }
            opcode::NO_SUCH_EJB => failed_with(&body, EjbwireError::NoSuchEjb),
            opcode::NO_SUCH_METHOD => failed_with(&body, EjbwireError::NoSuchMethod),
            opcode::SESSION_NOT_ACTIVE => failed_with(&body, EjbwireError::SessionNotActive),
            opcode::EJB_NOT_STATEFUL => failed_with(&body, EjbwireError::NotStateful),
            other => ResultProducer::Failed(EjbwireError::Protocol(format!(
                "unknown response opcode {other:#04x}"
            ))),
        };
        handle.result_ready(producer);
    }
}

fn failed_with(body: &Bytes, build: fn(String) -> EjbwireError) -> ResultProducer {
    match response::read_error_message(body) {
        Ok(message) => ResultProducer::Failed(build(message)),
        Err(e) => ResultProducer::Failed(e),
    }
}

/// Withdraws a pending record when its waiter stops waiting, unless the
/// dispatcher (or closure) already retired it.
struct RemoveGuard<'a> {
    registry: &'a InvocationRegistry,
    id: u16,
    record: Invocation,
}

impl Drop for RemoveGuard<'_> {
    fn drop(&mut self) {
        self.registry.remove_record(self.id, &self.record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mem;

    #[test]
    fn test_config_defaults() {
        let config = ChannelConfig::default();
        assert_eq!(config.channel_name, "ejb");
        assert_eq!(config.codec_name, "river");
        assert_eq!(config.max_version, 3);
        assert_eq!(config.handshake_timeout, DEFAULT_HANDSHAKE_TIMEOUT);
    }

    async fn negotiate(server_version: u8, config: ChannelConfig) -> Result<Arc<ClientChannel>> {
        let (client, mut server) = mem::pair(&config.channel_name, 8);
        tokio::spawn(async move {
            let mut frame = server.write_message().unwrap();
            frame.write_all(&[server_version, 0xAA, 0xBB]).unwrap();
            frame.close().unwrap();
            // hold the server end open until the reply arrives
            let mut inbound = server.take_inbound().unwrap();
            let _ = inbound.recv().await;
        });
        let connection = RemoteConnection::with_config(mem::MemOpener::new(client), config);
        connection.client_channel().await
    }

    #[tokio::test]
    async fn test_version_capped_by_config() {
        let config = ChannelConfig {
            max_version: 2,
            ..ChannelConfig::default()
        };
        let channel = negotiate(3, config).await.unwrap();
        assert_eq!(channel.version(), 2);
    }

    #[tokio::test]
    async fn test_server_version_below_latest_wins() {
        let channel = negotiate(1, ChannelConfig::default()).await.unwrap();
        assert_eq!(channel.version(), 1);
    }

    #[tokio::test]
    async fn test_version_zero_fails_handshake() {
        assert!(matches!(
            negotiate(0, ChannelConfig::default()).await,
            Err(EjbwireError::Handshake(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_codec_fails_handshake() {
        let config = ChannelConfig {
            codec_name: "protostream".to_string(),
            ..ChannelConfig::default()
        };
        assert!(matches!(
            negotiate(3, config).await,
            Err(EjbwireError::Handshake(_))
        ));
    }

    #[tokio::test]
    async fn test_handshake_outcome_is_memoized() {
        let (client, server) = mem::pair("ejb", 8);
        drop(server);
        let connection = RemoteConnection::new(mem::MemOpener::new(client));

        let first = connection.client_channel().await.unwrap_err();
        let second = connection.client_channel().await.unwrap_err();
        assert!(matches!(first, EjbwireError::Handshake(_)));
        // a re-attempt would fail differently (the opener refuses a
        // second open); the memoized outcome repeats verbatim
        assert_eq!(first.to_string(), second.to_string());
    }
}
