//! Response body decoding.
//!
//! The dispatcher hands each pending invocation the raw body of its
//! response frame; the types here turn those bytes into results. Method
//! responses are wrapped in lazy producers so the caller decides whether
//! to decode or discard the payload; session-open responses are decoded
//! in place by the waiting task.

use std::io::Read;
use std::sync::Arc;

use bytes::Bytes;
use byteorder::ReadBytesExt;
use flate2::read::ZlibDecoder;
use serde_json::Value;

use crate::attachment::{keys, Attachments};
use crate::codec::CodecAdapter;
use crate::error::{EjbwireError, Result};
use crate::locator::{Affinity, SessionId};
use crate::protocol::wire;

/// Read the message body of the error opcodes (`NO_SUCH_EJB` and
/// friends): one UTF string.
pub(crate) fn read_error_message(body: &Bytes) -> Result<String> {
    wire::read_utf(&mut &body[..])
}

/// Decoded `OPEN_SESSION_RESPONSE` body.
pub(crate) struct SessionOpened {
    pub session_id: SessionId,
    pub affinity: Affinity,
}

/// Parse an `OPEN_SESSION_RESPONSE` body: packed-uint length, session-id
/// bytes, then a codec stream holding the affinity.
pub(crate) fn parse_session_opened(body: &Bytes, adapter: &CodecAdapter) -> Result<SessionOpened> {
    let mut src: &[u8] = body;
    let len = wire::read_packed_uint(&mut src)? as usize;
    let mut session_id = vec![0u8; len];
    src.read_exact(&mut session_id)?;

    let mut decoder = adapter.decoder();
    let affinity = {
        let source: &mut dyn Read = &mut src;
        decoder.start(source)?;
        let affinity = decoder.read_object(source)?;
        decoder.finish(source)?;
        affinity
    };
    Ok(SessionOpened {
        session_id: SessionId::new(session_id),
        affinity,
    })
}

/// Parse an `APPLICATION_EXCEPTION` body received for a session-open
/// request, draining the pre-v3 attachment block that follows the
/// throwable.
pub(crate) fn parse_session_exception(body: &Bytes, adapter: &CodecAdapter) -> EjbwireError {
    let mut src: &[u8] = body;
    let source: &mut dyn Read = &mut src;
    let mut decoder = adapter.decoder();
    let decoded = (|| -> Result<Value> {
        decoder.start(source)?;
        let exception = decoder.read_object(source)?;
        if adapter.protocol_version() < 3 {
            let count = source.read_u8()?;
            for _ in 0..count {
                decoder.read_object(source)?;
                decoder.read_object(source)?;
            }
        }
        decoder.finish(source)?;
        Ok(exception)
    })();
    match decoded {
        Ok(exception) => EjbwireError::ApplicationException(exception),
        Err(e) => e,
    }
}

/// Lazy handle to a method-invocation outcome.
///
/// Exactly one of [`get_result`](ResultProducer::get_result) or
/// [`discard`](ResultProducer::discard) consumes the producer.
pub enum ResultProducer {
    /// A normal result payload, possibly compressed.
    Result(MethodCallResult),
    /// An application exception payload.
    Exception(ExceptionResult),
    /// The invocation failed before any payload was available.
    Failed(EjbwireError),
}

impl ResultProducer {
    /// Decode the outcome: the result value, or the error the invocation
    /// ended with.
    pub fn get_result(self) -> Result<Value> {
        match self {
            ResultProducer::Result(producer) => producer.get_result(),
            ResultProducer::Exception(producer) => Err(producer.into_error()),
            ResultProducer::Failed(error) => Err(error),
        }
    }

    /// Drop the payload without decoding it.
    pub fn discard(self) {}
}

impl std::fmt::Debug for ResultProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResultProducer::Result(_) => f.write_str("ResultProducer::Result"),
            ResultProducer::Exception(_) => f.write_str("ResultProducer::Exception"),
            ResultProducer::Failed(e) => write!(f, "ResultProducer::Failed({e})"),
        }
    }
}

/// Payload of an `INVOCATION_RESPONSE` (or its compressed form).
pub struct MethodCallResult {
    body: Bytes,
    compressed: bool,
    adapter: CodecAdapter,
    attachments: Arc<Attachments>,
}

impl MethodCallResult {
    pub(crate) fn new(
        body: Bytes,
        compressed: bool,
        adapter: CodecAdapter,
        attachments: Arc<Attachments>,
    ) -> Self {
        Self {
            body,
            compressed,
            adapter,
            attachments,
        }
    }

    /// Decode the result object and the trailing response attachments.
    ///
    /// The `jboss.weak-affinity` attachment updates the caller's shared
    /// attachment map; unrecognised keys are discarded.
    fn get_result(self) -> Result<Value> {
        let inflated;
        let mut src: &[u8] = if self.compressed {
            let mut decoder = ZlibDecoder::new(&self.body[..]);
            let mut buf = Vec::new();
            decoder.read_to_end(&mut buf)?;
            inflated = buf;
            &inflated
        } else {
            &self.body
        };

        let source: &mut dyn Read = &mut src;
        let mut decoder = self.adapter.decoder();
        decoder.start(source)?;
        let result = decoder.read_object(source)?;
        let count = source.read_u8()?;
        for _ in 0..count {
            let key = match decoder.read_object(source)? {
                Value::String(key) => key,
                other => {
                    return Err(EjbwireError::Protocol(format!(
                        "response attachment key must be a string, found {other}"
                    )))
                }
            };
            let value = decoder.read_object(source)?;
            if key == keys::WEAK_AFFINITY {
                self.attachments.put(keys::WEAK_AFFINITY, value);
            }
        }
        decoder.finish(source)?;
        Ok(result)
    }
}

/// Payload of an `APPLICATION_EXCEPTION` on the method path.
pub struct ExceptionResult {
    body: Bytes,
    adapter: CodecAdapter,
}

impl ExceptionResult {
    pub(crate) fn new(body: Bytes, adapter: CodecAdapter) -> Self {
        Self { body, adapter }
    }

    /// Decode the throwable, draining the pre-v3 attachment block.
    fn into_error(self) -> EjbwireError {
        match self.decode() {
            Ok(exception) => EjbwireError::ApplicationException(exception),
            Err(e) => e,
        }
    }

    fn decode(&self) -> Result<Value> {
        let mut src: &[u8] = &self.body;
        let source: &mut dyn Read = &mut src;
        let mut decoder = self.adapter.decoder();
        decoder.start(source)?;
        let exception = decoder.read_object(source)?;
        if self.adapter.protocol_version() < 3 {
            let count = source.read_u8()?;
            for _ in 0..count {
                decoder.read_object(source)?;
                decoder.read_object(source)?;
            }
        }
        decoder.finish(source)?;
        Ok(exception)
    }
}
