//! Object-graph codec layer.
//!
//! The channel serializes parameters, results and attachments through a
//! pluggable codec identified by a short name. A codec produces
//! single-use encoder/decoder streams: `start` writes or verifies the
//! stream header, `write_object`/`read_object` move one object graph at a
//! time, `finish` terminates the stream.
//!
//! The provided implementation is [`river`]: MessagePack underneath, with
//! per-version class/object tables that shorten well-known strings to
//! 3-byte references (see [`tables`]).
//!
//! Codec configuration follows the negotiated protocol version:
//!
//! | protocol version | class table | object table | stream version |
//! |-----------------:|-------------|--------------|---------------:|
//! | 1, 2             | V1          | V1           | 2              |
//! | 3                | V3          | V3           | 4              |

pub mod river;
pub mod tables;

use std::io::{Read, Write};
use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;
use crate::protocol::wire;
use tables::StringTable;

/// A pluggable object-graph codec, looked up by short name.
pub trait ObjectCodec: Send + Sync {
    /// Short name used during version negotiation (e.g. `"river"`).
    fn name(&self) -> &'static str;

    /// Create a single-use encoder for one codec stream.
    fn encoder(&self, config: CodecConfig) -> Box<dyn ObjectEncoder>;

    /// Create a single-use decoder for one codec stream.
    fn decoder(&self, config: CodecConfig) -> Box<dyn ObjectDecoder>;
}

/// Write side of one codec stream. Single-use: `start` first, then any
/// number of `write_object` calls, then `finish`.
pub trait ObjectEncoder: Send {
    /// Begin the stream, writing its header to `sink`.
    fn start(&mut self, sink: &mut dyn Write) -> Result<()>;

    /// Append one object graph to the stream.
    fn write_object(&mut self, sink: &mut dyn Write, value: &Value) -> Result<()>;

    /// Terminate the stream.
    fn finish(&mut self, sink: &mut dyn Write) -> Result<()>;
}

/// Read side of one codec stream, symmetric to [`ObjectEncoder`].
pub trait ObjectDecoder: Send {
    /// Begin the stream, reading and verifying its header from `source`.
    fn start(&mut self, source: &mut dyn Read) -> Result<()>;

    /// Read the next object graph from the stream.
    fn read_object(&mut self, source: &mut dyn Read) -> Result<Value>;

    /// Terminate the stream.
    fn finish(&mut self, source: &mut dyn Read) -> Result<()>;
}

/// Look up a provided codec by its short name.
pub fn lookup(name: &str) -> Option<Arc<dyn ObjectCodec>> {
    match name {
        river::NAME => Some(Arc::new(river::RiverCodec)),
        _ => None,
    }
}

/// Codec configuration derived from the negotiated protocol version.
#[derive(Clone, Copy, Debug)]
pub struct CodecConfig {
    /// Negotiated protocol version (1, 2 or 3).
    pub protocol_version: u8,
    /// Codec stream version written/verified by `start`.
    pub stream_version: u8,
    /// Table shortening map keys (locator field names).
    pub class_table: &'static StringTable,
    /// Table shortening whole string objects (reserved attachment keys).
    pub object_table: &'static StringTable,
}

impl CodecConfig {
    /// Select the configuration for a negotiated protocol version.
    pub fn for_protocol(version: u8) -> Self {
        if version < 3 {
            CodecConfig {
                protocol_version: version,
                stream_version: 2,
                class_table: &tables::V1_CLASS_TABLE,
                object_table: &tables::V1_OBJECT_TABLE,
            }
        } else {
            CodecConfig {
                protocol_version: version,
                stream_version: 4,
                class_table: &tables::V3_CLASS_TABLE,
                object_table: &tables::V3_OBJECT_TABLE,
            }
        }
    }
}

/// A codec bound to one channel's configuration.
///
/// Cheap to clone; encoder/decoder instances created from it are
/// single-use and never shared across requests.
#[derive(Clone)]
pub struct CodecAdapter {
    codec: Arc<dyn ObjectCodec>,
    config: CodecConfig,
}

impl CodecAdapter {
    /// Bind a codec to a configuration.
    pub fn new(codec: Arc<dyn ObjectCodec>, config: CodecConfig) -> Self {
        Self { codec, config }
    }

    /// Look up `name` and bind it to the configuration for
    /// `protocol_version`.
    pub fn for_version(name: &str, protocol_version: u8) -> Option<Self> {
        lookup(name).map(|codec| Self::new(codec, CodecConfig::for_protocol(protocol_version)))
    }

    /// The negotiated protocol version this adapter is configured for.
    pub fn protocol_version(&self) -> u8 {
        self.config.protocol_version
    }

    /// Create a single-use encoder.
    pub fn encoder(&self) -> Box<dyn ObjectEncoder> {
        self.codec.encoder(self.config)
    }

    /// Create a single-use decoder.
    pub fn decoder(&self) -> Box<dyn ObjectDecoder> {
        self.codec.decoder(self.config)
    }

    /// Write a packed unsigned integer into the stream.
    pub fn write_packed_uint(&self, sink: &mut dyn Write, value: u32) -> Result<()> {
        wire::write_packed_uint(sink, value)
    }

    /// Read a packed unsigned integer from the stream.
    pub fn read_packed_uint(&self, source: &mut dyn Read) -> Result<u32> {
        wire::read_packed_uint(source)
    }
}

impl std::fmt::Debug for CodecAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecAdapter")
            .field("codec", &self.codec.name())
            .field("config", &self.config)
            .finish()
    }
}
