//! The provided `"river"` object-graph codec.
//!
//! MessagePack on the wire, with two interning layers on top:
//!
//! - a whole string object found in the configured object table encodes
//!   as `fixext1` with ext type [`OBJECT_REF`] and the table index as the
//!   data byte;
//! - a map key found in the configured class table encodes as `fixext1`
//!   with ext type [`CLASS_REF`].
//!
//! Everything else is plain MessagePack (struct-as-map, named fields).
//! Each stream opens with a single version byte so that a peer speaking
//! the wrong table generation fails fast instead of misresolving
//! references.

use std::io::{Cursor, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use rmp::Marker;
use serde_json::Value;

use super::{CodecConfig, ObjectCodec, ObjectDecoder, ObjectEncoder};
use crate::error::{EjbwireError, Result};

/// Short name the codec is registered under.
pub const NAME: &str = "river";

/// Ext type tag for object-table references.
pub const OBJECT_REF: u8 = 0x01;
/// Ext type tag for class-table references.
pub const CLASS_REF: u8 = 0x02;

const FIXEXT1: u8 = 0xD4;
const MAX_DEPTH: u32 = 64;

/// MessagePack-backed graph codec with per-version interning tables.
pub struct RiverCodec;

impl ObjectCodec for RiverCodec {
    fn name(&self) -> &'static str {
        NAME
    }

    fn encoder(&self, config: CodecConfig) -> Box<dyn ObjectEncoder> {
        Box::new(RiverEncoder {
            config,
            started: false,
        })
    }

    fn decoder(&self, config: CodecConfig) -> Box<dyn ObjectDecoder> {
        Box::new(RiverDecoder {
            config,
            started: false,
        })
    }
}

struct RiverEncoder {
    config: CodecConfig,
    started: bool,
}

impl ObjectEncoder for RiverEncoder {
    fn start(&mut self, sink: &mut dyn Write) -> Result<()> {
        sink.write_u8(self.config.stream_version)?;
        self.started = true;
        Ok(())
    }

    fn write_object(&mut self, mut sink: &mut dyn Write, value: &Value) -> Result<()> {
        self.ensure_started()?;
        write_value(&mut sink, value, &self.config, 0)
    }

    fn finish(&mut self, _sink: &mut dyn Write) -> Result<()> {
        self.ensure_started()
    }
}

impl RiverEncoder {
    fn ensure_started(&self) -> Result<()> {
        if self.started {
            Ok(())
        } else {
            Err(EjbwireError::Protocol(
                "codec stream used before start".to_string(),
            ))
        }
    }
}

struct RiverDecoder {
    config: CodecConfig,
    started: bool,
}

impl ObjectDecoder for RiverDecoder {
    fn start(&mut self, source: &mut dyn Read) -> Result<()> {
        let version = source.read_u8()?;
        if version != self.config.stream_version {
            return Err(EjbwireError::Protocol(format!(
                "codec stream version {version} does not match the negotiated version {}",
                self.config.stream_version
            )));
        }
        self.started = true;
        Ok(())
    }

    fn read_object(&mut self, mut source: &mut dyn Read) -> Result<Value> {
        if !self.started {
            return Err(EjbwireError::Protocol(
                "codec stream used before start".to_string(),
            ));
        }
        read_value(&mut source, &self.config, 0)
    }

    fn finish(&mut self, _source: &mut dyn Read) -> Result<()> {
        Ok(())
    }
}

fn too_deep() -> EjbwireError {
    EjbwireError::Protocol("object graph nesting exceeds the codec limit".to_string())
}

fn codec_write_err(e: impl std::fmt::Display) -> EjbwireError {
    EjbwireError::Protocol(format!("codec write failed: {e}"))
}

fn write_value<W: Write>(sink: &mut W, value: &Value, config: &CodecConfig, depth: u32) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(too_deep());
    }
    match value {
        Value::String(s) => {
            if let Some(index) = config.object_table.index_of(s) {
                sink.write_all(&[FIXEXT1, OBJECT_REF, index])?;
            } else {
                rmp_serde::encode::write_named(sink, value)?;
            }
        }
        Value::Array(items) => {
            rmp::encode::write_array_len(sink, items.len() as u32).map_err(codec_write_err)?;
            for item in items {
                write_value(sink, item, config, depth + 1)?;
            }
        }
        Value::Object(map) => {
            rmp::encode::write_map_len(sink, map.len() as u32).map_err(codec_write_err)?;
            for (key, item) in map {
                if let Some(index) = config.class_table.index_of(key) {
                    sink.write_all(&[FIXEXT1, CLASS_REF, index])?;
                } else {
                    rmp::encode::write_str(sink, key).map_err(codec_write_err)?;
                }
                write_value(sink, item, config, depth + 1)?;
            }
        }
        _ => rmp_serde::encode::write_named(sink, value)?,
    }
    Ok(())
}

fn read_value<R: Read>(source: &mut R, config: &CodecConfig, depth: u32) -> Result<Value> {
    if depth > MAX_DEPTH {
        return Err(too_deep());
    }
    let first = source.read_u8()?;
    match Marker::from_u8(first) {
        Marker::FixExt1 => {
            let mut ext = [0u8; 2];
            source.read_exact(&mut ext)?;
            resolve_ext(ext[0], ext[1], config).map(|s| Value::String(s.to_string()))
        }
        Marker::FixArray(n) => read_array(source, config, depth, u32::from(n)),
        Marker::Array16 => {
            let n = source.read_u16::<BigEndian>()?;
            read_array(source, config, depth, u32::from(n))
        }
        Marker::Array32 => {
            let n = source.read_u32::<BigEndian>()?;
            read_array(source, config, depth, n)
        }
        Marker::FixMap(n) => read_map(source, config, depth, u32::from(n)),
        Marker::Map16 => {
            let n = source.read_u16::<BigEndian>()?;
            read_map(source, config, depth, u32::from(n))
        }
        Marker::Map32 => {
            let n = source.read_u32::<BigEndian>()?;
            read_map(source, config, depth, n)
        }
        _ => {
            // scalar: hand the marker byte back to the MessagePack reader
            let chained = Cursor::new([first]).chain(source);
            Ok(rmp_serde::decode::from_read(chained)?)
        }
    }
}

fn read_array<R: Read>(source: &mut R, config: &CodecConfig, depth: u32, len: u32) -> Result<Value> {
    let mut items = Vec::with_capacity(len.min(1024) as usize);
    for _ in 0..len {
        items.push(read_value(source, config, depth + 1)?);
    }
    Ok(Value::Array(items))
}

fn read_map<R: Read>(source: &mut R, config: &CodecConfig, depth: u32, len: u32) -> Result<Value> {
    let mut map = serde_json::Map::new();
    for _ in 0..len {
        let key = read_key(source, config)?;
        let value = read_value(source, config, depth + 1)?;
        map.insert(key, value);
    }
    Ok(Value::Object(map))
}

fn read_key<R: Read>(source: &mut R, config: &CodecConfig) -> Result<String> {
    let first = source.read_u8()?;
    match Marker::from_u8(first) {
        Marker::FixExt1 => {
            let mut ext = [0u8; 2];
            source.read_exact(&mut ext)?;
            resolve_ext(ext[0], ext[1], config).map(str::to_string)
        }
        Marker::FixStr(_) | Marker::Str8 | Marker::Str16 | Marker::Str32 => {
            let chained = Cursor::new([first]).chain(source);
            Ok(rmp_serde::decode::from_read(chained)?)
        }
        other => Err(EjbwireError::Protocol(format!(
            "map key must be a string or class reference, found marker {other:?}"
        ))),
    }
}

fn resolve_ext(ext_type: u8, index: u8, config: &CodecConfig) -> Result<&'static str> {
    let (table, kind) = match ext_type {
        OBJECT_REF => (config.object_table, "object"),
        CLASS_REF => (config.class_table, "class"),
        other => {
            return Err(EjbwireError::Protocol(format!(
                "unknown codec reference type {other:#04x}"
            )))
        }
    };
    table.get(index).ok_or_else(|| {
        EjbwireError::Protocol(format!("{kind} table has no entry at index {index}"))
    })
}
