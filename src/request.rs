//! Request body encoding.
//!
//! Pure writers for the two request opcodes. Both emit the full frame
//! body starting at the opcode byte, so a request can be encoded into
//! any sink and inspected byte-for-byte in tests.

use std::io::Write;

use byteorder::{BigEndian, WriteBytesExt};
use serde_json::Value;

use crate::attachment::keys;
use crate::codec::CodecAdapter;
use crate::error::Result;
use crate::invocation::InvocationContext;
use crate::locator::StatelessLocator;
use crate::protocol::{opcode, wire};

/// Encode an `OPEN_SESSION_REQUEST`: opcode, id, then the four locator
/// strings as UTF (`appName` and `distinctName` may be empty). No codec
/// stream is started.
pub(crate) fn write_open_session<W: Write>(
    out: &mut W,
    id: u16,
    locator: &StatelessLocator,
) -> Result<()> {
    out.write_u8(opcode::OPEN_SESSION_REQUEST)?;
    out.write_u16::<BigEndian>(id)?;
    wire::write_utf(out, locator.app_name())?;
    wire::write_utf(out, locator.module_name())?;
    wire::write_utf(out, locator.bean_name())?;
    wire::write_utf(out, locator.distinct_name())?;
    Ok(())
}

/// Encode an `INVOCATION_REQUEST`: opcode, id, then one codec stream
/// whose layout depends on the negotiated protocol version.
pub(crate) fn write_invocation<W: Write>(
    out: &mut W,
    id: u16,
    adapter: &CodecAdapter,
    invocation: &InvocationContext,
) -> Result<()> {
    out.write_u8(opcode::INVOCATION_REQUEST)?;
    out.write_u16::<BigEndian>(id)?;

    let version = adapter.protocol_version();
    let mut encoder = adapter.encoder();
    encoder.start(out)?;

    let method = invocation.method();
    let locator = invocation.locator();
    if version < 3 {
        wire::write_utf(out, method.method_name())?;
        wire::write_utf(out, &method.signature_string())?;
        // versions 1 and 2 carry the locator fields redundantly
        for part in [
            locator.app_name(),
            locator.module_name(),
            locator.distinct_name(),
            locator.bean_name(),
        ] {
            encoder.write_object(out, &Value::from(part))?;
        }
    } else {
        encoder.write_object(out, &method.to_wire_object()?)?;
    }
    encoder.write_object(out, &locator.to_wire_object()?)?;

    for parameter in invocation.parameters() {
        encoder.write_object(out, parameter)?;
    }

    let context_data = invocation.context_data();
    let private = invocation.private_attachments();
    let has_private = !private.is_empty();
    let duplicate_tx_id = version < 3 && private.contains_key(keys::TRANSACTION_ID);

    let mut total = context_data.len() + usize::from(has_private);
    if duplicate_tx_id {
        total += 1;
    }
    adapter.write_packed_uint(out, total as u32)?;

    for (key, value) in context_data {
        encoder.write_object(out, &Value::from(key.as_str()))?;
        encoder.write_object(out, value)?;
    }
    if has_private {
        let map: serde_json::Map<String, Value> = private
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        encoder.write_object(out, &Value::from(keys::PRIVATE_ATTACHMENTS))?;
        encoder.write_object(out, &Value::Object(map))?;
    }
    if duplicate_tx_id {
        // legacy duplicate for pre-v3 peers; the codec may or may not
        // collapse it with a back-reference
        encoder.write_object(out, &Value::from(keys::TRANSACTION_PRIVATE_DATA))?;
        if let Some(tx_id) = private.get(keys::TRANSACTION_ID) {
            encoder.write_object(out, tx_id)?;
        }
    }

    encoder.finish(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::MethodLocator;
    use crate::protocol::wire::{read_packed_uint, read_utf};
    use byteorder::ReadBytesExt;
    use serde_json::json;

    fn adapter(version: u8) -> CodecAdapter {
        CodecAdapter::for_version("river", version).unwrap()
    }

    fn locator() -> StatelessLocator {
        StatelessLocator::new("shop-app", "shop", "CartBean", "").unwrap()
    }

    fn invocation() -> InvocationContext {
        InvocationContext::new(
            MethodLocator::new("addItem", vec!["java.lang.String".to_string()]),
            locator(),
        )
        .parameter(json!("widget"))
    }

    struct DecodedStream {
        objects: Vec<Value>,
    }

    /// Read the whole invocation body back: header, UTF prefix (pre-v3),
    /// `object_count` objects, packed attachment count, then the
    /// `2 * attachment_count` trailing attachment objects.
    fn decode_invocation(
        bytes: &[u8],
        adapter: &CodecAdapter,
        expected_id: u16,
        utf_prefix: usize,
        object_count: usize,
    ) -> (Vec<String>, DecodedStream, u32, DecodedStream) {
        let mut src = bytes;
        assert_eq!(src.read_u8().unwrap(), opcode::INVOCATION_REQUEST);
        assert_eq!(src.read_u16::<BigEndian>().unwrap(), expected_id);

        let mut decoder = adapter.decoder();
        decoder.start(&mut src).unwrap();
        let mut strings = Vec::new();
        for _ in 0..utf_prefix {
            strings.push(read_utf(&mut src).unwrap());
        }
        let mut objects = Vec::new();
        for _ in 0..object_count {
            objects.push(decoder.read_object(&mut src).unwrap());
        }
        let attachments = read_packed_uint(&mut src).unwrap();
        let mut attachment_objects = Vec::new();
        for _ in 0..2 * attachments {
            attachment_objects.push(decoder.read_object(&mut src).unwrap());
        }
        decoder.finish(&mut src).unwrap();
        assert!(src.is_empty(), "unexpected trailing request bytes");
        (
            strings,
            DecodedStream { objects },
            attachments,
            DecodedStream {
                objects: attachment_objects,
            },
        )
    }

    #[test]
    fn test_open_session_layout() {
        let mut buf = Vec::new();
        write_open_session(&mut buf, 0x1234, &locator()).unwrap();

        let mut src = &buf[..];
        assert_eq!(src.read_u8().unwrap(), opcode::OPEN_SESSION_REQUEST);
        assert_eq!(src.read_u16::<BigEndian>().unwrap(), 0x1234);
        assert_eq!(read_utf(&mut src).unwrap(), "shop-app");
        assert_eq!(read_utf(&mut src).unwrap(), "shop");
        assert_eq!(read_utf(&mut src).unwrap(), "CartBean");
        assert_eq!(read_utf(&mut src).unwrap(), "");
        assert!(src.is_empty());
    }

    #[test]
    fn test_invocation_v3_layout() {
        let adapter = adapter(3);
        let mut buf = Vec::new();
        write_invocation(&mut buf, 7, &adapter, &invocation()).unwrap();

        // method locator, ejb locator, one parameter
        let (strings, stream, attachments, trailing) =
            decode_invocation(&buf, &adapter, 7, 0, 3);
        assert!(strings.is_empty());
        assert_eq!(stream.objects[0]["methodName"], "addItem");
        assert_eq!(stream.objects[1]["beanName"], "CartBean");
        assert_eq!(stream.objects[2], json!("widget"));
        assert_eq!(attachments, 0);
        assert!(trailing.objects.is_empty());
    }

    #[test]
    fn test_invocation_v2_layout() {
        let adapter = adapter(2);
        let mut buf = Vec::new();
        write_invocation(&mut buf, 7, &adapter, &invocation()).unwrap();

        // four redundant locator strings, the locator, one parameter
        let (strings, stream, attachments, _) = decode_invocation(&buf, &adapter, 7, 2, 6);
        assert_eq!(strings, vec!["addItem", "java.lang.String"]);
        assert_eq!(
            &stream.objects[..4],
            &[
                json!("shop-app"),
                json!("shop"),
                json!(""),
                json!("CartBean")
            ]
        );
        assert_eq!(stream.objects[4]["moduleName"], "shop");
        assert_eq!(stream.objects[5], json!("widget"));
        assert_eq!(attachments, 0);
    }

    #[test]
    fn test_invocation_attachment_counts() {
        let adapter = adapter(3);
        let ctx = invocation()
            .context_entry("trace", json!("abc"))
            .private_attachment(keys::TRANSACTION_ID, json!("tx-9"));

        let mut buf = Vec::new();
        write_invocation(&mut buf, 1, &adapter, &ctx).unwrap();
        let (_, _, attachments, trailing) = decode_invocation(&buf, &adapter, 1, 0, 3);
        // one context entry plus the private-attachments composite
        assert_eq!(attachments, 2);
        assert_eq!(trailing.objects[0], json!("trace"));
        assert_eq!(trailing.objects[1], json!("abc"));
        assert_eq!(trailing.objects[2], json!(keys::PRIVATE_ATTACHMENTS));
        assert_eq!(
            trailing.objects[3],
            json!({ (keys::TRANSACTION_ID): "tx-9" })
        );
        // no v3 duplication of the transaction id
        assert_eq!(trailing.objects.len(), 4);
    }

    #[test]
    fn test_invocation_v2_transaction_id_quirk() {
        let adapter = adapter(2);
        let ctx = invocation().private_attachment(keys::TRANSACTION_ID, json!("tx-9"));

        let mut buf = Vec::new();
        write_invocation(&mut buf, 1, &adapter, &ctx).unwrap();
        let (_, _, attachments, trailing) = decode_invocation(&buf, &adapter, 1, 2, 6);
        // the duplicate raises the declared count by one
        assert_eq!(attachments, 2);
        assert_eq!(trailing.objects[0], json!(keys::PRIVATE_ATTACHMENTS));
        assert_eq!(
            trailing.objects[1],
            json!({ (keys::TRANSACTION_ID): "tx-9" })
        );
        assert_eq!(trailing.objects[2], json!(keys::TRANSACTION_PRIVATE_DATA));
        assert_eq!(trailing.objects[3], json!("tx-9"));
    }

    #[test]
    fn test_encoding_is_idempotent_modulo_id() {
        let adapter = adapter(3);
        let ctx = invocation()
            .context_entry("b", json!(2))
            .context_entry("a", json!(1));

        let mut first = Vec::new();
        write_invocation(&mut first, 42, &adapter, &ctx).unwrap();
        let mut second = Vec::new();
        write_invocation(&mut second, 42, &adapter, &ctx).unwrap();
        assert_eq!(first, second);

        let mut other_id = Vec::new();
        write_invocation(&mut other_id, 43, &adapter, &ctx).unwrap();
        // identical bytes apart from the id field
        assert_eq!(first[0], other_id[0]);
        assert_ne!(first[1..3], other_id[1..3]);
        assert_eq!(first[3..], other_id[3..]);
    }

    #[test]
    fn test_no_parameters_writes_no_parameter_objects() {
        let adapter = adapter(3);
        let ctx = InvocationContext::new(MethodLocator::new("ping", vec![]), locator());
        let mut buf = Vec::new();
        write_invocation(&mut buf, 1, &adapter, &ctx).unwrap();
        let (_, stream, attachments, _) = decode_invocation(&buf, &adapter, 1, 0, 2);
        assert_eq!(stream.objects.len(), 2);
        assert_eq!(attachments, 0);
    }
}
