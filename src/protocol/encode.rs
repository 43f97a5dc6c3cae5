//! Protocol message encoding

use super::codec::Writer;
use super::constants::{self, tags};
use super::message::{Request, Response, ServerError};
use super::Protocol;
use crate::stream::{RecordBatch, Schema};
use crate::{Error, Result};
use arrow_ipc::writer::StreamWriter;
use bytes::{BufMut, BytesMut};

/// Encode the connection handshake
pub fn encode_handshake(protocol: Protocol) -> [u8; constants::HANDSHAKE_LEN] {
    let mut out = [0u8; constants::HANDSHAKE_LEN];
    out[..4].copy_from_slice(&constants::MAGIC);
    out[4..6].copy_from_slice(&constants::PROTOCOL_VERSION.to_be_bytes());
    out[6] = protocol.encoding_id();
    out
}

/// Encode a request into a frame
///
/// # Errors
///
/// `Error::Protocol` if the body would exceed `MAX_FRAME_LENGTH`.
pub fn encode_request(msg: &Request, protocol: Protocol) -> Result<BytesMut> {
    match msg {
        Request::Connect {
            user,
            password,
            database,
        } => frame(tags::CONNECT, protocol, |w| {
            w.put_str(user);
            w.put_str(password);
            w.put_str(database);
            Ok(())
        }),
        Request::Disconnect { session } => frame(tags::DISCONNECT, protocol, |w| {
            w.put_str(session);
            Ok(())
        }),
        Request::Execute {
            session,
            sql,
            first_n,
        } => frame(tags::EXECUTE, protocol, |w| {
            w.put_str(session);
            w.put_str(sql);
            w.put_i64(*first_n);
            Ok(())
        }),
        Request::Terminate => frame(tags::TERMINATE, protocol, |_| Ok(())),
    }
}

/// Encode a response into a frame
///
/// # Errors
///
/// `Error::Arrow` if a schema or batch cannot be written as IPC, and
/// `Error::Protocol` if the body would exceed `MAX_FRAME_LENGTH`.
pub fn encode_response(msg: &Response, protocol: Protocol) -> Result<BytesMut> {
    match msg {
        Response::Session(token) => frame(tags::SESSION, protocol, |w| {
            w.put_str(token);
            Ok(())
        }),
        Response::Schema(schema) => frame(tags::SCHEMA, protocol, |w| {
            w.put_slice(&arrow_ipc(schema, None)?);
            Ok(())
        }),
        Response::Batch(batch) => frame(tags::BATCH, protocol, |w| {
            w.put_slice(&arrow_ipc(&batch.schema(), Some(batch))?);
            Ok(())
        }),
        Response::Complete { rows, execution_ms } => frame(tags::COMPLETE, protocol, |w| {
            w.put_i64(*rows);
            w.put_i64(*execution_ms);
            Ok(())
        }),
        Response::Ok => frame(tags::OK, protocol, |_| Ok(())),
        Response::Error(ServerError { code, message }) => frame(tags::ERROR, protocol, |w| {
            w.put_i32(*code);
            w.put_str(message);
            Ok(())
        }),
    }
}

/// Write the body with `f`, then prefix it with tag and length
fn frame(
    tag: u8,
    protocol: Protocol,
    f: impl FnOnce(&mut Writer<'_>) -> Result<()>,
) -> Result<BytesMut> {
    let mut body = BytesMut::new();
    f(&mut Writer::new(&mut body, protocol))?;
    check_frame_len(tag, body.len())?;

    let mut buf = BytesMut::with_capacity(body.len() + 6);
    buf.put_u8(tag);
    Writer::new(&mut buf, protocol).put_len(body.len());
    buf.put(body);
    Ok(buf)
}

fn check_frame_len(tag: u8, len: usize) -> Result<()> {
    if len > constants::MAX_FRAME_LENGTH {
        return Err(Error::Protocol(format!(
            "frame '{}' body of {} bytes exceeds maximum allowed {}",
            tag as char,
            len,
            constants::MAX_FRAME_LENGTH
        )));
    }
    Ok(())
}

/// Arrow IPC stream holding `schema` and at most one batch
fn arrow_ipc(schema: &Schema, batch: Option<&RecordBatch>) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    {
        let mut writer = StreamWriter::try_new(&mut buf, schema)?;
        if let Some(batch) = batch {
            writer.write(batch)?;
        }
        writer.finish()?;
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_handshake() {
        let hs = encode_handshake(Protocol::Compact);
        assert_eq!(&hs[..4], b"MAPD");
        assert_eq!(&hs[4..6], &[0x00, 0x01]);
        assert_eq!(hs[6], constants::encoding::COMPACT);
        assert_eq!(hs[7], 0);
    }

    #[test]
    fn test_encode_terminate() {
        let buf = encode_request(&Request::Terminate, Protocol::Binary).unwrap();
        assert_eq!(&buf[..], &[b'X', 0, 0, 0, 0]);

        let buf = encode_request(&Request::Terminate, Protocol::Compact).unwrap();
        assert_eq!(&buf[..], &[b'X', 0]);
    }

    #[test]
    fn test_encode_disconnect_binary_layout() {
        let buf = encode_request(
            &Request::Disconnect {
                session: "abc".into(),
            },
            Protocol::Binary,
        )
        .unwrap();
        assert_eq!(buf[0], tags::DISCONNECT);
        let len = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
        assert_eq!(len, buf.len() - 5);
        assert_eq!(&buf[5..9], &[0, 0, 0, 3]);
        assert_eq!(&buf[9..], b"abc");
    }

    #[test]
    fn test_frame_length_cap() {
        assert!(check_frame_len(tags::EXECUTE, constants::MAX_FRAME_LENGTH).is_ok());

        let err = check_frame_len(tags::EXECUTE, constants::MAX_FRAME_LENGTH + 1).unwrap_err();
        assert!(matches!(err, Error::Protocol(msg) if msg.contains("'Q'")));

        // Past u32::MAX the binary length field would wrap
        let err = check_frame_len(tags::EXECUTE, u32::MAX as usize + 1).unwrap_err();
        assert!(err.is_fatal());
    }
}
