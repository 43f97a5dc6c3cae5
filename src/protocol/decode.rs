//! Protocol message decoding

use super::codec::{get_varint, Reader};
use super::constants::{self, tags};
use super::message::{Request, Response, ServerError};
use super::Protocol;
use crate::stream::{RecordBatch, SchemaRef};
use arrow_ipc::reader::StreamReader;
use arrow_schema::ArrowError;
use std::io;

/// Decode the connection handshake (server side)
pub fn decode_handshake(data: &[u8]) -> io::Result<Protocol> {
    if data.len() < constants::HANDSHAKE_LEN {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "incomplete handshake",
        ));
    }
    if data[..4] != constants::MAGIC {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "bad handshake magic",
        ));
    }
    let version = u16::from_be_bytes([data[4], data[5]]);
    if version != constants::PROTOCOL_VERSION {
        return Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("unsupported protocol version: {}", version),
        ));
    }
    Protocol::from_encoding_id(data[6]).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::Unsupported,
            format!("unsupported encoding: {}", data[6]),
        )
    })
}

/// Locate the next frame in `data`.
///
/// Returns `(tag, body_start, body_end)`. Fails with `UnexpectedEof` while the
/// frame is still incomplete.
fn frame_bounds(data: &[u8], protocol: Protocol) -> io::Result<(u8, usize, usize)> {
    if data.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "incomplete frame header",
        ));
    }
    let tag = data[0];

    let (len, header_len) = match protocol {
        Protocol::Binary => {
            if data.len() < 5 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "incomplete frame header",
                ));
            }
            let len = u32::from_be_bytes([data[1], data[2], data[3], data[4]]) as u64;
            (len, 5)
        }
        Protocol::Compact => {
            let (len, n) = get_varint(&data[1..])?;
            (len, 1 + n)
        }
    };

    if len > constants::MAX_FRAME_LENGTH as u64 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "frame length {} exceeds maximum allowed {}",
                len,
                constants::MAX_FRAME_LENGTH
            ),
        ));
    }

    let end = header_len + len as usize;
    if data.len() < end {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "incomplete frame body",
        ));
    }
    Ok((tag, header_len, end))
}

fn trailing(reader: &Reader<'_>, tag: u8) -> io::Result<()> {
    if reader.remaining() != 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "{} trailing bytes in frame '{}'",
                reader.remaining(),
                tag as char
            ),
        ));
    }
    Ok(())
}

/// Decode a response from the front of `data`.
///
/// Returns the message and the number of bytes consumed; the caller
/// advances its buffer.
pub fn decode_response(data: &[u8], protocol: Protocol) -> io::Result<(Response, usize)> {
    let (tag, start, end) = frame_bounds(data, protocol)?;
    let mut r = Reader::new(&data[start..end], protocol);

    let msg = match tag {
        tags::SESSION => Response::Session(r.get_str()?),
        tags::SCHEMA => Response::Schema(decode_schema(r.rest())?),
        tags::BATCH => Response::Batch(decode_batch(r.rest())?),
        tags::COMPLETE => Response::Complete {
            rows: r.get_i64()?,
            execution_ms: r.get_i64()?,
        },
        tags::OK => Response::Ok,
        tags::ERROR => Response::Error(ServerError {
            code: r.get_i32()?,
            message: r.get_str()?,
        }),
        _ => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown response tag: {}", tag),
            ))
        }
    };
    trailing(&r, tag)?;

    Ok((msg, end))
}

/// Decode a request from the front of `data` (server side)
pub fn decode_request(data: &[u8], protocol: Protocol) -> io::Result<(Request, usize)> {
    let (tag, start, end) = frame_bounds(data, protocol)?;
    let mut r = Reader::new(&data[start..end], protocol);

    let msg = match tag {
        tags::CONNECT => Request::Connect {
            user: r.get_str()?,
            password: r.get_str()?,
            database: r.get_str()?,
        },
        tags::DISCONNECT => Request::Disconnect {
            session: r.get_str()?,
        },
        tags::EXECUTE => Request::Execute {
            session: r.get_str()?,
            sql: r.get_str()?,
            first_n: r.get_i64()?,
        },
        tags::TERMINATE => Request::Terminate,
        _ => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown request tag: {}", tag),
            ))
        }
    };
    trailing(&r, tag)?;

    Ok((msg, end))
}

fn invalid_ipc(e: ArrowError) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("invalid arrow payload: {}", e),
    )
}

/// Schema frame body: an IPC stream with no batches
fn decode_schema(body: &[u8]) -> io::Result<SchemaRef> {
    let reader = StreamReader::try_new(body, None).map_err(invalid_ipc)?;
    Ok(reader.schema())
}

/// Batch frame body: an IPC stream with exactly one batch
fn decode_batch(body: &[u8]) -> io::Result<RecordBatch> {
    let mut reader = StreamReader::try_new(body, None).map_err(invalid_ipc)?;
    let batch = match reader.next() {
        Some(batch) => batch.map_err(invalid_ipc)?,
        None => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "batch frame without a record batch",
            ))
        }
    };
    if reader.next().is_some() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "batch frame with more than one record batch",
        ));
    }
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encode::{encode_handshake, encode_request, encode_response};
    use crate::stream::{ArrayRef, DataType, Field, Schema};
    use arrow_array::{BooleanArray, Float64Array, Int64Array, StringArray};
    use std::sync::Arc;

    fn flights_schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("origin_city", DataType::Utf8, true),
            Field::new("origin_lat", DataType::Float64, true),
            Field::new("delay", DataType::Int64, true),
            Field::new("cancelled", DataType::Boolean, true),
        ]))
    }

    fn sample_batch() -> Response {
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(vec![Some("Dallas"), None])),
            Arc::new(Float64Array::from(vec![Some(32.9), Some(-97.03)])),
            Arc::new(Int64Array::from(vec![Some(-1), Some(i64::MAX)])),
            Arc::new(BooleanArray::from(vec![None, Some(true)])),
        ];
        Response::Batch(RecordBatch::try_new(flights_schema(), columns).unwrap())
    }

    #[test]
    fn test_batch_survives_both_encodings() {
        for protocol in [Protocol::Binary, Protocol::Compact] {
            let msg = sample_batch();
            let buf = encode_response(&msg, protocol).unwrap();
            let (decoded, consumed) = decode_response(&buf, protocol).unwrap();
            assert_eq!(consumed, buf.len());
            assert_eq!(decoded, msg);
        }
    }

    #[test]
    fn test_schema_frame_carries_no_rows() {
        let buf = encode_response(&Response::Schema(flights_schema()), Protocol::Binary).unwrap();
        match decode_response(&buf, Protocol::Binary).unwrap().0 {
            Response::Schema(schema) => {
                assert_eq!(schema.fields().len(), 4);
                assert_eq!(schema.field(0).name(), "origin_city");
                assert_eq!(schema.field(3).data_type(), &DataType::Boolean);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_schema_frame_is_not_a_batch() {
        let mut buf =
            encode_response(&Response::Schema(flights_schema()), Protocol::Compact).unwrap();
        // Same body under the batch tag
        buf[0] = tags::BATCH;
        let err = decode_response(&buf, Protocol::Compact).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_garbage_arrow_payload_is_invalid() {
        let data = [tags::SCHEMA, 3, 1, 2, 3];
        let err = decode_response(&data, Protocol::Compact).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_incomplete_frame_is_eof() {
        let buf = encode_response(&sample_batch(), Protocol::Compact).unwrap();
        for cut in [0, 1, buf.len() / 2, buf.len() - 1] {
            let err = decode_response(&buf[..cut], Protocol::Compact).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof, "cut at {}", cut);
        }
    }

    #[test]
    fn test_two_frames_in_one_buffer() {
        let mut buf = encode_response(&Response::Session("tok".into()), Protocol::Binary).unwrap();
        buf.extend_from_slice(&encode_response(&Response::Ok, Protocol::Binary).unwrap());

        let (first, n) = decode_response(&buf, Protocol::Binary).unwrap();
        assert_eq!(first, Response::Session("tok".into()));
        let (second, m) = decode_response(&buf[n..], Protocol::Binary).unwrap();
        assert_eq!(second, Response::Ok);
        assert_eq!(n + m, buf.len());
    }

    #[test]
    fn test_rejects_oversized_frame() {
        let data = [tags::BATCH, 0xFF, 0xFF, 0xFF, 0xFF];
        let err = decode_response(&data, Protocol::Binary).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_rejects_unknown_tag() {
        let data = [b'?', 0];
        let err = decode_response(&data, Protocol::Compact).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_rejects_trailing_bytes() {
        // OK frame declaring a 1-byte body
        let data = [tags::OK, 1, 0];
        let err = decode_response(&data, Protocol::Compact).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_decode_execute_request() {
        let msg = Request::Execute {
            session: "s1".into(),
            sql: "SELECT count(*) FROM flights".into(),
            first_n: constants::NO_ROW_LIMIT,
        };
        let buf = encode_request(&msg, Protocol::Compact).unwrap();
        let (decoded, _) = decode_request(&buf, Protocol::Compact).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_decode_handshake() {
        let hs = encode_handshake(Protocol::Compact);
        assert_eq!(decode_handshake(&hs).unwrap(), Protocol::Compact);

        let mut bad = hs;
        bad[0] = b'X';
        assert!(decode_handshake(&bad).is_err());
        assert!(decode_handshake(&hs[..4]).is_err());
    }
}
