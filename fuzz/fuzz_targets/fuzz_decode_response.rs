#![no_main]

use bytes::{Buf, BytesMut};
use libfuzzer_sys::fuzz_target;
use mapd_connector::protocol::{decode_response, Protocol};

fuzz_target!(|data: &[u8]| {
    // First byte picks the encoding, the rest is a run of frames
    let Some((&first, rest)) = data.split_first() else {
        return;
    };
    let protocol = if first & 1 == 0 {
        Protocol::Binary
    } else {
        Protocol::Compact
    };

    let mut buf = BytesMut::from(rest);
    while !buf.is_empty() {
        match decode_response(&buf, protocol) {
            Ok((_, consumed)) if consumed > 0 => buf.advance(consumed),
            _ => break,
        }
    }
});
