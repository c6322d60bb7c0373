//! Fuzz target for wire frame decoding
//!
//! Untrusted bytes from a TCP peer must never crash the adapter.
//!
//! # Strategy
//!
//! - Raw bytes: Arbitrary length prefixes and CBOR payloads
//! - Small limits: Frame limit chosen by the fuzzer to hit size checks
//!
//! # Invariants
//!
//! - Decoding never panics
//! - An incomplete frame consumes no bytes
//! - An announced size above the limit is rejected before buffering
//! - A decoded request re-encodes and decodes to the same request

#![no_main]

use arbitrary::Arbitrary;
use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use roomledger_server::{
    protocol::{decode_frame, encode_frame, LENGTH_PREFIX_SIZE},
    ProtocolError, Request,
};

#[derive(Debug, Arbitrary)]
struct Input {
    max_frame_bytes: u16,
    bytes: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let max = usize::from(input.max_frame_bytes);
    let mut buf = BytesMut::from(&input.bytes[..]);
    let before = buf.len();

    match decode_frame::<Request>(&mut buf, max) {
        Ok(None) => assert_eq!(buf.len(), before, "incomplete frame must not be consumed"),
        Ok(Some(request)) => {
            let mut encoded = BytesMut::new();
            encode_frame(&request, &mut encoded, usize::MAX).expect("decoded request re-encodes");
            let again = decode_frame::<Request>(&mut encoded, usize::MAX)
                .expect("re-encoded frame decodes")
                .expect("re-encoded frame is complete");
            assert_eq!(again, request);
        },
        Err(ProtocolError::FrameTooLarge { size, max: limit }) => {
            assert!(size > limit);
            assert_eq!(buf.len(), before);
            assert!(before >= LENGTH_PREFIX_SIZE);
        },
        Err(_) => {},
    }
});
