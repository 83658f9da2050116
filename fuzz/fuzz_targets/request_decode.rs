//! Fuzz target for request decoding
//!
//! Arbitrary bytes arrive on a node or coordinator socket. Decoding must
//! never panic: anything that is not a well-formed request is an error the
//! server answers with `{ok:false, error}`.
//!
//! # Invariants
//!
//! - Decoded requests re-encode and decode to the same request

#![no_main]

use libfuzzer_sys::fuzz_target;
use tracegate_proto::{decode_request, encode_line};

fuzz_target!(|data: &[u8]| {
    let Ok(request) = decode_request(data) else { return };

    let line = encode_line(&request).expect("decoded request must re-encode");
    let again = decode_request(&line).expect("re-encoded request must decode");
    assert_eq!(request, again);
});
