#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use oxmilter_server::fuzzing::fuzz_parse;

fuzz_target!(|data: &[u8]| {
    let mut buffer = BytesMut::from(data);
    let _decoded = fuzz_parse(&mut buffer);
});
