//! Fuzzes server dispatch end to end on arbitrary request batches.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_dispatch
#![no_main]
use libfuzzer_sys::fuzz_target;
use modmap_ipc::prelude::*;

fuzz_target!(|data: &[u8]| {
    let mut batch = data.to_vec();
    batch.push(b'\n');

    let mut server = MapperServer::new();
    let mut resolver = FileResolver::default();
    if server.accept_batch(batch).is_ok() {
        let _ = server.parse_requests(&mut resolver);
        server.prepare_to_write();
        let _ = server.take_response_batch();
    }
});
