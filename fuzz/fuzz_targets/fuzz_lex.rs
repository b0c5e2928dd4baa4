//! Fuzzes the batch lexer on arbitrary bytes.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_lex
#![no_main]
use libfuzzer_sys::fuzz_target;
use modmap_wire::MessageBuffer;

fuzz_target!(|data: &[u8]| {
    // Malformed input must surface as data, never as a panic.
    let mut batch = data.to_vec();
    batch.push(b'\n');
    let mut buf = MessageBuffer::new();
    if buf.load_batch(batch).is_ok() {
        while let Some(line) = buf.lex() {
            let _ = line;
            let _ = buf.lexed_line();
        }
    }
});
