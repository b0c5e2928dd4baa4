//! Fuzzes the quoting round trip: any string that goes out must come
//! back byte-identical.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_quote_roundtrip
#![no_main]
use libfuzzer_sys::fuzz_target;
use modmap_wire::MessageBuffer;

fuzz_target!(|word: String| {
    let mut out = MessageBuffer::new();
    out.begin_line();
    out.append_word(&word);
    out.prepare_to_write();

    let mut back = MessageBuffer::new();
    back.load_batch(out.take_bytes()).expect("emitted batches are complete");
    match back.lex() {
        Some(Ok(words)) => assert_eq!(words, [word]),
        other => panic!("emitted word failed to parse: {other:?}"),
    }
});
