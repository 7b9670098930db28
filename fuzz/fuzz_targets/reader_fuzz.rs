//! Reader fuzz target: parse arbitrary bytes as a schema-less message.
//! Parsing and dumping must not panic. Whatever parses must re-encode to bytes that
//! parse to the same fields.
//! Build with: cargo fuzz run reader_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    use protowire::{Message, ParseOptions, UnknownFieldSet};

    let options = ParseOptions::default().with_recursion_limit(32);
    let mut fields = UnknownFieldSet::new();
    if fields.merge_from_bytes_with(data, options).is_err() {
        return;
    }
    let _ = protowire::dump::unknown_fields_to_text(&fields, 0);
    let encoded = fields.to_bytes().expect("re-encode");
    assert_eq!(encoded.len(), fields.calculate_size());
    let reparsed = UnknownFieldSet::parse_from_bytes(&encoded).expect("re-parse");
    assert_eq!(reparsed, fields);
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run reader_fuzz");
}
