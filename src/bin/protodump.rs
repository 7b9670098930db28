//! Decode protocol-buffer messages without a schema and print their fields.
//!
//! Usage:
//!   protodump [OPTIONS] [FILE ...]
//!   protodump < message.bin
//!
//! Options:
//!   --delimited, -d            Input is a run of length-prefixed messages
//!   --recursion-limit N        Maximum nesting depth (default 100)
//!   --size-limit N             Maximum bytes read per message
//!   --max-depth N              Nesting levels to render (default 10)
//!
//! If no files are given, reads from stdin. Set RUST_LOG=debug to see why a message
//! was rejected.

use anyhow::{bail, Context};
use protowire::dump::{unknown_fields_to_text_with_limit, DEFAULT_DUMP_RECURSION_LIMIT};
use protowire::frame::decode_delimited_frame;
use protowire::{Message, ParseOptions, UnknownFieldSet};
use std::io::{self, Read};
use tracing_subscriber::EnvFilter;

fn take_value(args: &mut Vec<String>, flag: &str) -> anyhow::Result<Option<String>> {
    match args.iter().position(|a| a == flag) {
        Some(pos) => {
            if pos + 1 >= args.len() {
                bail!("{} requires a value", flag);
            }
            let value = args.remove(pos + 1);
            args.remove(pos);
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

fn dump(name: &str, data: &[u8], delimited: bool, options: &ParseOptions, max_depth: usize) -> bool {
    if delimited {
        match decode_delimited_frame::<UnknownFieldSet>(data, options) {
            Ok(result) => {
                for (i, decoded) in result.messages.iter().enumerate() {
                    println!("# {} message {} bytes {}..{}", name, i, decoded.byte_range.0, decoded.byte_range.1);
                    println!("{}", unknown_fields_to_text_with_limit(&decoded.message, 0, max_depth));
                }
                for removed in &result.removed {
                    eprintln!(
                        "{}: bytes {}..{} removed: {}",
                        name, removed.byte_range.0, removed.byte_range.1, removed.reason
                    );
                }
                result.removed.is_empty()
            }
            Err(e) => {
                eprintln!("{}: {}", name, e);
                false
            }
        }
    } else {
        let mut message = UnknownFieldSet::new();
        match message.merge_from_bytes_with(data, options.clone()) {
            Ok(()) => {
                println!("{}", unknown_fields_to_text_with_limit(&message, 0, max_depth));
                true
            }
            Err(e) => {
                eprintln!("{}: {}", name, e);
                false
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let delimited = if let Some(pos) = args.iter().position(|a| a == "--delimited" || a == "-d") {
        args.remove(pos);
        true
    } else {
        false
    };
    let mut options = ParseOptions::default();
    if let Some(v) = take_value(&mut args, "--recursion-limit")? {
        options.recursion_limit = v.parse().with_context(|| format!("bad recursion limit {:?}", v))?;
    }
    if let Some(v) = take_value(&mut args, "--size-limit")? {
        options.size_limit = v.parse().with_context(|| format!("bad size limit {:?}", v))?;
    }
    let mut max_depth = DEFAULT_DUMP_RECURSION_LIMIT;
    if let Some(v) = take_value(&mut args, "--max-depth")? {
        max_depth = v.parse().with_context(|| format!("bad max depth {:?}", v))?;
    }

    let mut ok = true;
    if args.is_empty() {
        let mut data = Vec::new();
        io::stdin().read_to_end(&mut data)?;
        ok &= dump("<stdin>", &data, delimited, &options, max_depth);
    } else {
        for path in &args {
            let data = match std::fs::read(path) {
                Ok(d) => d,
                Err(e) => {
                    eprintln!("{}: {}", path, e);
                    ok = false;
                    continue;
                }
            };
            ok &= dump(path, &data, delimited, &options, max_depth);
        }
    }

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}
