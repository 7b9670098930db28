//! Format schema-less messages for display, one field per line.
//!
//! Output follows the usual raw-decode layout: `number: value` for scalars and
//! `number { ... }` for embedded messages and groups. A length-delimited value is shown
//! as a string when it is printable text, as a nested message when it parses as one,
//! and as hex otherwise.
//!
//! Nesting is bounded by a recursion budget. Every embedded message or group spends one
//! unit; once the budget is gone, length-delimited values are shown as hex and groups
//! are elided.

use crate::message::Message;
use crate::reader::ParseOptions;
use crate::unknown::{UnknownField, UnknownFieldSet};

/// Nesting levels rendered by [`unknown_fields_to_text`].
pub const DEFAULT_DUMP_RECURSION_LIMIT: usize = 10;

fn hex_string(b: &[u8]) -> String {
    b.iter().map(|x| format!("{:02x}", x)).collect::<Vec<_>>().join(" ")
}

fn is_printable(s: &str) -> bool {
    s.chars().all(|c| !c.is_control() || c == '\n' || c == '\r' || c == '\t')
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Text of every field in `set`, indented by `indent` levels, nesting at most
/// [`DEFAULT_DUMP_RECURSION_LIMIT`] levels deep.
pub fn unknown_fields_to_text(set: &UnknownFieldSet, indent: usize) -> String {
    unknown_fields_to_text_with_limit(set, indent, DEFAULT_DUMP_RECURSION_LIMIT)
}

/// Like [`unknown_fields_to_text`] with an explicit nesting budget.
pub fn unknown_fields_to_text_with_limit(set: &UnknownFieldSet, indent: usize, recursion_limit: usize) -> String {
    let mut lines = Vec::new();
    for (number, field) in set.fields() {
        field_lines(number, field, indent, recursion_limit, &mut lines);
    }
    lines.join("\n")
}

fn field_lines(number: u32, field: &UnknownField, indent: usize, budget: usize, lines: &mut Vec<String>) {
    let pad = "  ".repeat(indent);
    for v in field.varint_list() {
        lines.push(format!("{}{}: {}", pad, number, v));
    }
    for v in field.fixed32_list() {
        lines.push(format!("{}{}: 0x{:08x}", pad, number, v));
    }
    for v in field.fixed64_list() {
        lines.push(format!("{}{}: 0x{:016x}", pad, number, v));
    }
    for blob in field.length_delimited_list() {
        match length_delimited_text(blob, budget) {
            LengthDelimited::Text(s) => lines.push(format!("{}{}: {}", pad, number, quote(&s))),
            LengthDelimited::Nested(nested) => nested_lines(number, &nested, indent, budget, lines),
            LengthDelimited::Raw => lines.push(format!("{}{}: hex({})", pad, number, hex_string(blob))),
        }
    }
    for group in field.group_list() {
        if budget == 0 {
            lines.push(format!("{}{} {{ ... }}", pad, number));
        } else {
            nested_lines(number, group, indent, budget, lines);
        }
    }
}

/// Caller guarantees `budget > 0`.
fn nested_lines(number: u32, nested: &UnknownFieldSet, indent: usize, budget: usize, lines: &mut Vec<String>) {
    let pad = "  ".repeat(indent);
    lines.push(format!("{}{} {{", pad, number));
    for (n, f) in nested.fields() {
        field_lines(n, f, indent + 1, budget - 1, lines);
    }
    lines.push(format!("{}}}", pad));
}

enum LengthDelimited {
    Text(String),
    Nested(UnknownFieldSet),
    Raw,
}

fn length_delimited_text(blob: &[u8], budget: usize) -> LengthDelimited {
    if let Ok(s) = std::str::from_utf8(blob) {
        if is_printable(s) {
            return LengthDelimited::Text(s.to_string());
        }
    }
    if budget == 0 || blob.is_empty() {
        return LengthDelimited::Raw;
    }
    // Groups inside the blob count against the same budget.
    let mut nested = UnknownFieldSet::new();
    let options = ParseOptions::default().with_recursion_limit(budget);
    match nested.merge_from_bytes_with(blob, options) {
        Ok(()) if !nested.is_empty() => LengthDelimited::Nested(nested),
        _ => LengthDelimited::Raw,
    }
}

/// First line of the dump (summary for log lines).
pub fn summary_line(set: &UnknownFieldSet) -> String {
    unknown_fields_to_text(set, 0)
        .lines()
        .next()
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}
