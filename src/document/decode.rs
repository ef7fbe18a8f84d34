//! Turns a flattened [`Entry`] stream into typed records: finding
//! `StartClass`/`ClassName`/`EndClass` spans, coercing declared fields, and
//! routing everything else to a caller-supplied `decode_unknown` collector.

use super::tokenizer::{Entry, Value};
use crate::error::SldyError;

/// One flat `StartClass ... EndClass` span: a class name plus its ordered
/// attribute pairs. Composite records (ImageRecord -> LensDef -> ...) are
/// expressed as sibling spans, chained by the caller passing the returned
/// cursor into the next `read_block` call, matching the source document's
/// sequential (not nested) layout.
#[derive(Debug, Clone)]
pub struct Block {
    pub class_name: String,
    pub fields: Vec<(String, Value)>,
}

impl Block {
    /// Returns the extra `(key, value)` pairs left over once a record type's
    /// declared fields have claimed the ones they recognise. Callers build
    /// this by draining `self.fields` in their own decode loop; this method
    /// is provided for record types that don't need to inspect every field.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

/// Scans forward from `pos` for the next `StartClass`/`ClassName`/`EndClass`
/// span and returns it with the cursor advanced past its `EndClass`.
/// `Ok(None)` means an `EndClass` (or end of stream) was reached before any
/// `StartClass`, i.e. "no more records here" per §4.2 step 1.
pub fn read_block(entries: &[Entry], mut pos: usize) -> Result<Option<(Block, usize)>, SldyError> {
    loop {
        match entries.get(pos) {
            Some(Entry::StartClass) => break,
            Some(Entry::EndClass) => return Ok(None),
            Some(_) => pos += 1,
            None => return Ok(None),
        }
    }
    pos += 1;

    let class_name = match entries.get(pos) {
        Some(Entry::ClassName(name)) => name.clone(),
        _ => return Err(SldyError::format("StartClass not followed by ClassName")),
    };
    pos += 1;

    let mut fields = Vec::new();
    loop {
        match entries.get(pos) {
            Some(Entry::EndClass) => {
                pos += 1;
                break;
            }
            Some(Entry::Field { key, value }) => {
                fields.push((key.clone(), value.clone()));
                pos += 1;
            }
            Some(Entry::StartClass) => {
                return Err(SldyError::format(format!(
                    "unexpected nested StartClass inside {}",
                    class_name
                )));
            }
            Some(Entry::ClassName(_)) => pos += 1,
            None => {
                return Err(SldyError::format(format!(
                    "unexpected end of document inside {}",
                    class_name
                )))
            }
        }
    }

    Ok(Some((Block { class_name, fields }, pos)))
}

/// Like [`read_block`] but requires the class name to match, surfacing a
/// mismatch as a structural `Format` error (step 2 of §4.2: "if not, leave
/// index unchanged and signal no match" — callers that want the tolerant
/// variant should use [`find_next_class`] to dispatch instead of this).
pub fn expect_block(
    entries: &[Entry],
    pos: usize,
    expected_class: &str,
) -> Result<(Block, usize), SldyError> {
    match read_block(entries, pos)? {
        Some((block, new_pos)) if block.class_name == expected_class => Ok((block, new_pos)),
        Some((block, _)) => Err(SldyError::format(format!(
            "expected ClassName {} but found {}",
            expected_class, block.class_name
        ))),
        None => Err(SldyError::format(format!(
            "expected ClassName {} but reached end of document",
            expected_class
        ))),
    }
}

/// Locates the next `StartClass` without consuming it, returning its
/// `ClassName` and the position of the `StartClass` token. Used by record
/// aggregates to dispatch between sibling record types (e.g. choosing which
/// channel manipulation record comes next).
pub fn find_next_class(entries: &[Entry], mut pos: usize) -> Option<(String, usize)> {
    while let Some(entry) = entries.get(pos) {
        if matches!(entry, Entry::StartClass) {
            if let Some(Entry::ClassName(name)) = entries.get(pos + 1) {
                return Some((name.clone(), pos));
            }
        }
        pos += 1;
    }
    None
}

/// Fixed substitution table applied, in order, to every decoded scalar
/// string field (§4.2 "String un-escaping"). Idempotent on strings that
/// contain no `_#...;` trigger sequences.
pub fn unescape(raw: &str) -> String {
    if raw == "__empty" {
        return String::new();
    }

    const TABLE: &[(&str, &str)] = &[
        ("_#9;", "\t"),
        ("_#10;", "\n"),
        ("_#13;", "\r"),
        ("_#34;", "\""),
        ("_#58;", ":"),
        ("_#92;", "\\"),
        ("_#91;", "["),
        ("_#93;", "]"),
        ("_#124;", "|"),
        ("_#60;", "<"),
        ("_#62;", ">"),
        ("_#32;", " "),
    ];

    let mut result = raw.to_string();
    for (pattern, replacement) in TABLE {
        result = result.replace(pattern, replacement);
    }
    result
}

/// Coerces a scalar into a signed 32-bit integer. Per §4.2 numeric
/// semantics an overflow must not abort the load: it is logged and the
/// field is left at its default (zero).
pub fn coerce_i32(field: &str, raw: &str) -> i32 {
    match raw.trim().parse::<i64>() {
        Ok(value) => match i32::try_from(value) {
            Ok(value) => value,
            Err(_) => {
                log::warn!(
                    "field `{}` value `{}` overflows i32, defaulting to 0",
                    field,
                    raw
                );
                0
            }
        },
        Err(_) => {
            log::warn!("field `{}` could not be parsed as an integer: `{}`", field, raw);
            0
        }
    }
}

/// Coerces a scalar into a signed 64-bit integer.
pub fn coerce_i64(field: &str, raw: &str) -> i64 {
    raw.trim().parse::<i64>().unwrap_or_else(|_| {
        log::warn!("field `{}` could not be parsed as an integer: `{}`", field, raw);
        0
    })
}

/// Coerces a scalar into a 32-bit float.
pub fn coerce_f32(field: &str, raw: &str) -> f32 {
    raw.trim().parse::<f32>().unwrap_or_else(|_| {
        log::warn!("field `{}` could not be parsed as a float: `{}`", field, raw);
        0.0
    })
}

/// Coerces a scalar into a 64-bit float.
pub fn coerce_f64(field: &str, raw: &str) -> f64 {
    raw.trim().parse::<f64>().unwrap_or_else(|_| {
        log::warn!("field `{}` could not be parsed as a float: `{}`", field, raw);
        0.0
    })
}

/// Coerces a scalar into a boolean (`true`/`false`/`1`/`0`, case-insensitive).
pub fn coerce_bool(field: &str, raw: &str) -> bool {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => true,
        "false" | "0" => false,
        _ => {
            log::warn!("field `{}` could not be parsed as a bool: `{}`", field, raw);
            false
        }
    }
}

/// Coerces a scalar into an un-escaped string.
pub fn coerce_string(raw: &str) -> String {
    unescape(raw)
}

/// Splits a declared-length sequence into its actual elements, warning (but
/// not failing) when the declared count in `value[0]` disagrees with the
/// number of elements that actually follow (invariant 4 / §4.2).
pub fn sequence_items<'a>(field: &str, value: &'a Value) -> &'a [String] {
    match value {
        Value::Sequence(items) => {
            if items.is_empty() {
                return items;
            }
            let declared: Option<usize> = items[0].trim().parse().ok();
            let actual = &items[1..];
            if let Some(declared) = declared {
                if declared != actual.len() {
                    log::warn!(
                        "field `{}` declares length {} but {} elements follow; using actual length",
                        field,
                        declared,
                        actual.len()
                    );
                }
            }
            actual
        }
        Value::Scalar(_) => &[],
    }
}

/// Coerces every element of a declared-length sequence field into `f64`.
pub fn coerce_f64_vec(field: &str, value: &Value) -> Vec<f64> {
    sequence_items(field, value)
        .iter()
        .map(|item| coerce_f64(field, item))
        .collect()
}

/// Coerces every element of a declared-length sequence field into `i64`.
pub fn coerce_i64_vec(field: &str, value: &Value) -> Vec<i64> {
    sequence_items(field, value)
        .iter()
        .map(|item| coerce_i64(field, item))
        .collect()
}

/// Coerces every element of a declared-length sequence field into `i32`.
pub fn coerce_i32_vec(field: &str, value: &Value) -> Vec<i32> {
    sequence_items(field, value)
        .iter()
        .map(|item| coerce_i32(field, item))
        .collect()
}
