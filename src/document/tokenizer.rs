//! Line-oriented scanner for the sentinel-keyed key/value document stream
//! (§6). Each `.yaml` metadata file is scanned once into an ordered
//! [`Entry`] stream; the decoder (`super::decode`) advances a cursor
//! through that stream rather than re-parsing text.

/// One value attached to a non-sentinel key.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A single textual scalar, still in its raw (possibly escaped) form.
    Scalar(String),
    /// A sequence whose first element is the declared length, per §4.2.
    Sequence(Vec<String>),
}

/// One token in the flattened document stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    /// `StartClass` sentinel: opens a record.
    StartClass,
    /// `EndClass` sentinel: closes the innermost open record.
    EndClass,
    /// `ClassName` sentinel value, always the first pair after `StartClass`.
    ClassName(String),
    /// An ordinary attribute pair.
    Field { key: String, value: Value },
}

/// Scans `text` into an ordered list of [`Entry`] tokens.
///
/// Recognised line shapes: `Key: scalar`, `Key:` followed by indented
/// `- element` lines (a sequence), and the bare sentinels `StartClass`,
/// `EndClass`, `ClassName: <name>`.
pub fn tokenize(text: &str) -> Vec<Entry> {
    let lines: Vec<&str> = text.lines().collect();
    let mut entries = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i].trim();
        if line.is_empty() {
            i += 1;
            continue;
        }

        if line.starts_with('-') {
            // A sequence element encountered without its owning key, e.g. a
            // stray continuation; nothing upstream should reach this once
            // `parse_sequence` below has consumed its run, but skip safely.
            i += 1;
            continue;
        }

        let (key, rest) = match line.split_once(':') {
            Some((key, rest)) => (key.trim(), rest.trim()),
            None => (line, ""),
        };

        match key {
            "StartClass" => {
                entries.push(Entry::StartClass);
                i += 1;
            }
            "EndClass" => {
                entries.push(Entry::EndClass);
                i += 1;
            }
            "ClassName" => {
                entries.push(Entry::ClassName(rest.to_string()));
                i += 1;
            }
            _ => {
                if rest.is_empty() {
                    // Possibly a sequence: look ahead for indented `- value` lines.
                    let (items, consumed) = parse_sequence(&lines, i + 1);
                    if consumed > 0 {
                        entries.push(Entry::Field {
                            key: key.to_string(),
                            value: Value::Sequence(items),
                        });
                        i += 1 + consumed;
                    } else {
                        entries.push(Entry::Field {
                            key: key.to_string(),
                            value: Value::Scalar(String::new()),
                        });
                        i += 1;
                    }
                } else {
                    entries.push(Entry::Field {
                        key: key.to_string(),
                        value: Value::Scalar(rest.to_string()),
                    });
                    i += 1;
                }
            }
        }
    }

    entries
}

/// Consumes the run of `- value` lines starting at `start`, returning the
/// collected values (count element included, first) and the number of
/// lines consumed.
fn parse_sequence(lines: &[&str], start: usize) -> (Vec<String>, usize) {
    let mut items = Vec::new();
    let mut i = start;

    while i < lines.len() {
        let trimmed = lines[i].trim();
        if let Some(value) = trimmed.strip_prefix('-') {
            items.push(value.trim().to_string());
            i += 1;
        } else {
            break;
        }
    }

    (items, i - start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_scalar_and_sentinel_lines() {
        let text = "StartClass:\n  ClassName: ImageRecord\n  Width: 100\n  Height: 200\nEndClass:\n";
        let entries = tokenize(text);
        assert_eq!(
            entries,
            vec![
                Entry::StartClass,
                Entry::ClassName("ImageRecord".to_string()),
                Entry::Field {
                    key: "Width".to_string(),
                    value: Value::Scalar("100".to_string()),
                },
                Entry::Field {
                    key: "Height".to_string(),
                    value: Value::Scalar("200".to_string()),
                },
                Entry::EndClass,
            ]
        );
    }

    #[test]
    fn tokenizes_sequence_with_leading_count() {
        let text = "Vertices:\n  - 2\n  - 10,20,0\n  - 110,220,0\n";
        let entries = tokenize(text);
        assert_eq!(
            entries,
            vec![Entry::Field {
                key: "Vertices".to_string(),
                value: Value::Sequence(vec![
                    "2".to_string(),
                    "10,20,0".to_string(),
                    "110,220,0".to_string(),
                ]),
            }]
        );
    }
}
