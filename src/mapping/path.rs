//! Dotted/indexed path addressing over nested JSON records
//!
//! Paths look like `name[0].given[0]` or `address.0.city`. They split on `.`
//! and `[index]` into key and index tokens.
//!
//! Neither [`get`] nor [`set`] ever fails. Mapping rules are user-authored, so a
//! path that runs into the wrong kind of container reads as absent, and a write
//! through one leaves the record untouched and reports `false`.

use serde_json::{Map, Value};

/// A single step in a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathToken {
    /// Key lookup in a keyed map
    Key(String),
    /// Position in an ordered sequence
    Index(usize),
}

impl PathToken {
    fn is_index(&self) -> bool {
        matches!(self, PathToken::Index(_))
    }
}

/// Split a path expression into tokens
///
/// `"name[0].given[0]"` becomes `Key(name), Index(0), Key(given), Index(0)`.
/// Empty segments are dropped and all-digit segments are indices, whether they
/// were written as `[0]` or `.0`.
pub fn parse_path(path: &str) -> Vec<PathToken> {
    path.split(['.', '[', ']'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            if part.bytes().all(|b| b.is_ascii_digit()) {
                match part.parse::<usize>() {
                    Ok(idx) => PathToken::Index(idx),
                    Err(_) => PathToken::Key(part.to_string()),
                }
            } else {
                PathToken::Key(part.to_string())
            }
        })
        .collect()
}

/// Read the value at `path`, or `None` if any step is missing
///
/// A top-level key equal to the whole path wins over the tokenized walk, so flat
/// records with dotted keys such as `PID-5.1` are addressable as-is.
pub fn get<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    if let Value::Object(map) = record {
        if let Some(value) = map.get(path) {
            return Some(value);
        }
    }

    let mut current = record;
    for token in parse_path(path) {
        current = match (&token, current) {
            (PathToken::Index(idx), Value::Array(items)) => items.get(*idx)?,
            (PathToken::Key(key), Value::Object(map)) => map.get(key)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Write `value` at `path`, creating intermediate containers
///
/// An intermediate is created as a sequence when the following token is an
/// index and as a map otherwise. Sequences are padded with empty containers up
/// to the index being descended into, and with nulls at the final token. A
/// container of the wrong kind anywhere on the path, or an empty path, means
/// nothing is written and `false` is returned.
pub fn set(record: &mut Value, path: &str, value: Value) -> bool {
    let tokens = parse_path(path);
    let Some((last, parents)) = tokens.split_last() else {
        return false;
    };

    let mut current = record;
    for (i, token) in parents.iter().enumerate() {
        let next_is_index = tokens[i + 1].is_index();
        let placeholder = || {
            if next_is_index {
                Value::Array(Vec::new())
            } else {
                Value::Object(Map::new())
            }
        };

        current = match (token, current) {
            (PathToken::Index(idx), Value::Array(items)) => {
                while items.len() <= *idx {
                    items.push(placeholder());
                }
                &mut items[*idx]
            }
            (PathToken::Key(key), Value::Object(map)) => {
                map.entry(key.clone()).or_insert_with(placeholder)
            }
            _ => return false,
        };
    }

    match (last, current) {
        (PathToken::Index(idx), Value::Array(items)) => {
            while items.len() <= *idx {
                items.push(Value::Null);
            }
            items[*idx] = value;
            true
        }
        (PathToken::Key(key), Value::Object(map)) => {
            map.insert(key.clone(), value);
            true
        }
        _ => false,
    }
}
