//! JSON-Schema-subset validation of invocation arguments.
//!
//! Covers the slice of the schema vocabulary TSD documents actually use:
//! `type`, `enum`, `const`, string length/pattern, numeric bounds, object
//! `required`/`properties`/`additionalProperties`, array `items`, and the
//! `allOf`/`anyOf`/`oneOf` combinators. Recursion is depth-bounded so a
//! pathological schema cannot stack-overflow the applier.

use std::fmt;
use std::sync::LazyLock;

use parking_lot::RwLock;
use regex_lite::Regex;
use rustc_hash::FxHashMap;
use serde_json::Value;

/// A single schema violation with the JSON path where it occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub path: String,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

const MAX_DEPTH: usize = 8;
const PATTERN_CACHE_CAP: usize = 256;

static PATTERN_CACHE: LazyLock<RwLock<FxHashMap<String, Option<Regex>>>> =
    LazyLock::new(|| RwLock::new(FxHashMap::default()));

/// Validate `args` against a JSON-Schema-shaped structure.
///
/// # Errors
///
/// Returns every violation found, with paths rooted at `$`.
pub fn validate_args(args: &Value, schema: &Value) -> Result<(), Vec<Violation>> {
    let mut violations = Vec::new();
    check(args, schema, "$", 0, &mut violations);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

fn check(value: &Value, schema: &Value, path: &str, depth: usize, out: &mut Vec<Violation>) {
    if depth > MAX_DEPTH {
        return;
    }
    let Some(schema_obj) = schema.as_object() else {
        // Non-object schemas (`true`, null) constrain nothing.
        return;
    };

    if check_combinators(value, schema_obj, path, depth, out) {
        return;
    }

    if let Some(const_val) = schema_obj.get("const") {
        if value != const_val {
            push(out, path, format!("expected const {const_val}, got {value}"));
            return;
        }
    }

    if let Some(allowed) = schema_obj.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            push(out, path, format!("expected one of {allowed:?}, got {value}"));
            return;
        }
    }

    if !check_type(value, schema_obj, path, out) {
        return;
    }

    check_string(value, schema_obj, path, out);
    check_number(value, schema_obj, path, out);
    check_object(value, schema_obj, path, depth, out);
    check_array(value, schema_obj, path, depth, out);
}

#[inline]
fn push(out: &mut Vec<Violation>, path: &str, message: String) {
    out.push(Violation {
        path: path.to_string(),
        message,
    });
}

// ---------------------------------------------------------------------------
// Combinators
// ---------------------------------------------------------------------------

/// Returns true when a combinator keyword was present and fully handled.
fn check_combinators(
    value: &Value,
    schema_obj: &serde_json::Map<String, Value>,
    path: &str,
    depth: usize,
    out: &mut Vec<Violation>,
) -> bool {
    if let Some(all_of) = schema_obj.get("allOf").and_then(Value::as_array) {
        for (idx, sub) in all_of.iter().enumerate() {
            check(value, sub, &format!("{path}.allOf[{idx}]"), depth + 1, out);
        }
        return true;
    }

    if let Some(any_of) = schema_obj.get("anyOf").and_then(Value::as_array) {
        let satisfied = any_of.iter().any(|sub| {
            let mut sub_violations = Vec::new();
            check(value, sub, path, depth + 1, &mut sub_violations);
            sub_violations.is_empty()
        });
        if !satisfied {
            push(out, path, "value does not satisfy any anyOf option".to_string());
        }
        return true;
    }

    if let Some(one_of) = schema_obj.get("oneOf").and_then(Value::as_array) {
        let matched = one_of
            .iter()
            .filter(|sub| {
                let mut sub_violations = Vec::new();
                check(value, sub, path, depth + 1, &mut sub_violations);
                sub_violations.is_empty()
            })
            .count();
        if matched != 1 {
            push(
                out,
                path,
                format!("value must satisfy exactly one oneOf option (matched {matched})"),
            );
        }
        return true;
    }

    false
}

// ---------------------------------------------------------------------------
// Type dispatch
// ---------------------------------------------------------------------------

/// Returns false when the value's type already disqualifies it, in which
/// case per-type constraint checks are skipped.
fn check_type(
    value: &Value,
    schema_obj: &serde_json::Map<String, Value>,
    path: &str,
    out: &mut Vec<Violation>,
) -> bool {
    match schema_obj.get("type") {
        Some(Value::String(expected)) => {
            if type_matches(expected, value) {
                true
            } else {
                push(
                    out,
                    path,
                    format!("expected type '{expected}', got '{}'", type_name(value)),
                );
                false
            }
        }
        Some(Value::Array(options)) => {
            let ok = options
                .iter()
                .filter_map(Value::as_str)
                .any(|expected| type_matches(expected, value));
            if !ok {
                push(
                    out,
                    path,
                    format!("expected type in {options:?}, got '{}'", type_name(value)),
                );
            }
            ok
        }
        _ => {
            // No explicit type: object-ish keywords imply one.
            let implies_object = schema_obj.contains_key("properties")
                || schema_obj.contains_key("required")
                || schema_obj.contains_key("additionalProperties");
            if implies_object && !value.is_object() {
                push(
                    out,
                    path,
                    format!("expected type 'object', got '{}'", type_name(value)),
                );
                return false;
            }
            true
        }
    }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                "integer"
            } else {
                "number"
            }
        }
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Per-type constraints
// ---------------------------------------------------------------------------

fn check_string(
    value: &Value,
    schema_obj: &serde_json::Map<String, Value>,
    path: &str,
    out: &mut Vec<Violation>,
) {
    let Some(text) = value.as_str() else {
        return;
    };

    if let Some(min) = schema_obj.get("minLength").and_then(Value::as_u64) {
        if (text.chars().count() as u64) < min {
            push(out, path, format!("string shorter than minLength={min}"));
        }
    }
    if let Some(max) = schema_obj.get("maxLength").and_then(Value::as_u64) {
        if (text.chars().count() as u64) > max {
            push(out, path, format!("string longer than maxLength={max}"));
        }
    }
    if let Some(pattern) = schema_obj.get("pattern").and_then(Value::as_str) {
        if let Some(re) = cached_pattern(pattern) {
            if !re.is_match(text) {
                push(out, path, format!("string does not match pattern {pattern:?}"));
            }
        }
    }
}

fn cached_pattern(pattern: &str) -> Option<Regex> {
    if let Some(cached) = PATTERN_CACHE.read().get(pattern) {
        return cached.clone();
    }

    // An uncompilable pattern is recorded as None so it is not re-tried on
    // every call.
    let compiled = Regex::new(pattern).ok();
    let mut cache = PATTERN_CACHE.write();
    if cache.len() >= PATTERN_CACHE_CAP {
        cache.clear();
    }
    cache.insert(pattern.to_string(), compiled.clone());
    compiled
}

fn check_number(
    value: &Value,
    schema_obj: &serde_json::Map<String, Value>,
    path: &str,
    out: &mut Vec<Violation>,
) {
    let Some(n) = value.as_f64() else {
        return;
    };

    if let Some(min) = schema_obj.get("minimum").and_then(Value::as_f64) {
        if n < min {
            push(out, path, format!("value {n} is less than minimum {min}"));
        }
    }
    if let Some(max) = schema_obj.get("maximum").and_then(Value::as_f64) {
        if n > max {
            push(out, path, format!("value {n} is greater than maximum {max}"));
        }
    }
}

fn check_object(
    value: &Value,
    schema_obj: &serde_json::Map<String, Value>,
    path: &str,
    depth: usize,
    out: &mut Vec<Violation>,
) {
    let Some(obj) = value.as_object() else {
        return;
    };

    if let Some(required) = schema_obj.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if !obj.contains_key(key) {
                push(out, path, format!("missing required property '{key}'"));
            }
        }
    }

    let empty = serde_json::Map::new();
    let properties = schema_obj
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(&empty);
    let additional = schema_obj.get("additionalProperties");

    for (key, item) in obj {
        if let Some(prop_schema) = properties.get(key) {
            check(item, prop_schema, &format!("{path}.{key}"), depth + 1, out);
            continue;
        }
        match additional {
            Some(Value::Bool(false)) => {
                push(out, path, format!("unexpected property '{key}'"));
            }
            Some(additional_schema) if additional_schema.is_object() => {
                check(
                    item,
                    additional_schema,
                    &format!("{path}.{key}"),
                    depth + 1,
                    out,
                );
            }
            _ => {}
        }
    }
}

fn check_array(
    value: &Value,
    schema_obj: &serde_json::Map<String, Value>,
    path: &str,
    depth: usize,
    out: &mut Vec<Violation>,
) {
    let Some(items) = value.as_array() else {
        return;
    };
    let Some(items_schema) = schema_obj.get("items") else {
        return;
    };
    if !items_schema.is_object() {
        return;
    }

    for (idx, item) in items.iter().enumerate() {
        check(item, items_schema, &format!("{path}[{idx}]"), depth + 1, out);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
