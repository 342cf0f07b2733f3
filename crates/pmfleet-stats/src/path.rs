//! ---
//! ems_section: "08-energy-models-optimization"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Dotted-path lookups into nested fleet entries."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use serde_json::Value;

/// Follow `path` (for example `last.snap.stats.power_w`) through nested
/// objects. Numeric segments index into arrays. Any missing segment yields
/// `None`.
pub fn resolve<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Numeric value at `path`. Non-numeric leaves count as absent.
pub fn resolve_f64(value: &Value, path: &str) -> Option<f64> {
    resolve(value, path).and_then(Value::as_f64)
}

/// Group key at `path`. Strings are used as-is, numbers and booleans are
/// rendered; anything else is absent.
pub fn resolve_key(value: &Value, path: &str) -> Option<String> {
    match resolve(value, path)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
