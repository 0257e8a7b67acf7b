//! YAML overlay helpers.

use serde_yaml::{Mapping, Value};

use crate::errors::{BuildError, Result};

/// Recursively writes `overlay` into `base`.
///
/// Every key of `overlay` must already exist in `base`. Sections may only be
/// replaced by sections; leaves are replaced wholesale (lists are not merged
/// element-wise).
pub(super) fn merge_values(base: &mut Value, overlay: Value, path: &str) -> Result<()> {
    match (base, overlay) {
        (_, Value::Null) if path.is_empty() => Ok(()),
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                let key = match key {
                    Value::String(key) => key,
                    other => {
                        return Err(BuildError::invalid_config(format!(
                            "non-string key {other:?} under '{path}'"
                        )));
                    }
                };
                let full_key = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                let slot = base_map
                    .get_mut(&Value::String(key))
                    .ok_or_else(|| BuildError::UnknownConfigKey {
                        key: full_key.clone(),
                    })?;
                merge_values(slot, value, &full_key)?;
            }
            Ok(())
        }
        (Value::Mapping(_), _) => Err(BuildError::invalid_config(format!(
            "'{}' is a section and cannot be assigned a value",
            if path.is_empty() { "<root>" } else { path }
        ))),
        (slot, value) => {
            *slot = value;
            Ok(())
        }
    }
}

/// Builds a nested overlay from flat `KEY.PATH value` pairs.
pub(super) fn overlay_from_list<S: AsRef<str>>(opts: &[S]) -> Result<Value> {
    if opts.len() % 2 != 0 {
        return Err(BuildError::invalid_config(format!(
            "override list must hold key/value pairs, got {} items",
            opts.len()
        )));
    }

    let mut root = Mapping::new();
    for pair in opts.chunks(2) {
        let key = pair[0].as_ref();
        let value = parse_scalar(pair[1].as_ref())?;
        insert_path(&mut root, key, value)?;
    }
    Ok(Value::Mapping(root))
}

fn parse_scalar(raw: &str) -> Result<Value> {
    if raw.trim().is_empty() {
        return Ok(Value::String(raw.to_string()));
    }
    Ok(serde_yaml::from_str(raw)?)
}

fn insert_path(root: &mut Mapping, key: &str, value: Value) -> Result<()> {
    let parts: Vec<&str> = key.split('.').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(BuildError::invalid_config(format!("malformed key '{key}'")));
    }

    let (leaf, sections) = parts.split_last().ok_or_else(|| {
        BuildError::invalid_config(format!("malformed key '{key}'"))
    })?;

    let mut node = root;
    for section in sections {
        let entry = node
            .entry(Value::String((*section).to_string()))
            .or_insert_with(|| Value::Mapping(Mapping::new()));
        node = match entry {
            Value::Mapping(map) => map,
            _ => {
                return Err(BuildError::invalid_config(format!(
                    "key '{key}' conflicts with an earlier override"
                )));
            }
        };
    }
    node.insert(Value::String((*leaf).to_string()), value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(text: &str) -> Value {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn test_merge_nested_leaf() {
        let mut base = yaml("A:\n  B: 1\n  C: [1, 2]\n");
        merge_values(&mut base, yaml("A:\n  C: [3]\n"), "").unwrap();
        assert_eq!(base, yaml("A:\n  B: 1\n  C: [3]\n"));
    }

    #[test]
    fn test_merge_section_with_scalar_fails() {
        let mut base = yaml("A:\n  B: 1\n");
        let err = merge_values(&mut base, yaml("A: 3\n"), "").unwrap_err();
        assert!(matches!(err, BuildError::InvalidConfig { .. }));
    }

    #[test]
    fn test_overlay_from_list() {
        let overlay = overlay_from_list(&["A.B", "2", "A.C", "x", "D", "[1, 2]"]).unwrap();
        assert_eq!(overlay, yaml("A:\n  B: 2\n  C: x\nD: [1, 2]\n"));
    }

    #[test]
    fn test_overlay_from_list_odd_length() {
        assert!(overlay_from_list(&["A.B"]).is_err());
    }

    #[test]
    fn test_overlay_from_list_malformed_key() {
        assert!(overlay_from_list(&["A..B", "1"]).is_err());
        assert!(overlay_from_list(&["A", "1", "A.B", "2"]).is_err());
    }
}
