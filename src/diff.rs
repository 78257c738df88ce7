use serde_json::{Map, Value};

/// Dotted path, old value, new value.
pub(crate) type Change = (String, Value, Value);

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Leaf-level differences between two zone-state documents. Keys that
/// vanish are reported with a `null` new value, so an overlay ending shows
/// up as `overlay.* -> null`.
pub(crate) fn diff_json(
    previous: &Value,
    current: &Value,
    path_prefix: &str,
    changes: &mut Vec<Change>,
) {
    match (previous, current) {
        (Value::Object(prev_map), Value::Object(curr_map)) => {
            let empty = Value::Object(Map::new());
            for (key, curr_val) in curr_map {
                let path = join(path_prefix, key);
                match prev_map.get(key) {
                    Some(prev_val) => diff_json(prev_val, curr_val, &path, changes),
                    None if curr_val.is_object() => diff_json(&empty, curr_val, &path, changes),
                    None => changes.push((path, Value::Null, curr_val.clone())),
                }
            }
            for (key, prev_val) in prev_map {
                if curr_map.contains_key(key) {
                    continue;
                }
                let path = join(path_prefix, key);
                if prev_val.is_object() {
                    diff_removed(prev_val, &path, changes);
                } else {
                    changes.push((path, prev_val.clone(), Value::Null));
                }
            }
        }
        (prev, curr) if prev != curr => {
            changes.push((path_prefix.to_string(), prev.clone(), curr.clone()));
        }
        _ => {}
    }
}

fn diff_removed(previous: &Value, path_prefix: &str, changes: &mut Vec<Change>) {
    match previous {
        Value::Object(map) => {
            for (key, val) in map {
                diff_removed(val, &join(path_prefix, key), changes);
            }
        }
        other => changes.push((path_prefix.to_string(), other.clone(), Value::Null)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn diff_detects_changed_reading() {
        let prev = json!({"sensorDataPoints": {"insideTemperature": {"celsius": 20.5}}});
        let curr = json!({"sensorDataPoints": {"insideTemperature": {"celsius": 21.0}}});
        let mut changes = Vec::new();
        diff_json(&prev, &curr, "", &mut changes);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].0, "sensorDataPoints.insideTemperature.celsius");
        assert_eq!(changes[0].2, json!(21.0));
    }

    #[test]
    fn diff_detects_new_key() {
        let prev = json!({});
        let curr = json!({"overlay": {"setting": {"power": "ON"}}});
        let mut changes = Vec::new();
        diff_json(&prev, &curr, "", &mut changes);
        assert_eq!(changes, vec![("overlay.setting.power".to_string(), Value::Null, json!("ON"))]);
    }

    #[test]
    fn diff_reports_removed_overlay() {
        let prev = json!({
            "overlay": {"setting": {"power": "ON", "isBoost": true}},
            "link": "ONLINE"
        });
        let curr = json!({"link": "ONLINE"});
        let mut changes = Vec::new();
        diff_json(&prev, &curr, "", &mut changes);
        let paths: Vec<&str> = changes.iter().map(|(p, _, _)| p.as_str()).collect();
        assert!(paths.contains(&"overlay.setting.power"));
        assert!(paths.contains(&"overlay.setting.isBoost"));
        assert!(changes.iter().all(|(_, _, new)| new.is_null()));
    }

    #[test]
    fn identical_documents_have_no_changes() {
        let doc = json!({"a": {"b": [1, 2]}, "c": true});
        let mut changes = Vec::new();
        diff_json(&doc, &doc, "", &mut changes);
        assert!(changes.is_empty());
    }
}
