//! Path operations on an in-memory JSON tree, following the realtime
//! database's rules: `null` deletes a node and empty objects disappear.

use serde_json::{Map, Value};

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// The node at `path`, or `Value::Null` when absent.
pub fn get(root: &Value, path: &str) -> Value {
    let mut node = root;
    for seg in segments(path) {
        match node.get(seg) {
            Some(child) => node = child,
            None => return Value::Null,
        }
    }
    node.clone()
}

/// Replace the node at `path` with `value`.
pub fn set(root: &mut Value, path: &str, value: Value) {
    set_segments(root, &segments(path), value);
    prune(root);
}

/// Replace each child of the node at `path` named in `fields`.
pub fn update(root: &mut Value, path: &str, fields: Map<String, Value>) {
    let base = segments(path);
    for (key, value) in fields {
        // Firebase allows multi-location updates with `/` in keys.
        let mut full = base.clone();
        full.extend(segments(&key));
        set_segments(root, &full, value);
    }
    prune(root);
}

fn set_segments(node: &mut Value, segs: &[&str], value: Value) {
    let Some((first, rest)) = segs.split_first() else {
        *node = value;
        return;
    };

    if !node.is_object() {
        if value.is_null() {
            return;
        }
        *node = Value::Object(Map::new());
    }

    if let Value::Object(map) = node {
        if rest.is_empty() {
            if value.is_null() {
                map.remove(*first);
            } else {
                map.insert((*first).to_owned(), value);
            }
            return;
        }

        let child = map.entry(*first).or_insert(Value::Null);
        set_segments(child, rest, value);
        if is_empty(child) {
            map.remove(*first);
        }
    }
}

fn is_empty(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Object(m) => m.is_empty(),
        _ => false,
    }
}

fn prune(node: &mut Value) {
    if let Value::Object(map) = node {
        map.values_mut().for_each(prune);
        map.retain(|_, v| !is_empty(v));
        if map.is_empty() {
            *node = Value::Null;
        }
    }
}
