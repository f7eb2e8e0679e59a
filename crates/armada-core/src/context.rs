use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Shared context for passing data between workflow steps.
///
/// Each execution owns a private copy; steps read inputs from it and write
/// outputs into it through dotted paths (`"order.customer.id"`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    data: Map<String, Value>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context from initial data.
    pub fn from_map(data: Map<String, Value>) -> Self {
        Self { data }
    }

    /// Create a context from a JSON value. Non-object values land under `"input"`.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(data) => Self { data },
            Value::Null => Self::default(),
            other => {
                let mut data = Map::new();
                data.insert("input".to_string(), other);
                Self { data }
            }
        }
    }

    /// Read the value at a dotted path.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = split_path(path);
        let first = segments.next()?;
        let root = self.data.get(first)?;
        lookup(root, segments)
    }

    /// Write `value` at a dotted path, creating intermediate objects.
    ///
    /// A non-object value sitting on the way is replaced by an object.
    pub fn set_path(&mut self, path: &str, value: Value) {
        let segments: Vec<&str> = split_path(path).collect();
        let Some((last, parents)) = segments.split_last() else {
            return;
        };

        let mut current = &mut self.data;
        for segment in parents {
            let slot = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            let Value::Object(map) = slot else {
                return;
            };
            current = map;
        }
        current.insert(last.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.data)
    }
}

/// Read the value at a dotted path inside an arbitrary JSON value.
///
/// An empty path returns the value itself. Numeric segments index arrays.
pub fn value_at_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    lookup(value, split_path(path))
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('.').filter(|s| !s.is_empty())
}

fn lookup<'a, 'p>(
    mut current: &'a Value,
    segments: impl Iterator<Item = &'p str>,
) -> Option<&'a Value> {
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_nested_path() {
        let ctx = ExecutionContext::from_value(json!({
            "order": {"customer": {"id": 7}, "items": ["a", "b"]}
        }));
        assert_eq!(ctx.get_path("order.customer.id"), Some(&json!(7)));
        assert_eq!(ctx.get_path("order.items.1"), Some(&json!("b")));
        assert_eq!(ctx.get_path("order.missing"), None);
        assert_eq!(ctx.get_path(""), None);
    }

    #[test]
    fn test_set_path_creates_intermediates() {
        let mut ctx = ExecutionContext::new();
        ctx.set_path("report.summary.text", json!("ok"));
        assert_eq!(ctx.get_path("report.summary.text"), Some(&json!("ok")));
        assert!(ctx.get("report").unwrap().is_object());
    }

    #[test]
    fn test_set_path_replaces_scalar_parent() {
        let mut ctx = ExecutionContext::from_value(json!({"a": 1}));
        ctx.set_path("a.b", json!(true));
        assert_eq!(ctx.into_value(), json!({"a": {"b": true}}));
    }

    #[test]
    fn test_from_scalar_value() {
        let ctx = ExecutionContext::from_value(json!("hello"));
        assert_eq!(ctx.get("input"), Some(&json!("hello")));
        assert!(ExecutionContext::from_value(Value::Null).data().is_empty());
    }

    #[test]
    fn test_value_at_empty_path_is_identity() {
        let v = json!({"x": 1});
        assert_eq!(value_at_path(&v, ""), Some(&v));
        assert_eq!(value_at_path(&v, "x"), Some(&json!(1)));
    }
}
