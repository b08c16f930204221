//! The layered variable context the renderer (component B) substitutes
//! against. `spec.md` §4.B: "chained scope with first-hit-wins lookup; do
//! not merge eagerly."

use std::rc::Rc;

use serde_json::{Map, Value};

/// One layer of the context chain. Layers are cheap to clone (an `Rc` bump)
/// so a partial can prepend its own frontmatter variables without copying
/// the parent chain, per `spec.md` §9 "template context layering".
#[derive(Clone)]
pub struct RenderContext {
    values: Rc<Map<String, Value>>,
    parent: Option<Rc<RenderContext>>,
}

impl RenderContext {
    pub fn root(values: Map<String, Value>) -> Self {
        Self {
            values: Rc::new(values),
            parent: None,
        }
    }

    /// Prepend a more-specific layer in front of `self`.
    pub fn child(&self, values: Map<String, Value>) -> Self {
        Self {
            values: Rc::new(values),
            parent: Some(Rc::new(self.clone())),
        }
    }

    /// Dotted-path lookup, first-hit-wins walking from most specific to
    /// least specific layer.
    pub fn lookup(&self, path: &str) -> Option<Value> {
        let mut scope = Some(self);
        while let Some(s) = scope {
            if let Some(v) = lookup_in_map(&s.values, path) {
                return Some(v.clone());
            }
            scope = s.parent.as_deref();
        }
        None
    }

    pub fn is_truthy(&self, path: &str) -> bool {
        match self.lookup(path) {
            None => false,
            Some(v) => is_truthy_value(&v),
        }
    }

    /// Values to iterate for a `{{#section}}` block whose lookup resolved to
    /// a list; returns one child context per element with `.` bound to the
    /// element (for scalar lists) or the element's fields merged in (for
    /// object lists).
    pub fn section_contexts(&self, path: &str) -> Vec<RenderContext> {
        match self.lookup(path) {
            Some(Value::Array(items)) => items
                .into_iter()
                .map(|item| {
                    let mut map = Map::new();
                    match &item {
                        Value::Object(obj) => {
                            for (k, v) in obj {
                                map.insert(k.clone(), v.clone());
                            }
                        }
                        other => {
                            map.insert(".".to_string(), other.clone());
                        }
                    }
                    self.child(map)
                })
                .collect(),
            Some(other) if is_truthy_value(&other) => vec![self.clone()],
            _ => Vec::new(),
        }
    }
}

fn lookup_in_map<'a>(map: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut current = map.get(first)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn is_truthy_value(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_hit_wins_across_layers() {
        let root = RenderContext::root(
            json!({"name": "root-name", "other": "root-other"})
                .as_object()
                .unwrap()
                .clone(),
        );
        let child = root.child(json!({"name": "child-name"}).as_object().unwrap().clone());

        assert_eq!(child.lookup("name").unwrap(), json!("child-name"));
        assert_eq!(child.lookup("other").unwrap(), json!("root-other"));
        assert_eq!(child.lookup("missing"), None);
    }

    #[test]
    fn dotted_path_walks_nested_objects() {
        let ctx = RenderContext::root(
            json!({"system": {"os": "linux"}}).as_object().unwrap().clone(),
        );
        assert_eq!(ctx.lookup("system.os").unwrap(), json!("linux"));
        assert_eq!(ctx.lookup("system.missing"), None);
    }
}
