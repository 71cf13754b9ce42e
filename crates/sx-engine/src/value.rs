//! Runtime values.
//!
//! Values are plain clones with no shared mutable state, which keeps
//! concurrent pipeline invocations trivially independent. `Capability` is a
//! marker: the VM holds the one borrowed handle itself and never puts a
//! reference into a value.

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<ScriptValue>),
    Map(BTreeMap<String, ScriptValue>),
    /// The borrowed capability handle bound to the entry parameter.
    Capability,
}

impl ScriptValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ScriptValue::Null => "null",
            ScriptValue::Bool(_) => "bool",
            ScriptValue::Int(_) => "int",
            ScriptValue::Float(_) => "float",
            ScriptValue::Str(_) => "string",
            ScriptValue::List(_) => "list",
            ScriptValue::Map(_) => "map",
            ScriptValue::Capability => "capability",
        }
    }

    /// Converts to JSON for reports and the `json.*` builtins. The capability
    /// marker intentionally has no JSON form and maps to `null`.
    pub fn to_json(&self) -> JsonValue {
        match self {
            ScriptValue::Null | ScriptValue::Capability => JsonValue::Null,
            ScriptValue::Bool(b) => JsonValue::Bool(*b),
            ScriptValue::Int(i) => JsonValue::from(*i),
            ScriptValue::Float(f) => {
                serde_json::Number::from_f64(*f).map_or(JsonValue::Null, JsonValue::Number)
            }
            ScriptValue::Str(s) => JsonValue::String(s.clone()),
            ScriptValue::List(items) => {
                JsonValue::Array(items.iter().map(ScriptValue::to_json).collect())
            }
            ScriptValue::Map(map) => JsonValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    pub fn from_json(value: &JsonValue) -> ScriptValue {
        match value {
            JsonValue::Null => ScriptValue::Null,
            JsonValue::Bool(b) => ScriptValue::Bool(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    ScriptValue::Int(i)
                } else {
                    ScriptValue::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            JsonValue::String(s) => ScriptValue::Str(s.clone()),
            JsonValue::Array(items) => {
                ScriptValue::List(items.iter().map(ScriptValue::from_json).collect())
            }
            JsonValue::Object(map) => ScriptValue::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), ScriptValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Stringification used by `str(..)`, string concatenation, and `throw`.
    pub fn render(&self) -> String {
        match self {
            ScriptValue::Null => "null".to_string(),
            ScriptValue::Bool(b) => b.to_string(),
            ScriptValue::Int(i) => i.to_string(),
            ScriptValue::Float(f) => f.to_string(),
            ScriptValue::Str(s) => s.clone(),
            ScriptValue::Capability => "<capability>".to_string(),
            other => serde_json::to_string(&other.to_json())
                .unwrap_or_else(|_| "<unrenderable>".to_string()),
        }
    }

    /// Approximate in-memory weight, used for the value-size ceiling.
    pub fn size_hint(&self) -> usize {
        match self {
            ScriptValue::Null | ScriptValue::Bool(_) | ScriptValue::Capability => 1,
            ScriptValue::Int(_) | ScriptValue::Float(_) => 8,
            ScriptValue::Str(s) => s.len(),
            ScriptValue::List(items) => {
                8 + items.iter().map(ScriptValue::size_hint).sum::<usize>()
            }
            ScriptValue::Map(map) => {
                8 + map
                    .iter()
                    .map(|(k, v)| k.len() + v.size_hint())
                    .sum::<usize>()
            }
        }
    }
}

/// Ceilings on values a script may build. Untrusted code must not be able to
/// grow a string or list without bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueBudget {
    pub max_str_bytes: usize,
    pub max_list_items: usize,
}

impl Default for ValueBudget {
    fn default() -> Self {
        Self {
            max_str_bytes: 1024 * 1024,
            max_list_items: 65_536,
        }
    }
}

impl ValueBudget {
    pub fn check_str(&self, len: usize) -> Result<(), String> {
        if len > self.max_str_bytes {
            Err(format!(
                "value size budget exhausted: string of {len} bytes exceeds max_str_bytes={}",
                self.max_str_bytes
            ))
        } else {
            Ok(())
        }
    }

    pub fn check_list(&self, len: usize) -> Result<(), String> {
        if len > self.max_list_items {
            Err(format!(
                "value size budget exhausted: list of {len} items exceeds max_list_items={}",
                self.max_list_items
            ))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip() {
        let json: JsonValue =
            serde_json::from_str(r#"{"id": 7, "tags": ["a", "b"], "ok": true}"#).unwrap();
        let value = ScriptValue::from_json(&json);
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn render_is_plain_for_scalars_and_json_for_containers() {
        assert_eq!(ScriptValue::Str("hi".into()).render(), "hi");
        assert_eq!(ScriptValue::Int(3).render(), "3");
        assert_eq!(
            ScriptValue::List(vec![ScriptValue::Int(1), ScriptValue::Int(2)]).render(),
            "[1,2]"
        );
    }
}
