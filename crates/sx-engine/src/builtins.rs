//! The fixed, minimal reference set scripts compile against.
//!
//! Free helpers (`len`, `str`) plus namespaced operations under `text`,
//! `list`, and `json`. The compiler resolves calls against this registry and
//! the unit's own functions; nothing else is linkable. Capability operations
//! are not listed here; they are reached only through method calls on the
//! entry parameter and dispatch to the borrowed handle at runtime.

use crate::value::{ScriptValue, ValueBudget};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinId {
    Len,
    Str,
    TextUpper,
    TextLower,
    TextTrim,
    TextContains,
    TextStartsWith,
    TextReplace,
    TextSplit,
    TextJoin,
    ListPush,
    ListContains,
    JsonParse,
    JsonStringify,
}

#[derive(Debug, Clone, Copy)]
pub struct BuiltinDef {
    pub name: &'static str,
    pub arity: usize,
    pub id: BuiltinId,
}

pub const BUILTINS: &[BuiltinDef] = &[
    BuiltinDef {
        name: "len",
        arity: 1,
        id: BuiltinId::Len,
    },
    BuiltinDef {
        name: "str",
        arity: 1,
        id: BuiltinId::Str,
    },
    BuiltinDef {
        name: "text.upper",
        arity: 1,
        id: BuiltinId::TextUpper,
    },
    BuiltinDef {
        name: "text.lower",
        arity: 1,
        id: BuiltinId::TextLower,
    },
    BuiltinDef {
        name: "text.trim",
        arity: 1,
        id: BuiltinId::TextTrim,
    },
    BuiltinDef {
        name: "text.contains",
        arity: 2,
        id: BuiltinId::TextContains,
    },
    BuiltinDef {
        name: "text.starts_with",
        arity: 2,
        id: BuiltinId::TextStartsWith,
    },
    BuiltinDef {
        name: "text.replace",
        arity: 3,
        id: BuiltinId::TextReplace,
    },
    BuiltinDef {
        name: "text.split",
        arity: 2,
        id: BuiltinId::TextSplit,
    },
    BuiltinDef {
        name: "text.join",
        arity: 2,
        id: BuiltinId::TextJoin,
    },
    BuiltinDef {
        name: "list.push",
        arity: 2,
        id: BuiltinId::ListPush,
    },
    BuiltinDef {
        name: "list.contains",
        arity: 2,
        id: BuiltinId::ListContains,
    },
    BuiltinDef {
        name: "json.parse",
        arity: 1,
        id: BuiltinId::JsonParse,
    },
    BuiltinDef {
        name: "json.stringify",
        arity: 1,
        id: BuiltinId::JsonStringify,
    },
];

pub fn lookup(name: &str) -> Option<&'static BuiltinDef> {
    BUILTINS.iter().find(|b| b.name == name)
}

fn want_str<'a>(op: &str, v: &'a ScriptValue) -> Result<&'a str, String> {
    match v {
        ScriptValue::Str(s) => Ok(s),
        other => Err(format!("{op} expects a string, got {}", other.type_name())),
    }
}

fn want_list<'a>(op: &str, v: &'a ScriptValue) -> Result<&'a [ScriptValue], String> {
    match v {
        ScriptValue::List(items) => Ok(items),
        other => Err(format!("{op} expects a list, got {}", other.type_name())),
    }
}

/// Runs a builtin. Arity was checked at compile time; type errors here trap
/// as runtime errors with the returned message.
pub fn invoke(
    id: BuiltinId,
    args: &[ScriptValue],
    budget: &ValueBudget,
) -> Result<ScriptValue, String> {
    match id {
        BuiltinId::Len => match &args[0] {
            ScriptValue::Str(s) => Ok(ScriptValue::Int(s.chars().count() as i64)),
            ScriptValue::List(items) => Ok(ScriptValue::Int(items.len() as i64)),
            ScriptValue::Map(map) => Ok(ScriptValue::Int(map.len() as i64)),
            other => Err(format!(
                "len expects a string, list, or map, got {}",
                other.type_name()
            )),
        },
        BuiltinId::Str => Ok(ScriptValue::Str(args[0].render())),
        BuiltinId::TextUpper => Ok(ScriptValue::Str(
            want_str("text.upper", &args[0])?.to_uppercase(),
        )),
        BuiltinId::TextLower => Ok(ScriptValue::Str(
            want_str("text.lower", &args[0])?.to_lowercase(),
        )),
        BuiltinId::TextTrim => Ok(ScriptValue::Str(
            want_str("text.trim", &args[0])?.trim().to_string(),
        )),
        BuiltinId::TextContains => {
            let hay = want_str("text.contains", &args[0])?;
            let needle = want_str("text.contains", &args[1])?;
            Ok(ScriptValue::Bool(hay.contains(needle)))
        }
        BuiltinId::TextStartsWith => {
            let hay = want_str("text.starts_with", &args[0])?;
            let prefix = want_str("text.starts_with", &args[1])?;
            Ok(ScriptValue::Bool(hay.starts_with(prefix)))
        }
        BuiltinId::TextReplace => {
            let s = want_str("text.replace", &args[0])?;
            let from = want_str("text.replace", &args[1])?;
            let to = want_str("text.replace", &args[2])?;
            if from.is_empty() {
                return Err("text.replace pattern must be non-empty".to_string());
            }
            let out = s.replace(from, to);
            budget.check_str(out.len())?;
            Ok(ScriptValue::Str(out))
        }
        BuiltinId::TextSplit => {
            let s = want_str("text.split", &args[0])?;
            let sep = want_str("text.split", &args[1])?;
            if sep.is_empty() {
                return Err("text.split separator must be non-empty".to_string());
            }
            let parts: Vec<ScriptValue> = s
                .split(sep)
                .map(|p| ScriptValue::Str(p.to_string()))
                .collect();
            budget.check_list(parts.len())?;
            Ok(ScriptValue::List(parts))
        }
        BuiltinId::TextJoin => {
            let items = want_list("text.join", &args[0])?;
            let sep = want_str("text.join", &args[1])?;
            let out = items
                .iter()
                .map(ScriptValue::render)
                .collect::<Vec<_>>()
                .join(sep);
            budget.check_str(out.len())?;
            Ok(ScriptValue::Str(out))
        }
        BuiltinId::ListPush => {
            let items = want_list("list.push", &args[0])?;
            budget.check_list(items.len() + 1)?;
            let mut out = items.to_vec();
            out.push(args[1].clone());
            Ok(ScriptValue::List(out))
        }
        BuiltinId::ListContains => {
            let items = want_list("list.contains", &args[0])?;
            Ok(ScriptValue::Bool(items.contains(&args[1])))
        }
        BuiltinId::JsonParse => {
            let s = want_str("json.parse", &args[0])?;
            let json: serde_json::Value =
                serde_json::from_str(s).map_err(|e| format!("json.parse: {e}"))?;
            Ok(ScriptValue::from_json(&json))
        }
        BuiltinId::JsonStringify => {
            let out = serde_json::to_string(&args[0].to_json())
                .map_err(|e| format!("json.stringify: {e}"))?;
            budget.check_str(out.len())?;
            Ok(ScriptValue::Str(out))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget() -> ValueBudget {
        ValueBudget::default()
    }

    #[test]
    fn registry_names_are_unique() {
        let mut seen = std::collections::BTreeSet::new();
        for b in BUILTINS {
            assert!(seen.insert(b.name), "duplicate builtin {}", b.name);
        }
    }

    #[test]
    fn text_ops() {
        let b = budget();
        assert_eq!(
            invoke(
                BuiltinId::TextUpper,
                &[ScriptValue::Str("ok".into())],
                &b
            )
            .unwrap(),
            ScriptValue::Str("OK".into())
        );
        assert_eq!(
            invoke(
                BuiltinId::TextSplit,
                &[ScriptValue::Str("a,b".into()), ScriptValue::Str(",".into())],
                &b
            )
            .unwrap(),
            ScriptValue::List(vec![
                ScriptValue::Str("a".into()),
                ScriptValue::Str("b".into())
            ])
        );
    }

    #[test]
    fn push_returns_new_list() {
        let b = budget();
        let out = invoke(
            BuiltinId::ListPush,
            &[ScriptValue::List(vec![]), ScriptValue::Int(1)],
            &b,
        )
        .unwrap();
        assert_eq!(out, ScriptValue::List(vec![ScriptValue::Int(1)]));
    }

    #[test]
    fn type_errors_name_the_operation() {
        let err = invoke(BuiltinId::TextTrim, &[ScriptValue::Int(1)], &budget()).unwrap_err();
        assert!(err.contains("text.trim"), "{err}");
    }
}
