//! Generated authoring guide for script writers.

use crate::builtins::BUILTINS;
use crate::generate::{ENTRY_PARAM, ENTRY_SYMBOL, PERMITTED_IMPORTS};
use crate::language::{self, limits};
use crate::vm::VmBudget;
use sx_denylist::{BANNED_KEYWORDS, FORBIDDEN_NAMESPACES, FORBIDDEN_TYPES};

/// Renders the full authoring guide as Markdown.
pub fn guide_md() -> String {
    let budget = VmBudget::default();
    let mut s = String::new();
    s.push_str("# Script authoring guide\n\n");
    s.push_str(&format!("Language: `{}`\n\n", language::LANG_ID));

    s.push_str("## Entry point\n\n");
    s.push_str(&format!(
        "Submit a script body (a braced block). It becomes the body of\n`fn {ENTRY_SYMBOL}({ENTRY_PARAM})`. "
    ));
    s.push_str(&format!(
        "`{ENTRY_PARAM}` is the platform connection; call its operations as\n`{ENTRY_PARAM}.operation(args)`. It cannot be stored, compared, or passed around\nas data.\n\n"
    ));
    s.push_str(
        "Additional `fn name(params) { .. }` declarations after the body are allowed\nand callable from it.\n\n",
    );

    s.push_str("## Imports\n\n");
    s.push_str("Permitted `use` modules:\n\n");
    for module in PERMITTED_IMPORTS {
        s.push_str(&format!("- `{module}`\n"));
    }
    s.push('\n');

    s.push_str("## Builtins\n\n");
    s.push_str("| name | arity |\n|---|---|\n");
    for b in BUILTINS {
        s.push_str(&format!("| `{}` | {} |\n", b.name, b.arity));
    }
    s.push('\n');

    s.push_str("## Denied references\n\n");
    s.push_str("Scripts referencing any of the following are rejected before compilation:\n\n");
    s.push_str("Namespaces (prefix match):\n\n");
    for rule in FORBIDDEN_NAMESPACES {
        s.push_str(&format!("- `{}` ({})\n", rule.prefix, rule.concern));
    }
    s.push_str("\nConstructed types (substring match on `new T(..)`):\n\n");
    for t in FORBIDDEN_TYPES {
        s.push_str(&format!("- `{t}`\n"));
    }
    s.push_str("\nBanned identifiers:\n\n");
    for k in BANNED_KEYWORDS {
        s.push_str(&format!("- `{k}`\n"));
    }
    s.push('\n');

    s.push_str("## Limits\n\n");
    s.push_str(&format!(
        "- max_source_bytes: {}\n- max_ast_nodes: {}\n- max_fuel: {}\n- deadline_ms: {}\n- max_call_depth: {}\n- max_str_bytes: {}\n- max_list_items: {}\n",
        limits::max_source_bytes(),
        limits::max_ast_nodes(),
        budget.fuel,
        budget.deadline.as_millis(),
        budget.max_call_depth,
        budget.values.max_str_bytes,
        budget.values.max_list_items,
    ));
    s.push_str(
        "\nExhausting any execution limit fails the run as a runtime error; it never\ncrashes the host.\n",
    );
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guide_names_every_builtin_and_denied_namespace() {
        let md = guide_md();
        for b in BUILTINS {
            assert!(md.contains(b.name), "guide missing builtin {}", b.name);
        }
        for rule in FORBIDDEN_NAMESPACES {
            assert!(md.contains(rule.prefix), "guide missing {}", rule.prefix);
        }
        assert!(md.contains(language::LANG_ID));
    }
}
