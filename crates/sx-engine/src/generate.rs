//! Code generation: wraps a bare script body into a full translation unit.
//!
//! This step is pure string templating. It cannot reject input; an empty or
//! brace-imbalanced body simply fails later with compile diagnostics.

/// Fixed entry symbol the compiler must emit and the executor must locate.
pub const ENTRY_SYMBOL: &str = "script_main";
pub const ENTRY_ARITY: usize = 1;
/// Name the capability handle is bound to inside the script.
pub const ENTRY_PARAM: &str = "service";

/// Import prologue emitted for every unit. The compiler rejects any `use`
/// outside this set, so this is also the authoritative permitted list.
pub const PERMITTED_IMPORTS: &[&str] = &["core", "text", "list", "json"];

/// A generated translation unit plus a stable fingerprint of its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationUnit {
    pub source: String,
    pub fingerprint: String,
}

/// Wraps a script body (a brace-delimited statement list, no signature) into
/// a complete unit with the fixed entry point.
pub fn wrap_script_body(body: &str) -> TranslationUnit {
    let mut source = String::with_capacity(body.len() + 128);
    for module in PERMITTED_IMPORTS {
        source.push_str("use ");
        source.push_str(module);
        source.push_str(";\n");
    }
    source.push('\n');
    source.push_str("fn ");
    source.push_str(ENTRY_SYMBOL);
    source.push('(');
    source.push_str(ENTRY_PARAM);
    source.push_str(") ");
    source.push_str(body);
    source.push('\n');

    let fingerprint = blake3::hash(source.as_bytes()).to_hex().to_string();
    TranslationUnit {
        source,
        fingerprint,
    }
}
