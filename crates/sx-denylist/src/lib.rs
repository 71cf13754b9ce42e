//! Shared security denylist registry.
//!
//! This crate exists so both:
//! - the engine's security validator
//! - host tooling (guide text, reports)
//!
//! can share one authoritative list of forbidden capability namespaces,
//! forbidden constructed types, and banned keywords.
//!
//! Matching here is purely textual. It stops a script from *naming* a
//! forbidden API; it cannot stop indirect access reached through a permitted
//! API. Treat it as defense in depth, not a sandbox.

/// Which denylist table a violation matched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DenyRule {
    /// Member-access path begins with a forbidden namespace.
    Namespace,
    /// `new T(..)` where `T` contains a forbidden type name.
    Construction,
    /// Use of a banned identifier/keyword.
    Keyword,
}

impl DenyRule {
    pub fn as_str(self) -> &'static str {
        match self {
            DenyRule::Namespace => "namespace",
            DenyRule::Construction => "construction",
            DenyRule::Keyword => "keyword",
        }
    }
}

/// A forbidden member-access namespace and the capability it would expose.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NamespaceRule {
    pub prefix: &'static str,
    pub concern: &'static str,
}

/// Member-access prefixes scripts must never name.
pub const FORBIDDEN_NAMESPACES: &[NamespaceRule] = &[
    NamespaceRule {
        prefix: "fs",
        concern: "file I/O",
    },
    NamespaceRule {
        prefix: "io",
        concern: "raw I/O",
    },
    NamespaceRule {
        prefix: "proc",
        concern: "process control",
    },
    NamespaceRule {
        prefix: "reflect",
        concern: "reflection / dynamic symbol access",
    },
    NamespaceRule {
        prefix: "ffi",
        concern: "foreign-function interop",
    },
    NamespaceRule {
        prefix: "env",
        concern: "environment access",
    },
    NamespaceRule {
        prefix: "thread",
        concern: "low-level threading",
    },
    NamespaceRule {
        prefix: "registry",
        concern: "registry / OS handle access",
    },
    NamespaceRule {
        prefix: "sys",
        concern: "host system access",
    },
];

/// Type names scripts must never construct (substring match, case-insensitive).
pub const FORBIDDEN_TYPES: &[&str] = &[
    "File",
    "FileStream",
    "Dir",
    "Process",
    "Command",
    "Thread",
    "Registry",
    "Socket",
];

/// Identifiers banned outright: `dynamic` would let a script reach an API
/// without textually naming it, bypassing the two tables above.
pub const BANNED_KEYWORDS: &[&str] = &["dynamic"];

/// Matches a dotted member-access path against the namespace table.
///
/// A path matches when it equals a forbidden prefix or begins with
/// `prefix + "."`, compared case-insensitively.
pub fn match_namespace(path: &str) -> Option<&'static NamespaceRule> {
    let lower = path.to_ascii_lowercase();
    FORBIDDEN_NAMESPACES.iter().find(|rule| {
        lower
            .strip_prefix(rule.prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
    })
}

/// Matches a constructed type name against the type table (substring,
/// case-insensitive).
pub fn match_construction(type_name: &str) -> Option<&'static str> {
    let lower = type_name.to_ascii_lowercase();
    FORBIDDEN_TYPES
        .iter()
        .find(|t| lower.contains(&t.to_ascii_lowercase()))
        .copied()
}

pub fn is_banned_keyword(ident: &str) -> bool {
    BANNED_KEYWORDS.iter().any(|k| ident == *k)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_match_is_prefix_only() {
        assert!(match_namespace("fs.read_text").is_some());
        assert!(match_namespace("fs").is_some());
        assert!(match_namespace("FS.Read_Text").is_some());
        // A namespace must match a whole leading segment.
        assert!(match_namespace("fsm.step").is_none());
        assert!(match_namespace("service.who_am_i").is_none());
    }

    #[test]
    fn construction_match_is_substring() {
        assert_eq!(match_construction("FileStream"), Some("File"));
        assert_eq!(match_construction("background_thread"), Some("Thread"));
        assert_eq!(match_construction("RegistryKey"), Some("Registry"));
        assert!(match_construction("Map").is_none());
        assert!(match_construction("List").is_none());
    }

    #[test]
    fn banned_keywords_cover_dynamic() {
        assert!(is_banned_keyword("dynamic"));
        assert!(!is_banned_keyword("dyn_count"));
    }

    #[test]
    fn namespace_prefixes_are_lowercase_and_unique() {
        let mut seen = std::collections::BTreeSet::new();
        for rule in FORBIDDEN_NAMESPACES {
            assert_eq!(rule.prefix, rule.prefix.to_ascii_lowercase());
            assert!(seen.insert(rule.prefix), "duplicate prefix {}", rule.prefix);
            assert!(!rule.concern.is_empty());
        }
    }
}
