//! Static security validation.
//!
//! Walks every node of a parsed unit and accumulates all denylist breaches
//! rather than stopping at the first, so a caller rewriting the script gets
//! complete information in one round trip. Compilation must never be
//! attempted when this returns a non-empty report.

use serde::Serialize;
use sx_denylist::DenyRule;

use crate::ast::{AssignTarget, Block, Expr, Stmt, Unit};
use crate::diagnostics::Span;

/// One denylist breach: the offending textual reference and the rule it
/// matched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityViolation {
    #[serde(serialize_with = "serialize_rule")]
    pub rule: DenyRule,
    /// The reference as written in the script (dotted path, type name, or
    /// identifier).
    pub reference: String,
    /// The denylist entry that matched.
    pub matched: String,
    pub span: Span,
}

fn serialize_rule<S: serde::Serializer>(rule: &DenyRule, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(rule.as_str())
}

impl std::fmt::Display for SecurityViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.rule {
            DenyRule::Namespace => write!(
                f,
                "forbidden reference '{}' matches denylisted namespace '{}' (line {}, col {})",
                self.reference, self.matched, self.span.start.line, self.span.start.col
            ),
            DenyRule::Construction => write!(
                f,
                "forbidden construction 'new {}' matches denylisted type '{}' (line {}, col {})",
                self.reference, self.matched, self.span.start.line, self.span.start.col
            ),
            DenyRule::Keyword => write!(
                f,
                "use of banned identifier '{}' (line {}, col {})",
                self.reference, self.span.start.line, self.span.start.col
            ),
        }
    }
}

/// Walks the whole unit and returns every violation found. The keyword ban
/// covers every identifier position: declarations and bindings as much as
/// uses.
pub fn validate_unit(unit: &Unit) -> Vec<SecurityViolation> {
    let mut violations = Vec::new();
    for decl in &unit.uses {
        check_ident(&decl.module, decl.span, &mut violations);
    }
    for function in &unit.functions {
        check_ident(&function.name, function.span, &mut violations);
        for param in &function.params {
            check_ident(param, function.span, &mut violations);
        }
        walk_block(&function.body, &mut violations);
    }
    violations
}

fn walk_block(block: &Block, out: &mut Vec<SecurityViolation>) {
    for stmt in &block.stmts {
        walk_stmt(stmt, out);
    }
}

fn walk_stmt(stmt: &Stmt, out: &mut Vec<SecurityViolation>) {
    match stmt {
        Stmt::Var { name, init, span } => {
            check_ident(name, *span, out);
            walk_expr(init, out);
        }
        Stmt::Assign { target, value, .. } => {
            match target {
                AssignTarget::Name { name, span } => check_ident(name, *span, out),
                AssignTarget::Index { name, index, span } => {
                    check_ident(name, *span, out);
                    walk_expr(index, out);
                }
            }
            walk_expr(value, out);
        }
        Stmt::Expr(e) => walk_expr(e, out),
        Stmt::Return { value, .. } => {
            if let Some(e) = value {
                walk_expr(e, out);
            }
        }
        Stmt::Throw { value, .. } => walk_expr(value, out),
        Stmt::If {
            cond,
            then_block,
            else_block,
            ..
        } => {
            walk_expr(cond, out);
            walk_block(then_block, out);
            if let Some(b) = else_block {
                walk_block(b, out);
            }
        }
        Stmt::While { cond, body, .. } => {
            walk_expr(cond, out);
            walk_block(body, out);
        }
        Stmt::Block(b) => walk_block(b, out),
    }
}

fn check_ident(name: &str, span: Span, out: &mut Vec<SecurityViolation>) {
    if sx_denylist::is_banned_keyword(name) {
        out.push(SecurityViolation {
            rule: DenyRule::Keyword,
            reference: name.to_string(),
            matched: name.to_string(),
            span,
        });
    }
}

fn walk_expr(expr: &Expr, out: &mut Vec<SecurityViolation>) {
    match expr {
        Expr::Null { .. }
        | Expr::Bool { .. }
        | Expr::Int { .. }
        | Expr::Float { .. }
        | Expr::Str { .. } => {}
        Expr::Ident { name, span } => check_ident(name, *span, out),
        Expr::Member { base, name, span } => {
            check_ident(name, *span, out);
            if let Some(path) = expr.member_path() {
                if let Some(rule) = sx_denylist::match_namespace(&path) {
                    out.push(SecurityViolation {
                        rule: DenyRule::Namespace,
                        reference: path,
                        matched: rule.prefix.to_string(),
                        span: *span,
                    });
                    // The chain itself matched; its root identifier needs no
                    // separate report, but keyword checks still apply below.
                }
            }
            walk_expr(base, out);
        }
        Expr::Call { callee, args, .. } => {
            walk_expr(callee, out);
            for arg in args {
                walk_expr(arg, out);
            }
        }
        Expr::New {
            type_name,
            args,
            span,
        } => {
            check_ident(type_name, *span, out);
            if let Some(matched) = sx_denylist::match_construction(type_name) {
                out.push(SecurityViolation {
                    rule: DenyRule::Construction,
                    reference: type_name.clone(),
                    matched: matched.to_string(),
                    span: *span,
                });
            }
            for arg in args {
                walk_expr(arg, out);
            }
        }
        Expr::ListLit { items, .. } => {
            for item in items {
                walk_expr(item, out);
            }
        }
        Expr::Index { base, index, .. } => {
            walk_expr(base, out);
            walk_expr(index, out);
        }
        Expr::Unary { expr, .. } => walk_expr(expr, out),
        Expr::Binary { lhs, rhs, .. } => {
            walk_expr(lhs, out);
            walk_expr(rhs, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate;
    use crate::parser;

    fn validate_body(body: &str) -> Vec<SecurityViolation> {
        let unit = generate::wrap_script_body(body);
        let ast = parser::parse_unit(&unit.source).expect("body must parse");
        validate_unit(&ast)
    }

    #[test]
    fn clean_body_has_no_violations() {
        assert!(validate_body("{ return service.who_am_i(); }").is_empty());
    }

    #[test]
    fn member_access_prefix_matches_namespace() {
        let violations = validate_body("{ return fs.read_text(\"/etc/passwd\"); }");
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, DenyRule::Namespace);
        assert_eq!(violations[0].reference, "fs.read_text");
        assert_eq!(violations[0].matched, "fs");
    }

    #[test]
    fn construction_matches_type_substring() {
        let violations = validate_body("{ var f = new FileStream(\"x\"); return null; }");
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, DenyRule::Construction);
        assert_eq!(violations[0].matched, "File");
    }

    #[test]
    fn dynamic_identifier_is_banned() {
        let violations = validate_body("{ var dynamic = 1; return dynamic; }");
        assert_eq!(violations.len(), 2);
        assert!(violations.iter().all(|v| v.rule == DenyRule::Keyword));
    }

    #[test]
    fn dynamic_parameter_binding_is_banned() {
        let violations =
            validate_body("{ return pass(1); } fn pass(dynamic) { return 1; }");
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, DenyRule::Keyword);
        assert_eq!(violations[0].reference, "dynamic");
    }

    #[test]
    fn dynamic_member_name_is_banned() {
        let violations = validate_body("{ var m = new Map(); return m.dynamic; }");
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, DenyRule::Keyword);
    }

    #[test]
    fn dynamic_constructed_type_name_is_banned() {
        let violations = validate_body("{ var d = new dynamic(); return d; }");
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, DenyRule::Keyword);
    }

    #[test]
    fn all_violations_are_accumulated() {
        let violations =
            validate_body("{ var p = proc.spawn(\"sh\"); var f = new File(\"x\"); return null; }");
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].rule, DenyRule::Namespace);
        assert_eq!(violations[1].rule, DenyRule::Construction);
    }

    #[test]
    fn case_insensitive_matching() {
        let violations = validate_body("{ return Env.get(\"HOME\"); }");
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].matched, "env");
    }
}
