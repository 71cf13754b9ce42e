//! Lowers a validated unit to stack bytecode.
//!
//! Resolution is closed-world: calls link against the unit's own functions
//! and the builtin reference set, nothing else. All error-severity
//! diagnostics are accumulated and surfaced together; warnings never abort.

use std::collections::BTreeMap;

use crate::ast::{AssignTarget, BinaryOp, Block, Expr, Stmt, UnaryOp, Unit};
use crate::builtins::{self, BuiltinId};
use crate::diagnostics::{sort_diagnostics, Diagnostic, Span, Stage};
use crate::generate::PERMITTED_IMPORTS;
use crate::language::limits;

#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    Const(u16),
    Null,
    True,
    False,
    LoadLocal(u16),
    StoreLocal(u16),
    Pop,
    MakeList(u16),
    MakeMap,
    Index,
    /// `[container, index, value]` -> `[updated container]`
    StoreIndex,
    GetMember(u16),
    CallBuiltin {
        id: BuiltinId,
        argc: u8,
    },
    CallFunction {
        name: u16,
        argc: u8,
    },
    CallMethod {
        name: u16,
        argc: u8,
    },
    Jump(u32),
    JumpIfFalse(u32),
    /// Short-circuit helpers: branch on the top of stack without popping it.
    JumpIfFalseKeep(u32),
    JumpIfTrueKeep(u32),
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Neg,
    Not,
    Throw,
    Return,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Chunk {
    pub ops: Vec<Op>,
    pub consts: Vec<Const>,
    /// Parallel to `ops`; used for runtime traces.
    pub spans: Vec<Span>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub arity: usize,
    pub chunk: Chunk,
}

/// In-memory executable module for one request. Never cached across requests.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledModule {
    pub functions: BTreeMap<String, Function>,
    pub fingerprint: String,
}

pub fn compile_unit(unit: &Unit, fingerprint: &str) -> Result<CompiledModule, Vec<Diagnostic>> {
    let mut diagnostics: Vec<Diagnostic> = Vec::new();

    let node_count = unit.node_count();
    let max_nodes = limits::max_ast_nodes();
    if node_count > max_nodes {
        diagnostics.push(Diagnostic::error(
            "SX-LIMIT-0002",
            Stage::Compile,
            format!("unit too large: max_ast_nodes={max_nodes} got {node_count}"),
            None,
        ));
    }

    for decl in &unit.uses {
        if !PERMITTED_IMPORTS.contains(&decl.module.as_str()) {
            diagnostics.push(Diagnostic::error(
                "SX-IMPORT-0001",
                Stage::Compile,
                format!(
                    "import '{}' is not in the permitted set ({})",
                    decl.module,
                    PERMITTED_IMPORTS.join(", ")
                ),
                Some(decl.span),
            ));
        }
    }

    let mut signatures: BTreeMap<String, usize> = BTreeMap::new();
    for function in &unit.functions {
        if signatures
            .insert(function.name.clone(), function.params.len())
            .is_some()
        {
            diagnostics.push(Diagnostic::error(
                "SX-RES-0005",
                Stage::Compile,
                format!("duplicate function '{}'", function.name),
                Some(function.span),
            ));
        }
    }

    let mut functions = BTreeMap::new();
    for function in &unit.functions {
        let mut fc = FnCompiler::new(&signatures, &mut diagnostics);
        for (i, param) in function.params.iter().enumerate() {
            if function.params[..i].contains(param) {
                fc.diagnostics.push(Diagnostic::error(
                    "SX-RES-0005",
                    Stage::Compile,
                    format!("duplicate parameter '{param}'"),
                    Some(function.span),
                ));
            }
            fc.locals.push(Local {
                name: param.clone(),
                depth: 0,
            });
        }
        fc.block(&function.body);
        // Implicit `return null` for bodies that fall off the end.
        let end = function.body.span;
        fc.emit(Op::Null, end);
        fc.emit(Op::Return, end);
        functions.insert(
            function.name.clone(),
            Function {
                name: function.name.clone(),
                arity: function.params.len(),
                chunk: fc.chunk,
            },
        );
    }

    if diagnostics.iter().any(|d| d.severity == crate::diagnostics::Severity::Error) {
        sort_diagnostics(&mut diagnostics);
        return Err(diagnostics);
    }

    Ok(CompiledModule {
        functions,
        fingerprint: fingerprint.to_string(),
    })
}

struct Local {
    name: String,
    depth: usize,
}

struct FnCompiler<'a> {
    chunk: Chunk,
    locals: Vec<Local>,
    scope_depth: usize,
    signatures: &'a BTreeMap<String, usize>,
    diagnostics: &'a mut Vec<Diagnostic>,
}

impl<'a> FnCompiler<'a> {
    fn new(signatures: &'a BTreeMap<String, usize>, diagnostics: &'a mut Vec<Diagnostic>) -> Self {
        Self {
            chunk: Chunk::default(),
            locals: Vec::new(),
            scope_depth: 0,
            signatures,
            diagnostics,
        }
    }

    fn emit(&mut self, op: Op, span: Span) -> usize {
        self.chunk.ops.push(op);
        self.chunk.spans.push(span);
        self.chunk.ops.len() - 1
    }

    fn patch_jump(&mut self, at: usize) {
        let target = self.chunk.ops.len() as u32;
        match &mut self.chunk.ops[at] {
            Op::Jump(t) | Op::JumpIfFalse(t) | Op::JumpIfFalseKeep(t) | Op::JumpIfTrueKeep(t) => {
                *t = target;
            }
            other => unreachable!("patching non-jump op {other:?}"),
        }
    }

    fn error(&mut self, code: &str, message: String, span: Span) {
        self.diagnostics
            .push(Diagnostic::error(code, Stage::Compile, message, Some(span)));
    }

    fn add_const(&mut self, c: Const, span: Span) -> u16 {
        if let Some(i) = self.chunk.consts.iter().position(|x| *x == c) {
            return i as u16;
        }
        if self.chunk.consts.len() > u16::MAX as usize {
            self.error(
                "SX-LIMIT-0003",
                "too many constants in one function".to_string(),
                span,
            );
            return 0;
        }
        self.chunk.consts.push(c);
        (self.chunk.consts.len() - 1) as u16
    }

    fn name_const(&mut self, name: &str, span: Span) -> u16 {
        self.add_const(Const::Str(name.to_string()), span)
    }

    fn resolve_local(&self, name: &str) -> Option<u16> {
        self.locals
            .iter()
            .rposition(|l| l.name == name)
            .map(|i| i as u16)
    }

    fn is_namespace_root(&self, name: &str) -> bool {
        PERMITTED_IMPORTS.contains(&name) && self.resolve_local(name).is_none()
    }

    fn declare_local(&mut self, name: &str, span: Span) {
        let duplicate = self
            .locals
            .iter()
            .any(|l| l.depth == self.scope_depth && l.name == name);
        if duplicate {
            self.error(
                "SX-RES-0005",
                format!("duplicate variable '{name}' in this scope"),
                span,
            );
        }
        if self.locals.len() >= u16::MAX as usize {
            self.error("SX-LIMIT-0004", "too many locals".to_string(), span);
        }
        self.locals.push(Local {
            name: name.to_string(),
            depth: self.scope_depth,
        });
    }

    fn block(&mut self, block: &Block) {
        self.scope_depth += 1;
        for stmt in &block.stmts {
            self.stmt(stmt);
        }
        while self
            .locals
            .last()
            .is_some_and(|l| l.depth == self.scope_depth)
        {
            self.locals.pop();
            self.emit(Op::Pop, block.span);
        }
        self.scope_depth -= 1;
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Var { name, init, span } => {
                self.expr(init);
                // The initializer stays on the stack as the local's slot.
                self.declare_local(name, *span);
            }
            Stmt::Assign {
                target,
                value,
                span,
            } => match target {
                AssignTarget::Name { name, span: tspan } => {
                    let Some(slot) = self.resolve_local(name) else {
                        self.error(
                            "SX-RES-0001",
                            format!("unresolved variable '{name}'"),
                            *tspan,
                        );
                        self.expr(value);
                        self.emit(Op::Pop, *span);
                        return;
                    };
                    self.expr(value);
                    self.emit(Op::StoreLocal(slot), *span);
                }
                AssignTarget::Index {
                    name,
                    index,
                    span: tspan,
                } => {
                    let Some(slot) = self.resolve_local(name) else {
                        self.error(
                            "SX-RES-0001",
                            format!("unresolved variable '{name}'"),
                            *tspan,
                        );
                        self.expr(value);
                        self.emit(Op::Pop, *span);
                        return;
                    };
                    self.emit(Op::LoadLocal(slot), *tspan);
                    self.expr(index);
                    self.expr(value);
                    self.emit(Op::StoreIndex, *span);
                    self.emit(Op::StoreLocal(slot), *span);
                }
            },
            Stmt::Expr(e) => {
                self.expr(e);
                self.emit(Op::Pop, e.span());
            }
            Stmt::Return { value, span } => {
                match value {
                    Some(e) => self.expr(e),
                    None => {
                        self.emit(Op::Null, *span);
                    }
                }
                self.emit(Op::Return, *span);
            }
            Stmt::Throw { value, span } => {
                self.expr(value);
                self.emit(Op::Throw, *span);
            }
            Stmt::If {
                cond,
                then_block,
                else_block,
                span,
            } => {
                self.expr(cond);
                let to_else = self.emit(Op::JumpIfFalse(u32::MAX), cond.span());
                self.block(then_block);
                match else_block {
                    Some(eb) => {
                        let to_end = self.emit(Op::Jump(u32::MAX), *span);
                        self.patch_jump(to_else);
                        self.block(eb);
                        self.patch_jump(to_end);
                    }
                    None => self.patch_jump(to_else),
                }
            }
            Stmt::While { cond, body, .. } => {
                let loop_start = self.chunk.ops.len() as u32;
                self.expr(cond);
                let to_exit = self.emit(Op::JumpIfFalse(u32::MAX), cond.span());
                self.block(body);
                self.emit(Op::Jump(loop_start), cond.span());
                self.patch_jump(to_exit);
            }
            Stmt::Block(b) => self.block(b),
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Null { span } => {
                self.emit(Op::Null, *span);
            }
            Expr::Bool { value, span } => {
                self.emit(if *value { Op::True } else { Op::False }, *span);
            }
            Expr::Int { value, span } => {
                let c = self.add_const(Const::Int(*value), *span);
                self.emit(Op::Const(c), *span);
            }
            Expr::Float { value, span } => {
                let c = self.add_const(Const::Float(*value), *span);
                self.emit(Op::Const(c), *span);
            }
            Expr::Str { value, span } => {
                let c = self.add_const(Const::Str(value.clone()), *span);
                self.emit(Op::Const(c), *span);
            }
            Expr::Ident { name, span } => {
                if let Some(slot) = self.resolve_local(name) {
                    self.emit(Op::LoadLocal(slot), *span);
                } else if self.is_namespace_root(name) {
                    self.error(
                        "SX-RES-0003",
                        format!("namespace '{name}' is not a value"),
                        *span,
                    );
                    self.emit(Op::Null, *span);
                } else if self.signatures.contains_key(name) || builtins::lookup(name).is_some() {
                    self.error(
                        "SX-RES-0006",
                        format!("function '{name}' is not a value; call it"),
                        *span,
                    );
                    self.emit(Op::Null, *span);
                } else {
                    self.error(
                        "SX-RES-0001",
                        format!("unresolved identifier '{name}'"),
                        *span,
                    );
                    self.emit(Op::Null, *span);
                }
            }
            Expr::Member { base, name, span } => {
                if let Some(path) = expr.member_path() {
                    let root = path.split('.').next().unwrap_or("");
                    if self.is_namespace_root(root) {
                        self.error(
                            "SX-RES-0003",
                            format!("namespaced operation '{path}' must be called"),
                            *span,
                        );
                        self.emit(Op::Null, *span);
                        return;
                    }
                }
                self.expr(base);
                let c = self.name_const(name, *span);
                self.emit(Op::GetMember(c), *span);
            }
            Expr::Call { callee, args, span } => self.call(callee, args, *span),
            Expr::New {
                type_name,
                args,
                span,
            } => match type_name.as_str() {
                "Map" => {
                    if !args.is_empty() {
                        self.error(
                            "SX-ARITY-0001",
                            "Map constructor takes no arguments".to_string(),
                            *span,
                        );
                    }
                    self.emit(Op::MakeMap, *span);
                }
                "List" => {
                    for arg in args {
                        self.expr(arg);
                    }
                    self.emit(Op::MakeList(args.len() as u16), *span);
                }
                other => {
                    self.error(
                        "SX-RES-0004",
                        format!(
                            "unknown type '{other}'; constructible types are Map and List"
                        ),
                        *span,
                    );
                    self.emit(Op::Null, *span);
                }
            },
            Expr::ListLit { items, span } => {
                for item in items {
                    self.expr(item);
                }
                self.emit(Op::MakeList(items.len() as u16), *span);
            }
            Expr::Index { base, index, span } => {
                self.expr(base);
                self.expr(index);
                self.emit(Op::Index, *span);
            }
            Expr::Unary { op, expr, span } => {
                self.expr(expr);
                self.emit(
                    match op {
                        UnaryOp::Neg => Op::Neg,
                        UnaryOp::Not => Op::Not,
                    },
                    *span,
                );
            }
            Expr::Binary { op, lhs, rhs, span } => match op {
                BinaryOp::And => {
                    self.expr(lhs);
                    let short = self.emit(Op::JumpIfFalseKeep(u32::MAX), *span);
                    self.emit(Op::Pop, *span);
                    self.expr(rhs);
                    self.patch_jump(short);
                }
                BinaryOp::Or => {
                    self.expr(lhs);
                    let short = self.emit(Op::JumpIfTrueKeep(u32::MAX), *span);
                    self.emit(Op::Pop, *span);
                    self.expr(rhs);
                    self.patch_jump(short);
                }
                _ => {
                    self.expr(lhs);
                    self.expr(rhs);
                    let op = match op {
                        BinaryOp::Add => Op::Add,
                        BinaryOp::Sub => Op::Sub,
                        BinaryOp::Mul => Op::Mul,
                        BinaryOp::Div => Op::Div,
                        BinaryOp::Rem => Op::Rem,
                        BinaryOp::Eq => Op::Eq,
                        BinaryOp::Ne => Op::Ne,
                        BinaryOp::Lt => Op::Lt,
                        BinaryOp::Le => Op::Le,
                        BinaryOp::Gt => Op::Gt,
                        BinaryOp::Ge => Op::Ge,
                        BinaryOp::And | BinaryOp::Or => unreachable!(),
                    };
                    self.emit(op, *span);
                }
            },
        }
    }

    fn call(&mut self, callee: &Expr, args: &[Expr], span: Span) {
        if args.len() > u8::MAX as usize {
            self.error(
                "SX-ARITY-0001",
                "too many call arguments".to_string(),
                span,
            );
            self.emit(Op::Null, span);
            return;
        }
        let argc = args.len() as u8;
        match callee {
            Expr::Ident { name, span: cspan } => {
                if self.resolve_local(name).is_some() {
                    self.error(
                        "SX-RES-0006",
                        format!("variable '{name}' is not callable"),
                        *cspan,
                    );
                    self.emit(Op::Null, span);
                    return;
                }
                if let Some(&arity) = self.signatures.get(name) {
                    if args.len() != arity {
                        self.error(
                            "SX-ARITY-0001",
                            format!(
                                "function '{name}' expects {arity} argument(s), got {}",
                                args.len()
                            ),
                            span,
                        );
                    }
                    for arg in args {
                        self.expr(arg);
                    }
                    let c = self.name_const(name, *cspan);
                    self.emit(Op::CallFunction { name: c, argc }, span);
                    return;
                }
                if let Some(builtin) = builtins::lookup(name) {
                    if args.len() != builtin.arity {
                        self.error(
                            "SX-ARITY-0001",
                            format!(
                                "'{name}' expects {} argument(s), got {}",
                                builtin.arity,
                                args.len()
                            ),
                            span,
                        );
                    }
                    for arg in args {
                        self.expr(arg);
                    }
                    self.emit(
                        Op::CallBuiltin {
                            id: builtin.id,
                            argc,
                        },
                        span,
                    );
                    return;
                }
                self.error(
                    "SX-RES-0001",
                    format!("unresolved function '{name}'"),
                    *cspan,
                );
                self.emit(Op::Null, span);
            }
            Expr::Member {
                base,
                name,
                span: cspan,
            } => {
                if let Some(path) = callee.member_path() {
                    let root = path.split('.').next().unwrap_or("");
                    if self.is_namespace_root(root) {
                        let Some(builtin) = builtins::lookup(&path) else {
                            self.error(
                                "SX-RES-0002",
                                format!("no operation '{path}' in the reference set"),
                                *cspan,
                            );
                            self.emit(Op::Null, span);
                            return;
                        };
                        if args.len() != builtin.arity {
                            self.error(
                                "SX-ARITY-0001",
                                format!(
                                    "'{path}' expects {} argument(s), got {}",
                                    builtin.arity,
                                    args.len()
                                ),
                                span,
                            );
                        }
                        for arg in args {
                            self.expr(arg);
                        }
                        self.emit(
                            Op::CallBuiltin {
                                id: builtin.id,
                                argc,
                            },
                            span,
                        );
                        return;
                    }
                }
                self.expr(base);
                for arg in args {
                    self.expr(arg);
                }
                let c = self.name_const(name, *cspan);
                self.emit(Op::CallMethod { name: c, argc }, span);
            }
            other => {
                self.error(
                    "SX-RES-0006",
                    "expression is not callable".to_string(),
                    other.span(),
                );
                self.emit(Op::Null, span);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate;
    use crate::parser;

    fn compile_body(body: &str) -> Result<CompiledModule, Vec<Diagnostic>> {
        let unit = generate::wrap_script_body(body);
        let ast = parser::parse_unit(&unit.source).expect("body must parse");
        compile_unit(&ast, &unit.fingerprint)
    }

    #[test]
    fn compiles_entry_function() {
        let module = compile_body("{ return \"ok\"; }").unwrap();
        let f = module.functions.get("script_main").unwrap();
        assert_eq!(f.arity, 1);
        assert!(f.chunk.ops.contains(&Op::Return));
        assert_eq!(f.chunk.ops.len(), f.chunk.spans.len());
    }

    #[test]
    fn unresolved_identifier_is_reported_with_span() {
        let errs = compile_body("{ return missing; }").unwrap_err();
        assert!(errs.iter().any(|d| d.code == "SX-RES-0001"));
        assert!(errs.iter().all(|d| d.stage == Stage::Compile || d.stage == Stage::Parse));
        assert!(errs[0].span.is_some());
    }

    #[test]
    fn multiple_errors_are_accumulated() {
        let errs = compile_body("{ var a = missing1; var b = missing2; return a; }").unwrap_err();
        let res: Vec<_> = errs.iter().filter(|d| d.code == "SX-RES-0001").collect();
        assert_eq!(res.len(), 2);
    }

    #[test]
    fn builtin_arity_is_checked() {
        let errs = compile_body("{ return len(); }").unwrap_err();
        assert!(errs.iter().any(|d| d.code == "SX-ARITY-0001"));
    }

    #[test]
    fn unknown_namespace_operation_is_rejected() {
        let errs = compile_body("{ return text.frobnicate(\"x\"); }").unwrap_err();
        assert!(errs.iter().any(|d| d.code == "SX-RES-0002"));
    }

    #[test]
    fn unknown_constructed_type_is_rejected() {
        let errs = compile_body("{ var q = new Query(); return null; }").unwrap_err();
        assert!(errs.iter().any(|d| d.code == "SX-RES-0004"));
    }

    #[test]
    fn capability_calls_lower_to_method_dispatch() {
        let module = compile_body("{ return service.who_am_i(); }").unwrap();
        let f = module.functions.get("script_main").unwrap();
        assert!(f
            .chunk
            .ops
            .iter()
            .any(|op| matches!(op, Op::CallMethod { .. })));
    }
}
