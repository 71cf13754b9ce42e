//! Syntax tree for a translation unit.
//!
//! Every node carries a span into the generated unit so validator and
//! compiler diagnostics can point at source.

use crate::diagnostics::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
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
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Null {
        span: Span,
    },
    Bool {
        value: bool,
        span: Span,
    },
    Int {
        value: i64,
        span: Span,
    },
    Float {
        value: f64,
        span: Span,
    },
    Str {
        value: String,
        span: Span,
    },
    Ident {
        name: String,
        span: Span,
    },
    Member {
        base: Box<Expr>,
        name: String,
        span: Span,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        span: Span,
    },
    New {
        type_name: String,
        args: Vec<Expr>,
        span: Span,
    },
    ListLit {
        items: Vec<Expr>,
        span: Span,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
        span: Span,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Null { span }
            | Expr::Bool { span, .. }
            | Expr::Int { span, .. }
            | Expr::Float { span, .. }
            | Expr::Str { span, .. }
            | Expr::Ident { span, .. }
            | Expr::Member { span, .. }
            | Expr::Call { span, .. }
            | Expr::New { span, .. }
            | Expr::ListLit { span, .. }
            | Expr::Index { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Binary { span, .. } => *span,
        }
    }

    /// Renders a chain of identifiers and member accesses as a dotted path
    /// (`a.b.c`). Returns `None` when the chain is rooted in anything other
    /// than a plain identifier.
    pub fn member_path(&self) -> Option<String> {
        match self {
            Expr::Ident { name, .. } => Some(name.clone()),
            Expr::Member { base, name, .. } => {
                let mut path = base.member_path()?;
                path.push('.');
                path.push_str(name);
                Some(path)
            }
            _ => None,
        }
    }

    pub fn node_count(&self) -> usize {
        match self {
            Expr::Null { .. }
            | Expr::Bool { .. }
            | Expr::Int { .. }
            | Expr::Float { .. }
            | Expr::Str { .. }
            | Expr::Ident { .. } => 1,
            Expr::Member { base, .. } => 1 + base.node_count(),
            Expr::Call { callee, args, .. } => {
                1 + callee.node_count() + args.iter().map(Expr::node_count).sum::<usize>()
            }
            Expr::New { args, .. } | Expr::ListLit { items: args, .. } => {
                1 + args.iter().map(Expr::node_count).sum::<usize>()
            }
            Expr::Index { base, index, .. } => 1 + base.node_count() + index.node_count(),
            Expr::Unary { expr, .. } => 1 + expr.node_count(),
            Expr::Binary { lhs, rhs, .. } => 1 + lhs.node_count() + rhs.node_count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssignTarget {
    /// `x = e;`
    Name { name: String, span: Span },
    /// `x[i] = e;` where the base must be a plain local name.
    Index {
        name: String,
        index: Expr,
        span: Span,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Var {
        name: String,
        init: Expr,
        span: Span,
    },
    Assign {
        target: AssignTarget,
        value: Expr,
        span: Span,
    },
    Expr(Expr),
    Return {
        value: Option<Expr>,
        span: Span,
    },
    Throw {
        value: Expr,
        span: Span,
    },
    If {
        cond: Expr,
        then_block: Block,
        else_block: Option<Block>,
        span: Span,
    },
    While {
        cond: Expr,
        body: Block,
        span: Span,
    },
    Block(Block),
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Var { span, .. }
            | Stmt::Assign { span, .. }
            | Stmt::Return { span, .. }
            | Stmt::Throw { span, .. }
            | Stmt::If { span, .. }
            | Stmt::While { span, .. } => *span,
            Stmt::Expr(e) => e.span(),
            Stmt::Block(b) => b.span,
        }
    }

    pub fn node_count(&self) -> usize {
        match self {
            Stmt::Var { init, .. } => 1 + init.node_count(),
            Stmt::Assign { target, value, .. } => {
                let target_nodes = match target {
                    AssignTarget::Name { .. } => 1,
                    AssignTarget::Index { index, .. } => 1 + index.node_count(),
                };
                1 + target_nodes + value.node_count()
            }
            Stmt::Expr(e) => 1 + e.node_count(),
            Stmt::Return { value, .. } => 1 + value.as_ref().map_or(0, Expr::node_count),
            Stmt::Throw { value, .. } => 1 + value.node_count(),
            Stmt::If {
                cond,
                then_block,
                else_block,
                ..
            } => {
                1 + cond.node_count()
                    + then_block.node_count()
                    + else_block.as_ref().map_or(0, Block::node_count)
            }
            Stmt::While { cond, body, .. } => 1 + cond.node_count() + body.node_count(),
            Stmt::Block(b) => 1 + b.node_count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

impl Block {
    pub fn node_count(&self) -> usize {
        1 + self.stmts.iter().map(Stmt::node_count).sum::<usize>()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UseDecl {
    pub module: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<String>,
    pub body: Block,
    pub span: Span,
}

/// A parsed translation unit: import prologue plus function declarations.
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    pub uses: Vec<UseDecl>,
    pub functions: Vec<FunctionDecl>,
}

impl Unit {
    pub fn node_count(&self) -> usize {
        self.uses.len()
            + self
                .functions
                .iter()
                .map(|f| 1 + f.params.len() + f.body.node_count())
                .sum::<usize>()
    }
}
