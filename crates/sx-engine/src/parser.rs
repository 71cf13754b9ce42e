//! Recursive-descent parser for translation units.
//!
//! Parse errors are accumulated with statement-level recovery (skip to the
//! next `;` or `}`) so a malformed unit surfaces as many diagnostics as it
//! can in one pass. Nesting depth is bounded; exceeding it aborts the parse.

use crate::ast::{
    AssignTarget, BinaryOp, Block, Expr, FunctionDecl, Stmt, UnaryOp, Unit, UseDecl,
};
use crate::diagnostics::{Diagnostic, Span, Stage};
use crate::language::limits;
use crate::lexer::{self, SpannedToken, Token};

pub fn parse_unit(source: &str) -> Result<Unit, Vec<Diagnostic>> {
    let tokens = match lexer::lex(source) {
        Ok(tokens) => tokens,
        Err(diag) => return Err(vec![diag]),
    };
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        diagnostics: Vec::new(),
    };
    let unit = parser.unit();
    if parser.diagnostics.is_empty() {
        Ok(unit)
    } else {
        Err(parser.diagnostics)
    }
}

struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
    depth: usize,
    diagnostics: Vec<Diagnostic>,
}

/// Marker for an already-reported parse error. `Abort` stops the whole parse
/// (depth limit); `Sync` asks the caller to resynchronize and continue.
enum ParseError {
    Sync,
    Abort,
}

type PResult<T> = Result<T, ParseError>;

impl Parser {
    fn peek(&self) -> Option<&SpannedToken> {
        self.tokens.get(self.pos)
    }

    fn at(&self, token: &Token) -> bool {
        self.peek().map(|t| &t.token) == Some(token)
    }

    fn bump(&mut self) -> Option<SpannedToken> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, token: &Token) -> Option<Span> {
        if self.at(token) {
            self.bump().map(|t| t.span)
        } else {
            None
        }
    }

    fn last_span(&self) -> Span {
        self.tokens
            .get(self.pos.saturating_sub(1))
            .or_else(|| self.tokens.last())
            .map(|t| t.span)
            .unwrap_or_else(|| Span::point(1, 1))
    }

    fn error_here(&mut self, expected: &str) -> ParseError {
        let (found, span) = match self.peek() {
            Some(t) => (t.token.describe(), t.span),
            None => ("end of input".to_string(), self.last_span()),
        };
        self.diagnostics.push(Diagnostic::error(
            "SX-PARSE-0001",
            Stage::Parse,
            format!("expected {expected}, found {found}"),
            Some(span),
        ));
        ParseError::Sync
    }

    fn expect(&mut self, token: &Token, expected: &str) -> PResult<Span> {
        match self.eat(token) {
            Some(span) => Ok(span),
            None => Err(self.error_here(expected)),
        }
    }

    fn expect_ident(&mut self, expected: &str) -> PResult<(String, Span)> {
        match self.peek() {
            Some(SpannedToken {
                token: Token::Ident(_),
                ..
            }) => {
                let t = self.bump().expect("peeked");
                match t.token {
                    Token::Ident(name) => Ok((name, t.span)),
                    _ => unreachable!(),
                }
            }
            _ => Err(self.error_here(expected)),
        }
    }

    fn enter(&mut self) -> PResult<()> {
        self.depth += 1;
        if self.depth > limits::MAX_NEST_DEPTH {
            let span = self.peek().map(|t| t.span).unwrap_or_else(|| self.last_span());
            self.diagnostics.push(Diagnostic::error(
                "SX-PARSE-0002",
                Stage::Parse,
                format!("nesting depth exceeds limit {}", limits::MAX_NEST_DEPTH),
                Some(span),
            ));
            return Err(ParseError::Abort);
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Skips to just past the next `;`, or stops before `}` / end of input.
    fn synchronize(&mut self) {
        while let Some(t) = self.peek() {
            match t.token {
                Token::Semi => {
                    self.bump();
                    return;
                }
                Token::RBrace | Token::Fn => return,
                _ => {
                    self.bump();
                }
            }
        }
    }

    fn unit(&mut self) -> Unit {
        let mut uses = Vec::new();
        let mut functions = Vec::new();

        while self.at(&Token::Use) {
            match self.use_decl() {
                Ok(decl) => uses.push(decl),
                Err(ParseError::Abort) => return Unit { uses, functions },
                Err(ParseError::Sync) => self.synchronize(),
            }
        }

        while let Some(t) = self.peek() {
            if t.token == Token::Fn {
                match self.function_decl() {
                    Ok(decl) => functions.push(decl),
                    Err(ParseError::Abort) => break,
                    Err(ParseError::Sync) => self.skip_to_next_function(),
                }
            } else {
                self.error_here("'fn'");
                self.skip_to_next_function();
            }
        }

        Unit { uses, functions }
    }

    fn skip_to_next_function(&mut self) {
        while let Some(t) = self.peek() {
            if t.token == Token::Fn {
                return;
            }
            self.bump();
        }
    }

    fn use_decl(&mut self) -> PResult<UseDecl> {
        let start = self.expect(&Token::Use, "'use'")?;
        let (module, _) = self.expect_ident("module name")?;
        let end = self.expect(&Token::Semi, "';'")?;
        Ok(UseDecl {
            module,
            span: start.merge(end),
        })
    }

    fn function_decl(&mut self) -> PResult<FunctionDecl> {
        let start = self.expect(&Token::Fn, "'fn'")?;
        let (name, _) = self.expect_ident("function name")?;
        self.expect(&Token::LParen, "'('")?;
        let mut params = Vec::new();
        if !self.at(&Token::RParen) {
            loop {
                let (param, _) = self.expect_ident("parameter name")?;
                params.push(param);
                if self.eat(&Token::Comma).is_none() {
                    break;
                }
            }
        }
        self.expect(&Token::RParen, "')'")?;
        let body = self.block()?;
        let span = start.merge(body.span);
        Ok(FunctionDecl {
            name,
            params,
            body,
            span,
        })
    }

    fn block(&mut self) -> PResult<Block> {
        self.enter()?;
        let result = self.block_inner();
        self.leave();
        result
    }

    fn block_inner(&mut self) -> PResult<Block> {
        let start = self.expect(&Token::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        loop {
            match self.peek() {
                None => {
                    return Err(self.error_here("'}'"));
                }
                Some(t) if t.token == Token::RBrace => {
                    let end = self.bump().expect("peeked").span;
                    return Ok(Block {
                        stmts,
                        span: start.merge(end),
                    });
                }
                Some(_) => match self.statement() {
                    Ok(stmt) => stmts.push(stmt),
                    Err(ParseError::Abort) => return Err(ParseError::Abort),
                    Err(ParseError::Sync) => self.synchronize(),
                },
            }
        }
    }

    fn statement(&mut self) -> PResult<Stmt> {
        let token = match self.peek() {
            Some(t) => t.token.clone(),
            None => return Err(self.error_here("statement")),
        };
        match token {
            Token::Var => self.var_statement(),
            Token::Return => self.return_statement(),
            Token::Throw => self.throw_statement(),
            Token::If => self.if_statement(),
            Token::While => self.while_statement(),
            Token::LBrace => Ok(Stmt::Block(self.block()?)),
            _ => self.expr_or_assign_statement(),
        }
    }

    fn var_statement(&mut self) -> PResult<Stmt> {
        let start = self.expect(&Token::Var, "'var'")?;
        let (name, _) = self.expect_ident("variable name")?;
        self.expect(&Token::Assign, "'='")?;
        let init = self.expression()?;
        let end = self.expect(&Token::Semi, "';'")?;
        Ok(Stmt::Var {
            name,
            init,
            span: start.merge(end),
        })
    }

    fn return_statement(&mut self) -> PResult<Stmt> {
        let start = self.expect(&Token::Return, "'return'")?;
        if let Some(end) = self.eat(&Token::Semi) {
            return Ok(Stmt::Return {
                value: None,
                span: start.merge(end),
            });
        }
        let value = self.expression()?;
        let end = self.expect(&Token::Semi, "';'")?;
        Ok(Stmt::Return {
            value: Some(value),
            span: start.merge(end),
        })
    }

    fn throw_statement(&mut self) -> PResult<Stmt> {
        let start = self.expect(&Token::Throw, "'throw'")?;
        let value = self.expression()?;
        let end = self.expect(&Token::Semi, "';'")?;
        Ok(Stmt::Throw {
            value,
            span: start.merge(end),
        })
    }

    fn if_statement(&mut self) -> PResult<Stmt> {
        let start = self.expect(&Token::If, "'if'")?;
        self.expect(&Token::LParen, "'('")?;
        let cond = self.expression()?;
        self.expect(&Token::RParen, "')'")?;
        let then_block = self.block()?;
        let mut span = start.merge(then_block.span);
        let else_block = if self.eat(&Token::Else).is_some() {
            if self.at(&Token::If) {
                // `else if` chains nest as a single-statement else block.
                let nested = self.if_statement()?;
                let nested_span = nested.span();
                span = span.merge(nested_span);
                Some(Block {
                    stmts: vec![nested],
                    span: nested_span,
                })
            } else {
                let block = self.block()?;
                span = span.merge(block.span);
                Some(block)
            }
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_block,
            else_block,
            span,
        })
    }

    fn while_statement(&mut self) -> PResult<Stmt> {
        let start = self.expect(&Token::While, "'while'")?;
        self.expect(&Token::LParen, "'('")?;
        let cond = self.expression()?;
        self.expect(&Token::RParen, "')'")?;
        let body = self.block()?;
        let span = start.merge(body.span);
        Ok(Stmt::While { cond, body, span })
    }

    fn expr_or_assign_statement(&mut self) -> PResult<Stmt> {
        let expr = self.expression()?;
        if self.eat(&Token::Assign).is_some() {
            let target = match &expr {
                Expr::Ident { name, span } => AssignTarget::Name {
                    name: name.clone(),
                    span: *span,
                },
                Expr::Index { base, index, span } => match base.as_ref() {
                    Expr::Ident { name, .. } => AssignTarget::Index {
                        name: name.clone(),
                        index: (**index).clone(),
                        span: *span,
                    },
                    _ => {
                        self.diagnostics.push(Diagnostic::error(
                            "SX-ASSIGN-0001",
                            Stage::Parse,
                            "indexed assignment requires a plain variable base".to_string(),
                            Some(expr.span()),
                        ));
                        return Err(ParseError::Sync);
                    }
                },
                _ => {
                    self.diagnostics.push(Diagnostic::error(
                        "SX-ASSIGN-0001",
                        Stage::Parse,
                        "assignment target must be a variable or indexed variable".to_string(),
                        Some(expr.span()),
                    ));
                    return Err(ParseError::Sync);
                }
            };
            let value = self.expression()?;
            let end = self.expect(&Token::Semi, "';'")?;
            let span = expr.span().merge(end);
            return Ok(Stmt::Assign {
                target,
                value,
                span,
            });
        }
        self.expect(&Token::Semi, "';'")?;
        Ok(Stmt::Expr(expr))
    }

    fn expression(&mut self) -> PResult<Expr> {
        self.enter()?;
        let result = self.or_expr();
        self.leave();
        result
    }

    fn or_expr(&mut self) -> PResult<Expr> {
        let mut lhs = self.and_expr()?;
        while self.eat(&Token::OrOr).is_some() {
            let rhs = self.and_expr()?;
            let span = lhs.span().merge(rhs.span());
            lhs = Expr::Binary {
                op: BinaryOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> PResult<Expr> {
        let mut lhs = self.equality_expr()?;
        while self.eat(&Token::AndAnd).is_some() {
            let rhs = self.equality_expr()?;
            let span = lhs.span().merge(rhs.span());
            lhs = Expr::Binary {
                op: BinaryOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Ok(lhs)
    }

    fn equality_expr(&mut self) -> PResult<Expr> {
        let mut lhs = self.comparison_expr()?;
        loop {
            let op = if self.eat(&Token::EqEq).is_some() {
                BinaryOp::Eq
            } else if self.eat(&Token::NotEq).is_some() {
                BinaryOp::Ne
            } else {
                return Ok(lhs);
            };
            let rhs = self.comparison_expr()?;
            let span = lhs.span().merge(rhs.span());
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
    }

    fn comparison_expr(&mut self) -> PResult<Expr> {
        let mut lhs = self.term_expr()?;
        loop {
            let op = if self.eat(&Token::Lt).is_some() {
                BinaryOp::Lt
            } else if self.eat(&Token::Le).is_some() {
                BinaryOp::Le
            } else if self.eat(&Token::Gt).is_some() {
                BinaryOp::Gt
            } else if self.eat(&Token::Ge).is_some() {
                BinaryOp::Ge
            } else {
                return Ok(lhs);
            };
            let rhs = self.term_expr()?;
            let span = lhs.span().merge(rhs.span());
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
    }

    fn term_expr(&mut self) -> PResult<Expr> {
        let mut lhs = self.factor_expr()?;
        loop {
            let op = if self.eat(&Token::Plus).is_some() {
                BinaryOp::Add
            } else if self.eat(&Token::Minus).is_some() {
                BinaryOp::Sub
            } else {
                return Ok(lhs);
            };
            let rhs = self.factor_expr()?;
            let span = lhs.span().merge(rhs.span());
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
    }

    fn factor_expr(&mut self) -> PResult<Expr> {
        let mut lhs = self.unary_expr()?;
        loop {
            let op = if self.eat(&Token::Star).is_some() {
                BinaryOp::Mul
            } else if self.eat(&Token::Slash).is_some() {
                BinaryOp::Div
            } else if self.eat(&Token::Percent).is_some() {
                BinaryOp::Rem
            } else {
                return Ok(lhs);
            };
            let rhs = self.unary_expr()?;
            let span = lhs.span().merge(rhs.span());
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
    }

    fn unary_expr(&mut self) -> PResult<Expr> {
        if let Some(span) = self.eat(&Token::Minus) {
            self.enter()?;
            let expr = self.unary_expr();
            self.leave();
            let expr = expr?;
            let span = span.merge(expr.span());
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                expr: Box::new(expr),
                span,
            });
        }
        if let Some(span) = self.eat(&Token::Bang) {
            self.enter()?;
            let expr = self.unary_expr();
            self.leave();
            let expr = expr?;
            let span = span.merge(expr.span());
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(expr),
                span,
            });
        }
        self.postfix_expr()
    }

    fn postfix_expr(&mut self) -> PResult<Expr> {
        let mut expr = self.primary_expr()?;
        loop {
            if self.eat(&Token::Dot).is_some() {
                let (name, name_span) = self.expect_ident("member name")?;
                let span = expr.span().merge(name_span);
                expr = Expr::Member {
                    base: Box::new(expr),
                    name,
                    span,
                };
            } else if self.at(&Token::LParen) {
                let args = self.call_args()?;
                let span = expr.span().merge(self.last_span());
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                    span,
                };
            } else if self.eat(&Token::LBracket).is_some() {
                let index = self.expression()?;
                let end = self.expect(&Token::RBracket, "']'")?;
                let span = expr.span().merge(end);
                expr = Expr::Index {
                    base: Box::new(expr),
                    index: Box::new(index),
                    span,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn call_args(&mut self) -> PResult<Vec<Expr>> {
        self.expect(&Token::LParen, "'('")?;
        let mut args = Vec::new();
        if !self.at(&Token::RParen) {
            loop {
                args.push(self.expression()?);
                if self.eat(&Token::Comma).is_none() {
                    break;
                }
            }
        }
        self.expect(&Token::RParen, "')'")?;
        Ok(args)
    }

    fn primary_expr(&mut self) -> PResult<Expr> {
        let token = match self.peek() {
            Some(t) => t.clone(),
            None => return Err(self.error_here("expression")),
        };
        match token.token {
            Token::Null => {
                self.bump();
                Ok(Expr::Null { span: token.span })
            }
            Token::True => {
                self.bump();
                Ok(Expr::Bool {
                    value: true,
                    span: token.span,
                })
            }
            Token::False => {
                self.bump();
                Ok(Expr::Bool {
                    value: false,
                    span: token.span,
                })
            }
            Token::Int(value) => {
                self.bump();
                Ok(Expr::Int {
                    value,
                    span: token.span,
                })
            }
            Token::Float(value) => {
                self.bump();
                Ok(Expr::Float {
                    value,
                    span: token.span,
                })
            }
            Token::Str(value) => {
                self.bump();
                Ok(Expr::Str {
                    value,
                    span: token.span,
                })
            }
            Token::Ident(name) => {
                self.bump();
                Ok(Expr::Ident {
                    name,
                    span: token.span,
                })
            }
            Token::New => {
                self.bump();
                let (type_name, _) = self.expect_ident("type name")?;
                let args = self.call_args()?;
                let span = token.span.merge(self.last_span());
                Ok(Expr::New {
                    type_name,
                    args,
                    span,
                })
            }
            Token::LBracket => {
                self.bump();
                let mut items = Vec::new();
                if !self.at(&Token::RBracket) {
                    loop {
                        items.push(self.expression()?);
                        if self.eat(&Token::Comma).is_none() {
                            break;
                        }
                    }
                }
                let end = self.expect(&Token::RBracket, "']'")?;
                Ok(Expr::ListLit {
                    items,
                    span: token.span.merge(end),
                })
            }
            Token::LParen => {
                self.bump();
                let expr = self.expression()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(expr)
            }
            _ => Err(self.error_here("expression")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_entry_function() {
        let unit = parse_unit("use core;\nfn script_main(service) { return \"ok\"; }").unwrap();
        assert_eq!(unit.uses.len(), 1);
        assert_eq!(unit.functions.len(), 1);
        assert_eq!(unit.functions[0].name, "script_main");
        assert_eq!(unit.functions[0].params, vec!["service".to_string()]);
    }

    #[test]
    fn missing_semicolon_reports_span() {
        let errs = parse_unit("fn script_main(service) { return 1 }").unwrap_err();
        assert!(!errs.is_empty());
        assert!(errs[0].span.is_some());
    }

    #[test]
    fn recovers_to_report_multiple_statement_errors() {
        let errs =
            parse_unit("fn script_main(service) { var = 1; var y 2; return y; }").unwrap_err();
        assert!(errs.len() >= 2, "got {errs:?}");
    }

    #[test]
    fn parses_precedence_and_postfix() {
        let unit =
            parse_unit("fn script_main(service) { return 1 + 2 * service.count(a[0]); }").unwrap();
        let Stmt::Return { value: Some(e), .. } = &unit.functions[0].body.stmts[0] else {
            panic!("expected return");
        };
        let Expr::Binary {
            op: BinaryOp::Add, ..
        } = e
        else {
            panic!("expected top-level add, got {e:?}");
        };
    }

    #[test]
    fn depth_limit_aborts() {
        let mut body = String::from("fn script_main(service) { return ");
        for _ in 0..200 {
            body.push('(');
        }
        body.push('1');
        for _ in 0..200 {
            body.push(')');
        }
        body.push_str("; }");
        let errs = parse_unit(&body).unwrap_err();
        assert!(errs.iter().any(|d| d.code == "SX-PARSE-0002"));
    }
}
