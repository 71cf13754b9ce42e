//! Tokenizer for translation-unit source, built on logos.
//!
//! Comments and whitespace are skipped during lexing (not tokens). Byte
//! offsets from logos are converted to 1-based line/column spans so every
//! later stage reports human-readable locations.

use logos::Logos;

use crate::diagnostics::{Diagnostic, Position, Span, Stage};

fn unescape_string(lex: &mut logos::Lexer<Token>) -> Option<String> {
    let raw = lex.slice();
    let inner = &raw[1..raw.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            '\\' => out.push('\\'),
            '"' => out.push('"'),
            _ => return None,
        }
    }
    Some(out)
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*([^*]|\*[^/])*\*/")]
pub enum Token {
    // Keywords
    #[token("use")]
    Use,
    #[token("fn")]
    Fn,
    #[token("var")]
    Var,
    #[token("return")]
    Return,
    #[token("throw")]
    Throw,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("new")]
    New,
    #[token("null")]
    Null,
    #[token("true")]
    True,
    #[token("false")]
    False,

    // Literals and identifiers
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),
    #[regex(r"[0-9]+\.[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),
    #[regex(r#""([^"\\\n]|\\.)*""#, unescape_string)]
    Str(String),

    // Delimiters
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,
    #[token(".")]
    Dot,

    // Operators
    #[token("=")]
    Assign,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("!")]
    Bang,
}

impl Token {
    /// Short human-readable token name for parse diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Token::Use => "'use'".to_string(),
            Token::Fn => "'fn'".to_string(),
            Token::Var => "'var'".to_string(),
            Token::Return => "'return'".to_string(),
            Token::Throw => "'throw'".to_string(),
            Token::If => "'if'".to_string(),
            Token::Else => "'else'".to_string(),
            Token::While => "'while'".to_string(),
            Token::New => "'new'".to_string(),
            Token::Null => "'null'".to_string(),
            Token::True => "'true'".to_string(),
            Token::False => "'false'".to_string(),
            Token::Ident(name) => format!("identifier '{name}'"),
            Token::Float(v) => format!("float literal {v}"),
            Token::Int(v) => format!("integer literal {v}"),
            Token::Str(_) => "string literal".to_string(),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::LBrace => "'{'".to_string(),
            Token::RBrace => "'}'".to_string(),
            Token::LBracket => "'['".to_string(),
            Token::RBracket => "']'".to_string(),
            Token::Comma => "','".to_string(),
            Token::Semi => "';'".to_string(),
            Token::Dot => "'.'".to_string(),
            Token::Assign => "'='".to_string(),
            Token::EqEq => "'=='".to_string(),
            Token::NotEq => "'!='".to_string(),
            Token::Lt => "'<'".to_string(),
            Token::Le => "'<='".to_string(),
            Token::Gt => "'>'".to_string(),
            Token::Ge => "'>='".to_string(),
            Token::Plus => "'+'".to_string(),
            Token::Minus => "'-'".to_string(),
            Token::Star => "'*'".to_string(),
            Token::Slash => "'/'".to_string(),
            Token::Percent => "'%'".to_string(),
            Token::AndAnd => "'&&'".to_string(),
            Token::OrOr => "'||'".to_string(),
            Token::Bang => "'!'".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

/// Maps byte offsets to 1-based line/column positions.
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self { line_starts }
    }

    pub fn position(&self, offset: usize) -> Position {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        Position {
            line: line as u32 + 1,
            col: (offset - self.line_starts[line]) as u32 + 1,
        }
    }

    pub fn span(&self, range: std::ops::Range<usize>) -> Span {
        Span {
            start: self.position(range.start),
            end: self.position(range.end),
        }
    }
}

/// Tokenizes a translation unit. The first unrecognized token aborts lexing;
/// malformed escapes and out-of-range numeric literals surface the same way.
pub fn lex(source: &str) -> Result<Vec<SpannedToken>, Diagnostic> {
    let index = LineIndex::new(source);
    let mut lexer = Token::lexer(source);
    let mut out = Vec::new();
    while let Some(item) = lexer.next() {
        let span = index.span(lexer.span());
        match item {
            Ok(token) => out.push(SpannedToken { token, span }),
            Err(()) => {
                return Err(Diagnostic::error(
                    "SX-LEX-0001",
                    Stage::Parse,
                    format!("unrecognized token {:?}", lexer.slice()),
                    Some(span),
                ));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexes_statements_with_spans() {
        let toks = lex("var x = 1;\nreturn x;").unwrap();
        assert_eq!(toks[0].token, Token::Var);
        assert_eq!(toks[0].span.start.line, 1);
        let ret = toks.iter().find(|t| t.token == Token::Return).unwrap();
        assert_eq!(ret.span.start.line, 2);
        assert_eq!(ret.span.start.col, 1);
    }

    #[test]
    fn unescapes_string_literals() {
        let toks = lex(r#"  "a\n\"b\"" "#).unwrap();
        assert_eq!(toks[0].token, Token::Str("a\n\"b\"".to_string()));
    }

    #[test]
    fn rejects_bad_escape() {
        let err = lex(r#" "\q" "#).unwrap_err();
        assert_eq!(err.code, "SX-LEX-0001");
    }

    #[test]
    fn comments_are_skipped() {
        let toks = lex("// line\n/* block */ 1").unwrap();
        assert_eq!(toks.len(), 1);
        assert_eq!(toks[0].token, Token::Int(1));
    }
}
