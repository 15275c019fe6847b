//! Template and expression parsing
//!
//! A template is literal text interleaved with `{{ expression }}` actions.
//! Expressions are Go-template flavored: whitespace-separated function
//! calls (`HasRole "admin"`), parenthesized sub-expressions, field paths
//! rooted at `.` (`.Principal.Username`), and string/number/bool literals.
//! Unknown function names are a parse error; malformed text surfaces as a
//! Marshal failure at evaluation time.

use super::functions;
use super::value::Value;
use thiserror::Error;

/// Expression delimiters
pub const OPEN_DELIM: &str = "{{";
pub const CLOSE_DELIM: &str = "}}";

/// Template parse failure
#[derive(Debug, Clone, Error, PartialEq)]
#[error("constraint parse error at byte {position}: {message}")]
pub struct ParseError {
    /// What went wrong
    pub message: String,
    /// Byte offset into the (wrapped) template text
    pub position: usize,
}

impl ParseError {
    fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

/// A parsed expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// String, number, or boolean literal
    Lit(Value),
    /// Field path into the evaluation context; empty path is the root
    Field(Vec<String>),
    /// Predicate or builtin invocation
    Call { name: String, args: Vec<Expr> },
}

/// One piece of a template
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Verbatim text outside delimiters
    Literal(String),
    /// An `{{ expression }}` action
    Action(Expr),
}

/// A parsed constraint template
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    /// Segments in source order
    pub segments: Vec<Segment>,
}

/// Split template text into literal and action segments and parse each
/// action's expression.
pub fn parse_template(text: &str) -> Result<Template, ParseError> {
    let mut segments = Vec::new();
    let mut rest = text;
    let mut consumed = 0;

    while let Some(open) = rest.find(OPEN_DELIM) {
        if open > 0 {
            segments.push(Segment::Literal(rest[..open].to_string()));
        }
        let after_open = &rest[open + OPEN_DELIM.len()..];
        let close = after_open.find(CLOSE_DELIM).ok_or_else(|| {
            ParseError::new("unclosed expression delimiter", consumed + open)
        })?;

        let expr_text = &after_open[..close];
        let expr = parse_expression(expr_text, consumed + open + OPEN_DELIM.len())?;
        segments.push(Segment::Action(expr));

        let advance = open + OPEN_DELIM.len() + close + CLOSE_DELIM.len();
        consumed += advance;
        rest = &rest[advance..];
    }

    if !rest.is_empty() {
        segments.push(Segment::Literal(rest.to_string()));
    }

    Ok(Template { segments })
}

// ---- lexer --------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Field(Vec<String>),
    Str(String),
    Num(f64),
    LParen,
    RParen,
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn lex(text: &str, base: usize) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '"' => {
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => {
                            return Err(ParseError::new("unterminated string literal", base + i))
                        }
                        Some('"') => {
                            i += 1;
                            break;
                        }
                        Some('\\') => {
                            match chars.get(i + 1) {
                                Some('"') => s.push('"'),
                                Some('\\') => s.push('\\'),
                                Some('n') => s.push('\n'),
                                Some('t') => s.push('\t'),
                                Some(other) => {
                                    return Err(ParseError::new(
                                        format!("unknown escape '\\{}'", other),
                                        base + i,
                                    ))
                                }
                                None => {
                                    return Err(ParseError::new(
                                        "unterminated string literal",
                                        base + i,
                                    ))
                                }
                            }
                            i += 2;
                        }
                        Some(other) => {
                            s.push(*other);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(s));
            }
            '.' => {
                let mut path = Vec::new();
                while i < chars.len() && chars[i] == '.' {
                    i += 1;
                    let start = i;
                    while i < chars.len() && is_ident_char(chars[i]) {
                        i += 1;
                    }
                    if i == start {
                        // Bare "." refers to the context root
                        break;
                    }
                    path.push(chars[start..i].iter().collect());
                }
                tokens.push(Token::Field(path));
            }
            c if c.is_ascii_digit() || c == '-' || c == '+' => {
                let start = i;
                i += 1;
                while i < chars.len()
                    && (chars[i].is_ascii_digit() || chars[i] == '.' || chars[i] == 'e')
                {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let num = text.parse::<f64>().map_err(|_| {
                    ParseError::new(format!("malformed number '{}'", text), base + start)
                })?;
                tokens.push(Token::Num(num));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && is_ident_char(chars[i]) {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(ParseError::new(
                    format!("unexpected character '{}'", other),
                    base + i,
                ))
            }
        }
    }

    Ok(tokens)
}

// ---- parser -------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    base: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.base)
    }

    /// Top-level expression: a function call with space-separated
    /// arguments, or a single term.
    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        match self.peek() {
            Some(Token::Ident(name)) if !matches!(name.as_str(), "true" | "false") => {
                let name = name.clone();
                self.pos += 1;
                if !functions::is_known(&name) {
                    return Err(self.error(format!("unknown function '{}'", name)));
                }
                let mut args = Vec::new();
                while let Some(token) = self.peek() {
                    if matches!(token, Token::RParen) {
                        break;
                    }
                    args.push(self.parse_term()?);
                }
                Ok(Expr::Call { name, args })
            }
            Some(_) => {
                let term = self.parse_term()?;
                if self.peek().is_some() && !matches!(self.peek(), Some(Token::RParen)) {
                    return Err(self.error("trailing tokens after expression"));
                }
                Ok(term)
            }
            None => Err(self.error("empty expression")),
        }
    }

    fn parse_term(&mut self) -> Result<Expr, ParseError> {
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.parse_expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(self.error("expected ')'")),
                }
            }
            Some(Token::Field(path)) => Ok(Expr::Field(path)),
            Some(Token::Str(s)) => Ok(Expr::Lit(Value::Str(s))),
            Some(Token::Num(n)) => Ok(Expr::Lit(Value::Num(n))),
            Some(Token::Ident(name)) => match name.as_str() {
                "true" => Ok(Expr::Lit(Value::Bool(true))),
                "false" => Ok(Expr::Lit(Value::Bool(false))),
                _ => {
                    if !functions::is_known(&name) {
                        return Err(self.error(format!("unknown function '{}'", name)));
                    }
                    // A bare identifier in argument position is a
                    // zero-argument call
                    Ok(Expr::Call {
                        name,
                        args: Vec::new(),
                    })
                }
            },
            Some(Token::RParen) => Err(self.error("unexpected ')'")),
            None => Err(self.error("unexpected end of expression")),
        }
    }
}

fn parse_expression(text: &str, base: usize) -> Result<Expr, ParseError> {
    let tokens = lex(text, base)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        base,
    };
    let expr = parser.parse_expr()?;
    if parser.peek().is_some() {
        return Err(parser.error("trailing tokens after expression"));
    }
    Ok(expr)
}
