//! String filter grammar.
//!
//! ```text
//! expr       := and ("OR" and)*
//! and        := not ("AND" not)*
//! not        := "NOT" not | primary
//! primary    := "(" expr ")" | comparison
//! comparison := field op value
//! op         := "=" | "==" | "!=" | ">" | "<" | ">=" | "<="
//! value      := word | "double quoted" | 'single quoted'
//! ```
//!
//! Keywords are case-insensitive. Quoted values may contain spaces, `=` and keywords.

use crate::condition::{CompareOp, Condition, compare};
use crate::error::ConfigError;
use crate::filter::Filter;
use crate::path::FieldPath;
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::char,
    combinator::value,
    sequence::delimited,
};
use takeoff_types::Scalar;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    And,
    Or,
    Not,
    Op(CompareOp),
    Word(String),
    Quoted(String),
}

#[derive(Debug, Clone, PartialEq)]
struct Spanned {
    token: Token,
    offset: usize,
}

// ============================================================================
// Lexer
// ============================================================================

fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '(' | ')' | '=' | '!' | '<' | '>' | '"' | '\'')
}

fn operator(input: &str) -> IResult<&str, CompareOp> {
    alt((
        value(CompareOp::Ge, tag(">=")),
        value(CompareOp::Le, tag("<=")),
        value(CompareOp::Ne, tag("!=")),
        value(CompareOp::Eq, tag("==")),
        value(CompareOp::Eq, tag("=")),
        value(CompareOp::Gt, tag(">")),
        value(CompareOp::Lt, tag("<")),
    ))
    .parse(input)
}

fn quoted(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(char('"'), take_while(|c: char| c != '"'), char('"')),
        delimited(char('\''), take_while(|c: char| c != '\''), char('\'')),
    ))
    .parse(input)
}

fn word(input: &str) -> IResult<&str, Token> {
    let (input, w) = take_while1(is_word_char)(input)?;
    let token = if w.eq_ignore_ascii_case("and") {
        Token::And
    } else if w.eq_ignore_ascii_case("or") {
        Token::Or
    } else if w.eq_ignore_ascii_case("not") {
        Token::Not
    } else {
        Token::Word(w.to_string())
    };
    Ok((input, token))
}

fn token(input: &str) -> IResult<&str, Token> {
    alt((
        value(Token::LParen, char('(')),
        value(Token::RParen, char(')')),
        operator.map(Token::Op),
        quoted.map(|s: &str| Token::Quoted(s.to_string())),
        word,
    ))
    .parse(input)
}

fn tokenize(src: &str) -> Result<Vec<Spanned>, ConfigError> {
    let mut out = Vec::new();
    let mut rest = src.trim_start();
    while !rest.is_empty() {
        let offset = src.len() - rest.len();
        match token(rest) {
            Ok((next, token)) => {
                out.push(Spanned { token, offset });
                rest = next.trim_start();
            }
            Err(_) => {
                let message = if rest.starts_with(['"', '\'']) {
                    "unterminated quoted value".to_string()
                } else {
                    format!("unexpected character `{}`", rest.chars().next().unwrap_or(' '))
                };
                return Err(ConfigError::FilterSyntax { offset, message });
            }
        }
    }
    Ok(out)
}

// ============================================================================
// Parser
// ============================================================================

pub(crate) fn parse(src: &str) -> Result<Filter, ConfigError> {
    let tokens = tokenize(src)?;
    if tokens.is_empty() {
        return Ok(Filter::MatchAll);
    }

    let mut parser = ExprParser {
        tokens: &tokens,
        pos: 0,
        end: src.len(),
    };
    let filter = parser.or_expr()?;
    match parser.peek() {
        None => Ok(filter),
        Some(Spanned {
            token: Token::RParen,
            offset,
        }) => Err(ConfigError::UnmatchedParen { offset: *offset }),
        Some(t) => Err(ConfigError::FilterSyntax {
            offset: t.offset,
            message: "expected `AND`, `OR` or end of expression".to_string(),
        }),
    }
}

struct ExprParser<'t> {
    tokens: &'t [Spanned],
    pos: usize,
    end: usize,
}

impl<'t> ExprParser<'t> {
    fn peek(&self) -> Option<&'t Spanned> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'t Spanned> {
        let t = self.tokens.get(self.pos);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek().is_some_and(|t| &t.token == token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn unexpected_end(&self, expected: &str) -> ConfigError {
        ConfigError::FilterSyntax {
            offset: self.end,
            message: format!("expected {expected}, found end of expression"),
        }
    }

    fn or_expr(&mut self) -> Result<Filter, ConfigError> {
        let mut parts = vec![self.and_expr()?];
        while self.eat(&Token::Or) {
            parts.push(self.and_expr()?);
        }
        Ok(collapse(parts, Filter::Or))
    }

    fn and_expr(&mut self) -> Result<Filter, ConfigError> {
        let mut parts = vec![self.not_expr()?];
        while self.eat(&Token::And) {
            parts.push(self.not_expr()?);
        }
        Ok(collapse(parts, Filter::And))
    }

    fn not_expr(&mut self) -> Result<Filter, ConfigError> {
        if self.eat(&Token::Not) {
            return Ok(Filter::Not(Box::new(self.not_expr()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Filter, ConfigError> {
        let Some(t) = self.next() else {
            return Err(self.unexpected_end("a comparison"));
        };
        match &t.token {
            Token::LParen => {
                let inner = self.or_expr()?;
                if self.eat(&Token::RParen) {
                    Ok(inner)
                } else {
                    Err(ConfigError::UnmatchedParen { offset: t.offset })
                }
            }
            Token::RParen => Err(ConfigError::UnmatchedParen { offset: t.offset }),
            Token::Word(key) => self.comparison(key),
            _ => Err(ConfigError::FilterSyntax {
                offset: t.offset,
                message: "expected a field name".to_string(),
            }),
        }
    }

    fn comparison(&mut self, key: &str) -> Result<Filter, ConfigError> {
        let path = FieldPath::parse(key)?;

        let op = match self.next() {
            Some(Spanned {
                token: Token::Op(op),
                ..
            }) => *op,
            Some(t) => {
                return Err(ConfigError::FilterSyntax {
                    offset: t.offset,
                    message: format!("expected a comparison operator after `{key}`"),
                });
            }
            None => return Err(self.unexpected_end("a comparison operator")),
        };

        let rhs = match self.next() {
            Some(Spanned {
                token: Token::Word(w),
                ..
            }) => scalar_from_word(w),
            Some(Spanned {
                token: Token::Quoted(s),
                ..
            }) => Scalar::String(s.clone()),
            Some(t) => {
                return Err(ConfigError::FilterSyntax {
                    offset: t.offset,
                    message: format!("expected a value after `{key}{op}`"),
                });
            }
            None => return Err(self.unexpected_end("a value")),
        };

        let condition = match op {
            CompareOp::Eq => Condition::Equals(rhs),
            CompareOp::Ne => Condition::NotEquals(rhs),
            _ => compare(key, op.as_str(), &rhs)?,
        };
        Ok(Filter::Test { path, condition })
    }
}

fn collapse(mut parts: Vec<Filter>, combine: fn(Vec<Filter>) -> Filter) -> Filter {
    if parts.len() == 1 {
        parts.remove(0)
    } else {
        combine(parts)
    }
}

fn scalar_from_word(w: &str) -> Scalar {
    if let Ok(n) = w.parse::<f64>()
        && n.is_finite()
    {
        return Scalar::Number(n);
    }
    if w.eq_ignore_ascii_case("true") {
        Scalar::Bool(true)
    } else if w.eq_ignore_ascii_case("false") {
        Scalar::Bool(false)
    } else {
        Scalar::String(w.to_string())
    }
}
