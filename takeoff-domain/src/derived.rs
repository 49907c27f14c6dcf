//! Derived metrics: arithmetic over other metric values.
//!
//! Formulas are restricted to identifiers, numeric literals, `+ - * /`, unary minus
//! and parentheses. Identifiers resolve only against known metric names.

use crate::error::ConfigError;
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, one_of},
    combinator::{recognize, value},
    error::{Error, ErrorKind},
    number::complete::recognize_float,
    sequence::pair,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use takeoff_types::Named;
use takeoff_types::config::DerivedConfig;
use takeoff_types::result::{MetricValue, ResultRow, RowStatus};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(f64),
    Ref(String),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Op(char),
    LParen,
    RParen,
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))
    .parse(input)
}

fn number(input: &str) -> IResult<&str, Token> {
    let (rest, digits) = recognize_float::<&str, Error<&str>>(input)?;
    match digits.parse::<f64>() {
        Ok(n) => Ok((rest, Token::Number(n))),
        Err(_) => Err(nom::Err::Error(Error::new(input, ErrorKind::Float))),
    }
}

fn token(input: &str) -> IResult<&str, Token> {
    alt((
        identifier.map(|s: &str| Token::Ident(s.to_string())),
        number,
        one_of("+-*/").map(Token::Op),
        value(Token::LParen, char('(')),
        value(Token::RParen, char(')')),
    ))
    .parse(input)
}

fn tokenize(src: &str) -> Result<Vec<(Token, usize)>, ConfigError> {
    let mut out = Vec::new();
    let mut rest = src.trim_start();
    while !rest.is_empty() {
        let offset = src.len() - rest.len();
        // `recognize_float` accepts a leading sign; binary minus must stay an operator.
        let parsed = if rest.starts_with(['+', '-']) {
            one_of("+-").map(Token::Op).parse(rest)
        } else {
            token(rest)
        };
        let (next, tok) = parsed.map_err(|_: nom::Err<nom::error::Error<&str>>| {
            ConfigError::FormulaSyntax {
                offset,
                message: format!(
                    "unexpected character `{}`",
                    rest.chars().next().unwrap_or(' ')
                ),
            }
        })?;
        out.push((tok, offset));
        rest = next.trim_start();
    }
    Ok(out)
}

struct FormulaParser<'t> {
    tokens: &'t [(Token, usize)],
    pos: usize,
    end: usize,
}

impl FormulaParser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |(_, o)| *o)
    }

    fn error(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::FormulaSyntax {
            offset: self.offset(),
            message: message.into(),
        }
    }

    fn expr(&mut self) -> Result<Expr, ConfigError> {
        let mut lhs = self.term()?;
        while let Some(Token::Op(c @ ('+' | '-'))) = self.peek() {
            let op = if *c == '+' { BinOp::Add } else { BinOp::Sub };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, ConfigError> {
        let mut lhs = self.unary()?;
        while let Some(Token::Op(c @ ('*' | '/'))) = self.peek() {
            let op = if *c == '*' { BinOp::Mul } else { BinOp::Div };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ConfigError> {
        if let Some(Token::Op('-')) = self.peek() {
            self.pos += 1;
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ConfigError> {
        let open = self.offset();
        match self.peek().cloned() {
            Some(Token::Number(n)) => {
                self.pos += 1;
                Ok(Expr::Number(n))
            }
            Some(Token::Ident(name)) => {
                self.pos += 1;
                Ok(Expr::Ref(name))
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.expr()?;
                if let Some(Token::RParen) = self.peek() {
                    self.pos += 1;
                    Ok(inner)
                } else {
                    Err(ConfigError::FormulaSyntax {
                        offset: open,
                        message: "unmatched parenthesis".to_string(),
                    })
                }
            }
            Some(_) => Err(self.error("expected a metric name, number or `(`")),
            None => Err(self.error("unexpected end of formula")),
        }
    }
}

/// A parsed formula.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    expr: Expr,
}

impl Formula {
    pub fn parse(src: &str) -> Result<Self, ConfigError> {
        let tokens = tokenize(src)?;
        let mut parser = FormulaParser {
            tokens: &tokens,
            pos: 0,
            end: src.len(),
        };
        let expr = parser.expr()?;
        if parser.pos < tokens.len() {
            return Err(parser.error("expected an operator or end of formula"));
        }
        Ok(Self {
            source: src.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Referenced names, deduplicated, in first-use order.
    pub fn references(&self) -> Vec<&str> {
        let mut out = Vec::new();
        collect_refs(&self.expr, &mut out);
        out
    }

    /// `None` when an operand is unknown or undefined, on division by zero, or when
    /// the result is not finite.
    pub fn evaluate(&self, env: &HashMap<String, f64>) -> Option<f64> {
        eval(&self.expr, env).filter(|v| v.is_finite())
    }
}

fn collect_refs<'a>(expr: &'a Expr, out: &mut Vec<&'a str>) {
    match expr {
        Expr::Number(_) => {}
        Expr::Ref(name) => {
            if !out.contains(&name.as_str()) {
                out.push(name);
            }
        }
        Expr::Neg(inner) => collect_refs(inner, out),
        Expr::Binary(_, lhs, rhs) => {
            collect_refs(lhs, out);
            collect_refs(rhs, out);
        }
    }
}

fn eval(expr: &Expr, env: &HashMap<String, f64>) -> Option<f64> {
    match expr {
        Expr::Number(n) => Some(*n),
        Expr::Ref(name) => env.get(name).copied(),
        Expr::Neg(inner) => eval(inner, env).map(|v| -v),
        Expr::Binary(op, lhs, rhs) => {
            let (a, b) = (eval(lhs, env)?, eval(rhs, env)?);
            match op {
                BinOp::Add => Some(a + b),
                BinOp::Sub => Some(a - b),
                BinOp::Mul => Some(a * b),
                BinOp::Div if b == 0.0 => None,
                BinOp::Div => Some(a / b),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DerivedDefinition {
    pub name: String,
    pub description: String,
    pub unit: String,
    pub category: String,
    pub formula: Formula,
}

/// Derived metrics in a valid evaluation order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedSet {
    ordered: Vec<DerivedDefinition>,
}

impl DerivedSet {
    /// Parse every formula, resolve references against `base` and the derived names,
    /// and order by dependency. Cycles and undefined names fail before evaluation.
    pub fn compile(
        derived: &Named<DerivedConfig>,
        base: &BTreeSet<String>,
        grouped: &BTreeSet<String>,
    ) -> Result<Self, ConfigError> {
        let mut defs: BTreeMap<&str, DerivedDefinition> = BTreeMap::new();
        let mut order: Vec<&str> = Vec::new();

        for (name, cfg) in derived.iter() {
            let subject = format!("derived metric `{name}`");
            let formula = Formula::parse(&cfg.formula).map_err(|e| e.within(subject.clone()))?;
            for reference in formula.references() {
                if grouped.contains(reference) {
                    return Err(ConfigError::invalid(format!(
                        "`{reference}` is a grouped metric and cannot be referenced"
                    ))
                    .within(subject));
                }
                if !base.contains(reference) && !derived.contains(reference) {
                    return Err(ConfigError::UndefinedReference {
                        name: reference.to_string(),
                    }
                    .within(subject));
                }
            }
            defs.insert(
                name,
                DerivedDefinition {
                    name: name.to_string(),
                    description: cfg.description.clone().unwrap_or_default(),
                    unit: cfg.unit.clone().unwrap_or_default(),
                    category: cfg.category.clone().unwrap_or_else(|| "derived".to_string()),
                    formula,
                },
            );
            order.push(name);
        }

        let mut state: HashMap<&str, Visit> = HashMap::new();
        let mut sorted = Vec::with_capacity(order.len());
        let mut stack = Vec::new();
        for name in &order {
            visit(*name, &defs, &mut state, &mut stack, &mut sorted)?;
        }

        let mut ordered = Vec::with_capacity(sorted.len());
        for name in sorted {
            if let Some(def) = defs.remove(name) {
                ordered.push(def);
            }
        }
        Ok(Self { ordered })
    }

    /// Definitions in evaluation order.
    pub fn ordered(&self) -> &[DerivedDefinition] {
        &self.ordered
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Evaluate all formulas. `base` holds resolved base values; a base metric that
    /// failed is simply absent.
    pub fn evaluate(&self, base: &HashMap<String, f64>) -> Vec<(String, MetricValue)> {
        let mut env = base.clone();
        let mut out = Vec::with_capacity(self.ordered.len());
        for def in &self.ordered {
            let value = match def.formula.evaluate(&env) {
                Some(v) => {
                    env.insert(def.name.clone(), v);
                    MetricValue::Number(v)
                }
                None => {
                    debug!(
                        metric = %def.name,
                        formula = def.formula.source(),
                        "derived value undefined"
                    );
                    env.remove(&def.name);
                    MetricValue::Undefined
                }
            };
            out.push((def.name.clone(), value));
        }
        out
    }

    /// Evaluate against base result rows and return one row per derived metric.
    pub fn evaluate_rows(&self, base_rows: &[ResultRow]) -> Vec<ResultRow> {
        let base: HashMap<String, f64> = base_rows
            .iter()
            .filter(|r| r.status == RowStatus::Success && r.group.is_none())
            .filter_map(|r| r.value.as_f64().map(|v| (r.metric_name.clone(), v)))
            .collect();

        self.evaluate(&base)
            .into_iter()
            .zip(&self.ordered)
            .map(|((name, value), def)| ResultRow {
                metric_name: name,
                status: if value.is_undefined() {
                    RowStatus::Undefined
                } else {
                    RowStatus::Success
                },
                value,
                unit: def.unit.clone(),
                category: def.category.clone(),
                description: def.description.clone(),
                error: None,
                group: None,
                element_count: 0,
                missing_values: 0,
                deducted_count: 0,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

fn visit<'n>(
    name: &'n str,
    defs: &BTreeMap<&'n str, DerivedDefinition>,
    state: &mut HashMap<&'n str, Visit>,
    stack: &mut Vec<&'n str>,
    sorted: &mut Vec<&'n str>,
) -> Result<(), ConfigError> {
    match state.get(name) {
        Some(Visit::Done) => return Ok(()),
        Some(Visit::InProgress) => {
            let start = stack.iter().position(|n| *n == name).unwrap_or(0);
            let mut cycle: Vec<String> = stack[start..].iter().map(|s| s.to_string()).collect();
            cycle.push(name.to_string());
            return Err(ConfigError::Cycle { cycle });
        }
        None => {}
    }

    let Some(def) = defs.get(name) else {
        // Base metric; nothing to order.
        return Ok(());
    };

    state.insert(name, Visit::InProgress);
    stack.push(name);
    for dep in def.formula.references() {
        if let Some((key, _)) = defs.get_key_value(dep) {
            visit(*key, defs, state, stack, sorted)?;
        }
    }
    stack.pop();
    state.insert(name, Visit::Done);
    sorted.push(name);
    Ok(())
}

/// Evaluate `derived` against `base` values, in dependency order.
pub fn evaluate_all(
    base: &HashMap<String, f64>,
    derived: &DerivedSet,
) -> BTreeMap<String, MetricValue> {
    derived.evaluate(base).into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn derived(entries: &[(&str, &str)]) -> Named<DerivedConfig> {
        entries
            .iter()
            .map(|(n, f)| {
                (
                    n.to_string(),
                    DerivedConfig {
                        formula: f.to_string(),
                        ..Default::default()
                    },
                )
            })
            .collect()
    }

    fn env(values: &[(&str, f64)]) -> HashMap<String, f64> {
        values.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn precedence_and_unary_minus() {
        let f = Formula::parse("a + b * 2 - -(c / 4)").expect("parse");
        let v = f.evaluate(&env(&[("a", 1.0), ("b", 3.0), ("c", 8.0)]));
        assert_eq!(v, Some(9.0));
    }

    #[test]
    fn binary_minus_before_number() {
        let f = Formula::parse("a-1").expect("parse");
        assert_eq!(f.evaluate(&env(&[("a", 5.0)])), Some(4.0));
    }

    #[test]
    fn references_are_deduplicated() {
        let f = Formula::parse("(gfa - luf) / gfa").expect("parse");
        assert_eq!(f.references(), vec!["gfa", "luf"]);
    }

    #[test]
    fn syntax_errors() {
        assert!(matches!(
            Formula::parse("a +"),
            Err(ConfigError::FormulaSyntax { offset: 3, .. })
        ));
        assert!(matches!(
            Formula::parse("(a + b"),
            Err(ConfigError::FormulaSyntax { offset: 0, .. })
        ));
        assert!(matches!(
            Formula::parse("a ^ b"),
            Err(ConfigError::FormulaSyntax { offset: 2, .. })
        ));
        assert!(Formula::parse("a b").is_err());
        assert!(Formula::parse("__import__('os')").is_err());
    }

    #[test]
    fn division_by_zero_is_undefined_and_isolated() {
        let set = DerivedSet::compile(
            &derived(&[("ratio", "a / b"), ("total", "a + b")]),
            &names(&["a", "b"]),
            &BTreeSet::new(),
        )
        .expect("compile");
        let out = evaluate_all(&env(&[("a", 4.0), ("b", 0.0)]), &set);
        assert_eq!(out["ratio"], MetricValue::Undefined);
        assert_eq!(out["total"], MetricValue::Number(4.0));
    }

    #[test]
    fn dependencies_are_evaluated_first() {
        let set = DerivedSet::compile(
            &derived(&[("outer", "inner * 2"), ("inner", "a + 1")]),
            &names(&["a"]),
            &BTreeSet::new(),
        )
        .expect("compile");
        let order: Vec<_> = set.ordered().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(order, vec!["inner", "outer"]);
        let out = evaluate_all(&env(&[("a", 2.0)]), &set);
        assert_eq!(out["outer"], MetricValue::Number(6.0));
    }

    #[test]
    fn undefined_operands_propagate() {
        let set = DerivedSet::compile(
            &derived(&[("r", "a / b"), ("twice", "r * 2")]),
            &names(&["a", "b"]),
            &BTreeSet::new(),
        )
        .expect("compile");
        let out = evaluate_all(&env(&[("a", 1.0), ("b", 0.0)]), &set);
        assert_eq!(out["twice"], MetricValue::Undefined);
    }

    #[test]
    fn cycles_fail_before_evaluation() {
        let err = DerivedSet::compile(
            &derived(&[("x", "y + 1"), ("y", "z + 1"), ("z", "x")]),
            &BTreeSet::new(),
            &BTreeSet::new(),
        )
        .expect_err("cycle");
        assert_eq!(
            err,
            ConfigError::Cycle {
                cycle: vec![
                    "x".to_string(),
                    "y".to_string(),
                    "z".to_string(),
                    "x".to_string()
                ]
            }
        );
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let err = DerivedSet::compile(
            &derived(&[("x", "x + 1")]),
            &BTreeSet::new(),
            &BTreeSet::new(),
        )
        .expect_err("cycle");
        assert!(matches!(err, ConfigError::Cycle { .. }));
    }

    #[test]
    fn undefined_reference_names_the_metric() {
        let err = DerivedSet::compile(
            &derived(&[("x", "missing * 2")]),
            &BTreeSet::new(),
            &BTreeSet::new(),
        )
        .expect_err("undefined");
        assert_eq!(
            err.root(),
            &ConfigError::UndefinedReference {
                name: "missing".to_string()
            }
        );
        assert!(err.to_string().starts_with("derived metric `x`"));
    }

    #[test]
    fn grouped_references_are_rejected() {
        let err = DerivedSet::compile(
            &derived(&[("x", "per_room * 2")]),
            &BTreeSet::new(),
            &names(&["per_room"]),
        )
        .expect_err("grouped");
        assert!(err.to_string().contains("grouped metric"));
    }
}
