//! Parsing and evaluation of [`Expression`]s for the local backends.
//!
//! Supported grammar:
//!
//! ```text
//! condition := or
//! or        := and ("OR" and)*
//! and       := unary ("AND" unary)*
//! unary     := "NOT" unary | primary
//! primary   := "(" condition ")"
//!            | function "(" operand ("," operand)* ")"
//!            | operand comparator operand
//!            | operand "BETWEEN" operand "AND" operand
//! operand   := path | ":value"
//! path      := segment ("." segment)*      segment := "#name" | identifier
//! ```
//!
//! Functions: `contains`, `begins_with`, `attribute_exists`,
//! `attribute_not_exists`. Keywords are case-insensitive.

use crate::error::{StoreError, StoreResult};
use crate::expression::Expression;
use crate::traits::Item;
use serde_json::Value;
use std::cmp::Ordering;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Comparator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    LParen,
    RParen,
    Comma,
    Dot,
    Cmp(Comparator),
    Name(String),
    Value(String),
    Ident(String),
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Operand {
    Path(Vec<String>),
    Literal(Value),
}

/// A parsed, placeholder-resolved condition.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Condition {
    /// Matches every item. Produced by an empty expression.
    Always,
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    Not(Box<Condition>),
    Compare {
        left: Operand,
        op: Comparator,
        right: Operand,
    },
    Contains(Operand, Operand),
    BeginsWith(Operand, Operand),
    /// Path plus whether the attribute is expected to exist.
    Exists(Vec<String>, bool),
}

impl Condition {
    /// Parse an expression, resolving every placeholder against its bindings.
    pub(crate) fn parse(expression: &Expression) -> StoreResult<Self> {
        let tokens = tokenize(expression.text())?;
        if tokens.is_empty() {
            return Ok(Condition::Always);
        }
        let mut parser = Parser {
            tokens,
            pos: 0,
            expression,
        };
        let condition = parser.parse_or()?;
        if parser.pos != parser.tokens.len() {
            return Err(StoreError::InvalidExpression(format!(
                "unexpected token {:?} in '{}'",
                parser.tokens[parser.pos],
                expression.text()
            )));
        }
        Ok(condition)
    }

    /// Whether the item satisfies the condition.
    pub(crate) fn matches(&self, item: &Item) -> bool {
        match self {
            Condition::Always => true,
            Condition::And(a, b) => a.matches(item) && b.matches(item),
            Condition::Or(a, b) => a.matches(item) || b.matches(item),
            Condition::Not(c) => !c.matches(item),
            Condition::Compare { left, op, right } => {
                match (resolve(left, item), resolve(right, item)) {
                    (Some(l), Some(r)) => compare_with(l, *op, r),
                    _ => false,
                }
            }
            Condition::Contains(haystack, needle) => {
                match (resolve(haystack, item), resolve(needle, item)) {
                    (Some(Value::String(s)), Some(Value::String(sub))) => s.contains(sub.as_str()),
                    (Some(Value::Array(values)), Some(needle)) => {
                        values.iter().any(|v| values_equal(v, needle))
                    }
                    _ => false,
                }
            }
            Condition::BeginsWith(value, prefix) => {
                match (resolve(value, item), resolve(prefix, item)) {
                    (Some(Value::String(s)), Some(Value::String(p))) => s.starts_with(p.as_str()),
                    _ => false,
                }
            }
            Condition::Exists(path, expected) => lookup(item, path).is_some() == *expected,
        }
    }
}

fn resolve<'a>(operand: &'a Operand, item: &'a Item) -> Option<&'a Value> {
    match operand {
        Operand::Literal(value) => Some(value),
        Operand::Path(path) => lookup(item, path),
    }
}

/// Follow a dotted attribute path through nested maps.
fn lookup<'a>(item: &'a Item, path: &[String]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut current = item.get(first)?;
    for segment in rest {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn compare_with(left: &Value, op: Comparator, right: &Value) -> bool {
    match op {
        Comparator::Eq => values_equal(left, right),
        Comparator::Ne => !values_equal(left, right),
        Comparator::Lt => compare_values(left, right) == Some(Ordering::Less),
        Comparator::Le => matches!(
            compare_values(left, right),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Comparator::Gt => compare_values(left, right) == Some(Ordering::Greater),
        Comparator::Ge => matches!(
            compare_values(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        ),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare_values(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

/// Ordering between two values of the same scalar type; `None` across types.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ if a == b => Some(Ordering::Equal),
        _ => None,
    }
}

/// Total order over optional values, used to sort rows by key attributes.
/// Missing sorts first, then by type (null, bool, number, string, array, object).
pub(crate) fn total_order(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => rank(a).cmp(&rank(b)).then_with(|| match (a, b) {
            (Value::Number(x), Value::Number(y)) => x
                .as_f64()
                .unwrap_or(0.0)
                .total_cmp(&y.as_f64().unwrap_or(0.0)),
            (Value::String(x), Value::String(y)) => x.cmp(y),
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            _ => a.to_string().cmp(&b.to_string()),
        }),
    }
}

fn tokenize(text: &str) -> StoreResult<Vec<Token>> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let is_word = |c: char| c.is_alphanumeric() || c == '_' || c == '-';

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Cmp(Comparator::Eq));
                i += 1;
            }
            '<' => match chars.get(i + 1) {
                Some('=') => {
                    tokens.push(Token::Cmp(Comparator::Le));
                    i += 2;
                }
                Some('>') => {
                    tokens.push(Token::Cmp(Comparator::Ne));
                    i += 2;
                }
                _ => {
                    tokens.push(Token::Cmp(Comparator::Lt));
                    i += 1;
                }
            },
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Cmp(Comparator::Ge));
                    i += 2;
                } else {
                    tokens.push(Token::Cmp(Comparator::Gt));
                    i += 1;
                }
            }
            '#' | ':' => {
                let start = i;
                i += 1;
                while i < chars.len() && is_word(chars[i]) {
                    i += 1;
                }
                if i == start + 1 {
                    return Err(StoreError::InvalidExpression(format!(
                        "empty placeholder at offset {start} in '{text}'"
                    )));
                }
                let placeholder: String = chars[start..i].iter().collect();
                if c == '#' {
                    tokens.push(Token::Name(placeholder));
                } else {
                    tokens.push(Token::Value(placeholder));
                }
            }
            c if is_word(c) => {
                let start = i;
                while i < chars.len() && is_word(chars[i]) {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(StoreError::InvalidExpression(format!(
                    "unexpected character '{other}' in '{text}'"
                )));
            }
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    expression: &'a Expression,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> StoreResult<Token> {
        let token = self.tokens.get(self.pos).cloned().ok_or_else(|| {
            StoreError::InvalidExpression(format!(
                "unexpected end of expression '{}'",
                self.expression.text()
            ))
        })?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, expected: Token) -> StoreResult<()> {
        let token = self.next()?;
        if token != expected {
            return Err(StoreError::InvalidExpression(format!(
                "expected {expected:?}, found {token:?} in '{}'",
                self.expression.text()
            )));
        }
        Ok(())
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(word)) if word.eq_ignore_ascii_case(keyword))
    }

    fn parse_or(&mut self) -> StoreResult<Condition> {
        let mut left = self.parse_and()?;
        while self.peek_keyword("OR") {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Condition::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> StoreResult<Condition> {
        let mut left = self.parse_unary()?;
        while self.peek_keyword("AND") {
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Condition::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> StoreResult<Condition> {
        if self.peek_keyword("NOT") {
            self.pos += 1;
            let inner = self.parse_unary()?;
            return Ok(Condition::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> StoreResult<Condition> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.parse_or()?;
            self.expect(Token::RParen)?;
            return Ok(inner);
        }

        if let Some(Token::Ident(word)) = self.peek().cloned()
            && self.tokens.get(self.pos + 1) == Some(&Token::LParen)
        {
            self.pos += 2;
            return self.parse_function(&word);
        }

        let left = self.parse_operand()?;
        if self.peek_keyword("BETWEEN") {
            self.pos += 1;
            let low = self.parse_operand()?;
            if !self.peek_keyword("AND") {
                return Err(StoreError::InvalidExpression(format!(
                    "BETWEEN requires AND in '{}'",
                    self.expression.text()
                )));
            }
            self.pos += 1;
            let high = self.parse_operand()?;
            return Ok(Condition::And(
                Box::new(Condition::Compare {
                    left: left.clone(),
                    op: Comparator::Ge,
                    right: low,
                }),
                Box::new(Condition::Compare {
                    left,
                    op: Comparator::Le,
                    right: high,
                }),
            ));
        }

        let op = match self.next()? {
            Token::Cmp(op) => op,
            other => {
                return Err(StoreError::InvalidExpression(format!(
                    "expected comparator, found {other:?} in '{}'",
                    self.expression.text()
                )));
            }
        };
        let right = self.parse_operand()?;
        Ok(Condition::Compare { left, op, right })
    }

    fn parse_function(&mut self, name: &str) -> StoreResult<Condition> {
        let mut args = vec![self.parse_operand()?];
        while self.peek() == Some(&Token::Comma) {
            self.pos += 1;
            args.push(self.parse_operand()?);
        }
        self.expect(Token::RParen)?;

        let arity_error = |n: usize, got: usize| {
            StoreError::InvalidExpression(format!("{name} takes {n} argument(s), got {got}"))
        };

        match name {
            "contains" | "begins_with" => {
                let [a, b]: [Operand; 2] = args
                    .try_into()
                    .map_err(|args: Vec<Operand>| arity_error(2, args.len()))?;
                if name == "contains" {
                    Ok(Condition::Contains(a, b))
                } else {
                    Ok(Condition::BeginsWith(a, b))
                }
            }
            "attribute_exists" | "attribute_not_exists" => {
                let [operand]: [Operand; 1] = args
                    .try_into()
                    .map_err(|args: Vec<Operand>| arity_error(1, args.len()))?;
                match operand {
                    Operand::Path(path) => Ok(Condition::Exists(path, name == "attribute_exists")),
                    Operand::Literal(_) => Err(StoreError::InvalidExpression(format!(
                        "{name} requires an attribute path"
                    ))),
                }
            }
            other => Err(StoreError::InvalidExpression(format!(
                "unknown function '{other}'"
            ))),
        }
    }

    fn parse_operand(&mut self) -> StoreResult<Operand> {
        match self.next()? {
            Token::Value(placeholder) => {
                let value = self.expression.value(&placeholder).ok_or_else(|| {
                    StoreError::InvalidExpression(format!("unbound value placeholder {placeholder}"))
                })?;
                Ok(Operand::Literal(value.clone()))
            }
            token @ (Token::Name(_) | Token::Ident(_)) => {
                let mut path = vec![self.segment(token)?];
                while self.peek() == Some(&Token::Dot) {
                    self.pos += 1;
                    let token = self.next()?;
                    path.push(self.segment(token)?);
                }
                Ok(Operand::Path(path))
            }
            other => Err(StoreError::InvalidExpression(format!(
                "expected operand, found {other:?} in '{}'",
                self.expression.text()
            ))),
        }
    }

    fn segment(&self, token: Token) -> StoreResult<String> {
        match token {
            Token::Name(placeholder) => self
                .expression
                .name(&placeholder)
                .map(str::to_string)
                .ok_or_else(|| {
                    StoreError::InvalidExpression(format!("unbound name placeholder {placeholder}"))
                }),
            Token::Ident(word) => Ok(word),
            other => Err(StoreError::InvalidExpression(format!(
                "expected attribute name, found {other:?}"
            ))),
        }
    }
}
