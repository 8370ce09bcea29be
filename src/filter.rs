//! Filter expressions over event fields
//!
//! Attributes and event categories can be restricted with an LDAP-style filter
//! expression taken from their `filter` configuration parameter:
//!
//! ```text
//! (&(name=latency)(value>=100))
//! (|(source=web-*)(!(message~=ignored)))
//! (correlationId=*)
//! ```
//!
//! The expression is compiled once when the attribute or category is connected.
//! An empty expression matches every event.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use regex::Regex;

use crate::error::{ConnectorError, ConnectorResult};

/// Field value exposed to filters
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue<'a> {
    Text(Cow<'a, str>),
    Number(f64),
    Boolean(bool),
}

impl FieldValue<'_> {
    fn as_text(&self) -> Cow<'_, str> {
        match self {
            FieldValue::Text(text) => Cow::Borrowed(text.as_ref()),
            FieldValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                Cow::Owned(format!("{}", *n as i64))
            }
            FieldValue::Number(n) => Cow::Owned(n.to_string()),
            FieldValue::Boolean(b) => Cow::Owned(b.to_string()),
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(text) => text.trim().parse().ok(),
            FieldValue::Boolean(_) => None,
        }
    }
}

/// Anything a filter can be evaluated against
pub trait FilterTarget {
    fn field(&self, key: &str) -> Option<FieldValue<'_>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Equal,
    Approx,
    GreaterOrEqual,
    LessOrEqual,
}

#[derive(Debug, Clone)]
struct Operand {
    text: String,
    number: Option<f64>,
    pattern: Option<Regex>,
}

#[derive(Debug, Clone)]
enum Node {
    And(Vec<Node>),
    Or(Vec<Node>),
    Not(Box<Node>),
    Present(String),
    Compare {
        key: String,
        operator: Operator,
        operand: Operand,
    },
}

impl Node {
    fn evaluate<T: FilterTarget + ?Sized>(&self, target: &T) -> bool {
        match self {
            Node::And(nodes) => nodes.iter().all(|n| n.evaluate(target)),
            Node::Or(nodes) => nodes.iter().any(|n| n.evaluate(target)),
            Node::Not(node) => !node.evaluate(target),
            Node::Present(key) => target.field(key).is_some(),
            Node::Compare {
                key,
                operator,
                operand,
            } => match target.field(key) {
                Some(value) => compare(&value, *operator, operand),
                None => false,
            },
        }
    }
}

fn compare(value: &FieldValue<'_>, operator: Operator, operand: &Operand) -> bool {
    if let Some(pattern) = &operand.pattern {
        return pattern.is_match(&value.as_text());
    }

    match operator {
        Operator::Equal => match (value, operand.number) {
            (FieldValue::Number(n), Some(expected)) => *n == expected,
            (FieldValue::Boolean(b), _) => operand.text.eq_ignore_ascii_case(&b.to_string()),
            _ => value.as_text() == operand.text,
        },
        Operator::Approx => value
            .as_text()
            .trim()
            .eq_ignore_ascii_case(operand.text.trim()),
        Operator::GreaterOrEqual | Operator::LessOrEqual => {
            let ordering = match (value.as_number(), operand.number) {
                (Some(actual), Some(expected)) => actual.partial_cmp(&expected),
                _ if matches!(value, FieldValue::Boolean(_)) => None,
                _ => Some(value.as_text().as_ref().cmp(operand.text.as_str())),
            };
            match (operator, ordering) {
                (Operator::GreaterOrEqual, Some(o)) => o != Ordering::Less,
                (Operator::LessOrEqual, Some(o)) => o != Ordering::Greater,
                _ => false,
            }
        }
    }
}

/// Compiled filter expression
#[derive(Debug, Clone, Default)]
pub struct NotificationFilter {
    expression: String,
    root: Option<Node>,
}

impl NotificationFilter {
    /// Filter that accepts every event
    pub fn match_all() -> Self {
        Self::default()
    }

    /// Compile a filter expression
    pub fn parse(expression: &str) -> ConnectorResult<Self> {
        let trimmed = expression.trim();
        if trimmed.is_empty() || trimmed == "*" {
            return Ok(Self::match_all());
        }

        let mut parser = Parser::new(trimmed);
        let root = parser
            .filter()
            .and_then(|node| parser.end().map(|_| node))
            .map_err(|reason| ConnectorError::InvalidFilter {
                expression: expression.to_string(),
                reason,
            })?;

        Ok(Self {
            expression: trimmed.to_string(),
            root: Some(root),
        })
    }

    pub fn accepts<T: FilterTarget + ?Sized>(&self, target: &T) -> bool {
        self.root.as_ref().is_none_or(|root| root.evaluate(target))
    }

    pub fn is_match_all(&self) -> bool {
        self.root.is_none()
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }
}

impl FromStr for NotificationFilter {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for NotificationFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.root.is_none() {
            write!(f, "*")
        } else {
            write!(f, "{}", self.expression)
        }
    }
}

enum Segment {
    Literal(char),
    Wildcard,
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), String> {
        self.skip_whitespace();
        match self.peek() {
            Some(c) if c == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(c) => Err(format!(
                "expected '{expected}' at position {} but found '{c}'",
                self.pos
            )),
            None => Err(format!("expected '{expected}' but reached end of input")),
        }
    }

    fn end(&mut self) -> Result<(), String> {
        self.skip_whitespace();
        match self.peek() {
            None => Ok(()),
            Some(c) => Err(format!("unexpected '{c}' at position {}", self.pos)),
        }
    }

    fn filter(&mut self) -> Result<Node, String> {
        self.expect('(')?;
        self.skip_whitespace();
        let node = match self.peek() {
            Some('&') => {
                self.pos += 1;
                Node::And(self.filter_list()?)
            }
            Some('|') => {
                self.pos += 1;
                Node::Or(self.filter_list()?)
            }
            Some('!') => {
                self.pos += 1;
                Node::Not(Box::new(self.filter()?))
            }
            Some(_) => self.item()?,
            None => return Err("unterminated filter".to_string()),
        };
        self.expect(')')?;
        Ok(node)
    }

    fn filter_list(&mut self) -> Result<Vec<Node>, String> {
        let mut nodes = vec![];
        loop {
            self.skip_whitespace();
            if self.peek() != Some('(') {
                break;
            }
            nodes.push(self.filter()?);
        }
        if nodes.is_empty() {
            return Err(format!("empty filter list at position {}", self.pos));
        }
        Ok(nodes)
    }

    fn item(&mut self) -> Result<Node, String> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if matches!(c, '=' | '~' | '>' | '<' | '(' | ')') {
                break;
            }
            self.pos += 1;
        }
        let key: String = self.chars[start..self.pos].iter().collect();
        let key = key.trim().to_string();
        if key.is_empty() {
            return Err(format!("missing field name at position {start}"));
        }

        let operator = match (self.peek(), self.chars.get(self.pos + 1)) {
            (Some('='), _) => {
                self.pos += 1;
                Operator::Equal
            }
            (Some('~'), Some('=')) => {
                self.pos += 2;
                Operator::Approx
            }
            (Some('>'), Some('=')) => {
                self.pos += 2;
                Operator::GreaterOrEqual
            }
            (Some('<'), Some('=')) => {
                self.pos += 2;
                Operator::LessOrEqual
            }
            _ => return Err(format!("missing operator after '{key}'")),
        };

        let segments = self.value()?;
        let has_wildcard = segments.iter().any(|s| matches!(s, Segment::Wildcard));

        if operator == Operator::Equal && segments.len() == 1 && has_wildcard {
            return Ok(Node::Present(key));
        }

        let text: String = segments
            .iter()
            .map(|s| match s {
                Segment::Literal(c) => *c,
                Segment::Wildcard => '*',
            })
            .collect();

        let pattern = match operator {
            Operator::Equal | Operator::Approx if has_wildcard => {
                Some(wildcard_pattern(&segments, operator == Operator::Approx)?)
            }
            _ => None,
        };

        let number = if has_wildcard {
            None
        } else {
            text.trim().parse().ok()
        };

        Ok(Node::Compare {
            key,
            operator,
            operand: Operand {
                text,
                number,
                pattern,
            },
        })
    }

    fn value(&mut self) -> Result<Vec<Segment>, String> {
        let mut segments = vec![];
        loop {
            match self.peek() {
                None => return Err("unterminated value".to_string()),
                Some(')') => break,
                Some('(') => {
                    return Err(format!("unescaped '(' in value at position {}", self.pos));
                }
                Some('\\') => {
                    let escaped = self
                        .chars
                        .get(self.pos + 1)
                        .copied()
                        .ok_or_else(|| "dangling escape at end of input".to_string())?;
                    segments.push(Segment::Literal(escaped));
                    self.pos += 2;
                }
                Some('*') => {
                    segments.push(Segment::Wildcard);
                    self.pos += 1;
                }
                Some(c) => {
                    segments.push(Segment::Literal(c));
                    self.pos += 1;
                }
            }
        }
        Ok(segments)
    }
}

fn wildcard_pattern(segments: &[Segment], case_insensitive: bool) -> Result<Regex, String> {
    let mut pattern = String::from(if case_insensitive { "(?i)^" } else { "^" });
    for segment in segments {
        match segment {
            Segment::Literal(c) => pattern.push_str(&regex::escape(&c.to_string())),
            Segment::Wildcard => pattern.push_str(".*"),
        }
    }
    pattern.push('$');
    Regex::new(&pattern).map_err(|e| e.to_string())
}
