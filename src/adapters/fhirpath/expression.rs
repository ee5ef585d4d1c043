//! Path expression parser and evaluator
//!
//! Supports the subset of FHIRPath the pipeline is configured with in
//! practice:
//!
//! - member navigation: `request.url`, `entry.resource.meta.tag.code`
//! - functions: `first()`, `toString()`, `exists()`, `empty()`, `count()`, `not()`
//! - comparisons against literals: `=` and `!=` with `'string'`, `true`,
//!   `false` or numbers
//! - boolean `and` / `or`
//!
//! Navigation follows FHIRPath collection semantics: arrays are flattened and
//! missing members yield an empty collection rather than an error.

use crate::domain::{PipelineError, Result};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Number(f64),
    Dot,
    LParen,
    RParen,
    Eq,
    NotEq,
}

#[derive(Debug, Clone, PartialEq)]
enum Step {
    Member(String),
    Function(Function),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Function {
    First,
    ToString,
    Exists,
    Empty,
    Count,
    Not,
}

impl Function {
    fn from_name(name: &str) -> Result<Self> {
        match name {
            "first" => Ok(Function::First),
            "toString" => Ok(Function::ToString),
            "exists" => Ok(Function::Exists),
            "empty" => Ok(Function::Empty),
            "count" => Ok(Function::Count),
            "not" => Ok(Function::Not),
            other => Err(PipelineError::Configuration(format!(
                "Unsupported path function '{other}()'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Str(String),
    Bool(bool),
    Number(f64),
}

impl Literal {
    fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (Literal::Str(expected), Value::String(actual)) => expected == actual,
            (Literal::Bool(expected), Value::Bool(actual)) => expected == actual,
            (Literal::Number(expected), Value::Number(actual)) => actual
                .as_f64()
                .map(|a| (a - expected).abs() < f64::EPSILON)
                .unwrap_or(false),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Path(Vec<Step>),
    Literal(Literal),
    Compare {
        path: Vec<Step>,
        negated: bool,
        literal: Literal,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

/// A parsed path expression
#[derive(Debug, Clone, PartialEq)]
pub struct PathExpression {
    source: String,
    root: Expr,
}

impl PathExpression {
    /// Parses an expression
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Configuration` if the expression is blank or
    /// uses syntax outside the supported subset.
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(PipelineError::Configuration(
                "Path expression cannot be empty".to_string(),
            ));
        }

        let mut parser = Parser { tokens, pos: 0 };
        let root = parser.parse_or()?;
        if parser.pos != parser.tokens.len() {
            return Err(PipelineError::Configuration(format!(
                "Unexpected trailing input in path expression '{source}'"
            )));
        }

        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Evaluates the expression against a JSON value, returning the
    /// resulting collection
    pub fn evaluate(&self, context: &Value) -> Vec<Value> {
        eval(&self.root, context)
    }

    /// First result rendered as a string, if it is a primitive
    pub fn evaluate_first_string(&self, context: &Value) -> Option<String> {
        self.evaluate(context)
            .into_iter()
            .next()
            .and_then(|value| primitive_to_string(&value))
    }

    /// Whether the first result is the boolean `true`
    pub fn evaluate_bool(&self, context: &Value) -> bool {
        matches!(self.evaluate(context).first(), Some(Value::Bool(true)))
    }
}

fn primitive_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn eval(expr: &Expr, context: &Value) -> Vec<Value> {
    match expr {
        Expr::Path(steps) => navigate(steps, context),
        Expr::Literal(Literal::Str(s)) => vec![Value::String(s.clone())],
        Expr::Literal(Literal::Bool(b)) => vec![Value::Bool(*b)],
        Expr::Literal(Literal::Number(n)) => serde_json::Number::from_f64(*n)
            .map(|n| vec![Value::Number(n)])
            .unwrap_or_default(),
        Expr::Compare {
            path,
            negated,
            literal,
        } => {
            let values = navigate(path, context);
            match values.first() {
                // comparing an empty collection yields an empty result
                None => Vec::new(),
                Some(first) => vec![Value::Bool(literal.matches(first) != *negated)],
            }
        }
        Expr::And(lhs, rhs) => {
            let result = truthy(&eval(lhs, context)) && truthy(&eval(rhs, context));
            vec![Value::Bool(result)]
        }
        Expr::Or(lhs, rhs) => {
            let result = truthy(&eval(lhs, context)) || truthy(&eval(rhs, context));
            vec![Value::Bool(result)]
        }
    }
}

fn truthy(collection: &[Value]) -> bool {
    matches!(collection.first(), Some(Value::Bool(true)))
}

fn navigate(steps: &[Step], context: &Value) -> Vec<Value> {
    let mut current = vec![context.clone()];

    for (index, step) in steps.iter().enumerate() {
        current = match step {
            Step::Member(name) => {
                // a leading type name (`Bundle.entry`) selects the root itself
                if index == 0
                    && context.get("resourceType").and_then(Value::as_str) == Some(name.as_str())
                {
                    continue;
                }
                current
                    .iter()
                    .filter_map(|value| value.get(name.as_str()))
                    .flat_map(|value| match value {
                        Value::Array(items) => items.clone(),
                        Value::Null => Vec::new(),
                        other => vec![other.clone()],
                    })
                    .collect()
            }
            Step::Function(function) => apply(*function, current),
        };
    }

    current
}

fn apply(function: Function, input: Vec<Value>) -> Vec<Value> {
    match function {
        Function::First => input.into_iter().take(1).collect(),
        Function::ToString => input
            .iter()
            .filter_map(primitive_to_string)
            .map(Value::String)
            .collect(),
        Function::Exists => vec![Value::Bool(!input.is_empty())],
        Function::Empty => vec![Value::Bool(input.is_empty())],
        Function::Count => vec![Value::from(input.len())],
        Function::Not => match input.first() {
            Some(Value::Bool(b)) => vec![Value::Bool(!b)],
            _ => Vec::new(),
        },
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Eq);
                i += 1;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::NotEq);
                i += 2;
            }
            '\'' => {
                let mut literal = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => {
                            return Err(PipelineError::Configuration(format!(
                                "Unterminated string literal in path expression '{source}'"
                            )))
                        }
                        Some('\\') => {
                            if let Some(escaped) = chars.get(i + 1) {
                                literal.push(*escaped);
                            }
                            i += 2;
                        }
                        Some('\'') => {
                            i += 1;
                            break;
                        }
                        Some(other) => {
                            literal.push(*other);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(literal));
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = text.parse::<f64>().map_err(|_| {
                    PipelineError::Configuration(format!(
                        "Invalid number '{text}' in path expression '{source}'"
                    ))
                })?;
                tokens.push(Token::Number(number));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(PipelineError::Configuration(format!(
                    "Unexpected character '{other}' in path expression '{source}'"
                )))
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(name)) if name == keyword)
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        while self.peek_keyword("or") {
            self.pos += 1;
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_comparison()?;
        while self.peek_keyword("and") {
            self.pos += 1;
            let rhs = self.parse_comparison()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(Token::Str(_)) | Some(Token::Number(_)) => {
                return Ok(Expr::Literal(self.parse_literal()?));
            }
            Some(Token::Ident(name)) if name == "true" || name == "false" => {
                return Ok(Expr::Literal(self.parse_literal()?));
            }
            _ => {}
        }

        let path = self.parse_path()?;
        let negated = match self.peek() {
            Some(Token::Eq) => false,
            Some(Token::NotEq) => true,
            _ => return Ok(Expr::Path(path)),
        };
        self.pos += 1;
        let literal = self.parse_literal()?;

        Ok(Expr::Compare {
            path,
            negated,
            literal,
        })
    }

    fn parse_literal(&mut self) -> Result<Literal> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Literal::Str(s)),
            Some(Token::Number(n)) => Ok(Literal::Number(n)),
            Some(Token::Ident(name)) if name == "true" => Ok(Literal::Bool(true)),
            Some(Token::Ident(name)) if name == "false" => Ok(Literal::Bool(false)),
            other => Err(PipelineError::Configuration(format!(
                "Expected a literal in path expression, found {other:?}"
            ))),
        }
    }

    fn parse_path(&mut self) -> Result<Vec<Step>> {
        let mut steps = vec![self.parse_step()?];
        while matches!(self.peek(), Some(Token::Dot)) {
            self.pos += 1;
            steps.push(self.parse_step()?);
        }
        Ok(steps)
    }

    fn parse_step(&mut self) -> Result<Step> {
        let name = match self.next() {
            Some(Token::Ident(name)) => name,
            other => {
                return Err(PipelineError::Configuration(format!(
                    "Expected a member name in path expression, found {other:?}"
                )))
            }
        };

        if matches!(self.peek(), Some(Token::LParen)) {
            self.pos += 1;
            match self.next() {
                Some(Token::RParen) => Ok(Step::Function(Function::from_name(&name)?)),
                _ => Err(PipelineError::Configuration(format!(
                    "Function '{name}' does not take arguments"
                ))),
            }
        } else {
            Ok(Step::Member(name))
        }
    }
}
