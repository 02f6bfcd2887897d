//! Freight-creation criteria expressions.
//!
//! A small boolean language evaluated against the artifacts of one discovery
//! cycle:
//!
//! ```text
//! expr    := or
//! or      := and ( "||" and )*
//! and     := unary ( "&&" unary )*
//! unary   := "!" unary | compare
//! compare := postfix ( ( "==" | "!=" ) postfix )?
//! postfix := primary ( "." IDENT )*
//! primary := STRING | "true" | "false" | "null" | IDENT "(" args ")" | "(" expr ")"
//! ```
//!
//! Lookup functions return the best discovered entry of a subscription, or
//! `null` when nothing matches:
//!
//! | Function | Fields |
//! |----------|--------|
//! | `commitFrom(repoURL[, branch])` | `ID`, `Tag`, `Branch`, `Message`, `Author`, `Committer` |
//! | `imageFrom(repoURL[, platform])` | `RepoURL`, `Tag`, `Digest` |
//! | `chartFrom(repoURL[, name])` | `RepoURL`, `Name`, `Version` |
//! | `artifactFrom(subscriptionName)` | `Name`, `Version` |
//!
//! Compile errors and evaluation errors are reported separately from a
//! `false` result. Sources longer than [`MAX_EXPRESSION_LENGTH`] bytes or
//! nesting deeper than [`MAX_DEPTH`] levels do not compile.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;
use yardmaster_core::DiscoveredArtifacts;

/// Errors raised while compiling or evaluating a criteria expression.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CriteriaError {
    /// The expression does not parse, or calls an unknown function.
    #[error("invalid criteria expression: {message}")]
    Compile {
        /// What is wrong.
        message: String,
    },

    /// The expression parsed but could not be evaluated.
    #[error("criteria evaluation failed: {message}")]
    Evaluation {
        /// What went wrong.
        message: String,
    },
}

impl CriteriaError {
    fn compile(message: impl Into<String>) -> Self {
        Self::Compile {
            message: message.into(),
        }
    }

    fn evaluation(message: impl Into<String>) -> Self {
        Self::Evaluation {
            message: message.into(),
        }
    }

    /// Returns true for compile errors, which only a spec change can fix.
    #[must_use]
    pub const fn is_compile(&self) -> bool {
        matches!(self, Self::Compile { .. })
    }
}

type CriteriaResult<T> = std::result::Result<T, CriteriaError>;

/// Longest accepted expression source, in bytes.
pub const MAX_EXPRESSION_LENGTH: usize = 4096;

/// Deepest accepted nesting of operators, parentheses, calls and field
/// accesses. Evaluation recurses once per level.
pub const MAX_DEPTH: usize = 64;

// --- Lexer ---

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Str(String),
    Ident(String),
    LParen,
    RParen,
    Comma,
    Dot,
    Or,
    And,
    Not,
    Eq,
    Ne,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "string {s:?}"),
            Self::Ident(s) => write!(f, "'{s}'"),
            Self::LParen => f.write_str("'('"),
            Self::RParen => f.write_str("')'"),
            Self::Comma => f.write_str("','"),
            Self::Dot => f.write_str("'.'"),
            Self::Or => f.write_str("'||'"),
            Self::And => f.write_str("'&&'"),
            Self::Not => f.write_str("'!'"),
            Self::Eq => f.write_str("'=='"),
            Self::Ne => f.write_str("'!='"),
        }
    }
}

fn tokenize(source: &str) -> CriteriaResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        let token = match c {
            c if c.is_whitespace() => continue,
            '(' => Token::LParen,
            ')' => Token::RParen,
            ',' => Token::Comma,
            '.' => Token::Dot,
            '|' | '&' | '=' => {
                if chars.next_if(|&(_, n)| n == c).is_none() {
                    return Err(CriteriaError::compile(format!(
                        "unexpected '{c}' at offset {pos}"
                    )));
                }
                match c {
                    '|' => Token::Or,
                    '&' => Token::And,
                    _ => Token::Eq,
                }
            }
            '!' => {
                if chars.next_if(|&(_, n)| n == '=').is_some() {
                    Token::Ne
                } else {
                    Token::Not
                }
            }
            '"' | '\'' => {
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, n)) = chars.next() {
                    match n {
                        '\\' => match chars.next() {
                            Some((_, escaped)) => value.push(escaped),
                            None => break,
                        },
                        n if n == c => {
                            closed = true;
                            break;
                        }
                        n => value.push(n),
                    }
                }
                if !closed {
                    return Err(CriteriaError::compile(format!(
                        "unterminated string starting at offset {pos}"
                    )));
                }
                Token::Str(value)
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::from(c);
                while let Some((_, n)) = chars.next_if(|&(_, n)| n.is_ascii_alphanumeric() || n == '_')
                {
                    ident.push(n);
                }
                Token::Ident(ident)
            }
            other => {
                return Err(CriteriaError::compile(format!(
                    "unexpected character '{other}' at offset {pos}"
                )))
            }
        };
        tokens.push(token);
    }

    Ok(tokens)
}

// --- Syntax tree ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Function {
    CommitFrom,
    ImageFrom,
    ChartFrom,
    ArtifactFrom,
}

impl Function {
    fn lookup(name: &str) -> Option<Self> {
        match name {
            "commitFrom" => Some(Self::CommitFrom),
            "imageFrom" => Some(Self::ImageFrom),
            "chartFrom" => Some(Self::ChartFrom),
            "artifactFrom" => Some(Self::ArtifactFrom),
            _ => None,
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::CommitFrom => "commitFrom",
            Self::ImageFrom => "imageFrom",
            Self::ChartFrom => "chartFrom",
            Self::ArtifactFrom => "artifactFrom",
        }
    }

    const fn arity(self) -> (usize, usize) {
        match self {
            Self::ArtifactFrom => (1, 1),
            _ => (1, 2),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Call(Function, Vec<Expr>),
    Field(Box<Expr>, String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Equal(Box<Expr>, Box<Expr>),
    NotEqual(Box<Expr>, Box<Expr>),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    const fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn enter(&mut self) -> CriteriaResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(CriteriaError::compile(format!(
                "expression nests deeper than {MAX_DEPTH} levels"
            )));
        }
        Ok(())
    }

    fn leave(&mut self, levels: usize) {
        self.depth -= levels;
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> CriteriaResult<()> {
        match self.next() {
            Some(ref t) if t == expected => Ok(()),
            Some(t) => Err(CriteriaError::compile(format!(
                "expected {expected}, found {t}"
            ))),
            None => Err(CriteriaError::compile(format!(
                "expected {expected}, found end of expression"
            ))),
        }
    }

    // Chained operators build left-deep trees, so every link counts as a
    // level even though the parser itself does not recurse for it.
    fn or(&mut self) -> CriteriaResult<Expr> {
        let mut lhs = self.and()?;
        let mut links = 0;
        while self.eat(&Token::Or) {
            self.enter()?;
            links += 1;
            lhs = Expr::Or(Box::new(lhs), Box::new(self.and()?));
        }
        self.leave(links);
        Ok(lhs)
    }

    fn and(&mut self) -> CriteriaResult<Expr> {
        let mut lhs = self.unary()?;
        let mut links = 0;
        while self.eat(&Token::And) {
            self.enter()?;
            links += 1;
            lhs = Expr::And(Box::new(lhs), Box::new(self.unary()?));
        }
        self.leave(links);
        Ok(lhs)
    }

    fn unary(&mut self) -> CriteriaResult<Expr> {
        if self.eat(&Token::Not) {
            self.enter()?;
            let operand = self.unary()?;
            self.leave(1);
            return Ok(Expr::Not(Box::new(operand)));
        }
        self.compare()
    }

    fn compare(&mut self) -> CriteriaResult<Expr> {
        let lhs = self.postfix()?;
        let equal = if self.eat(&Token::Eq) {
            true
        } else if self.eat(&Token::Ne) {
            false
        } else {
            return Ok(lhs);
        };
        self.enter()?;
        let rhs = self.postfix()?;
        self.leave(1);
        Ok(if equal {
            Expr::Equal(Box::new(lhs), Box::new(rhs))
        } else {
            Expr::NotEqual(Box::new(lhs), Box::new(rhs))
        })
    }

    fn postfix(&mut self) -> CriteriaResult<Expr> {
        let mut expr = self.primary()?;
        let mut links = 0;
        while self.eat(&Token::Dot) {
            self.enter()?;
            links += 1;
            match self.next() {
                Some(Token::Ident(field)) => expr = Expr::Field(Box::new(expr), field),
                Some(t) => {
                    return Err(CriteriaError::compile(format!(
                        "expected field name after '.', found {t}"
                    )))
                }
                None => {
                    return Err(CriteriaError::compile(
                        "expected field name after '.', found end of expression",
                    ))
                }
            }
        }
        self.leave(links);
        Ok(expr)
    }

    fn primary(&mut self) -> CriteriaResult<Expr> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::LParen) => {
                self.enter()?;
                let expr = self.or()?;
                self.expect(&Token::RParen)?;
                self.leave(1);
                Ok(expr)
            }
            Some(Token::Ident(ident)) => match ident.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                _ => self.call(&ident),
            },
            Some(t) => Err(CriteriaError::compile(format!("unexpected {t}"))),
            None => Err(CriteriaError::compile("unexpected end of expression")),
        }
    }

    fn call(&mut self, name: &str) -> CriteriaResult<Expr> {
        let function = Function::lookup(name)
            .ok_or_else(|| CriteriaError::compile(format!("unknown function '{name}'")))?;
        self.expect(&Token::LParen)?;
        self.enter()?;

        let mut args = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                args.push(self.or()?);
                if self.eat(&Token::RParen) {
                    break;
                }
                self.expect(&Token::Comma)?;
            }
        }
        self.leave(1);

        let (min, max) = function.arity();
        if !(min..=max).contains(&args.len()) {
            let expected = if min == max {
                min.to_string()
            } else {
                format!("{min} or {max}")
            };
            return Err(CriteriaError::compile(format!(
                "{}() takes {expected} argument(s), got {}",
                function.name(),
                args.len()
            )));
        }
        Ok(Expr::Call(function, args))
    }
}

// --- Evaluation ---

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Null,
    Bool(bool),
    String(String),
    Record {
        kind: &'static str,
        fields: BTreeMap<&'static str, Value>,
    },
}

impl Value {
    const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::String(_) => "string",
            Self::Record { kind, .. } => kind,
        }
    }

    fn opt(value: Option<&String>) -> Self {
        value.map_or(Self::Null, |s| Self::String(s.clone()))
    }

    fn record<const N: usize>(kind: &'static str, fields: [(&'static str, Self); N]) -> Self {
        Self::Record {
            kind,
            fields: BTreeMap::from(fields),
        }
    }
}

fn equals(lhs: &Value, rhs: &Value) -> CriteriaResult<bool> {
    match (lhs, rhs) {
        (Value::Null, Value::Null) => Ok(true),
        (Value::Null, Value::Bool(_) | Value::String(_))
        | (Value::Bool(_) | Value::String(_), Value::Null) => Ok(false),
        (Value::Bool(a), Value::Bool(b)) => Ok(a == b),
        (Value::String(a), Value::String(b)) => Ok(a == b),
        (a, b) => Err(CriteriaError::evaluation(format!(
            "cannot compare {} with {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

struct Evaluator<'a> {
    artifacts: &'a DiscoveredArtifacts,
}

impl Evaluator<'_> {
    fn eval(&self, expr: &Expr) -> CriteriaResult<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Call(function, args) => {
                let args = args
                    .iter()
                    .map(|a| self.string_arg(*function, a))
                    .collect::<CriteriaResult<Vec<_>>>()?;
                Ok(self.lookup(*function, &args))
            }
            Expr::Field(target, field) => match self.eval(target)? {
                Value::Record { kind, fields } => fields.get(field.as_str()).cloned().ok_or_else(|| {
                    CriteriaError::evaluation(format!("{kind} has no field '{field}'"))
                }),
                Value::Null => Err(CriteriaError::evaluation(format!(
                    "cannot access field '{field}' of null"
                ))),
                other => Err(CriteriaError::evaluation(format!(
                    "cannot access field '{field}' of {}",
                    other.type_name()
                ))),
            },
            Expr::Not(inner) => Ok(Value::Bool(!self.eval_bool(inner)?)),
            Expr::And(lhs, rhs) => Ok(Value::Bool(self.eval_bool(lhs)? && self.eval_bool(rhs)?)),
            Expr::Or(lhs, rhs) => Ok(Value::Bool(self.eval_bool(lhs)? || self.eval_bool(rhs)?)),
            Expr::Equal(lhs, rhs) => Ok(Value::Bool(equals(&self.eval(lhs)?, &self.eval(rhs)?)?)),
            Expr::NotEqual(lhs, rhs) => {
                Ok(Value::Bool(!equals(&self.eval(lhs)?, &self.eval(rhs)?)?))
            }
        }
    }

    fn eval_bool(&self, expr: &Expr) -> CriteriaResult<bool> {
        match self.eval(expr)? {
            Value::Bool(b) => Ok(b),
            other => Err(CriteriaError::evaluation(format!(
                "expected bool, got {}",
                other.type_name()
            ))),
        }
    }

    fn string_arg(&self, function: Function, expr: &Expr) -> CriteriaResult<String> {
        match self.eval(expr)? {
            Value::String(s) => Ok(s),
            other => Err(CriteriaError::evaluation(format!(
                "{}() expects string arguments, got {}",
                function.name(),
                other.type_name()
            ))),
        }
    }

    fn lookup(&self, function: Function, args: &[String]) -> Value {
        let first = args.first().map_or("", String::as_str);
        let second = args.get(1).map(String::as_str);

        let found = match function {
            Function::CommitFrom => self
                .artifacts
                .git
                .iter()
                .filter(|r| r.repo_url == first)
                .flat_map(|r| r.commits.iter())
                .find(|c| second.is_none_or(|b| c.branch.as_deref() == Some(b)))
                .map(|c| {
                    Value::record(
                        "commit",
                        [
                            ("ID", Value::String(c.id.clone())),
                            ("Tag", Value::opt(c.tag.as_ref())),
                            ("Branch", Value::opt(c.branch.as_ref())),
                            ("Message", Value::opt(c.subject.as_ref())),
                            ("Author", Value::opt(c.author.as_ref())),
                            ("Committer", Value::opt(c.committer.as_ref())),
                        ],
                    )
                }),
            Function::ImageFrom => self
                .artifacts
                .images
                .iter()
                .filter(|r| r.repo_url == first)
                .find(|r| second.is_none_or(|p| r.platform.as_deref() == Some(p)))
                .and_then(|r| r.references.first().map(|i| (r, i)))
                .map(|(r, i)| {
                    Value::record(
                        "image",
                        [
                            ("RepoURL", Value::String(r.repo_url.clone())),
                            ("Tag", Value::String(i.tag.clone())),
                            ("Digest", Value::String(i.digest.clone())),
                        ],
                    )
                }),
            Function::ChartFrom => self
                .artifacts
                .charts
                .iter()
                .filter(|r| r.repo_url == first)
                .find(|r| second.is_none_or(|n| r.name.as_deref() == Some(n)))
                .and_then(|r| r.versions.first().map(|v| (r, v)))
                .map(|(r, v)| {
                    Value::record(
                        "chart",
                        [
                            ("RepoURL", Value::String(r.repo_url.clone())),
                            ("Name", Value::opt(r.name.as_ref())),
                            ("Version", Value::String(v.clone())),
                        ],
                    )
                }),
            Function::ArtifactFrom => self
                .artifacts
                .results
                .iter()
                .find(|r| r.name == first)
                .and_then(|r| r.references.first())
                .map(|a| {
                    Value::record(
                        "artifact",
                        [
                            ("Name", Value::String(a.subscription_name.clone())),
                            ("Version", Value::String(a.version.clone())),
                        ],
                    )
                }),
        };

        found.unwrap_or(Value::Null)
    }
}

/// A compiled criteria expression.
#[derive(Debug, Clone)]
pub struct Criteria {
    source: String,
    expr: Expr,
}

impl Criteria {
    /// Compiles an expression.
    ///
    /// # Errors
    ///
    /// Returns [`CriteriaError::Compile`] on syntax errors, unknown functions,
    /// wrong argument counts and sources that are too long or too deeply
    /// nested.
    ///
    /// # Examples
    ///
    /// ```
    /// use yardmaster_warehouse::criteria::Criteria;
    ///
    /// assert!(Criteria::compile(r#"imageFrom("nginx").Tag == "1.27.0""#).is_ok());
    /// assert!(Criteria::compile(r#"imageFrom("nginx").Tag =="#).unwrap_err().is_compile());
    /// assert!(Criteria::compile(r#"latest("nginx")"#).unwrap_err().is_compile());
    /// ```
    pub fn compile(source: &str) -> CriteriaResult<Self> {
        if source.len() > MAX_EXPRESSION_LENGTH {
            return Err(CriteriaError::compile(format!(
                "expression is {} bytes long, the limit is {MAX_EXPRESSION_LENGTH}",
                source.len()
            )));
        }
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(CriteriaError::compile("expression is empty"));
        }
        let mut parser = Parser::new(tokens);
        let expr = parser.or()?;
        if let Some(extra) = parser.peek() {
            return Err(CriteriaError::compile(format!(
                "unexpected {extra} after end of expression"
            )));
        }
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    /// Returns the expression source.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates the expression against discovered artifacts.
    ///
    /// # Errors
    ///
    /// Returns [`CriteriaError::Evaluation`] on field access on `null`,
    /// unknown fields, incompatible comparisons and non-boolean results.
    pub fn evaluate(&self, artifacts: &DiscoveredArtifacts) -> CriteriaResult<bool> {
        Evaluator { artifacts }.eval_bool(&self.expr)
    }
}

#[cfg(test)]
mod tests {
    use yardmaster_core::{
        ArtifactReference, ChartDiscoveryResult, DiscoveredCommit, DiscoveredImageReference,
        GenericDiscoveryResult, GitDiscoveryResult, ImageDiscoveryResult,
    };

    use super::*;

    const REPO: &str = "https://github.com/acme/app";

    fn artifacts() -> DiscoveredArtifacts {
        DiscoveredArtifacts {
            git: vec![GitDiscoveryResult {
                repo_url: REPO.to_string(),
                commits: vec![DiscoveredCommit {
                    id: "abc123".to_string(),
                    branch: Some("main".to_string()),
                    subject: Some("fix: things".to_string()),
                    ..DiscoveredCommit::default()
                }],
            }],
            images: vec![ImageDiscoveryResult {
                repo_url: "ghcr.io/acme/api".to_string(),
                platform: Some("linux/amd64".to_string()),
                references: vec![DiscoveredImageReference {
                    tag: "1.2.0".to_string(),
                    digest: "sha256:aaa".to_string(),
                    ..DiscoveredImageReference::default()
                }],
            }],
            charts: vec![ChartDiscoveryResult {
                repo_url: "https://charts.acme.dev".to_string(),
                name: Some("api".to_string()),
                versions: vec!["0.4.0".to_string()],
            }],
            results: vec![GenericDiscoveryResult {
                name: "bundle".to_string(),
                kind: "s3".to_string(),
                references: vec![ArtifactReference {
                    subscription_name: "bundle".to_string(),
                    version: "v7".to_string(),
                    metadata: BTreeMap::new(),
                }],
            }],
            ..DiscoveredArtifacts::default()
        }
    }

    fn eval(source: &str) -> CriteriaResult<bool> {
        Criteria::compile(source)?.evaluate(&artifacts())
    }

    #[test]
    fn test_literals_and_operators() {
        assert!(eval("true").unwrap());
        assert!(!eval("!true").unwrap());
        assert!(eval("true && !false").unwrap());
        assert!(eval("false || (true && true)").unwrap());
        assert!(eval("null == null").unwrap());
        assert!(eval("'a' != 'b'").unwrap());
    }

    #[test]
    fn test_lookups() {
        assert!(eval(r#"commitFrom("https://github.com/acme/app").ID == "abc123""#).unwrap());
        assert!(eval(r#"commitFrom("https://github.com/acme/app", "main").Message == "fix: things""#).unwrap());
        assert!(eval(r#"commitFrom("https://github.com/acme/app").Tag == null"#).unwrap());
        assert!(eval(r#"imageFrom("ghcr.io/acme/api", "linux/amd64").Digest == "sha256:aaa""#).unwrap());
        assert!(eval(r#"chartFrom("https://charts.acme.dev", "api").Version == "0.4.0""#).unwrap());
        assert!(eval(r#"artifactFrom("bundle").Version == "v7""#).unwrap());
    }

    #[test]
    fn test_missing_lookup_is_null() {
        assert!(eval(r#"imageFrom("ghcr.io/acme/other") == null"#).unwrap());
        assert!(eval(r#"commitFrom("https://github.com/acme/app", "dev") == null"#).unwrap());
    }

    #[test]
    fn test_short_circuit_skips_errors() {
        assert!(!eval(r#"false && imageFrom("missing").Tag == "x""#).unwrap());
        assert!(eval(r#"true || imageFrom("missing").Tag == "x""#).unwrap());
    }

    #[test]
    fn test_compile_errors() {
        for source in [
            "",
            "true &&",
            "(true",
            "true false",
            "imageFrom()",
            r#"artifactFrom("a", "b")"#,
            r#"unknownFn("a")"#,
            "'unterminated",
            "a = b",
            "imageFrom('x').",
        ] {
            let err = Criteria::compile(source).unwrap_err();
            assert!(err.is_compile(), "{source}: {err}");
        }
    }

    #[test]
    fn test_evaluation_errors() {
        for source in [
            r#"imageFrom("ghcr.io/acme/other").Tag == "1""#,
            r#"imageFrom("ghcr.io/acme/api").Size == "1""#,
            r#"imageFrom("ghcr.io/acme/api")"#,
            r#""text""#,
            r#"true == "true""#,
            r#"imageFrom(true)"#,
            r#"!imageFrom("ghcr.io/acme/api").Tag"#,
        ] {
            let err = eval(source).unwrap_err();
            assert!(
                matches!(err, CriteriaError::Evaluation { .. }),
                "{source}: {err}"
            );
        }
    }

    #[test]
    fn test_nesting_limit() {
        let shallow = format!("{}true{}", "(".repeat(20), ")".repeat(20));
        assert!(eval(&shallow).unwrap());
        assert!(eval(&format!("{}true", "!".repeat(20))).unwrap());

        for source in [
            format!("{}true{}", "(".repeat(5_000), ")".repeat(5_000)),
            format!("{}true{}", "(".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1)),
            format!("{}true", "!".repeat(MAX_DEPTH + 1)),
            vec!["true"; MAX_DEPTH + 2].join(" && "),
            format!("imageFrom('x'){}", ".Tag".repeat(MAX_DEPTH + 1)),
        ] {
            let err = Criteria::compile(&source).unwrap_err();
            assert!(err.is_compile(), "{err}");
        }
    }

    #[test]
    fn test_length_limit() {
        let err = Criteria::compile(&"!".repeat(200_000)).unwrap_err();
        assert!(err.is_compile());
        assert!(err.to_string().contains("limit"), "{err}");

        let padded = format!("true{}", " ".repeat(MAX_EXPRESSION_LENGTH - 4));
        assert!(Criteria::compile(&padded).is_ok());
    }

    #[test]
    fn test_escaped_quotes() {
        let criteria = Criteria::compile(r#""a\"b" == 'a"b'"#).unwrap();
        assert!(criteria.evaluate(&DiscoveredArtifacts::default()).unwrap());
        assert_eq!(criteria.source(), r#""a\"b" == 'a"b'"#);
    }
}
