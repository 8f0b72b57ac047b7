//! Formula expressions.
//!
//! A small arithmetic language evaluated against named inputs. Inputs are
//! either scalars or lists (wildcard aliases). Syntax:
//!
//! - numbers use `.` as decimal point regardless of the display locale
//! - binary operators `+ - * / % ^` (`^` is right-associative and binds
//!   tighter than unary minus on its left: `-2^2 == -4`)
//! - parentheses, unary `+`/`-`
//! - function calls `name(arg, ...)`
//! - constants `pi` and `e` (an input with the same alias shadows them)
//! - at most [`MAX_TOKENS`] tokens and [`MAX_NESTING`] levels of nesting
//!
//! Arithmetic between a list and a scalar broadcasts; between two lists it is
//! element-wise and requires equal lengths. Aggregates (`sum`, `mean`, `min`,
//! `max`, `count`, `median`, `std`) flatten all their arguments.

use std::collections::BTreeMap;
use std::fmt;

use chumsky::input::ValueInput;
use chumsky::pratt::{infix, left, prefix, right};
use chumsky::prelude::*;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    #[error("parse error at {pos}: {message}")]
    Parse { pos: usize, message: String },

    #[error("formula is longer than {max} tokens")]
    TooLong { max: usize },

    #[error("formula nests {depth} levels deep, at most {max} allowed")]
    TooDeep { depth: usize, max: usize },

    #[error("unknown variable `{0}`")]
    UnknownVariable(String),

    #[error("unknown function `{0}`")]
    UnknownFunction(String),

    #[error("`{name}` expects {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: &'static str,
        got: usize,
    },

    #[error("list length mismatch: {0} vs {1}")]
    Shape(usize, usize),

    #[error("`{0}` of an empty list")]
    EmptyList(String),
}

/// Runtime value of an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    List(Vec<f64>),
}

impl Value {
    fn flatten_into(&self, out: &mut Vec<f64>) {
        match self {
            Value::Number(n) => out.push(*n),
            Value::List(v) => out.extend_from_slice(v),
        }
    }

    fn map(self, f: impl Fn(f64) -> f64) -> Value {
        match self {
            Value::Number(n) => Value::Number(f(n)),
            Value::List(v) => Value::List(v.into_iter().map(f).collect()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
}

impl BinOp {
    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BinOp::Add => a + b,
            BinOp::Sub => a - b,
            BinOp::Mul => a * b,
            BinOp::Div => a / b,
            BinOp::Rem => a % b,
            BinOp::Pow => a.powf(b),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(f64),
    Var(String),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

/// Longest accepted formula, in tokens.
pub const MAX_TOKENS: usize = 512;

/// Deepest accepted nesting: parentheses, prefix signs and `^` chains.
pub const MAX_NESTING: usize = 32;

/// A parsed formula.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    ast: Expr,
}

impl Formula {
    pub fn parse(source: &str) -> Result<Self, FormulaError> {
        let tokens = lexer().parse(source).into_result().map_err(first_error)?;
        if tokens.len() > MAX_TOKENS {
            return Err(FormulaError::TooLong { max: MAX_TOKENS });
        }
        let depth = nesting_depth(&tokens);
        if depth > MAX_NESTING {
            return Err(FormulaError::TooDeep {
                depth,
                max: MAX_NESTING,
            });
        }

        let eoi: Span = (source.len()..source.len()).into();
        let input = tokens
            .as_slice()
            .map(eoi, |(token, span)| (token, span));
        let ast = parser().parse(input).into_result().map_err(first_error)?;
        Ok(Self { ast })
    }

    /// Variable names the formula reads, excluding the built-in constants.
    pub fn variables(&self) -> Vec<&str> {
        let mut out = Vec::new();
        collect_vars(&self.ast, &mut out);
        out.retain(|v| constant(v).is_none());
        out.sort_unstable();
        out.dedup();
        out
    }

    pub fn evaluate(&self, env: &BTreeMap<String, Value>) -> Result<Value, FormulaError> {
        eval(&self.ast, env)
    }
}

fn collect_vars<'a>(e: &'a Expr, out: &mut Vec<&'a str>) {
    match e {
        Expr::Number(_) => {}
        Expr::Var(v) => out.push(v),
        Expr::Neg(inner) => collect_vars(inner, out),
        Expr::Binary(_, a, b) => {
            collect_vars(a, out);
            collect_vars(b, out);
        }
        Expr::Call(_, args) => {
            for a in args {
                collect_vars(a, out);
            }
        }
    }
}

fn constant(name: &str) -> Option<f64> {
    match name {
        "pi" => Some(std::f64::consts::PI),
        "e" => Some(std::f64::consts::E),
        _ => None,
    }
}

fn first_error<T: fmt::Display + fmt::Debug>(errors: Vec<ParseError<'_, T>>) -> FormulaError {
    match errors.first() {
        Some(e) => FormulaError::Parse {
            pos: e.span().start,
            message: e.to_string(),
        },
        None => FormulaError::Parse {
            pos: 0,
            message: "invalid formula".to_string(),
        },
    }
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

type Span = SimpleSpan;
type ParseError<'src, T> = Rich<'src, T, Span>;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token<'src> {
    Number(f64),
    Ident(&'src str),
    Op(char),
    ParenOpen,
    ParenClose,
    Comma,
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{n}"),
            Token::Ident(name) => write!(f, "{name}"),
            Token::Op(c) => write!(f, "{c}"),
            Token::ParenOpen => write!(f, "("),
            Token::ParenClose => write!(f, ")"),
            Token::Comma => write!(f, ","),
        }
    }
}

fn lexer<'src>() -> impl Parser<'src, &'src str, Vec<(Token<'src>, Span)>, extra::Err<ParseError<'src, char>>> {
    let mantissa = text::digits(10)
        .then(just('.').then(text::digits(10).or_not()).or_not())
        .ignored()
        .or(just('.').then(text::digits(10)).ignored());
    let exponent = one_of("eE").then(one_of("+-").or_not()).then(text::digits(10));

    let number = mantissa
        .then(exponent.or_not())
        .to_slice()
        .try_map(|raw: &str, span| {
            raw.parse::<f64>()
                .map(Token::Number)
                .map_err(|_| Rich::custom(span, format!("invalid number `{raw}`")))
        });

    let ident = any()
        .filter(|c: &char| c.is_ascii_alphabetic() || *c == '_')
        .then(any().filter(|c: &char| c.is_ascii_alphanumeric() || *c == '_').repeated())
        .to_slice()
        .map(Token::Ident);

    let token = choice((
        number,
        ident,
        one_of("+-*/%^").map(Token::Op),
        just('(').to(Token::ParenOpen),
        just(')').to(Token::ParenClose),
        just(',').to(Token::Comma),
    ));

    token
        .map_with(|token, extra| (token, extra.span()))
        .padded()
        .repeated()
        .collect()
        .then_ignore(end())
}

/// Upper bound on parser recursion for a token stream.
///
/// Each open parenthesis adds a level; inside a level, every prefix sign and
/// every `^` adds one until a binary operator of lower precedence or a comma
/// ends the chain.
fn nesting_depth(tokens: &[(Token<'_>, Span)]) -> usize {
    let mut chains = vec![0usize];
    let mut after_operand = false;
    let mut max = 0;

    for (token, _) in tokens {
        match token {
            Token::ParenOpen => {
                chains.push(0);
                after_operand = false;
            }
            Token::ParenClose => {
                if chains.len() > 1 {
                    chains.pop();
                }
                after_operand = true;
            }
            Token::Comma => {
                if let Some(chain) = chains.last_mut() {
                    *chain = 0;
                }
                after_operand = false;
            }
            Token::Op(op) => {
                if let Some(chain) = chains.last_mut() {
                    if *op == '^' || !after_operand {
                        *chain += 1;
                    } else {
                        *chain = 0;
                    }
                }
                after_operand = false;
            }
            Token::Number(_) | Token::Ident(_) => after_operand = true,
        }
        let depth = chains.len() - 1 + chains.iter().sum::<usize>();
        max = max.max(depth);
    }
    max
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

fn binary_expr(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary(op, Box::new(lhs), Box::new(rhs))
}

fn parser<'src, I>() -> impl Parser<'src, I, Expr, extra::Err<ParseError<'src, Token<'src>>>>
where
    I: ValueInput<'src, Token = Token<'src>, Span = Span>,
{
    let expr = recursive(|expr| {
        let paren_open = just(Token::ParenOpen);
        let paren_close = just(Token::ParenClose);

        let name = select! { Token::Ident(name) => name };
        let number = select! { Token::Number(n) => Expr::Number(n) };

        let call = name
            .then(
                expr.clone()
                    .separated_by(just(Token::Comma))
                    .collect::<Vec<_>>()
                    .delimited_by(paren_open.clone(), paren_close.clone()),
            )
            .map(|(name, args): (&str, Vec<Expr>)| Expr::Call(name.to_string(), args));
        let var = name.map(|name: &str| Expr::Var(name.to_string()));
        let nested = expr.delimited_by(paren_open, paren_close);

        let atom = choice((number, call, var, nested));

        atom.pratt((
            infix(right(4), just(Token::Op('^')), |l, _, r, _| binary_expr(BinOp::Pow, l, r)),
            prefix(3, just(Token::Op('-')), |_, e, _| Expr::Neg(Box::new(e))),
            prefix(3, just(Token::Op('+')), |_, e, _| e),
            infix(left(2), just(Token::Op('*')), |l, _, r, _| binary_expr(BinOp::Mul, l, r)),
            infix(left(2), just(Token::Op('/')), |l, _, r, _| binary_expr(BinOp::Div, l, r)),
            infix(left(2), just(Token::Op('%')), |l, _, r, _| binary_expr(BinOp::Rem, l, r)),
            infix(left(1), just(Token::Op('+')), |l, _, r, _| binary_expr(BinOp::Add, l, r)),
            infix(left(1), just(Token::Op('-')), |l, _, r, _| binary_expr(BinOp::Sub, l, r)),
        ))
    });

    expr.then_ignore(end())
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

fn eval(e: &Expr, env: &BTreeMap<String, Value>) -> Result<Value, FormulaError> {
    match e {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Var(name) => env
            .get(name)
            .cloned()
            .or_else(|| constant(name).map(Value::Number))
            .ok_or_else(|| FormulaError::UnknownVariable(name.clone())),
        Expr::Neg(inner) => Ok(eval(inner, env)?.map(|x| -x)),
        Expr::Binary(op, a, b) => binary(*op, eval(a, env)?, eval(b, env)?),
        Expr::Call(name, args) => {
            let values = args
                .iter()
                .map(|a| eval(a, env))
                .collect::<Result<Vec<_>, _>>()?;
            call(name, values)
        }
    }
}

fn binary(op: BinOp, a: Value, b: Value) -> Result<Value, FormulaError> {
    Ok(match (a, b) {
        (Value::Number(x), Value::Number(y)) => Value::Number(op.apply(x, y)),
        (Value::List(xs), Value::Number(y)) => {
            Value::List(xs.into_iter().map(|x| op.apply(x, y)).collect())
        }
        (Value::Number(x), Value::List(ys)) => {
            Value::List(ys.into_iter().map(|y| op.apply(x, y)).collect())
        }
        (Value::List(xs), Value::List(ys)) => {
            if xs.len() != ys.len() {
                return Err(FormulaError::Shape(xs.len(), ys.len()));
            }
            Value::List(xs.into_iter().zip(ys).map(|(x, y)| op.apply(x, y)).collect())
        }
    })
}

fn flatten(args: &[Value]) -> Vec<f64> {
    let mut out = Vec::new();
    for a in args {
        a.flatten_into(&mut out);
    }
    out
}

fn non_empty(name: &str, xs: Vec<f64>) -> Result<Vec<f64>, FormulaError> {
    if xs.is_empty() {
        return Err(FormulaError::EmptyList(name.to_string()));
    }
    Ok(xs)
}

fn one(name: &str, mut args: Vec<Value>) -> Result<Value, FormulaError> {
    if args.len() != 1 {
        return Err(FormulaError::Arity {
            name: name.to_string(),
            expected: "1",
            got: args.len(),
        });
    }
    Ok(args.remove(0))
}

fn call(name: &str, args: Vec<Value>) -> Result<Value, FormulaError> {
    match name {
        "sum" => Ok(Value::Number(flatten(&args).iter().sum())),
        "count" => Ok(Value::Number(flatten(&args).len() as f64)),
        "mean" | "avg" => {
            let xs = non_empty(name, flatten(&args))?;
            Ok(Value::Number(xs.iter().sum::<f64>() / xs.len() as f64))
        }
        "min" => {
            let xs = non_empty(name, flatten(&args))?;
            Ok(Value::Number(xs.into_iter().fold(f64::INFINITY, f64::min)))
        }
        "max" => {
            let xs = non_empty(name, flatten(&args))?;
            Ok(Value::Number(xs.into_iter().fold(f64::NEG_INFINITY, f64::max)))
        }
        "median" => {
            let mut xs = non_empty(name, flatten(&args))?;
            xs.sort_by(|a, b| a.total_cmp(b));
            let mid = xs.len() / 2;
            Ok(Value::Number(if xs.len() % 2 == 0 {
                (xs[mid - 1] + xs[mid]) / 2.0
            } else {
                xs[mid]
            }))
        }
        "std" => {
            // Sample standard deviation (n - 1).
            let xs = non_empty(name, flatten(&args))?;
            if xs.len() < 2 {
                return Ok(Value::Number(0.0));
            }
            let mean = xs.iter().sum::<f64>() / xs.len() as f64;
            let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (xs.len() - 1) as f64;
            Ok(Value::Number(var.sqrt()))
        }
        "abs" => Ok(one(name, args)?.map(f64::abs)),
        "sqrt" => Ok(one(name, args)?.map(f64::sqrt)),
        "floor" => Ok(one(name, args)?.map(f64::floor)),
        "ceil" => Ok(one(name, args)?.map(f64::ceil)),
        "exp" => Ok(one(name, args)?.map(f64::exp)),
        "ln" | "log" => Ok(one(name, args)?.map(f64::ln)),
        "log10" => Ok(one(name, args)?.map(f64::log10)),
        "round" => match args.len() {
            1 => Ok(one(name, args)?.map(f64::round)),
            2 => {
                let mut it = args.into_iter();
                let (x, d) = (it.next(), it.next());
                let digits = match d {
                    Some(Value::Number(d)) => d,
                    _ => {
                        return Err(FormulaError::Arity {
                            name: name.to_string(),
                            expected: "a scalar digit count as second",
                            got: 2,
                        })
                    }
                };
                let factor = 10f64.powi(digits as i32);
                Ok(x.map(|v| v.map(|x| (x * factor).round() / factor))
                    .unwrap_or(Value::Number(f64::NAN)))
            }
            got => Err(FormulaError::Arity {
                name: name.to_string(),
                expected: "1 or 2",
                got,
            }),
        },
        "pow" => {
            if args.len() != 2 {
                return Err(FormulaError::Arity {
                    name: name.to_string(),
                    expected: "2",
                    got: args.len(),
                });
            }
            let mut it = args.into_iter();
            match (it.next(), it.next()) {
                (Some(a), Some(b)) => binary(BinOp::Pow, a, b),
                _ => Err(FormulaError::UnknownFunction(name.to_string())),
            }
        }
        _ => Err(FormulaError::UnknownFunction(name.to_string())),
    }
}
