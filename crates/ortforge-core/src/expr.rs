//! Arithmetic expressions and predicates over named real variables.
//!
//! Used for logic-engine expressions and constraints and for the symbolic
//! forms in a rendering payload. The grammar is small on purpose:
//!
//! ```text
//! predicate  := conjunct (("||" | "or" | "∨") conjunct)*
//! conjunct   := negation (("&&" | "and" | "∧") negation)*
//! negation   := ("!" | "¬") negation | comparison | "(" predicate ")"
//! comparison := expr (cmp expr)+            -- chains: 0 < x < 1
//! expr       := term (("+" | "-") term)*
//! term       := unary (("*" | "/") unary)*
//! unary      := "-" unary | power
//! power      := atom ("^" unary)?
//! atom       := number | func "(" expr ("," expr)* ")" | "√" atom | ident | "(" expr ")"
//! number     := (digits ("." digits)? | "." digits) (("e" | "E") ("+" | "-")? digits)?
//! ```
//!
//! Nesting (parentheses, prefix operators, exponents) is capped at
//! [`MAX_DEPTH`] levels so hostile input fails as a syntax error.

use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet};

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{alpha1, alphanumeric1, char as pchar, digit1, multispace0, one_of},
    combinator::{all_consuming, map, map_res, not, opt, recognize},
    multi::{many0, many0_count, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};
use thiserror::Error;

/// Failure to parse or evaluate an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("syntax error near `{0}`")]
    Syntax(String),

    #[error("unknown variable `{0}`")]
    UnknownVariable(String),

    #[error("`{function}` takes {expected} argument(s), got {got}")]
    Arity {
        function: String,
        expected: usize,
        got: usize,
    },

    #[error("result is not a finite number")]
    NonFinite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Sqrt,
    Abs,
    Ln,
    Log,
    Exp,
    Min,
    Max,
}

impl Func {
    fn lookup(name: &str) -> Option<Func> {
        match name {
            "sqrt" => Some(Func::Sqrt),
            "abs" => Some(Func::Abs),
            "ln" => Some(Func::Ln),
            "log" => Some(Func::Log),
            "exp" => Some(Func::Exp),
            "min" => Some(Func::Min),
            "max" => Some(Func::Max),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Func::Sqrt => "sqrt",
            Func::Abs => "abs",
            Func::Ln => "ln",
            Func::Log => "log",
            Func::Exp => "exp",
            Func::Min => "min",
            Func::Max => "max",
        }
    }

    fn arity(&self) -> usize {
        match self {
            Func::Min | Func::Max => 2,
            _ => 1,
        }
    }
}

/// Arithmetic expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(f64),
    Var(String),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Call(Func, Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

/// Boolean predicate tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `operands[i] ops[i] operands[i + 1]` for every i.
    Chain { operands: Vec<Expr>, ops: Vec<CmpOp> },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

/// Recursion levels the parser enters before giving up.
pub const MAX_DEPTH: usize = 128;

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Holds one parser recursion level until dropped.
struct DepthGuard;

impl DepthGuard {
    fn enter(input: &str) -> Result<Self, nom::Err<nom::error::Error<&str>>> {
        DEPTH.with(|depth| {
            if depth.get() >= MAX_DEPTH {
                return Err(nom::Err::Failure(nom::error::Error::new(
                    input,
                    nom::error::ErrorKind::TooLarge,
                )));
            }
            depth.set(depth.get() + 1);
            Ok(DepthGuard)
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Names that resolve without being declared.
const CONSTANTS: [(&str, f64); 2] = [("pi", std::f64::consts::PI), ("e", std::f64::consts::E)];

pub type Env = BTreeMap<String, f64>;

impl Expr {
    pub fn parse(source: &str) -> Result<Expr, ExprError> {
        finish(source, all_consuming(ws(expr))(source))
    }

    pub fn eval(&self, env: &Env) -> Result<f64, ExprError> {
        let value = match self {
            Expr::Num(n) => *n,
            Expr::Var(name) => match env.get(name) {
                Some(v) => *v,
                None => constant(name).ok_or_else(|| ExprError::UnknownVariable(name.clone()))?,
            },
            Expr::Neg(inner) => -inner.eval(env)?,
            Expr::Binary(op, lhs, rhs) => {
                let (l, r) = (lhs.eval(env)?, rhs.eval(env)?);
                match op {
                    BinOp::Add => l + r,
                    BinOp::Sub => l - r,
                    BinOp::Mul => l * r,
                    BinOp::Div => l / r,
                    BinOp::Pow => l.powf(r),
                }
            }
            Expr::Call(func, args) => {
                if args.len() != func.arity() {
                    return Err(ExprError::Arity {
                        function: func.name().to_string(),
                        expected: func.arity(),
                        got: args.len(),
                    });
                }
                let values = args
                    .iter()
                    .map(|a| a.eval(env))
                    .collect::<Result<Vec<_>, _>>()?;
                match func {
                    Func::Sqrt => values[0].sqrt(),
                    Func::Abs => values[0].abs(),
                    Func::Ln => values[0].ln(),
                    Func::Log => values[0].log10(),
                    Func::Exp => values[0].exp(),
                    Func::Min => values[0].min(values[1]),
                    Func::Max => values[0].max(values[1]),
                }
            }
        };
        if value.is_finite() {
            Ok(value)
        } else {
            Err(ExprError::NonFinite)
        }
    }

    /// Identifiers referenced by the expression, excluding known constants.
    pub fn variables(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Num(_) => {}
            Expr::Var(name) => {
                if constant(name).is_none() {
                    out.insert(name.clone());
                }
            }
            Expr::Neg(inner) => inner.collect_variables(out),
            Expr::Binary(_, l, r) => {
                l.collect_variables(out);
                r.collect_variables(out);
            }
            Expr::Call(_, args) => args.iter().for_each(|a| a.collect_variables(out)),
        }
    }
}

impl Predicate {
    pub fn parse(source: &str) -> Result<Predicate, ExprError> {
        finish(source, all_consuming(ws(predicate))(source))
    }

    /// Evaluate with `tolerance` applied to `=` and `!=`.
    pub fn eval(&self, env: &Env, tolerance: f64) -> Result<bool, ExprError> {
        match self {
            Predicate::Chain { operands, ops } => {
                let values = operands
                    .iter()
                    .map(|e| e.eval(env))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ops.iter().enumerate().all(|(i, op)| {
                    let (l, r) = (values[i], values[i + 1]);
                    match op {
                        CmpOp::Lt => l < r,
                        CmpOp::Le => l <= r,
                        CmpOp::Gt => l > r,
                        CmpOp::Ge => l >= r,
                        CmpOp::Eq => (l - r).abs() <= tolerance,
                        CmpOp::Ne => (l - r).abs() > tolerance,
                    }
                }))
            }
            Predicate::And(l, r) => Ok(l.eval(env, tolerance)? && r.eval(env, tolerance)?),
            Predicate::Or(l, r) => Ok(l.eval(env, tolerance)? || r.eval(env, tolerance)?),
            Predicate::Not(inner) => Ok(!inner.eval(env, tolerance)?),
        }
    }

    pub fn variables(&self) -> BTreeSet<String> {
        match self {
            Predicate::Chain { operands, .. } => {
                operands.iter().flat_map(|e| e.variables()).collect()
            }
            Predicate::And(l, r) | Predicate::Or(l, r) => {
                let mut out = l.variables();
                out.extend(r.variables());
                out
            }
            Predicate::Not(inner) => inner.variables(),
        }
    }
}

fn constant(name: &str) -> Option<f64> {
    CONSTANTS.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
}

fn finish<T>(source: &str, result: IResult<&str, T>) -> Result<T, ExprError> {
    match result {
        Ok((_, value)) => Ok(value),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let near = if e.input.is_empty() { source } else { e.input };
            Err(ExprError::Syntax(near.chars().take(24).collect()))
        }
        Err(nom::Err::Incomplete(_)) => Err(ExprError::Syntax(source.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Parsers
// ---------------------------------------------------------------------------

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

/// A word operator that must not run into an identifier (`and` but not `android`).
fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    terminated(tag(word), not(alt((alphanumeric1, tag("_")))))
}

/// Run `inner` one recursion level deeper.
fn nested<'a, O, F>(mut inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    move |input: &'a str| {
        let _guard = DepthGuard::enter(input)?;
        inner(input)
    }
}

fn number(input: &str) -> IResult<&str, Expr> {
    let mantissa = alt((
        recognize(pair(digit1, opt(pair(pchar('.'), digit1)))),
        recognize(pair(pchar('.'), digit1)),
    ));
    let exponent = tuple((one_of("eE"), opt(one_of("+-")), digit1));
    map_res(recognize(pair(mantissa, opt(exponent))), |s: &str| {
        s.parse::<f64>().map(Expr::Num)
    })(input)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0_count(alt((alphanumeric1, tag("_")))),
    ))(input)
}

fn call_or_var(input: &str) -> IResult<&str, Expr> {
    let (rest, name) = identifier(input)?;
    let (after, args) = opt(delimited(
        ws(pchar('(')),
        separated_list1(pchar(','), ws(expr)),
        pchar(')'),
    ))(rest)?;
    match args {
        Some(args) => match Func::lookup(name) {
            Some(func) => Ok((after, Expr::Call(func, args))),
            None => Err(nom::Err::Failure(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Verify,
            ))),
        },
        None => Ok((rest, Expr::Var(name.to_string()))),
    }
}

fn atom(input: &str) -> IResult<&str, Expr> {
    nested(ws(alt((
        number,
        map(preceded(tag("√"), atom), |e| Expr::Call(Func::Sqrt, vec![e])),
        call_or_var,
        delimited(pchar('('), expr, pchar(')')),
    ))))(input)
}

fn power(input: &str) -> IResult<&str, Expr> {
    let (input, base) = atom(input)?;
    let (input, exponent) = opt(preceded(pchar('^'), unary))(input)?;
    Ok(match exponent {
        Some(exp) => (input, Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exp))),
        None => (input, base),
    })
}

fn unary(input: &str) -> IResult<&str, Expr> {
    nested(alt((
        map(preceded(ws(pchar('-')), unary), |e| Expr::Neg(Box::new(e))),
        power,
    )))(input)
}

fn term(input: &str) -> IResult<&str, Expr> {
    let (input, first) = unary(input)?;
    let (input, rest) = many0(pair(
        alt((
            map(pchar('*'), |_| BinOp::Mul),
            map(pchar('/'), |_| BinOp::Div),
        )),
        unary,
    ))(input)?;
    Ok((input, fold_binary(first, rest)))
}

fn expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = term(input)?;
    let (input, rest) = many0(pair(
        alt((
            map(pchar('+'), |_| BinOp::Add),
            map(pchar('-'), |_| BinOp::Sub),
        )),
        term,
    ))(input)?;
    Ok((input, fold_binary(first, rest)))
}

fn fold_binary(first: Expr, rest: Vec<(BinOp, Expr)>) -> Expr {
    rest.into_iter().fold(first, |acc, (op, rhs)| {
        Expr::Binary(op, Box::new(acc), Box::new(rhs))
    })
}

fn cmp_op(input: &str) -> IResult<&str, CmpOp> {
    alt((
        map(alt((tag("<="), tag("≤"))), |_| CmpOp::Le),
        map(alt((tag(">="), tag("≥"))), |_| CmpOp::Ge),
        map(alt((tag("!="), tag("≠"))), |_| CmpOp::Ne),
        map(alt((tag("=="), tag("="))), |_| CmpOp::Eq),
        map(tag("<"), |_| CmpOp::Lt),
        map(tag(">"), |_| CmpOp::Gt),
    ))(input)
}

fn comparison(input: &str) -> IResult<&str, Predicate> {
    let (input, first) = expr(input)?;
    let (input, links) = many0(pair(ws(cmp_op), expr))(input)?;
    if links.is_empty() {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Verify,
        )));
    }
    let mut operands = vec![first];
    let mut ops = Vec::with_capacity(links.len());
    for (op, operand) in links {
        ops.push(op);
        operands.push(operand);
    }
    Ok((input, Predicate::Chain { operands, ops }))
}

fn negation(input: &str) -> IResult<&str, Predicate> {
    nested(ws(alt((
        map(
            preceded(alt((tag("¬"), terminated(tag("!"), not(tag("="))))), negation),
            |p| Predicate::Not(Box::new(p)),
        ),
        comparison,
        delimited(pchar('('), predicate, pchar(')')),
    ))))(input)
}

fn conjunct(input: &str) -> IResult<&str, Predicate> {
    let (input, first) = negation(input)?;
    let (input, rest) = many0(preceded(
        alt((tag("&&"), tag("∧"), keyword("and"))),
        negation,
    ))(input)?;
    Ok((
        input,
        rest.into_iter()
            .fold(first, |acc, p| Predicate::And(Box::new(acc), Box::new(p))),
    ))
}

fn predicate(input: &str) -> IResult<&str, Predicate> {
    let (input, first) = conjunct(input)?;
    let (input, rest) = many0(preceded(
        alt((tag("||"), tag("∨"), keyword("or"))),
        conjunct,
    ))(input)?;
    Ok((
        input,
        rest.into_iter()
            .fold(first, |acc, p| Predicate::Or(Box::new(acc), Box::new(p))),
    ))
}
