//! Expression API and a small reference expression engine.
//!
//! Rule reports carry extents (boolean predicates) and corrections (values)
//! as expression text. The engine only needs the [`Expression`] trait; the
//! parser in this module covers a compact language:
//!
//! - literals: `12`, `-3`, `273.15`, `1e-3`, `'text'`, `"text"`, `true`, `false`
//! - data access: `int(path)`, `float(path)`, `str(path)`
//! - position: `filename()`, `index()`
//! - operators: `==`, `!=`, `<`, `<=`, `>`, `>=`, `!`, unary `-`, `&&`, `||`
//!   and parentheses
//!
//! Paths are absolute (`/a/b[2]@units`) or relative to the cursor the
//! expression is evaluated at (`.`, `..`, `./x`, `../x`). Data access goes
//! through the ordinary cursor reads, so it is subject to the product's read
//! hook like any other read.

use crate::cursor::Cursor;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char as pchar, digit1, multispace0, one_of, satisfy},
    combinator::{all_consuming, map, map_res, opt, recognize, value},
    error::{Error as NomError, ErrorKind},
    multi::many0,
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};
use qiap_error::{QiapError, Result};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Static result type of an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ExpressionType {
    Boolean,
    Integer,
    Float,
    String,
}

impl ExpressionType {
    pub fn name(self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::String => "string",
        }
    }
}

impl fmt::Display for ExpressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub trait Expression: fmt::Debug + Send + Sync {
    fn result_type(&self) -> ExpressionType;

    /// Source text the expression was parsed from.
    fn text(&self) -> &str;

    fn eval_bool(&self, cursor: &Cursor<'_>) -> Result<bool>;

    fn eval_integer(&self, cursor: &Cursor<'_>) -> Result<i64>;

    /// Integer expressions are widened.
    fn eval_float(&self, cursor: &Cursor<'_>) -> Result<f64>;

    fn eval_string(&self, cursor: &Cursor<'_>) -> Result<String>;
}

/// Parse `text` with the reference engine.
pub fn parse_expression(text: &str) -> Result<Arc<dyn Expression>> {
    let root = match all_consuming(terminated(or_expr, multispace0))(text) {
        Ok((_, root)) => root,
        Err(nom::Err::Error(err) | nom::Err::Failure(err)) => {
            return Err(syntax_error(text, err.input))
        }
        Err(nom::Err::Incomplete(_)) => return Err(syntax_error(text, "")),
    };
    let ty = type_of(&root)?;
    Ok(Arc::new(SimpleExpression {
        text: text.to_string(),
        root,
        ty,
    }))
}

// ============================================================================
// AST
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone)]
enum Expr {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    ReadInt(String),
    ReadFloat(String),
    ReadStr(String),
    Filename,
    Index,
    Neg(Box<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
enum Val {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

fn type_of(expr: &Expr) -> Result<ExpressionType> {
    use ExpressionType as T;
    Ok(match expr {
        Expr::Bool(_) => T::Boolean,
        Expr::Int(_) | Expr::ReadInt(_) | Expr::Index => T::Integer,
        Expr::Float(_) | Expr::ReadFloat(_) => T::Float,
        Expr::Str(_) | Expr::ReadStr(_) | Expr::Filename => T::String,
        Expr::Neg(inner) => match type_of(inner)? {
            t @ (T::Integer | T::Float) => t,
            t => return Err(QiapError::expression(format!("cannot negate a {t}"))),
        },
        Expr::Not(inner) => match type_of(inner)? {
            T::Boolean => T::Boolean,
            t => return Err(QiapError::expression(format!("cannot apply '!' to a {t}"))),
        },
        Expr::And(a, b) | Expr::Or(a, b) => match (type_of(a)?, type_of(b)?) {
            (T::Boolean, T::Boolean) => T::Boolean,
            (l, r) => {
                return Err(QiapError::expression(format!(
                    "logical operator needs booleans, found {l} and {r}"
                )))
            }
        },
        Expr::Cmp(op, a, b) => {
            let (l, r) = (type_of(a)?, type_of(b)?);
            let numeric = |t: ExpressionType| matches!(t, T::Integer | T::Float);
            let ok = (numeric(l) && numeric(r))
                || (l == r && l == T::String)
                || (l == r && l == T::Boolean && matches!(op, CmpOp::Eq | CmpOp::Ne));
            if !ok {
                return Err(QiapError::expression(format!("cannot compare {l} with {r}")));
            }
            T::Boolean
        }
    })
}

#[derive(Debug)]
struct SimpleExpression {
    text: String,
    root: Expr,
    ty: ExpressionType,
}

impl SimpleExpression {
    fn eval(&self, expr: &Expr, cursor: &Cursor<'_>) -> Result<Val> {
        Ok(match expr {
            Expr::Bool(v) => Val::Bool(*v),
            Expr::Int(v) => Val::Int(*v),
            Expr::Float(v) => Val::Float(*v),
            Expr::Str(v) => Val::Str(v.clone()),
            Expr::ReadInt(path) => Val::Int(at(cursor, path)?.read_int64()?),
            Expr::ReadFloat(path) => Val::Float(at(cursor, path)?.read_double()?),
            Expr::ReadStr(path) => Val::Str(at(cursor, path)?.read_string()?),
            Expr::Filename => Val::Str(cursor.product().filename().to_string()),
            Expr::Index => Val::Int(cursor.index()),
            Expr::Neg(inner) => match self.eval(inner, cursor)? {
                Val::Int(v) => Val::Int(v.wrapping_neg()),
                Val::Float(v) => Val::Float(-v),
                other => return Err(mistyped(&other)),
            },
            Expr::Not(inner) => Val::Bool(!self.eval_to_bool(inner, cursor)?),
            Expr::And(a, b) => {
                Val::Bool(self.eval_to_bool(a, cursor)? && self.eval_to_bool(b, cursor)?)
            }
            Expr::Or(a, b) => {
                Val::Bool(self.eval_to_bool(a, cursor)? || self.eval_to_bool(b, cursor)?)
            }
            Expr::Cmp(op, a, b) => {
                let l = self.eval(a, cursor)?;
                let r = self.eval(b, cursor)?;
                Val::Bool(compare(*op, &l, &r)?)
            }
        })
    }

    fn eval_to_bool(&self, expr: &Expr, cursor: &Cursor<'_>) -> Result<bool> {
        match self.eval(expr, cursor)? {
            Val::Bool(v) => Ok(v),
            other => Err(mistyped(&other)),
        }
    }

    fn expect(&self, wanted: ExpressionType) -> Result<()> {
        if self.ty != wanted {
            return Err(QiapError::expression(format!(
                "'{}' is a {} expression, not {}",
                self.text, self.ty, wanted
            )));
        }
        Ok(())
    }
}

impl Expression for SimpleExpression {
    fn result_type(&self) -> ExpressionType {
        self.ty
    }

    fn text(&self) -> &str {
        &self.text
    }

    fn eval_bool(&self, cursor: &Cursor<'_>) -> Result<bool> {
        self.expect(ExpressionType::Boolean)?;
        self.eval_to_bool(&self.root, cursor)
    }

    fn eval_integer(&self, cursor: &Cursor<'_>) -> Result<i64> {
        self.expect(ExpressionType::Integer)?;
        match self.eval(&self.root, cursor)? {
            Val::Int(v) => Ok(v),
            other => Err(mistyped(&other)),
        }
    }

    fn eval_float(&self, cursor: &Cursor<'_>) -> Result<f64> {
        match self.eval(&self.root, cursor)? {
            Val::Float(v) => Ok(v),
            Val::Int(v) => Ok(v as f64),
            other => Err(mistyped(&other)),
        }
    }

    fn eval_string(&self, cursor: &Cursor<'_>) -> Result<String> {
        self.expect(ExpressionType::String)?;
        match self.eval(&self.root, cursor)? {
            Val::Str(v) => Ok(v),
            other => Err(mistyped(&other)),
        }
    }
}

fn at<'p>(cursor: &Cursor<'p>, path: &str) -> Result<Cursor<'p>> {
    let mut target = cursor.clone();
    target.goto(path)?;
    Ok(target)
}

fn mistyped(value: &Val) -> QiapError {
    QiapError::expression(format!("unexpected value {value:?}"))
}

fn compare(op: CmpOp, l: &Val, r: &Val) -> Result<bool> {
    use std::cmp::Ordering;
    let ordering = match (l, r) {
        (Val::Int(a), Val::Int(b)) => a.cmp(b),
        (Val::Str(a), Val::Str(b)) => a.cmp(b),
        (Val::Bool(a), Val::Bool(b)) => a.cmp(b),
        (Val::Int(_) | Val::Float(_), Val::Int(_) | Val::Float(_)) => {
            let (a, b) = (as_f64(l), as_f64(r));
            match a.partial_cmp(&b) {
                Some(ordering) => ordering,
                // NaN compares unequal to everything
                None => return Ok(op == CmpOp::Ne),
            }
        }
        _ => {
            return Err(QiapError::expression(format!(
                "cannot compare {l:?} with {r:?}"
            )))
        }
    };
    Ok(match op {
        CmpOp::Eq => ordering == Ordering::Equal,
        CmpOp::Ne => ordering != Ordering::Equal,
        CmpOp::Lt => ordering == Ordering::Less,
        CmpOp::Le => ordering != Ordering::Greater,
        CmpOp::Gt => ordering == Ordering::Greater,
        CmpOp::Ge => ordering != Ordering::Less,
    })
}

fn as_f64(value: &Val) -> f64 {
    match value {
        Val::Int(v) => *v as f64,
        Val::Float(v) => *v,
        _ => f64::NAN,
    }
}

// ============================================================================
// Parser
// ============================================================================

fn ws<'a, O>(
    inner: impl FnMut(&'a str) -> IResult<&'a str, O>,
) -> impl FnMut(&'a str) -> IResult<&'a str, O> {
    preceded(multispace0, inner)
}

fn parens<'a, O>(
    inner: impl FnMut(&'a str) -> IResult<&'a str, O>,
) -> impl FnMut(&'a str) -> IResult<&'a str, O> {
    delimited(ws(pchar('(')), inner, ws(pchar(')')))
}

fn or_expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = and_expr(input)?;
    let (input, rest) = many0(preceded(ws(tag("||")), and_expr))(input)?;
    let expr = rest
        .into_iter()
        .fold(first, |left, right| Expr::Or(Box::new(left), Box::new(right)));
    Ok((input, expr))
}

fn and_expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = cmp_expr(input)?;
    let (input, rest) = many0(preceded(ws(tag("&&")), cmp_expr))(input)?;
    let expr = rest
        .into_iter()
        .fold(first, |left, right| Expr::And(Box::new(left), Box::new(right)));
    Ok((input, expr))
}

fn cmp_op(input: &str) -> IResult<&str, CmpOp> {
    alt((
        value(CmpOp::Eq, tag("==")),
        value(CmpOp::Ne, tag("!=")),
        value(CmpOp::Le, tag("<=")),
        value(CmpOp::Ge, tag(">=")),
        value(CmpOp::Lt, tag("<")),
        value(CmpOp::Gt, tag(">")),
    ))(input)
}

/// Comparisons do not chain: `a < b < c` is rejected.
fn cmp_expr(input: &str) -> IResult<&str, Expr> {
    let (input, left) = unary_expr(input)?;
    let (input, tail) = opt(pair(ws(cmp_op), unary_expr))(input)?;
    let expr = match tail {
        Some((op, right)) => Expr::Cmp(op, Box::new(left), Box::new(right)),
        None => left,
    };
    Ok((input, expr))
}

fn unary_expr(input: &str) -> IResult<&str, Expr> {
    alt((
        map(preceded(ws(pchar('!')), unary_expr), |inner| {
            Expr::Not(Box::new(inner))
        }),
        map(preceded(ws(pchar('-')), unary_expr), negate),
        primary_expr,
    ))(input)
}

fn negate(expr: Expr) -> Expr {
    match expr {
        Expr::Int(v) => Expr::Int(v.wrapping_neg()),
        Expr::Float(v) => Expr::Float(-v),
        other => Expr::Neg(Box::new(other)),
    }
}

fn primary_expr(input: &str) -> IResult<&str, Expr> {
    preceded(
        multispace0,
        alt((parens(or_expr), string_literal, number_literal, call_expr)),
    )(input)
}

fn string_literal(input: &str) -> IResult<&str, Expr> {
    map(
        alt((
            delimited(pchar('\''), take_while(|c: char| c != '\''), pchar('\'')),
            delimited(pchar('"'), take_while(|c: char| c != '"'), pchar('"')),
        )),
        |body: &str| Expr::Str(body.to_string()),
    )(input)
}

fn number_literal(input: &str) -> IResult<&str, Expr> {
    map_res(
        recognize(pair(
            take_while1(|c: char| c.is_ascii_digit() || c == '.'),
            opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
        )),
        |literal: &str| -> std::result::Result<Expr, String> {
            if literal.contains(['.', 'e', 'E']) {
                literal.parse().map(Expr::Float).map_err(|err| format!("{err}"))
            } else {
                literal.parse().map(Expr::Int).map_err(|err| format!("{err}"))
            }
        },
    )(input)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_ascii_alphabetic()),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))(input)
}

/// `true`, `false` or a function call. Unknown functions and bad argument
/// counts are hard failures so the reported offset points at the call.
fn call_expr(input: &str) -> IResult<&str, Expr> {
    let start = input;
    let (input, name) = identifier(input)?;
    match name {
        "true" => return Ok((input, Expr::Bool(true))),
        "false" => return Ok((input, Expr::Bool(false))),
        _ => {}
    }
    let (input, argument) = parens(take_while(|c: char| c != ')'))(input)?;
    let argument = argument.trim();
    let expr = match (name, argument.is_empty()) {
        ("int", false) => Expr::ReadInt(argument.to_string()),
        ("float", false) => Expr::ReadFloat(argument.to_string()),
        ("str", false) => Expr::ReadStr(argument.to_string()),
        ("filename", true) => Expr::Filename,
        ("index", true) => Expr::Index,
        _ => {
            return Err(nom::Err::Failure(NomError::new(start, ErrorKind::Verify)));
        }
    };
    Ok((input, expr))
}

fn syntax_error(text: &str, remaining: &str) -> QiapError {
    if remaining.trim().is_empty() {
        return QiapError::expression(format!("unexpected end of expression in '{text}'"));
    }
    let offset = text.len() - remaining.len();
    QiapError::expression(format!(
        "unexpected '{remaining}' at offset {offset} in '{text}'"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::Product;
    use crate::types::{DataType, NativeType};
    use crate::value::Node;
    use approx::assert_relative_eq;

    fn product() -> Product {
        let ty = DataType::record(vec![
            ("count", DataType::integer(NativeType::Int32)),
            ("values", DataType::array(DataType::real(NativeType::Double))),
            ("mode", DataType::text()),
        ]);
        let root = Node::record(vec![
            Node::int(4),
            Node::array(vec![Node::real(0.5), Node::real(-2.0)]),
            Node::text("FAST"),
        ]);
        Product::new("/data/MER_RR_2P.N1", ty, root)
    }

    #[test]
    fn test_literal_types() {
        assert_eq!(parse_expression("273.15").unwrap().result_type(), ExpressionType::Float);
        assert_eq!(parse_expression("-12").unwrap().result_type(), ExpressionType::Integer);
        assert_eq!(parse_expression("'x'").unwrap().result_type(), ExpressionType::String);
        assert_eq!(parse_expression("true").unwrap().result_type(), ExpressionType::Boolean);
    }

    #[test]
    fn test_literal_values() {
        let product = product();
        let cursor = product.cursor();
        assert_relative_eq!(parse_expression("273.15").unwrap().eval_float(&cursor).unwrap(), 273.15);
        assert_eq!(parse_expression("-12").unwrap().eval_integer(&cursor).unwrap(), -12);
        assert_eq!(parse_expression("\"ab\"").unwrap().eval_string(&cursor).unwrap(), "ab");
    }

    #[test]
    fn test_data_access_and_logic() {
        let product = product();
        let cursor = product.cursor();
        let expr = parse_expression("int(/count) > 3 && str(/mode) == 'FAST'").unwrap();
        assert!(expr.eval_bool(&cursor).unwrap());
        let expr = parse_expression("!(float(/values[1]) < 0.0) || false").unwrap();
        assert!(!expr.eval_bool(&cursor).unwrap());
    }

    #[test]
    fn test_relative_paths_and_index() {
        let product = product();
        let mut cursor = product.cursor();
        cursor.goto("/values[1]").unwrap();
        assert!(parse_expression("index() == 1").unwrap().eval_bool(&cursor).unwrap());
        assert!(parse_expression("float(.) == -2.0").unwrap().eval_bool(&cursor).unwrap());
        assert!(parse_expression("int(../../count) == 4").unwrap().eval_bool(&cursor).unwrap());
        assert_eq!(
            parse_expression("filename()").unwrap().eval_string(&cursor).unwrap(),
            "/data/MER_RR_2P.N1"
        );
    }

    #[test]
    fn test_type_errors() {
        assert!(parse_expression("1 && true").is_err());
        assert!(parse_expression("'a' < 2").is_err());
        assert!(parse_expression("!3").is_err());
        assert!(parse_expression("int()").is_err());
        assert!(parse_expression("foo(1)").is_err());
        assert!(parse_expression("1 2").is_err());

        let product = product();
        let cursor = product.cursor();
        let float = parse_expression("1.5").unwrap();
        assert!(float.eval_integer(&cursor).is_err());
        let int = parse_expression("2").unwrap();
        assert_relative_eq!(int.eval_float(&cursor).unwrap(), 2.0);
    }

    #[test]
    fn test_whitespace_and_precedence() {
        let product = product();
        let cursor = product.cursor();
        let expr = parse_expression("  int(/count)==4||false&&false ").unwrap();
        assert!(expr.eval_bool(&cursor).unwrap());
        let expr = parse_expression("( index ( ) < 0 ) && - 1 < 0").unwrap();
        assert!(expr.eval_bool(&cursor).unwrap());
        assert_relative_eq!(parse_expression("1e-3").unwrap().eval_float(&cursor).unwrap(), 1e-3);
    }

    #[test]
    fn test_syntax_errors_report_offset() {
        let err = parse_expression("1 2").unwrap_err().to_string();
        assert!(err.contains("offset 2"), "{err}");
        let err = parse_expression("index() > ").unwrap_err().to_string();
        assert!(err.contains("offset 8"), "{err}");
        let err = parse_expression("int(/count) == foo(1)").unwrap_err().to_string();
        assert!(err.contains("offset 15"), "{err}");
        assert!(parse_expression("'open").is_err());
        assert!(parse_expression("1 < 2 < 3").is_err());
        assert!(parse_expression("").is_err());
    }
}
