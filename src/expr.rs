use std::cmp::Ordering;
use std::fmt;

use winnow::ascii::multispace0;
use winnow::combinator::{alt, cut_err, delimited, opt, preceded, repeat, terminated};
use winnow::error::{ContextError, ErrMode, StrContext};
use winnow::prelude::*;
use winnow::token::take_while;

use crate::error::{Error, Result};

/// Comparison operator inside a `%if` expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CompareOp {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        };
        f.write_str(s)
    }
}

/// A node in a (macro-expanded) `%if` expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// An integer literal.
    Number(i64),
    /// A quoted string or bare word.
    Text(String),
    /// `!expr`
    Not(Box<Expr>),
    /// `lhs && rhs`
    And(Box<Expr>, Box<Expr>),
    /// `lhs || rhs`
    Or(Box<Expr>, Box<Expr>),
    /// `lhs <op> rhs`
    Compare(CompareOp, Box<Expr>, Box<Expr>),
}

/// Result of evaluating an [`Expr`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Integer result.
    Number(i64),
    /// String result.
    Text(String),
}

impl Value {
    /// Zero and the empty string are false; everything else is true.
    pub fn is_true(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0,
            Value::Text(s) => !s.is_empty(),
        }
    }
}

impl Expr {
    /// Parse an already macro-expanded conditional expression.
    ///
    /// # Examples
    ///
    /// ```
    /// use planex::Expr;
    ///
    /// let expr = Expr::parse("0%{?rhel} >= 7 || \"x\" == \"x\"".replace("%{?rhel}", "").as_str()).unwrap();
    /// assert!(expr.evaluate().unwrap().is_true());
    /// ```
    pub fn parse(input: &str) -> Result<Expr> {
        parse_expr_string()
            .parse(input)
            .map_err(|e| Error::InvalidExpression(format!("{e}")))
    }

    /// Evaluate the expression.
    ///
    /// Comparing a number with a string is an error, as it is for rpm.
    pub fn evaluate(&self) -> Result<Value> {
        match self {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Text(s) => Ok(Value::Text(s.clone())),
            Expr::Not(inner) => Ok(bool_value(!inner.evaluate()?.is_true())),
            Expr::And(lhs, rhs) => {
                if !lhs.evaluate()?.is_true() {
                    return Ok(bool_value(false));
                }
                Ok(bool_value(rhs.evaluate()?.is_true()))
            }
            Expr::Or(lhs, rhs) => {
                if lhs.evaluate()?.is_true() {
                    return Ok(bool_value(true));
                }
                Ok(bool_value(rhs.evaluate()?.is_true()))
            }
            Expr::Compare(op, lhs, rhs) => {
                let ordering = match (lhs.evaluate()?, rhs.evaluate()?) {
                    (Value::Number(a), Value::Number(b)) => a.cmp(&b),
                    (Value::Text(a), Value::Text(b)) => a.cmp(&b),
                    (a, b) => {
                        return Err(Error::InvalidExpression(format!(
                            "types must match: {a:?} {op} {b:?}"
                        )))
                    }
                };
                Ok(bool_value(op.holds(ordering)))
            }
        }
    }
}

fn bool_value(b: bool) -> Value {
    Value::Number(i64::from(b))
}

/// Evaluate the condition of an `%if` line. An empty condition is false.
pub fn evaluate_condition(text: &str) -> Result<bool> {
    if text.trim().is_empty() {
        return Ok(false);
    }
    Ok(Expr::parse(text)?.evaluate()?.is_true())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{n}"),
            Expr::Text(s) => write!(f, "\"{s}\""),
            Expr::Not(inner) => write!(f, "!{inner}"),
            Expr::And(lhs, rhs) => write!(f, "({lhs} && {rhs})"),
            Expr::Or(lhs, rhs) => write!(f, "({lhs} || {rhs})"),
            Expr::Compare(op, lhs, rhs) => write!(f, "{lhs} {op} {rhs}"),
        }
    }
}

// Winnow parsers

fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '(' | ')' | '"' | '!' | '=' | '<' | '>' | '&' | '|')
}

fn parse_word<'s>() -> impl Parser<&'s str, Expr, ErrMode<ContextError>> {
    take_while(1.., is_word_char).map(|word: &str| {
        let digits = word.strip_prefix('-').unwrap_or(word);
        if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(n) = word.parse::<i64>() {
                return Expr::Number(n);
            }
        }
        Expr::Text(word.to_string())
    })
}

fn parse_quoted<'s>() -> impl Parser<&'s str, Expr, ErrMode<ContextError>> {
    delimited(
        '"',
        take_while(0.., |c: char| c != '"'),
        cut_err('"').context(StrContext::Label("closing '\"'")),
    )
    .map(|s: &str| Expr::Text(s.to_string()))
}

fn parse_primary(input: &mut &str) -> ModalResult<Expr> {
    preceded(
        multispace0,
        alt((
            delimited(
                '(',
                parse_or,
                cut_err((multispace0, ')')).context(StrContext::Label("closing ')'")),
            ),
            parse_quoted(),
            parse_word(),
        )),
    )
    .parse_next(input)
}

fn parse_unary(input: &mut &str) -> ModalResult<Expr> {
    multispace0.parse_next(input)?;
    if opt('!').parse_next(input)?.is_some() {
        let inner = cut_err(parse_unary).parse_next(input)?;
        return Ok(Expr::Not(Box::new(inner)));
    }
    parse_primary(input)
}

fn parse_compare_op<'s>() -> impl Parser<&'s str, CompareOp, ErrMode<ContextError>> {
    alt((
        "==".value(CompareOp::Eq),
        "!=".value(CompareOp::Ne),
        "<=".value(CompareOp::Le),
        ">=".value(CompareOp::Ge),
        "<".value(CompareOp::Lt),
        ">".value(CompareOp::Gt),
    ))
}

fn parse_compare(input: &mut &str) -> ModalResult<Expr> {
    let lhs = parse_unary(input)?;
    let rhs = opt((
        preceded(multispace0, parse_compare_op()),
        cut_err(parse_unary).context(StrContext::Label("right-hand operand")),
    ))
    .parse_next(input)?;
    Ok(match rhs {
        Some((op, rhs)) => Expr::Compare(op, Box::new(lhs), Box::new(rhs)),
        None => lhs,
    })
}

fn parse_and(input: &mut &str) -> ModalResult<Expr> {
    let first = parse_compare(input)?;
    let rest: Vec<Expr> =
        repeat(0.., preceded((multispace0, "&&"), cut_err(parse_compare))).parse_next(input)?;
    Ok(rest
        .into_iter()
        .fold(first, |acc, e| Expr::And(Box::new(acc), Box::new(e))))
}

fn parse_or(input: &mut &str) -> ModalResult<Expr> {
    let first = parse_and(input)?;
    let rest: Vec<Expr> =
        repeat(0.., preceded((multispace0, "||"), cut_err(parse_and))).parse_next(input)?;
    Ok(rest
        .into_iter()
        .fold(first, |acc, e| Expr::Or(Box::new(acc), Box::new(e))))
}

pub(crate) fn parse_expr_string<'s>() -> impl Parser<&'s str, Expr, ErrMode<ContextError>> {
    terminated(parse_or, multispace0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(s: &str) -> bool {
        evaluate_condition(s).unwrap()
    }

    #[test]
    fn literals() {
        assert!(eval("1"));
        assert!(!eval("0"));
        assert!(!eval(""));
        assert!(eval("\"yes\""));
        assert!(!eval("\"\""));
    }

    #[test]
    fn numeric_comparisons() {
        assert!(eval("07 >= 7"));
        assert!(eval("0 < 1"));
        assert!(!eval("6 == 7"));
        assert!(eval("6 != 7"));
    }

    #[test]
    fn string_comparisons() {
        assert!(eval("\"x86_64\" == \"x86_64\""));
        assert!(eval("\"a\" < \"b\""));
    }

    #[test]
    fn boolean_operators_and_precedence() {
        assert!(eval("1 || 0 && 0"));
        assert!(!eval("(1 || 0) && 0"));
        assert!(eval("!0"));
        assert!(eval("!!1"));
        assert!(eval("0 || !(1 == 2)"));
    }

    #[test]
    fn mixed_types_fail() {
        assert!(evaluate_condition("1 == \"1\"").is_err());
    }

    #[test]
    fn syntax_errors() {
        assert!(evaluate_condition("(1").is_err());
        assert!(evaluate_condition("1 ==").is_err());
        assert!(evaluate_condition("\"open").is_err());
        assert!(evaluate_condition("1 &&").is_err());
    }

    #[test]
    fn parse_tree() {
        let expr = Expr::parse("1 && 2 == 2").unwrap();
        assert_eq!(
            expr,
            Expr::And(
                Box::new(Expr::Number(1)),
                Box::new(Expr::Compare(
                    CompareOp::Eq,
                    Box::new(Expr::Number(2)),
                    Box::new(Expr::Number(2))
                ))
            )
        );
    }
}
