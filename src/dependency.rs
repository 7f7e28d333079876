use std::fmt;

use winnow::ascii::multispace0;
use winnow::combinator::{alt, opt, preceded, repeat, terminated};
use winnow::error::{ContextError, ErrMode, StrContext};
use winnow::prelude::*;
use winnow::token::{any, take_while};

use crate::error::{Error, Result};

/// Version comparison operator in a dependency declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `<`
    Less,
    /// `<=`
    LessEqual,
    /// `=` (also written `==`)
    Equal,
    /// `>=`
    GreaterEqual,
    /// `>`
    Greater,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Operator::Less => "<",
            Operator::LessEqual => "<=",
            Operator::Equal => "=",
            Operator::GreaterEqual => ">=",
            Operator::Greater => ">",
        };
        f.write_str(s)
    }
}

/// One entry of a `Requires:`, `BuildRequires:` or `Provides:` list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dependency {
    /// Capability name (`openssl-devel`, `perl(Foo::Bar)`, `/usr/bin/sh`,
    /// or a whole boolean expression such as `(foo or bar)`).
    pub name: String,
    /// Optional version constraint.
    pub constraint: Option<(Operator, String)>,
}

impl Dependency {
    /// Parse a dependency list. Entries are separated by whitespace and/or
    /// commas.
    ///
    /// # Examples
    ///
    /// ```
    /// use planex::{Dependency, Operator};
    ///
    /// let deps = Dependency::parse_list("ocaml >= 3.12, ocaml-findlib perl(Foo::Bar)").unwrap();
    /// assert_eq!(deps.len(), 3);
    /// assert_eq!(deps[0].name, "ocaml");
    /// assert_eq!(deps[0].constraint, Some((Operator::GreaterEqual, "3.12".to_string())));
    /// assert_eq!(deps[2].name, "perl(Foo::Bar)");
    /// ```
    pub fn parse_list(input: &str) -> Result<Vec<Dependency>> {
        parse_dependency_list()
            .parse(input)
            .map_err(|e| Error::InvalidDependency(format!("{e}")))
    }

    /// The name with any trailing architecture qualifier removed.
    pub fn arch_independent_name(&self) -> &str {
        strip_arch_suffix(&self.name)
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some((op, version)) = &self.constraint {
            write!(f, " {op} {version}")?;
        }
        Ok(())
    }
}

/// Remove an rpm ISA qualifier such as `(x86-64)` from the end of a
/// capability name.
///
/// rpm attaches these to dependencies generated with `%{?_isa}`; consumers
/// matching names across architectures need the bare name.
///
/// # Examples
///
/// ```
/// use planex::strip_arch_suffix;
///
/// assert_eq!(strip_arch_suffix("libfoo(x86-64)"), "libfoo");
/// assert_eq!(strip_arch_suffix("perl(Foo::Bar)"), "perl(Foo::Bar)");
/// ```
pub fn strip_arch_suffix(name: &str) -> &str {
    let Some(open) = name.rfind('(') else {
        return name;
    };
    let Some(inner) = name[open + 1..].strip_suffix(')') else {
        return name;
    };
    let is_isa = inner
        .split_once('-')
        .is_some_and(|(arch, bits)| {
            !arch.is_empty()
                && arch.chars().all(|c| c.is_ascii_alphanumeric())
                && (bits == "32" || bits == "64")
        });
    if is_isa && open > 0 {
        &name[..open]
    } else {
        name
    }
}

// Winnow parsers

fn is_name_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, ',' | '<' | '>' | '=' | '(' | ')')
}

fn is_version_char(c: char) -> bool {
    !c.is_whitespace() && c != ','
}

/// A balanced `( ... )` group, returned verbatim.
fn parse_paren_group<'s>(input: &mut &'s str) -> ModalResult<&'s str> {
    let start = *input;
    '('.parse_next(input)?;
    let mut level = 1usize;
    while level > 0 {
        let c: char = any.parse_next(input)?;
        match c {
            '(' => level += 1,
            ')' => level -= 1,
            _ => {}
        }
    }
    let consumed = start.len() - input.len();
    Ok(&start[..consumed])
}

/// A capability name: plain characters with optional parenthesised
/// qualifiers, or a whole boolean expression in parentheses.
fn parse_name(input: &mut &str) -> ModalResult<String> {
    let mut name = String::new();
    loop {
        let plain: &str = take_while(0.., is_name_char).parse_next(input)?;
        name.push_str(plain);
        if input.starts_with('(') {
            name.push_str(parse_paren_group(input)?);
        } else {
            break;
        }
    }
    if name.is_empty() {
        return Err(ErrMode::Backtrack(ContextError::new()));
    }
    Ok(name)
}

fn parse_operator<'s>() -> impl Parser<&'s str, Operator, ErrMode<ContextError>> {
    alt((
        "<=".value(Operator::LessEqual),
        ">=".value(Operator::GreaterEqual),
        "==".value(Operator::Equal),
        "<".value(Operator::Less),
        ">".value(Operator::Greater),
        "=".value(Operator::Equal),
    ))
}

fn parse_constraint(input: &mut &str) -> ModalResult<(Operator, String)> {
    let op = preceded(multispace0, parse_operator()).parse_next(input)?;
    let version: &str = preceded(multispace0, take_while(1.., is_version_char))
        .context(StrContext::Label("version"))
        .parse_next(input)?;
    Ok((op, version.to_string()))
}

fn parse_dependency(input: &mut &str) -> ModalResult<Dependency> {
    let name = parse_name(input)?;
    let constraint = opt(parse_constraint).parse_next(input)?;
    Ok(Dependency { name, constraint })
}

fn parse_separator(input: &mut &str) -> ModalResult<()> {
    (multispace0, opt(','), multispace0).void().parse_next(input)
}

pub(crate) fn parse_dependency_list<'s>(
) -> impl Parser<&'s str, Vec<Dependency>, ErrMode<ContextError>> {
    move |input: &mut &'s str| {
        parse_separator(input)?;
        let deps: Vec<Dependency> =
            repeat(0.., terminated(parse_dependency, parse_separator)).parse_next(input)?;
        Ok(deps)
    }
}
