//! Nom grammar for the expression language.
//!
//! ```text
//! expression  := conditional
//! conditional := or ( "?" expression ":" expression )?
//! or          := and ( ("||" | "??") and )*
//! and         := equality ( "&&" equality )*
//! equality    := comparison ( ("===" | "!==" | "==" | "!=") comparison )*
//! comparison  := additive ( ("<=" | ">=" | "<" | ">") additive )*
//! additive    := term ( ("+" | "-") term )*
//! term        := unary ( ("*" | "/" | "%") unary )*
//! unary       := ("!" | "-" | "+") unary | postfix
//! postfix     := primary ( "." ident | "[" expression "]" | "(" args ")" )*
//! primary     := number | string | array | object | "(" expression ")" | ident
//! ```

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{char, digit0, digit1, multispace0, one_of, satisfy},
    combinator::{all_consuming, map, map_res, opt, recognize, value},
    error::{Error, ErrorKind},
    multi::{fold_many0, separated_list0},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};
use serde_json::Value;

use crate::error::EvalError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    Coalesce,
    And,
    StrictEq,
    StrictNe,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Ident(String),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
}

/// Deepest bracket, unary and conditional nesting accepted by [`parse_expression`].
pub const MAX_NESTING: usize = 32;
/// Most binary operators and postfix accesses accepted in one expression.
pub const MAX_OPERATORS: usize = 256;

/// Parse expression source text into an [`Expr`].
pub fn parse_expression(source: &str) -> Result<Expr, EvalError> {
    check_complexity(source)?;
    match all_consuming(ws(expression))(source) {
        Ok((_, expr)) => Ok(expr),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(EvalError::Syntax {
            expression: source.to_string(),
            offset: source.len() - e.input.len(),
            message: describe(&e),
        }),
        Err(nom::Err::Incomplete(_)) => Err(EvalError::Syntax {
            expression: source.to_string(),
            offset: source.len(),
            message: "unexpected end of expression".to_string(),
        }),
    }
}

/// Reject sources whose parse or evaluation would recurse too deeply, before
/// any recursive descent starts.
fn check_complexity(source: &str) -> Result<(), EvalError> {
    struct Level {
        base: usize,
        conditionals: usize,
    }

    let too_complex = |offset: usize, message: String| EvalError::Syntax {
        expression: source.to_string(),
        offset,
        message,
    };

    let mut levels = vec![Level { base: 0, conditionals: 0 }];
    let mut unary_run = 0;
    let mut operators = 0;
    let mut after_operand = false;
    let mut chars = source.char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        match c {
            '\'' | '"' => {
                let mut escaped = false;
                for (_, s) in chars.by_ref() {
                    match s {
                        _ if escaped => escaped = false,
                        '\\' => escaped = true,
                        _ if s == c => break,
                        _ => {}
                    }
                }
                after_operand = true;
                unary_run = 0;
            }
            '(' | '[' | '{' => {
                if after_operand {
                    operators += 1;
                }
                levels.push(Level {
                    base: unary_run + 1,
                    conditionals: 0,
                });
                unary_run = 0;
                after_operand = false;
            }
            ')' | ']' | '}' => {
                if levels.len() > 1 {
                    levels.pop();
                }
                after_operand = true;
            }
            '?' if chars.peek().map(|(_, n)| *n) == Some('?') => {
                chars.next();
                operators += 1;
                after_operand = false;
            }
            '?' => {
                if let Some(level) = levels.last_mut() {
                    level.conditionals += 1;
                }
                after_operand = false;
            }
            '!' | '-' | '+' if !after_operand => unary_run += 1,
            '!' | '-' | '+' | '*' | '/' | '%' | '<' | '>' | '=' | '&' | '|' | '.' => {
                if after_operand {
                    operators += 1;
                }
                after_operand = false;
            }
            ':' | ',' => after_operand = false,
            c if c.is_whitespace() => {}
            _ => {
                after_operand = true;
                unary_run = 0;
            }
        }

        let nesting: usize = levels
            .iter()
            .map(|level| level.base + level.conditionals)
            .sum::<usize>()
            + unary_run;
        if nesting > MAX_NESTING {
            return Err(too_complex(
                offset,
                format!("expression nests deeper than {} levels", MAX_NESTING),
            ));
        }
        if operators > MAX_OPERATORS {
            return Err(too_complex(
                offset,
                format!("expression has more than {} operators", MAX_OPERATORS),
            ));
        }
    }
    Ok(())
}

fn describe(e: &Error<&str>) -> String {
    match e.input.chars().next() {
        Some(c) => format!("unexpected '{}'", c),
        None => "unexpected end of expression".to_string(),
    }
}

/// Surround a parser with optional whitespace.
fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary(op, Box::new(lhs), Box::new(rhs))
}

fn expression(input: &str) -> IResult<&str, Expr> {
    conditional(input)
}

fn conditional(input: &str) -> IResult<&str, Expr> {
    let (input, test) = or_expr(input)?;
    let (input, branches) = opt(tuple((
        ws(char('?')),
        expression,
        ws(char(':')),
        expression,
    )))(input)?;
    match branches {
        Some((_, then, _, otherwise)) => Ok((
            input,
            Expr::Conditional(Box::new(test), Box::new(then), Box::new(otherwise)),
        )),
        None => Ok((input, test)),
    }
}

fn or_expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = and_expr(input)?;
    fold_many0(
        pair(
            ws(alt((
                value(BinaryOp::Or, tag("||")),
                value(BinaryOp::Coalesce, tag("??")),
            ))),
            and_expr,
        ),
        move || first.clone(),
        |acc, (op, rhs)| binary(op, acc, rhs),
    )(input)
}

fn and_expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = equality(input)?;
    fold_many0(
        pair(ws(value(BinaryOp::And, tag("&&"))), equality),
        move || first.clone(),
        |acc, (op, rhs)| binary(op, acc, rhs),
    )(input)
}

fn equality(input: &str) -> IResult<&str, Expr> {
    let (input, first) = comparison(input)?;
    fold_many0(
        pair(
            ws(alt((
                value(BinaryOp::StrictEq, tag("===")),
                value(BinaryOp::StrictNe, tag("!==")),
                value(BinaryOp::Eq, tag("==")),
                value(BinaryOp::Ne, tag("!=")),
            ))),
            comparison,
        ),
        move || first.clone(),
        |acc, (op, rhs)| binary(op, acc, rhs),
    )(input)
}

fn comparison(input: &str) -> IResult<&str, Expr> {
    let (input, first) = additive(input)?;
    fold_many0(
        pair(
            ws(alt((
                value(BinaryOp::Le, tag("<=")),
                value(BinaryOp::Ge, tag(">=")),
                value(BinaryOp::Lt, tag("<")),
                value(BinaryOp::Gt, tag(">")),
            ))),
            additive,
        ),
        move || first.clone(),
        |acc, (op, rhs)| binary(op, acc, rhs),
    )(input)
}

fn additive(input: &str) -> IResult<&str, Expr> {
    let (input, first) = term(input)?;
    fold_many0(
        pair(
            ws(alt((
                value(BinaryOp::Add, char('+')),
                value(BinaryOp::Sub, char('-')),
            ))),
            term,
        ),
        move || first.clone(),
        |acc, (op, rhs)| binary(op, acc, rhs),
    )(input)
}

fn term(input: &str) -> IResult<&str, Expr> {
    let (input, first) = unary(input)?;
    fold_many0(
        pair(
            ws(alt((
                value(BinaryOp::Mul, char('*')),
                value(BinaryOp::Div, char('/')),
                value(BinaryOp::Rem, char('%')),
            ))),
            unary,
        ),
        move || first.clone(),
        |acc, (op, rhs)| binary(op, acc, rhs),
    )(input)
}

fn unary(input: &str) -> IResult<&str, Expr> {
    alt((
        map(
            pair(
                ws(alt((
                    value(UnaryOp::Not, char('!')),
                    value(UnaryOp::Neg, char('-')),
                    value(UnaryOp::Plus, char('+')),
                ))),
                unary,
            ),
            |(op, operand)| Expr::Unary(op, Box::new(operand)),
        ),
        postfix,
    ))(input)
}

enum Suffix {
    Member(String),
    Index(Expr),
    Call(Vec<Expr>),
}

fn postfix(input: &str) -> IResult<&str, Expr> {
    let (input, base) = primary(input)?;
    fold_many0(
        alt((
            map(preceded(ws(char('.')), identifier), |name: &str| {
                Suffix::Member(name.to_string())
            }),
            map(
                delimited(ws(char('[')), expression, ws(char(']'))),
                Suffix::Index,
            ),
            map(
                delimited(ws(char('(')), list(expression), ws(char(')'))),
                Suffix::Call,
            ),
        )),
        move || base.clone(),
        |acc, suffix| match suffix {
            Suffix::Member(name) => Expr::Member(Box::new(acc), name),
            Suffix::Index(index) => Expr::Index(Box::new(acc), Box::new(index)),
            Suffix::Call(args) => Expr::Call(Box::new(acc), args),
        },
    )(input)
}

fn primary(input: &str) -> IResult<&str, Expr> {
    ws(alt((
        number,
        map(string_literal, |s| Expr::Literal(Value::String(s))),
        map(
            delimited(char('['), list(expression), ws(char(']'))),
            Expr::Array,
        ),
        map(
            delimited(char('{'), list(object_entry), ws(char('}'))),
            Expr::Object,
        ),
        delimited(char('('), ws(expression), char(')')),
        map(identifier, keyword_or_ident),
    )))(input)
}

/// Comma-separated items, trailing comma allowed.
fn list<'a, O, F>(item: F) -> impl FnMut(&'a str) -> IResult<&'a str, Vec<O>>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    terminated(separated_list0(ws(char(',')), item), opt(ws(char(','))))
}

fn object_entry(input: &str) -> IResult<&str, (String, Expr)> {
    let (input, key) = ws(alt((
        string_literal,
        map(identifier, str::to_string),
        map(digit1, str::to_string),
    )))(input)?;
    let (input, value) = opt(preceded(ws(char(':')), expression))(input)?;
    let value = value.unwrap_or_else(|| Expr::Ident(key.clone()));
    Ok((input, (key, value)))
}

fn keyword_or_ident(name: &str) -> Expr {
    match name {
        "true" => Expr::Literal(Value::Bool(true)),
        "false" => Expr::Literal(Value::Bool(false)),
        "null" | "undefined" => Expr::Literal(Value::Null),
        other => Expr::Ident(other.to_string()),
    }
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c: char| c.is_alphabetic() || c == '_' || c == '$'),
        take_while(|c: char| c.is_alphanumeric() || c == '_' || c == '$'),
    ))(input)
}

fn number(input: &str) -> IResult<&str, Expr> {
    map_res(
        recognize(pair(
            alt((
                recognize(pair(digit1, opt(pair(char('.'), digit0)))),
                recognize(pair(char('.'), digit1)),
            )),
            opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
        )),
        |s: &str| {
            s.parse::<f64>()
                .map_err(|_| EvalError::NonFinite)
                .and_then(super::value::number)
                .map(Expr::Literal)
        },
    )(input)
}

/// Single- or double-quoted string with backslash escapes.
fn string_literal(input: &str) -> IResult<&str, String> {
    let (rest, quote) = one_of("\"'")(input)?;
    let mut out = String::new();
    let mut chars = rest.char_indices();
    while let Some((i, c)) = chars.next() {
        if c == quote {
            return Ok((&rest[i + c.len_utf8()..], out));
        }
        if c == '\\' {
            match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, 'r')) => out.push('\r'),
                Some((_, other)) => out.push(other),
                None => break,
            }
        } else {
            out.push(c);
        }
    }
    Err(nom::Err::Failure(Error::new(input, ErrorKind::Char)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lit(v: Value) -> Expr {
        Expr::Literal(v)
    }

    fn ident(name: &str) -> Expr {
        Expr::Ident(name.to_string())
    }

    #[test]
    fn precedence_of_arithmetic() {
        assert_eq!(
            parse_expression("1 + 2 * 3").unwrap(),
            binary(
                BinaryOp::Add,
                lit(json!(1)),
                binary(BinaryOp::Mul, lit(json!(2)), lit(json!(3)))
            )
        );
    }

    #[test]
    fn left_associativity() {
        assert_eq!(
            parse_expression("8 - 4 - 2").unwrap(),
            binary(
                BinaryOp::Sub,
                binary(BinaryOp::Sub, lit(json!(8)), lit(json!(4))),
                lit(json!(2))
            )
        );
    }

    #[test]
    fn member_index_and_call_chain() {
        assert_eq!(
            parse_expression("user.tags[0].toUpperCase()").unwrap(),
            Expr::Call(
                Box::new(Expr::Member(
                    Box::new(Expr::Index(
                        Box::new(Expr::Member(Box::new(ident("user")), "tags".to_string())),
                        Box::new(lit(json!(0)))
                    )),
                    "toUpperCase".to_string()
                )),
                vec![]
            )
        );
    }

    #[test]
    fn object_and_array_literals() {
        let expr = parse_expression("{ name: 'Ada', 'two words': [1, 2,], n }").unwrap();
        assert_eq!(
            expr,
            Expr::Object(vec![
                ("name".to_string(), lit(json!("Ada"))),
                (
                    "two words".to_string(),
                    Expr::Array(vec![lit(json!(1)), lit(json!(2))])
                ),
                ("n".to_string(), ident("n")),
            ])
        );
    }

    #[test]
    fn comparison_operators_prefer_longest_match() {
        assert_eq!(
            parse_expression("a <= b").unwrap(),
            binary(BinaryOp::Le, ident("a"), ident("b"))
        );
        assert_eq!(
            parse_expression("a !== b").unwrap(),
            binary(BinaryOp::StrictNe, ident("a"), ident("b"))
        );
    }

    #[test]
    fn conditional_and_unary() {
        assert_eq!(
            parse_expression("!ok ? -1 : .5").unwrap(),
            Expr::Conditional(
                Box::new(Expr::Unary(UnaryOp::Not, Box::new(ident("ok")))),
                Box::new(Expr::Unary(UnaryOp::Neg, Box::new(lit(json!(1))))),
                Box::new(lit(json!(0.5)))
            )
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            parse_expression(r#""a\"b" + 'it\'s'"#).unwrap(),
            binary(BinaryOp::Add, lit(json!("a\"b")), lit(json!("it's")))
        );
    }

    #[test]
    fn keywords() {
        assert_eq!(parse_expression("true").unwrap(), lit(json!(true)));
        assert_eq!(parse_expression("undefined").unwrap(), lit(json!(null)));
        assert_eq!(parse_expression("trueish").unwrap(), ident("trueish"));
    }

    #[test]
    fn deep_nesting_is_rejected_before_parsing() {
        let deep = format!("{}1{}", "(".repeat(20_000), ")".repeat(20_000));
        assert!(matches!(
            parse_expression(&deep),
            Err(EvalError::Syntax { offset: 32, .. })
        ));
        assert!(parse_expression(&"!".repeat(5_000)).is_err());
        assert!(parse_expression(&"a ? b : ".repeat(100)).is_err());
    }

    #[test]
    fn long_operator_chains_are_rejected() {
        let chain = vec!["1"; 1_000].join(" + ");
        assert!(matches!(
            parse_expression(&chain),
            Err(EvalError::Syntax { .. })
        ));
        let members = format!("a{}", ".b".repeat(1_000));
        assert!(parse_expression(&members).is_err());
    }

    #[test]
    fn ordinary_nesting_is_accepted() {
        let nested = format!("{}1{}", "(".repeat(20), ")".repeat(20));
        assert_eq!(parse_expression(&nested).unwrap(), lit(json!(1)));
        assert!(parse_expression("-(-(!a)) ?? [{b: [c[0]]}]").is_ok());
        assert!(parse_expression("a - -b ? 'x?(y' : c").is_ok());
        assert!(parse_expression(&vec!["1"; 200].join(" * ")).is_ok());
    }

    #[test]
    fn syntax_errors_report_offset() {
        match parse_expression("1 + ") {
            Err(EvalError::Syntax { offset, .. }) => assert!(offset >= 1),
            other => panic!("expected syntax error, got {:?}", other),
        }
        assert!(parse_expression("").is_err());
        assert!(parse_expression("'open").is_err());
        assert!(parse_expression("a b").is_err());
    }
}
