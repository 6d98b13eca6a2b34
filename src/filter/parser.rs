//! Filter Parser
//!
//! Parses the textual filter syntax into a normalized `Filter`.
//!
//! # Supported Syntax
//!
//! ```text
//! filter    := or
//! or        := and ("or" and)*
//! and       := unary ("and" unary)*
//! unary     := "not" unary | "(" filter ")" | "matchAll" | "matchNone" | condition
//! condition := column ("=" | "!=" | "<>" | ">" | ">=" | "<" | "<=") literal
//!            | column ["not"] "in" "(" literal ("," literal)* ")"
//!            | column ["not"] "like" 'pattern'
//!            | column "is" ["not"] "null"
//! literal   := 'text' | integer | decimal | true | false | null
//! ```
//!
//! Keywords are case-insensitive. An empty input is `matchAll`.

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while, take_while1},
    character::complete::{char, digit1, multispace0, multispace1, satisfy},
    combinator::{map, map_res, not, opt, recognize, value},
    multi::{fold_many0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use crate::filter::ast::{CompareOp, Filter};
use crate::filter::error::{FilterError, FilterResult};
use crate::value::Value;

/// Parse a filter expression
pub fn parse_filter(input: &str) -> FilterResult<Filter> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(Filter::MatchAll);
    }

    match parse_or(input) {
        Ok((remaining, filter)) => {
            if remaining.trim().is_empty() {
                Ok(filter)
            } else {
                Err(FilterError::Parse(format!(
                    "Unexpected input after filter: '{}'",
                    remaining.trim()
                )))
            }
        }
        Err(e) => Err(FilterError::Parse(format!("Parse error: {:?}", e))),
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Case-insensitive keyword not followed by an identifier character
fn word<'a>(keyword: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    terminated(tag_no_case(keyword), not(satisfy(is_identifier_char)))
}

/// Parse disjunctions
fn parse_or(input: &str) -> IResult<&str, Filter> {
    let (input, operands) =
        separated_list1(delimited(multispace0, word("or"), multispace0), parse_and)(input)?;
    Ok((input, Filter::or(operands)))
}

/// Parse conjunctions
fn parse_and(input: &str) -> IResult<&str, Filter> {
    let (input, operands) =
        separated_list1(delimited(multispace0, word("and"), multispace0), parse_unary)(input)?;
    Ok((input, Filter::and(operands)))
}

/// Parse a negation, a parenthesized group, a constant or a condition
fn parse_unary(input: &str) -> IResult<&str, Filter> {
    let (input, _) = multispace0(input)?;
    alt((
        map(preceded(pair(word("not"), multispace0), parse_unary), Filter::not),
        parse_group,
        value(Filter::MatchAll, word("matchAll")),
        value(Filter::MatchNone, word("matchNone")),
        parse_condition,
    ))(input)
}

/// Parse a parenthesized filter
fn parse_group(input: &str) -> IResult<&str, Filter> {
    delimited(
        pair(char('('), multispace0),
        parse_or,
        pair(multispace0, char(')')),
    )(input)
}

/// Parse a single column condition
fn parse_condition(input: &str) -> IResult<&str, Filter> {
    let (input, column) = parse_identifier(input)?;
    let (input, _) = multispace0(input)?;

    let condition = alt((
        map(
            tuple((word("is"), multispace1, word("not"), multispace1, word("null"))),
            |_| Filter::not(Filter::is_null(column)),
        ),
        map(tuple((word("is"), multispace1, word("null"))), |_| {
            Filter::is_null(column)
        }),
        map(
            preceded(
                tuple((word("not"), multispace1, word("in"), multispace0)),
                parse_value_list,
            ),
            |values| Filter::not(Filter::is_in(column, values)),
        ),
        map(preceded(pair(word("in"), multispace0), parse_value_list), |values| {
            Filter::is_in(column, values)
        }),
        map_res(
            preceded(
                tuple((word("not"), multispace1, word("like"), multispace0)),
                parse_quoted_string,
            ),
            |pattern| Filter::like(column, &pattern).map(Filter::not),
        ),
        map_res(
            preceded(pair(word("like"), multispace0), parse_quoted_string),
            |pattern| Filter::like(column, &pattern),
        ),
        map(
            pair(parse_operator, preceded(multispace0, parse_literal)),
            |(op, literal)| match op {
                Some(op) => Filter::compare(column, op, literal),
                None => Filter::equals(column, literal),
            },
        ),
    ))(input);
    condition
}

/// Parse comparison operator (`None` is equality)
fn parse_operator(input: &str) -> IResult<&str, Option<CompareOp>> {
    alt((
        value(Some(CompareOp::Gte), tag(">=")),
        value(Some(CompareOp::Lte), tag("<=")),
        value(Some(CompareOp::NotEquals), alt((tag("!="), tag("<>")))),
        value(Some(CompareOp::Gt), tag(">")),
        value(Some(CompareOp::Lt), tag("<")),
        value(None, alt((tag("=="), tag("=")))),
    ))(input)
}

/// Parse `(literal, literal, ...)`
fn parse_value_list(input: &str) -> IResult<&str, Vec<Value>> {
    delimited(
        pair(char('('), multispace0),
        separated_list1(delimited(multispace0, char(','), multispace0), parse_literal),
        pair(multispace0, char(')')),
    )(input)
}

/// Parse a literal value
fn parse_literal(input: &str) -> IResult<&str, Value> {
    alt((
        map(parse_quoted_string, Value::from),
        value(Value::Null, word("null")),
        value(Value::Bool(true), word("true")),
        value(Value::Bool(false), word("false")),
        parse_number,
    ))(input)
}

/// Parse an integer (as `Long`) or decimal (as `Double`)
fn parse_number(input: &str) -> IResult<&str, Value> {
    map_res(
        recognize(tuple((
            opt(char('-')),
            digit1,
            opt(pair(char('.'), digit1)),
        ))),
        |s: &str| {
            if !s.contains('.') {
                if let Ok(l) = s.parse::<i64>() {
                    return Ok(Value::Long(l));
                }
            }
            s.parse::<f64>().map(Value::Double)
        },
    )(input)
}

/// Parse a column name
fn parse_identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_alphabetic() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || c == '_' || c == '.'),
    ))(input)
}

/// Parse quoted string; `''` stands for one quote
fn parse_quoted_string(input: &str) -> IResult<&str, String> {
    delimited(
        char('\''),
        fold_many0(
            alt((take_while1(|c| c != '\''), value("'", tag("''")))),
            String::new,
            |mut content, part| {
                content.push_str(part);
                content
            },
        ),
        char('\''),
    )(input)
}
