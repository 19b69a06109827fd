use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{anychar, char, multispace0, none_of},
    combinator::{all_consuming, cut, map, value, verify},
    error::{context, convert_error, VerboseError},
    multi::{many0, many1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use super::{Filter, FilterError, FilterResult};

type ParserResult<'a, O> = IResult<&'a str, O, VerboseError<&'a str>>;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Operator {
    Equal,
    Approx,
    GreaterEq,
    LessEq,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Piece {
    Char(char),
    Wildcard,
}

/// Parse an LDAP-style filter string. The whole input must be a single
/// filter, optionally surrounded by whitespace.
#[tracing::instrument(level = "debug")]
pub fn parse_filter(input: &str) -> FilterResult<Filter> {
    if input.trim().is_empty() {
        return Err(FilterError::InvalidSyntax {
            filter: input.to_string(),
            message: "empty filter".to_string(),
        });
    }
    match all_consuming(delimited(multispace0, parse_node, multispace0))(input) {
        Ok((_, filter)) => Ok(filter),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(FilterError::InvalidSyntax {
            filter: input.to_string(),
            message: convert_error(input, e),
        }),
        Err(nom::Err::Incomplete(_)) => Err(FilterError::InvalidSyntax {
            filter: input.to_string(),
            message: "unexpected end of filter".to_string(),
        }),
    }
}

fn parse_node(input: &str) -> ParserResult<'_, Filter> {
    context(
        "filter",
        delimited(
            terminated(char('('), multispace0),
            cut(parse_component),
            preceded(multispace0, cut(char(')'))),
        ),
    )(input)
}

fn parse_component(input: &str) -> ParserResult<'_, Filter> {
    alt((parse_and, parse_or, parse_not, parse_item))(input)
}

fn parse_list(input: &str) -> ParserResult<'_, Vec<Filter>> {
    many1(preceded(multispace0, parse_node))(input)
}

fn parse_and(input: &str) -> ParserResult<'_, Filter> {
    context(
        "and",
        map(preceded(char('&'), cut(parse_list)), Filter::And),
    )(input)
}

fn parse_or(input: &str) -> ParserResult<'_, Filter> {
    context("or", map(preceded(char('|'), cut(parse_list)), Filter::Or))(input)
}

fn parse_not(input: &str) -> ParserResult<'_, Filter> {
    context(
        "not",
        map(
            preceded(pair(char('!'), multispace0), cut(parse_node)),
            |filter| Filter::Not(Box::new(filter)),
        ),
    )(input)
}

fn parse_item(input: &str) -> ParserResult<'_, Filter> {
    context(
        "item",
        map(
            tuple((parse_attribute, cut(parse_operator), parse_value)),
            |(attribute, operator, pieces)| build_item(attribute, operator, pieces),
        ),
    )(input)
}

fn parse_attribute(input: &str) -> ParserResult<'_, String> {
    context(
        "attribute",
        map(
            verify(
                many1(alt((
                    preceded(char('\\'), anychar),
                    none_of("=~<>()\\"),
                ))),
                |chars: &Vec<char>| chars.iter().any(|c| !c.is_whitespace()),
            ),
            |chars| chars.into_iter().collect::<String>().trim().to_string(),
        ),
    )(input)
}

fn parse_operator(input: &str) -> ParserResult<'_, Operator> {
    context(
        "operator",
        alt((
            value(Operator::Approx, tag("~=")),
            value(Operator::GreaterEq, tag(">=")),
            value(Operator::LessEq, tag("<=")),
            value(Operator::Equal, tag("=")),
        )),
    )(input)
}

fn parse_value(input: &str) -> ParserResult<'_, Vec<Piece>> {
    context(
        "value",
        many0(alt((
            map(preceded(char('\\'), anychar), Piece::Char),
            value(Piece::Wildcard, char('*')),
            map(none_of("()\\*"), Piece::Char),
        ))),
    )(input)
}

fn literal(pieces: &[Piece]) -> String {
    pieces
        .iter()
        .map(|piece| match piece {
            Piece::Char(c) => *c,
            Piece::Wildcard => '*',
        })
        .collect()
}

fn build_item(attribute: String, operator: Operator, pieces: Vec<Piece>) -> Filter {
    match operator {
        Operator::Approx => Filter::Approx {
            attribute,
            value: literal(&pieces),
        },
        Operator::GreaterEq => Filter::GreaterEq {
            attribute,
            value: literal(&pieces),
        },
        Operator::LessEq => Filter::LessEq {
            attribute,
            value: literal(&pieces),
        },
        Operator::Equal if pieces == [Piece::Wildcard] => Filter::Present(attribute),
        Operator::Equal if pieces.contains(&Piece::Wildcard) => {
            let mut segments: Vec<String> = pieces
                .split(|piece| *piece == Piece::Wildcard)
                .map(literal)
                .collect();
            // split on at least one wildcard always yields two or more segments
            let last = segments.pop().filter(|s| !s.is_empty());
            let initial = Some(segments.remove(0)).filter(|s| !s.is_empty());
            let any = segments.into_iter().filter(|s| !s.is_empty()).collect();
            Filter::Substring {
                attribute,
                initial,
                any,
                last,
            }
        }
        Operator::Equal => Filter::Equal {
            attribute,
            value: literal(&pieces),
        },
    }
}
