use nom::branch::alt;
use nom::bytes::complete::{is_not, take_while, take_while1};
use nom::character::complete::{anychar, char};
use nom::combinator::{all_consuming, cut, map, opt, success, value};
use nom::error::{context, VerboseError, VerboseErrorKind};
use nom::multi::{many0, many1};
use nom::sequence::{preceded, terminated};
use nom::IResult;

use super::tokens::StringLiteralComponent as Component;
use super::tokens::*;
use super::SyntaxError;

type LexResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

pub fn is_metacharacter(c: char) -> bool {
    matches!(c, '|' | '<' | '>' | '&')
}

fn is_bare(c: char) -> bool {
    !c.is_whitespace() && !is_metacharacter(c) && !matches!(c, '"' | '\'' | '\\' | '$')
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn whitespace(input: &str) -> LexResult<&str> {
    take_while(|c: char| c.is_whitespace())(input)
}

fn operator(input: &str) -> LexResult<Token> {
    alt((
        value(Token::Pipe, char('|')),
        value(Token::RedirectIn, char('<')),
        value(Token::RedirectOut, char('>')),
        value(Token::Background, char('&')),
    ))(input)
}

fn literal(s: &str) -> Vec<Component> {
    vec![Component::Literal(s.to_owned())]
}

fn variable(input: &str) -> LexResult<Vec<Component>> {
    preceded(
        char('$'),
        alt((
            preceded(
                char('{'),
                cut(context(
                    "malformed `${...}` variable reference",
                    terminated(
                        map(take_while1(is_name_char), |name: &str| {
                            vec![Component::EnvVar(name.to_owned())]
                        }),
                        char('}'),
                    ),
                )),
            ),
            map(take_while1(is_name_char), |name: &str| {
                vec![Component::EnvVar(name.to_owned())]
            }),
            success(literal("$")),
        )),
    )(input)
}

fn escaped(input: &str) -> LexResult<Vec<Component>> {
    preceded(
        char('\\'),
        cut(context(
            "dangling `\\` at end of line",
            map(anychar, |c| vec![Component::Literal(c.to_string())]),
        )),
    )(input)
}

fn double_quoted(input: &str) -> LexResult<Vec<Component>> {
    let body = many0(alt((
        preceded(char('\\'), map(anychar, |c| vec![Component::Literal(c.to_string())])),
        variable,
        map(is_not("\"\\$"), literal),
    )));
    preceded(
        char('"'),
        cut(context(
            "unterminated double quote",
            terminated(
                map(body, |parts| {
                    // "" must still yield a word
                    let mut out = literal("");
                    out.extend(parts.into_iter().flatten());
                    out
                }),
                char('"'),
            ),
        )),
    )(input)
}

fn single_quoted(input: &str) -> LexResult<Vec<Component>> {
    preceded(
        char('\''),
        cut(context(
            "unterminated single quote",
            terminated(map(take_while(|c: char| c != '\''), literal), char('\'')),
        )),
    )(input)
}

fn bare(input: &str) -> LexResult<Vec<Component>> {
    map(take_while1(is_bare), literal)(input)
}

fn home(input: &str) -> LexResult<Component> {
    let (rest, _) = char('~')(input)?;
    match rest.chars().next() {
        None | Some('/') => Ok((rest, Component::Home)),
        Some(c) if c.is_whitespace() || is_metacharacter(c) => Ok((rest, Component::Home)),
        _ => Err(nom::Err::Error(VerboseError {
            errors: vec![(input, VerboseErrorKind::Char('/'))],
        })),
    }
}

fn word_part(input: &str) -> LexResult<Vec<Component>> {
    alt((bare, double_quoted, single_quoted, escaped, variable))(input)
}

fn word(input: &str) -> LexResult<Word> {
    let (rest, prefix) = opt(home)(input)?;
    let (rest, parts) = match prefix {
        Some(_) => many0(word_part)(rest)?,
        None => many1(word_part)(rest)?,
    };
    let components = prefix.into_iter().chain(parts.into_iter().flatten());
    Ok((rest, Word::from_components(components)))
}

fn token(input: &str) -> LexResult<Token> {
    alt((operator, map(word, Token::Word)))(input)
}

fn lex_all(input: &str) -> LexResult<Vec<Token>> {
    preceded(whitespace, many0(terminated(token, whitespace)))(input)
}

/// Splits a raw line into tokens. A blank line yields no tokens.
pub fn lex(line: &str) -> Result<Vec<Token>, SyntaxError> {
    match all_consuming(lex_all)(line) {
        Ok((_, tokens)) => Ok(tokens),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(describe(e)),
        Err(nom::Err::Incomplete(_)) => Err(SyntaxError::UnexpectedInput(line.to_owned())),
    }
}

fn describe(error: VerboseError<&str>) -> SyntaxError {
    let unterminated = error.errors.iter().find_map(|(_, kind)| match kind {
        VerboseErrorKind::Context(what) => Some(*what),
        _ => None,
    });
    match unterminated {
        Some(what) => SyntaxError::Unterminated(what),
        None => {
            let remaining = error.errors.first().map(|(rest, _)| *rest).unwrap_or("");
            SyntaxError::UnexpectedInput(remaining.to_owned())
        }
    }
}
