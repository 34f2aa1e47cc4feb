use std::env;
use std::path::PathBuf;

use super::ast::*;
use super::checker;
use super::tokens::*;
use super::SyntaxError;

/// Checks `tokens` and splits them into a pipeline, expanding words against the
/// process environment.
pub fn parse(tokens: Vec<Token>) -> Result<Pipeline, SyntaxError> {
    parse_with(tokens, |name| env::var(name).ok())
}

pub fn parse_with<F>(tokens: Vec<Token>, lookup: F) -> Result<Pipeline, SyntaxError>
where
    F: Fn(&str) -> Option<String>,
{
    checker::check(&tokens)?;
    Ok(split(tokens, &lookup))
}

/// Splits an already checked sequence at every pipe. Redirection targets are lifted out
/// of the argument list; everything else keeps its original order.
fn split<F>(mut tokens: Vec<Token>, lookup: &F) -> Pipeline
where
    F: Fn(&str) -> Option<String>,
{
    let background = tokens.last() == Some(&Token::Background);
    if background {
        tokens.pop();
    }

    let mut segments = Vec::new();
    let mut current = Segment::default();
    let mut iter = tokens.into_iter();
    while let Some(token) = iter.next() {
        match token {
            Token::Word(word) => current.argv.push(word.expand_with(lookup)),
            Token::Pipe => segments.push(std::mem::take(&mut current)),
            Token::RedirectIn => current.input = target(iter.next(), lookup),
            Token::RedirectOut => current.output = target(iter.next(), lookup),
            Token::Background => {}
        }
    }
    segments.push(current);

    Pipeline {
        segments,
        background,
    }
}

fn target<F>(token: Option<Token>, lookup: &F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    match token {
        Some(Token::Word(word)) => Some(PathBuf::from(word.expand_with(lookup))),
        _ => None,
    }
}
