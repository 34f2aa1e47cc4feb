//! Property-based tests for the tokenizer, checker and pipeline splitter

use proptest::prelude::*;
use turnip::shell::syntax::checker::check;
use turnip::shell::syntax::lexer::lex;
use turnip::shell::syntax::parser::parse_with;
use turnip::shell::syntax::tokens::{Token, Word};
use turnip::shell::syntax::SyntaxError;

fn word() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9._-]{0,8}"
}

fn command() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(word(), 1..4)
}

fn operator() -> impl Strategy<Value = Token> {
    prop_oneof![
        Just(Token::Pipe),
        Just(Token::RedirectIn),
        Just(Token::RedirectOut),
        Just(Token::Background),
    ]
}

fn tokens() -> impl Strategy<Value = Vec<Token>> {
    prop::collection::vec(
        prop_oneof![word().prop_map(|w| Token::Word(Word::literal(&w))), operator()],
        0..12,
    )
}

proptest! {
    #[test]
    fn lexing_never_panics(line in "\\PC{0,80}") {
        let _ = lex(&line);
    }

    #[test]
    fn k_pipes_make_k_plus_one_segments(
        commands in prop::collection::vec(command(), 1..6),
        background in any::<bool>(),
    ) {
        let mut line = commands
            .iter()
            .map(|argv| argv.join(" "))
            .collect::<Vec<_>>()
            .join(" | ");
        if background {
            line.push_str(" &");
        }
        let tokens = lex(&line).unwrap();
        let pipes = tokens.iter().filter(|t| **t == Token::Pipe).count();

        let pipeline = parse_with(tokens, |_| None).unwrap();
        prop_assert_eq!(pipeline.segments.len(), pipes + 1);
        prop_assert_eq!(pipeline.background, background);
        for (segment, argv) in pipeline.segments.iter().zip(&commands) {
            prop_assert_eq!(&segment.argv, argv);
        }
    }

    #[test]
    fn valid_sequences_split_into_non_empty_segments(tokens in tokens()) {
        if check(&tokens).is_ok() {
            let pipes = tokens.iter().filter(|t| **t == Token::Pipe).count();
            let pipeline = parse_with(tokens, |_| None).unwrap();
            prop_assert_eq!(pipeline.segments.len(), pipes + 1);
            prop_assert!(pipeline.segments.iter().all(|s| !s.argv.is_empty()));
        }
    }

    #[test]
    fn trailing_redirect_is_rejected(
        mut tokens in tokens(),
        redirect in prop_oneof![Just(Token::RedirectIn), Just(Token::RedirectOut)],
    ) {
        tokens.push(redirect);
        prop_assert!(check(&tokens).is_err());
    }

    #[test]
    fn background_must_be_single_and_last(
        argv in command(),
        tail in prop::collection::vec(operator(), 1..4),
    ) {
        let mut tokens: Vec<Token> = argv.iter().map(|w| Token::Word(Word::literal(w))).collect();
        tokens.push(Token::Background);
        tokens.extend(tail);
        prop_assert!(check(&tokens).is_err());

        let mut twice: Vec<Token> = argv.iter().map(|w| Token::Word(Word::literal(w))).collect();
        twice.push(Token::Background);
        twice.push(Token::Background);
        prop_assert_eq!(check(&twice), Err(SyntaxError::MisplacedBackground));
    }
}
