pub mod ast;
pub mod checker;
pub mod lexer;
pub mod parser;
pub mod tokens;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyntaxError {
    #[error("{0}")]
    Unterminated(&'static str),
    #[error("unexpected input `{0}`")]
    UnexpectedInput(String),
    #[error("missing command {0} `|`")]
    MissingCommand(&'static str),
    #[error("expected a file name after `{0}`")]
    MissingRedirectTarget(char),
    #[error("`&` is only allowed at the end of a line")]
    MisplacedBackground,
    #[error("command has no program name")]
    EmptyCommand,
    #[error("more than one `{0}` redirection in one command")]
    DuplicateRedirect(char),
    #[error("input redirection is only allowed on the first command of a pipeline")]
    InputAfterPipe,
    #[error("builtin `{name}` cannot run {context}")]
    BuiltinNotAllowed {
        name: String,
        context: &'static str,
    },
}
