use super::tokens::Token;
use super::SyntaxError;

/// Validates the grammar of a token sequence, left to right.
///
/// Pipes need a command on both sides, every redirection needs a file name, `&` may
/// only close the line, and each command needs a program name. A command may redirect
/// each stream once; input redirection is only accepted on the first command.
pub fn check(tokens: &[Token]) -> Result<(), SyntaxError> {
    let mut segment = 0;
    let mut segment_tokens = 0;
    let mut words = 0;
    let mut redirected_in = false;
    let mut redirected_out = false;

    let mut iter = tokens.iter().enumerate().peekable();
    while let Some((index, token)) = iter.next() {
        match token {
            Token::Word(_) => {
                words += 1;
                segment_tokens += 1;
            }
            Token::Pipe => {
                if segment_tokens == 0 {
                    return Err(SyntaxError::MissingCommand("before"));
                }
                if words == 0 {
                    return Err(SyntaxError::EmptyCommand);
                }
                match iter.peek() {
                    None | Some((_, Token::Background)) => {
                        return Err(SyntaxError::MissingCommand("after"))
                    }
                    _ => {}
                }
                segment += 1;
                segment_tokens = 0;
                words = 0;
                redirected_in = false;
                redirected_out = false;
            }
            Token::RedirectIn | Token::RedirectOut => {
                let symbol = if *token == Token::RedirectIn { '<' } else { '>' };
                match iter.next() {
                    Some((_, Token::Word(_))) => {}
                    _ => return Err(SyntaxError::MissingRedirectTarget(symbol)),
                }
                let seen = if symbol == '<' {
                    &mut redirected_in
                } else {
                    &mut redirected_out
                };
                if *seen {
                    return Err(SyntaxError::DuplicateRedirect(symbol));
                }
                *seen = true;
                if symbol == '<' && segment > 0 {
                    return Err(SyntaxError::InputAfterPipe);
                }
                segment_tokens += 2;
            }
            Token::Background => {
                if index + 1 != tokens.len() {
                    return Err(SyntaxError::MisplacedBackground);
                }
            }
        }
    }

    if words == 0 {
        return Err(SyntaxError::EmptyCommand);
    }
    Ok(())
}
