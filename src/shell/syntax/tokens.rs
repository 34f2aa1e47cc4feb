use std::env;
use std::fmt;

#[derive(PartialEq, Eq, Debug, Clone)]
pub enum Token {
    Word(Word),
    Pipe,
    RedirectIn,
    RedirectOut,
    Background,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Token::Word(w) => write!(f, "{}", w),
            Token::Pipe => f.write_str("|"),
            Token::RedirectIn => f.write_str("<"),
            Token::RedirectOut => f.write_str(">"),
            Token::Background => f.write_str("&"),
        }
    }
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub enum StringLiteralComponent {
    Literal(String),
    EnvVar(String),
    Home,
}

/// A word as written on the command line, before variable and home expansion.
///
/// Adjacent literal components are always merged, so `Word::literal("ls")` compares
/// equal to the lexed form of `ls`, `l\s` or `"ls"`.
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct Word(Vec<StringLiteralComponent>);

impl Word {
    pub fn literal(s: &str) -> Word {
        Word(vec![StringLiteralComponent::Literal(s.to_owned())])
    }

    pub fn from_components<I: IntoIterator<Item = StringLiteralComponent>>(components: I) -> Word {
        let mut word = Word::default();
        for component in components {
            word.push(component);
        }
        word
    }

    pub fn push(&mut self, component: StringLiteralComponent) {
        if let StringLiteralComponent::Literal(ref text) = component {
            if let Some(StringLiteralComponent::Literal(last)) = self.0.last_mut() {
                last.push_str(text);
                return;
            }
        }
        self.0.push(component);
    }

    /// Expands against the process environment.
    pub fn expand(&self) -> String {
        self.expand_with(|name| env::var(name).ok())
    }

    pub fn expand_with<F>(&self, lookup: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut out = String::new();
        for component in &self.0 {
            match component {
                StringLiteralComponent::Literal(s) => out.push_str(s),
                StringLiteralComponent::EnvVar(name) => {
                    if let Some(value) = lookup(name) {
                        out.push_str(&value);
                    }
                }
                StringLiteralComponent::Home => {
                    if let Some(home) = lookup("HOME").or_else(passwd_home) {
                        out.push_str(&home);
                    }
                }
            }
        }
        out
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for component in &self.0 {
            match component {
                StringLiteralComponent::Literal(s) => f.write_str(s)?,
                StringLiteralComponent::EnvVar(name) => write!(f, "${{{}}}", name)?,
                StringLiteralComponent::Home => f.write_str("~")?,
            }
        }
        Ok(())
    }
}

fn passwd_home() -> Option<String> {
    use users::os::unix::UserExt;
    users::get_user_by_uid(users::get_current_uid())
        .and_then(|user| user.home_dir().to_str().map(String::from))
}
