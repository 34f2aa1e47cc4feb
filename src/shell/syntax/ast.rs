use std::fmt;
use std::path::PathBuf;

/// One process to launch: program, arguments and its own redirections.
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct Segment {
    pub argv: Vec<String>,
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

impl Segment {
    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or("")
    }
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Pipeline {
    pub segments: Vec<Segment>,
    pub background: bool,
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.argv.join(" "))?;
        if let Some(ref input) = self.input {
            write!(f, " < {}", input.display())?;
        }
        if let Some(ref output) = self.output {
            write!(f, " > {}", output.display())?;
        }
        Ok(())
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{}", segment)?;
        }
        if self.background {
            f.write_str(" &")?;
        }
        Ok(())
    }
}
