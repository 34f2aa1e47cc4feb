use std::env;
use std::io::Write;
use std::path::PathBuf;

use nix::unistd;

use super::super::error::{Error, Result};

/// Commands that must run inside the shell process because they change its state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Cd,
    Setenv,
    Unsetenv,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Status(i32),
    Exit(i32),
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Builtin> {
        match name {
            "cd" => Some(Builtin::Cd),
            "setenv" => Some(Builtin::Setenv),
            "unsetenv" => Some(Builtin::Unsetenv),
            "exit" => Some(Builtin::Exit),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Cd => "cd",
            Builtin::Setenv => "setenv",
            Builtin::Unsetenv => "unsetenv",
            Builtin::Exit => "exit",
        }
    }

    /// Runs the builtin with `args` (the words after the name). `out` receives
    /// whatever the builtin prints.
    pub fn run<W: Write>(self, args: &[String], out: &mut W) -> Result<Outcome> {
        match self {
            Builtin::Cd => cd(args).map(|_| Outcome::Status(0)),
            Builtin::Setenv => setenv(args, out).map(|_| Outcome::Status(0)),
            Builtin::Unsetenv => unsetenv(args).map(|_| Outcome::Status(0)),
            Builtin::Exit => exit(args).map(Outcome::Exit),
        }
    }
}

fn usage(message: String) -> Error {
    Error::Usage(message)
}

fn home_dir() -> Option<PathBuf> {
    use users::os::unix::UserExt;
    env::var_os("HOME").map(PathBuf::from).or_else(|| {
        users::get_user_by_uid(users::get_current_uid()).map(|u| u.home_dir().to_path_buf())
    })
}

fn cd(args: &[String]) -> Result<()> {
    let target = match args {
        [] => home_dir().ok_or_else(|| usage("cd: HOME not set".into()))?,
        [dir] if dir == "-" => env::var_os("OLDPWD")
            .map(PathBuf::from)
            .ok_or_else(|| usage("cd: OLDPWD not set".into()))?,
        [dir] => PathBuf::from(dir),
        _ => return Err(usage("cd: too many arguments".into())),
    };

    let previous = env::current_dir().ok();
    unistd::chdir(&target).map_err(|e| Error::resource(&target, e))?;
    if let Some(previous) = previous {
        env::set_var("OLDPWD", previous);
    }
    if let Ok(now) = env::current_dir() {
        env::set_var("PWD", now);
    }
    debug!("cd {}", target.display());
    Ok(())
}

fn check_name(builtin: &str, name: &str) -> Result<()> {
    if name.is_empty() || name.contains('=') || name.contains('\0') {
        return Err(usage(format!("{}: invalid variable name `{}`", builtin, name)));
    }
    Ok(())
}

fn setenv<W: Write>(args: &[String], out: &mut W) -> Result<()> {
    match args {
        [] => {
            for (name, value) in env::vars_os() {
                writeln!(out, "{}={}", name.to_string_lossy(), value.to_string_lossy())?;
            }
            Ok(())
        }
        [name] => set(name, ""),
        [name, value] => set(name, value),
        _ => Err(usage("setenv: too many arguments".into())),
    }
}

fn set(name: &str, value: &str) -> Result<()> {
    check_name("setenv", name)?;
    if value.contains('\0') {
        return Err(Error::InvalidArgument(value.to_owned()));
    }
    env::set_var(name, value);
    Ok(())
}

fn unsetenv(args: &[String]) -> Result<()> {
    match args {
        [name] => {
            check_name("unsetenv", name)?;
            env::remove_var(name);
            Ok(())
        }
        [] => Err(usage("unsetenv: missing variable name".into())),
        _ => Err(usage("unsetenv: too many arguments".into())),
    }
}

fn exit(args: &[String]) -> Result<i32> {
    match args {
        [] => Ok(0),
        [code] => code
            .parse::<i32>()
            .map_err(|_| usage(format!("exit: {}: numeric argument required", code))),
        _ => Err(usage("exit: too many arguments".into())),
    }
}
