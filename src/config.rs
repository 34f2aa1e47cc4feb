use std::env;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crate::logger;

pub const RC_VARIABLE: &str = "TURNIP_RC";
pub const LOG_VARIABLE: &str = "TURNIP_LOG";
pub const RC_FILE_NAME: &str = ".turniprc";
pub const QUIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Session settings, read once at start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Init script fed through the line processor before the first prompt.
    pub rc_path: Option<PathBuf>,
    /// Whether `rc_path` was named explicitly; only then is a missing file an error.
    pub rc_explicit: bool,
    /// `tracing-subscriber` filter directives for the shell's own diagnostics.
    pub log_filter: String,
    pub interactive: bool,
    pub quit_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            rc_path: None,
            rc_explicit: false,
            log_filter: logger::DEFAULT_FILTER.to_owned(),
            interactive: false,
            quit_timeout: QUIT_TIMEOUT,
        }
    }
}

impl Config {
    pub fn from_env() -> Config {
        Config::from_lookup(|name| env::var(name).ok(), termion::is_tty(&io::stdin()))
    }

    /// `TURNIP_RC` names the init script; set but empty, it disables it. Otherwise
    /// `$HOME/.turniprc` is used if it exists.
    pub fn from_lookup<F>(lookup: F, interactive: bool) -> Config
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config {
            interactive,
            ..Config::default()
        };

        match lookup(RC_VARIABLE) {
            Some(ref path) if path.is_empty() => {}
            Some(path) => {
                config.rc_path = Some(PathBuf::from(path));
                config.rc_explicit = true;
            }
            None => config.rc_path = lookup("HOME").map(|home| PathBuf::from(home).join(RC_FILE_NAME)),
        }

        if let Some(directives) = lookup(LOG_VARIABLE) {
            if !directives.trim().is_empty() {
                config.log_filter = directives.trim().to_owned();
            }
        }
        config
    }
}
