//! `turnip`, a small job-control shell: pipelines, `<`/`>` redirection, background
//! jobs and a confirm-to-quit `Ctrl-\`.

#[macro_use]
extern crate log;

pub mod config;
pub mod logger;
pub mod shell;

pub use crate::config::Config;
pub use crate::shell::state::{Flow, ShellState};
pub use crate::shell::Shell;
