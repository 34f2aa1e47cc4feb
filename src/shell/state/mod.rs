use std::env;
use std::io::{self, Write};

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{self, Pid};
use termion::color;

use super::error::{Error, Result};
use super::signals::{self, AlarmTimer, Delivery, SignalController};
use super::syntax::ast::Pipeline;
use super::syntax::{lexer, parser, SyntaxError};
use super::TerminalFgGroupManager;
use crate::config::Config;

pub mod builtins;
pub mod jobs;

use self::builtins::{Builtin, Outcome};
use self::jobs::JobRegistry;

/// What the session should do after a line has been processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue(i32),
    Exit(i32),
}

/// Result of servicing pending signal deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Serviced {
    Quiet,
    /// Something was printed over the prompt, or the user interrupted the line.
    Redraw,
    Exit(i32),
}

pub struct ShellState {
    config: Config,
    jobs: JobRegistry,
    signals: SignalController<AlarmTimer>,
    foreground: Option<Pid>,
    last_status: i32,
}

impl ShellState {
    pub fn new(config: Config) -> Self {
        let signals = SignalController::new(AlarmTimer, config.quit_timeout);
        ShellState {
            config,
            jobs: JobRegistry::new(),
            signals,
            foreground: None,
            last_status: 0,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn jobs(&self) -> &JobRegistry {
        &self.jobs
    }

    pub fn last_status(&self) -> i32 {
        self.last_status
    }

    /// Runs one input line. Recoverable errors are reported on stderr and turned into
    /// a non-zero status; the session only ends on `exit` or a confirmed quit.
    pub fn process_line(&mut self, line: &str) -> Flow {
        let flow = match self.execute(line) {
            Ok(flow) => flow,
            Err(e) => {
                eprintln!("turnip: {}", e);
                Flow::Continue(match e {
                    Error::Syntax(_) | Error::Usage(_) => 2,
                    _ => 1,
                })
            }
        };
        if let Flow::Continue(status) = flow {
            self.last_status = status;
        }
        flow
    }

    fn execute(&mut self, line: &str) -> Result<Flow> {
        let tokens = lexer::lex(line)?;
        if tokens.is_empty() {
            return Ok(Flow::Continue(self.last_status));
        }
        let pipeline = parser::parse(tokens)?;
        debug!("parsed {:?}", pipeline);

        if let Some(builtin) = find_builtin(&pipeline) {
            if pipeline.segments.len() > 1 {
                return Err(not_allowed(builtin, "in a pipeline"));
            }
            if pipeline.background {
                return Err(not_allowed(builtin, "in the background"));
            }
            return self.run_builtin(builtin, &pipeline);
        }

        if pipeline.background {
            self.launch_background(&pipeline)
        } else {
            self.launch_foreground(&pipeline)
        }
    }

    fn run_builtin(&mut self, builtin: Builtin, pipeline: &Pipeline) -> Result<Flow> {
        let segment = &pipeline.segments[0];
        // targets are opened for their side effects; builtins print to the terminal
        if let Some(ref path) = segment.input {
            jobs::open_redirect(path, false)?;
        }
        if let Some(ref path) = segment.output {
            jobs::open_redirect(path, true)?;
        }

        let stdout = io::stdout();
        match builtin.run(&segment.argv[1..], &mut stdout.lock())? {
            Outcome::Status(status) => Ok(Flow::Continue(status)),
            Outcome::Exit(code) => Ok(Flow::Exit(code)),
        }
    }

    fn launch_background(&mut self, pipeline: &Pipeline) -> Result<Flow> {
        let job = jobs::launch(pipeline, false)?;
        for &pid in &job.pids {
            self.jobs.push(pid);
        }
        println!("[{}] {}", self.jobs.len(), job.last());
        info!("background job {} started: {}", job.pgid, pipeline);
        Ok(Flow::Continue(0))
    }

    fn launch_foreground(&mut self, pipeline: &Pipeline) -> Result<Flow> {
        let take_terminal = self.config.interactive;
        let terminal = if take_terminal {
            Some(TerminalFgGroupManager::restoring(unistd::getpgrp()))
        } else {
            None
        };
        let job = jobs::launch(pipeline, take_terminal)?;
        if let Some(ref terminal) = terminal {
            terminal.give_to(job.pgid);
        }

        self.foreground = Some(job.pgid);
        let flow = self.wait_foreground(&job.pids);
        self.foreground = None;
        Ok(flow)
    }

    /// Waits until every process of the foreground pipeline has terminated. Between
    /// checks the shell sleeps on the signal pipe, so a signal or a child exit wakes it
    /// and pending signals are serviced without losing track of any child.
    fn wait_foreground(&mut self, pids: &[Pid]) -> Flow {
        let last = pids.last().copied();
        let mut remaining = pids.to_vec();
        // without the signal pipe nothing can wake us, so block in waitpid
        let flags = signals::wakeup_fd().map(|_| WaitPidFlag::WNOHANG);
        let mut status = 0;
        loop {
            let mut index = 0;
            while index < remaining.len() {
                let pid = remaining[index];
                match waitpid(pid, flags) {
                    Ok(WaitStatus::StillAlive) => index += 1,
                    Ok(wait_status) => {
                        if Some(pid) == last {
                            status = jobs::exit_status(wait_status);
                        }
                        remaining.swap_remove(index);
                    }
                    Err(Errno::EINTR) => {}
                    Err(e) => {
                        warn!("waitpid({}) failed: {}", pid, e);
                        remaining.swap_remove(index);
                    }
                }
            }
            if remaining.is_empty() {
                return Flow::Continue(status);
            }
            signals::wait_for_wakeup();
            if let Serviced::Exit(code) = self.service_signals() {
                return Flow::Exit(code);
            }
        }
    }

    /// Applies every signal recorded since the last call.
    pub fn service_signals(&mut self) -> Serviced {
        let mut serviced = Serviced::Quiet;
        for delivery in signals::take_pending() {
            if delivery == Delivery::Interrupt {
                match self.foreground {
                    Some(pgid) => {
                        forward_interrupt(pgid);
                    }
                    None => serviced = Serviced::Redraw,
                }
                continue;
            }
            let before = self.signals.state().is_armed();
            let stdout = io::stdout();
            if let Some(code) = self.signals.handle(delivery, &mut stdout.lock()) {
                return Serviced::Exit(code);
            }
            if !before && self.signals.state().is_armed() {
                serviced = Serviced::Redraw;
            }
        }
        serviced
    }

    /// Reports background processes that finished since the last prompt.
    pub fn report_finished_jobs(&mut self) {
        for (pid, status) in self.jobs.reap_finished() {
            println!("[{}] done (status {})", pid, status);
        }
    }

    pub fn shutdown(&mut self) {
        let finished = self.jobs.drain_all();
        debug!("reaped {} background processes at shutdown", finished.len());
    }

    pub fn prompt(&self) -> String {
        let cwd = match env::current_dir() {
            Ok(x) => x.display().to_string(),
            Err(e) => format!("(error: {})", e),
        };
        let username = users::get_current_username()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| String::from("(none)"));
        let last_character = if users::get_current_uid() == 0 { "#" } else { "$" };
        format!(
            "{red}{username}{reset}@{green}{cwd}{reset}{last_character} ",
            red = color::Fg(color::Red),
            green = color::Fg(color::Green),
            reset = color::Fg(color::Reset),
            username = username,
            cwd = cwd,
            last_character = last_character
        )
    }

    pub fn flush_prompt(&self) {
        print!("{}", self.prompt());
        let _ = io::stdout().flush();
    }
}

fn find_builtin(pipeline: &Pipeline) -> Option<Builtin> {
    pipeline
        .segments
        .iter()
        .find_map(|segment| Builtin::from_name(segment.program()))
}

/// Sends SIGINT to a foreground group, returning whether it was delivered.
fn forward_interrupt(pgid: Pid) -> bool {
    debug!("forwarding SIGINT to group {}", pgid);
    match killpg(pgid, Signal::SIGINT) {
        Ok(()) => true,
        Err(e) => {
            warn!("cannot interrupt group {}: {}", pgid, e);
            false
        }
    }
}

fn not_allowed(builtin: Builtin, context: &'static str) -> Error {
    Error::Syntax(SyntaxError::BuiltinNotAllowed {
        name: builtin.name().to_owned(),
        context,
    })
}
