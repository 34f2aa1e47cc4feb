pub mod error;
pub mod readline;
pub mod signals;
pub mod state;
pub mod syntax;

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::os::fd::AsFd;
use std::path::Path;

use nix::unistd::{self, Pid};

use self::readline::{LineReader, ReadEvent};
use self::state::{Flow, Serviced, ShellState};
use crate::config::Config;

pub struct Shell {
    state: ShellState,
}

/// Hands the terminal to a process group and gives it back to the previous owner when
/// dropped.
pub(crate) struct TerminalFgGroupManager {
    stdin_group: Pid,
}

impl TerminalFgGroupManager {
    /// Remembers the current owner of the terminal, then gives it to `group`.
    pub fn new(group: Pid) -> Option<TerminalFgGroupManager> {
        match unistd::tcgetpgrp(io::stdin().as_fd()) {
            Ok(owner) => {
                let manager = TerminalFgGroupManager::restoring(owner);
                manager.give_to(group);
                Some(manager)
            }
            Err(_) => None,
        }
    }

    /// Returns the terminal to `owner` when dropped, whoever holds it by then. Taken
    /// before a pipeline is forked, since its first process grabs the terminal itself
    /// and could otherwise be mistaken for the owner.
    pub fn restoring(owner: Pid) -> TerminalFgGroupManager {
        TerminalFgGroupManager { stdin_group: owner }
    }

    pub fn give_to(&self, group: Pid) {
        if let Err(e) = unistd::tcsetpgrp(io::stdin().as_fd(), group) {
            warn!("cannot give the terminal to group {}: {}", group, e);
        }
    }
}

impl Drop for TerminalFgGroupManager {
    fn drop(&mut self) {
        if let Err(e) = unistd::tcsetpgrp(io::stdin().as_fd(), self.stdin_group) {
            warn!("cannot take the terminal back: {}", e);
        }
    }
}

/// Moves the shell into its own process group for the lifetime of the guard.
struct ProcessGroupManager {
    group: Pid,
}

impl ProcessGroupManager {
    pub fn new() -> Option<ProcessGroupManager> {
        let group = unistd::getpgrp();
        match unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0)) {
            Ok(_) => Some(ProcessGroupManager { group }),
            Err(e) => {
                // a session leader already leads its own group
                debug!("setpgid(0, 0) failed: {}", e);
                None
            }
        }
    }
}

impl Drop for ProcessGroupManager {
    fn drop(&mut self) {
        if let Err(e) = unistd::setpgid(Pid::from_raw(0), self.group) {
            debug!("cannot restore process group {}: {}", self.group, e);
        }
    }
}

impl Shell {
    pub fn new(config: Config) -> Self {
        Shell {
            state: ShellState::new(config),
        }
    }

    /// Runs the session until `exit`, end of input or a confirmed quit, and returns the
    /// shell's exit status.
    pub fn run(&mut self) -> i32 {
        let interactive = self.state.config().interactive;
        if interactive {
            if let Err(e) = signals::ignore_job_control() {
                warn!("cannot ignore job control signals: {}", e);
            }
        }
        let _process_group_manager = if interactive {
            ProcessGroupManager::new()
        } else {
            None
        };
        let _terminal_group_manager = if interactive {
            TerminalFgGroupManager::new(unistd::getpgrp())
        } else {
            None
        };
        if let Err(e) = signals::install() {
            error!("cannot install signal handlers: {}", e);
            eprintln!("turnip: cannot install signal handlers: {}", e);
            return 1;
        }

        if let Some(code) = self.source_init_script() {
            return self.finish(code);
        }

        let code = self.run_interactive(interactive);
        self.finish(code)
    }

    fn run_interactive(&mut self, interactive: bool) -> i32 {
        let mut reader = LineReader::stdin();
        loop {
            if let Serviced::Exit(code) = self.state.service_signals() {
                return code;
            }
            self.state.report_finished_jobs();
            if interactive {
                self.state.flush_prompt();
            }
            let line = loop {
                match reader.read_line() {
                    Ok(ReadEvent::Line(line)) => break line,
                    Ok(ReadEvent::Invalid(bytes)) => {
                        eprintln!(
                            "turnip: ignoring input that is not valid UTF-8: {:?}",
                            String::from_utf8_lossy(&bytes)
                        );
                        if interactive {
                            self.state.flush_prompt();
                        }
                    }
                    Ok(ReadEvent::Eof) => {
                        if interactive {
                            println!();
                        }
                        return 0;
                    }
                    Ok(ReadEvent::Interrupted) => match self.state.service_signals() {
                        Serviced::Exit(code) => return code,
                        Serviced::Redraw if interactive => {
                            println!();
                            self.state.flush_prompt();
                        }
                        _ => {}
                    },
                    Err(e) => {
                        error!("reading input failed: {}", e);
                        eprintln!("turnip: input error: {}", e);
                        return 1;
                    }
                }
            };
            if let Flow::Exit(code) = self.state.process_line(&line) {
                return code;
            }
        }
    }

    fn source_init_script(&mut self) -> Option<i32> {
        let path = self.state.config().rc_path.clone()?;
        match File::open(&path) {
            Ok(file) => {
                info!("sourcing {}", path.display());
                self.source(&path, BufReader::new(file))
            }
            Err(ref e) if e.kind() == io::ErrorKind::NotFound && !self.state.config().rc_explicit => {
                debug!("no init script at {}", path.display());
                None
            }
            Err(e) => {
                eprintln!("turnip: {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Feeds every line of `input` through the same entry point as typed lines.
    /// Returns the exit status if one of them ended the session.
    pub fn source<R: BufRead>(&mut self, path: &Path, input: R) -> Option<i32> {
        for line in input.lines() {
            match line {
                Ok(line) => {
                    if let Flow::Exit(code) = self.state.process_line(&line) {
                        return Some(code);
                    }
                }
                Err(e) => {
                    eprintln!("turnip: {}: {}", path.display(), e);
                    break;
                }
            }
        }
        None
    }

    fn finish(&mut self, code: i32) -> i32 {
        self.state.shutdown();
        let _ = io::stdout().flush();
        code
    }
}
