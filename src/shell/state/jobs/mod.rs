use std::ffi::CString;
use std::fs::File;
use std::io::{self, Write};
use std::mem::ManuallyDrop;
use std::os::fd::{AsFd, AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::path::Path;

use nix::errno::Errno;
use nix::fcntl::{self, OFlag};
use nix::libc;
use nix::sys::signal::{killpg, Signal};
use nix::sys::stat::Mode;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{self, ForkResult, Pid};

use super::super::error::{Error, Result};
use super::super::signals;
use super::super::syntax::ast::{Pipeline, Segment};

pub mod registry;
pub use self::registry::JobRegistry;

/// A pipeline whose processes have all been created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub pgid: Pid,
    pub pids: Vec<Pid>,
}

impl Job {
    /// The process whose status is the pipeline's status.
    pub fn last(&self) -> Pid {
        self.pids[self.pids.len() - 1]
    }
}

/// Maps a wait status to a shell exit status (`128 + n` for death by signal `n`).
pub fn exit_status(status: WaitStatus) -> i32 {
    match status {
        WaitStatus::Exited(_, code) => code,
        WaitStatus::Signaled(_, signal, _) => 128 + signal as i32,
        _ => 0,
    }
}

/// Opens a redirection target. Output files are created private to the user and
/// truncated.
pub fn open_redirect(path: &Path, output: bool) -> Result<OwnedFd> {
    let (flags, mode) = if output {
        (
            OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC | OFlag::O_CLOEXEC,
            Mode::S_IRUSR | Mode::S_IWUSR,
        )
    } else {
        (OFlag::O_RDONLY | OFlag::O_CLOEXEC, Mode::empty())
    };
    let fd = fcntl::open(path, flags, mode).map_err(|e| Error::resource(path, e))?;
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

fn to_cstrings(segment: &Segment) -> Result<Vec<CString>> {
    segment
        .argv
        .iter()
        .map(|arg| CString::new(arg.as_bytes()).map_err(|_| Error::InvalidArgument(arg.clone())))
        .collect()
}

/// Creates one process per segment, connected left to right by pipes, all in a new
/// process group led by the first one. Returns without waiting.
///
/// If a pipe or a process cannot be created, the processes already started are
/// terminated and reaped before the error is returned.
pub fn launch(pipeline: &Pipeline, take_terminal: bool) -> Result<Job> {
    let argvs = pipeline
        .segments
        .iter()
        .map(to_cstrings)
        .collect::<Result<Vec<_>>>()?;

    let count = pipeline.segments.len();
    let mut pipes = Vec::with_capacity(count.saturating_sub(1));
    for _ in 1..count {
        pipes.push(unistd::pipe2(OFlag::O_CLOEXEC).map_err(|e| Error::launch("cannot create pipe", e))?);
    }

    let blocked = signals::BlockedSignals::block()
        .map_err(|e| Error::launch("cannot block signals", e))?;
    let mut pgid: Option<Pid> = None;
    let mut pids = Vec::with_capacity(count);
    for (index, segment) in pipeline.segments.iter().enumerate() {
        match unsafe { unistd::fork() } {
            Ok(ForkResult::Child) => {
                run_child(index, segment, &argvs[index], pipes, pgid, take_terminal, &blocked)
            }
            Ok(ForkResult::Parent { child }) => {
                let group = *pgid.get_or_insert(child);
                // the child does the same; whichever runs first wins
                if let Err(e) = unistd::setpgid(child, group) {
                    if e != Errno::EACCES && e != Errno::ESRCH {
                        debug!("setpgid({}, {}) failed: {}", child, group, e);
                    }
                }
                pids.push(child);
            }
            Err(e) => {
                drop(pipes);
                drop(blocked);
                abandon(pgid, &pids);
                return Err(Error::launch("cannot create process", e));
            }
        }
    }
    // the parent keeps no pipe ends; readers must see end-of-file
    drop(pipes);
    drop(blocked);

    match pgid {
        Some(pgid) => {
            debug!("launched `{}` as group {} {:?}", pipeline, pgid, pids);
            Ok(Job { pgid, pids })
        }
        None => Err(Error::launch("empty pipeline", Errno::EINVAL)),
    }
}

fn abandon(pgid: Option<Pid>, pids: &[Pid]) {
    if let Some(pgid) = pgid {
        let _ = killpg(pgid, Signal::SIGTERM);
    }
    for &pid in pids {
        while let Err(Errno::EINTR) = waitpid(pid, None) {}
    }
}

fn run_child(
    index: usize,
    segment: &Segment,
    argv: &[CString],
    pipes: Vec<(OwnedFd, OwnedFd)>,
    pgid: Option<Pid>,
    take_terminal: bool,
    blocked: &signals::BlockedSignals,
) -> ! {
    let group = pgid.unwrap_or_else(|| Pid::from_raw(0));
    let _ = unistd::setpgid(Pid::from_raw(0), group);
    if take_terminal && index == 0 {
        // SIGTTOU is still ignored at this point
        let _ = unistd::tcsetpgrp(io::stdin().as_fd(), unistd::getpid());
    }
    signals::reset_for_child();
    blocked.unblock();

    if let Err(e) = wire(index, segment, pipes) {
        report(&e.to_string());
        exit_child(1);
    }

    let program = segment.program();
    match unistd::execvp(&argv[0], argv) {
        Err(Errno::ENOENT) => {
            report(&format!("{}: command not found", program));
            exit_child(127);
        }
        Err(e) => {
            report(
                &Error::Exec {
                    program: program.to_owned(),
                    source: e,
                }
                .to_string(),
            );
            exit_child(126);
        }
        Ok(never) => match never {},
    }
}

/// Points stdin/stdout of the child at its pipe ends, then at its redirection
/// targets, and closes every other pipe descriptor.
fn wire(index: usize, segment: &Segment, pipes: Vec<(OwnedFd, OwnedFd)>) -> Result<()> {
    let stdin = libc::STDIN_FILENO;
    let stdout = libc::STDOUT_FILENO;
    if index > 0 {
        replace(&pipes[index - 1].0, stdin)?;
    }
    if index < pipes.len() {
        replace(&pipes[index].1, stdout)?;
    }
    drop(pipes);

    if let Some(ref path) = segment.input {
        replace(&open_redirect(path, false)?, stdin)?;
    }
    if let Some(ref path) = segment.output {
        replace(&open_redirect(path, true)?, stdout)?;
    }
    Ok(())
}

fn replace(fd: &OwnedFd, target: RawFd) -> Result<()> {
    unistd::dup2(fd.as_raw_fd(), target)
        .map(|_| ())
        .map_err(|e| Error::launch("cannot redirect descriptor", e))
}

fn exit_child(code: i32) -> ! {
    unsafe { libc::_exit(code) }
}

/// Writes straight to fd 2; the `Stderr` lock may have been held by another thread
/// when we forked.
fn report(message: &str) {
    let mut stderr = ManuallyDrop::new(unsafe { File::from_raw_fd(libc::STDERR_FILENO) });
    let _ = writeln!(stderr, "turnip: {}", message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::wait::waitpid;
    use std::fs;
    use std::path::PathBuf;

    fn segment(argv: &[&str]) -> Segment {
        Segment {
            argv: argv.iter().map(|s| s.to_string()).collect(),
            input: None,
            output: None,
        }
    }

    fn wait_all(job: &Job) -> i32 {
        let mut status = 0;
        for &pid in &job.pids {
            status = exit_status(waitpid(pid, None).unwrap());
        }
        status
    }

    #[test]
    fn pipeline_connects_segments_and_redirects_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let pipeline = Pipeline {
            segments: vec![
                segment(&["printf", "foo\\nbar\\nfoo bar\\n"]),
                Segment {
                    output: Some(out.clone()),
                    ..segment(&["grep", "foo"])
                },
            ],
            background: false,
        };
        let job = launch(&pipeline, false).unwrap();
        assert_eq!(job.pids.len(), 2);
        assert_eq!(job.pgid, job.pids[0]);
        assert_eq!(wait_all(&job), 0);
        assert_eq!(fs::read_to_string(&out).unwrap(), "foo\nfoo bar\n");
    }

    #[test]
    fn input_redirection_feeds_first_segment() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let out = dir.path().join("out.txt");
        fs::write(&input, "b\na\n").unwrap();
        let pipeline = Pipeline {
            segments: vec![
                Segment {
                    input: Some(input),
                    ..segment(&["sort"])
                },
                Segment {
                    output: Some(out.clone()),
                    ..segment(&["tr", "a-z", "A-Z"])
                },
            ],
            background: false,
        };
        let job = launch(&pipeline, false).unwrap();
        assert_eq!(wait_all(&job), 0);
        assert_eq!(fs::read_to_string(&out).unwrap(), "A\nB\n");
    }

    #[test]
    fn output_redirect_in_the_middle_replaces_the_pipe() {
        let dir = tempfile::tempdir().unwrap();
        let mid = dir.path().join("mid.txt");
        let end = dir.path().join("end.txt");
        let pipeline = Pipeline {
            segments: vec![
                segment(&["printf", "data\\n"]),
                Segment {
                    output: Some(mid.clone()),
                    ..segment(&["cat"])
                },
                Segment {
                    output: Some(end.clone()),
                    ..segment(&["cat"])
                },
            ],
            background: false,
        };
        assert_eq!(wait_all(&launch(&pipeline, false).unwrap()), 0);
        assert_eq!(fs::read_to_string(&mid).unwrap(), "data\n");
        // the last command saw end-of-file right away
        assert_eq!(fs::read_to_string(&end).unwrap(), "");
    }

    #[test]
    fn status_is_last_segments() {
        let pipeline = Pipeline {
            segments: vec![segment(&["true"]), segment(&["false"])],
            background: false,
        };
        assert_eq!(wait_all(&launch(&pipeline, false).unwrap()), 1);
    }

    #[test]
    fn failures_stay_in_the_child() {
        let pipeline = Pipeline {
            segments: vec![segment(&["definitely-not-a-program-turnip"])],
            background: false,
        };
        assert_eq!(wait_all(&launch(&pipeline, false).unwrap()), 127);

        let pipeline = Pipeline {
            segments: vec![Segment {
                input: Some(PathBuf::from("/nonexistent/input")),
                ..segment(&["cat"])
            }],
            background: false,
        };
        assert_eq!(wait_all(&launch(&pipeline, false).unwrap()), 1);
    }

    #[test]
    fn output_files_are_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("private");
        drop(open_redirect(&path, true).unwrap());
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0);
    }

    #[test]
    fn nul_bytes_are_rejected_before_forking() {
        let pipeline = Pipeline {
            segments: vec![segment(&["echo", "a\0b"])],
            background: false,
        };
        assert!(matches!(launch(&pipeline, false), Err(Error::InvalidArgument(_))));
    }
}
