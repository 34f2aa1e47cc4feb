//! Line input that lets signals through.
//!
//! The standard library's buffered readers block until a newline, which would keep a
//! quit press from being acted on until the user hits return. [`LineReader`] polls the
//! input descriptor together with the signal self-pipe and reports a pending signal
//! to its caller as soon as it is recorded.

use std::os::fd::{BorrowedFd, RawFd};

use nix::errno::Errno;
use nix::libc;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::unistd;

use super::signals;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadEvent {
    Line(String),
    /// The line was not valid UTF-8 and has been discarded.
    Invalid(Vec<u8>),
    Eof,
    /// A signal arrived before a full line was available. Already buffered input is
    /// kept for the next call.
    Interrupted,
}

pub struct LineReader {
    fd: RawFd,
    wakeup: Option<RawFd>,
    pending: Vec<u8>,
}

impl LineReader {
    pub fn new(fd: RawFd) -> LineReader {
        LineReader {
            fd,
            wakeup: None,
            pending: Vec::new(),
        }
    }

    /// Also returns [`ReadEvent::Interrupted`] whenever `wakeup` becomes readable.
    pub fn with_wakeup(mut self, wakeup: Option<RawFd>) -> LineReader {
        self.wakeup = wakeup;
        self
    }

    /// Standard input, interrupted by the shell's signal pipe.
    pub fn stdin() -> LineReader {
        LineReader::new(libc::STDIN_FILENO).with_wakeup(signals::wakeup_fd())
    }

    pub fn read_line(&mut self) -> nix::Result<ReadEvent> {
        let mut chunk = [0u8; 4096];
        loop {
            if let Some(end) = self.pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.pending.drain(..=end).collect();
                return Ok(decode(&line[..end]));
            }
            if self.wait_for_input()? {
                return Ok(ReadEvent::Interrupted);
            }
            match unistd::read(self.fd, &mut chunk) {
                Ok(0) if self.pending.is_empty() => return Ok(ReadEvent::Eof),
                Ok(0) => {
                    // last line without a newline
                    let line = std::mem::take(&mut self.pending);
                    return Ok(decode(&line));
                }
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(Errno::EINTR) => return Ok(ReadEvent::Interrupted),
                Err(e) => return Err(e),
            }
        }
    }

    /// Sleeps until input or a wakeup is ready. Returns true for a wakeup.
    fn wait_for_input(&self) -> nix::Result<bool> {
        let wakeup = match self.wakeup {
            Some(fd) => fd,
            None => return Ok(false),
        };
        let (input, wakeup) = unsafe { (BorrowedFd::borrow_raw(self.fd), BorrowedFd::borrow_raw(wakeup)) };
        let mut fds = [
            PollFd::new(input, PollFlags::POLLIN),
            PollFd::new(wakeup, PollFlags::POLLIN),
        ];
        match poll(&mut fds, PollTimeout::NONE) {
            Ok(_) => {}
            Err(Errno::EINTR) => return Ok(true),
            Err(e) => return Err(e),
        }
        let woken = fds[1]
            .revents()
            .map_or(false, |r| r.contains(PollFlags::POLLIN));
        Ok(woken)
    }
}

fn decode(bytes: &[u8]) -> ReadEvent {
    match String::from_utf8(bytes.to_vec()) {
        Ok(line) => ReadEvent::Line(line),
        Err(e) => ReadEvent::Invalid(e.into_bytes()),
    }
}
