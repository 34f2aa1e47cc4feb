//! Signal plumbing and the quit-confirmation state machine.
//!
//! Handlers never touch shell state. They bump lock-free counters and write a byte to
//! a self-pipe. The main loop polls the read end of that pipe next to its input (or
//! while a foreground pipeline runs), collects the counters with [`take_pending`] and
//! feeds each [`Delivery`] to the session's [`SignalController`]. A signal that lands
//! between two checks leaves its byte in the pipe, so the next poll returns at once.

use std::io::Write;
use std::os::fd::{BorrowedFd, IntoRawFd, RawFd};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::time::Duration;

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::libc;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::signal::{
    pthread_sigmask, sigaction, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal,
};
use nix::unistd::{self, alarm};

static QUIT_PRESSES: AtomicUsize = AtomicUsize::new(0);
static ALARM_FIRED: AtomicBool = AtomicBool::new(false);
static INTERRUPTED: AtomicBool = AtomicBool::new(false);
static WAKE_READ: AtomicI32 = AtomicI32::new(-1);
static WAKE_WRITE: AtomicI32 = AtomicI32::new(-1);

extern "C" fn record(signo: libc::c_int) {
    match signo {
        libc::SIGQUIT => {
            QUIT_PRESSES.fetch_add(1, Ordering::SeqCst);
        }
        libc::SIGALRM => ALARM_FIRED.store(true, Ordering::SeqCst),
        libc::SIGINT => INTERRUPTED.store(true, Ordering::SeqCst),
        // SIGCHLD only needs to wake the loop
        _ => {}
    }
    let fd = WAKE_WRITE.load(Ordering::SeqCst);
    if fd >= 0 {
        let saved = Errno::last_raw();
        let byte = 1u8;
        // a full pipe already guarantees a wakeup
        unsafe { libc::write(fd, &byte as *const u8 as *const libc::c_void, 1) };
        Errno::set_raw(saved);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Quit,
    TimerExpired,
    Interrupt,
}

/// Drains the self-pipe, then everything recorded since the last call. A timer expiry
/// is reported before any quit presses collected alongside it, since the alarm can
/// only have been set by an earlier press.
pub fn take_pending() -> Vec<Delivery> {
    drain_wakeups();
    let mut pending = Vec::new();
    if ALARM_FIRED.swap(false, Ordering::SeqCst) {
        pending.push(Delivery::TimerExpired);
    }
    let presses = QUIT_PRESSES.swap(0, Ordering::SeqCst);
    pending.extend(std::iter::repeat(Delivery::Quit).take(presses));
    if INTERRUPTED.swap(false, Ordering::SeqCst) {
        pending.push(Delivery::Interrupt);
    }
    pending
}

/// Read end of the self-pipe, once [`install`] has run.
pub fn wakeup_fd() -> Option<RawFd> {
    match WAKE_READ.load(Ordering::SeqCst) {
        fd if fd >= 0 => Some(fd),
        _ => None,
    }
}

fn drain_wakeups() {
    if let Some(fd) = wakeup_fd() {
        let mut buf = [0u8; 64];
        // non-blocking: stops with EAGAIN once empty
        while let Ok(n) = unistd::read(fd, &mut buf) {
            if n < buf.len() {
                break;
            }
        }
    }
}

/// Blocks until a signal has been recorded. Returns immediately when one is already
/// waiting in the self-pipe. Does nothing before [`install`].
pub fn wait_for_wakeup() {
    if let Some(fd) = wakeup_fd() {
        let fd = unsafe { BorrowedFd::borrow_raw(fd) };
        let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
        match poll(&mut fds, PollTimeout::NONE) {
            Ok(_) | Err(Errno::EINTR) => {}
            Err(e) => warn!("poll on signal pipe failed: {}", e),
        }
    }
}

/// Creates the self-pipe and routes SIGQUIT, SIGALRM, SIGINT and SIGCHLD to the
/// recorder. Calling it again reuses the existing pipe.
pub fn install() -> nix::Result<()> {
    if wakeup_fd().is_none() {
        let (read_end, write_end) = unistd::pipe2(OFlag::O_CLOEXEC | OFlag::O_NONBLOCK)?;
        WAKE_WRITE.store(write_end.into_raw_fd(), Ordering::SeqCst);
        WAKE_READ.store(read_end.into_raw_fd(), Ordering::SeqCst);
    }
    let action = SigAction::new(
        SigHandler::Handler(record),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    for signal in &[
        Signal::SIGQUIT,
        Signal::SIGALRM,
        Signal::SIGINT,
        Signal::SIGCHLD,
    ] {
        unsafe { sigaction(*signal, &action) }?;
    }
    Ok(())
}

/// Keeps an interactive shell from being stopped by terminal job-control signals.
pub fn ignore_job_control() -> nix::Result<()> {
    let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
    for signal in &[Signal::SIGTSTP, Signal::SIGTTIN, Signal::SIGTTOU] {
        unsafe { sigaction(*signal, &ignore) }?;
    }
    Ok(())
}

/// Called in a freshly forked child. Ignored dispositions survive `exec`, so every
/// signal the shell touched (SIGPIPE included, which the Rust runtime ignores) goes
/// back to its default. The child also stops writing to the shell's self-pipe.
pub fn reset_for_child() {
    WAKE_WRITE.store(-1, Ordering::SeqCst);
    let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    for signal in &[
        Signal::SIGINT,
        Signal::SIGQUIT,
        Signal::SIGALRM,
        Signal::SIGCHLD,
        Signal::SIGTSTP,
        Signal::SIGTTIN,
        Signal::SIGTTOU,
        Signal::SIGPIPE,
    ] {
        let _ = unsafe { sigaction(*signal, &default) };
    }
}

/// Holds back keyboard signals while a pipeline is being forked, so a child cannot
/// receive one before it has dropped the shell's handlers. The previous mask comes
/// back when the guard is dropped; a child restores it itself with [`Self::unblock`].
pub struct BlockedSignals {
    previous: SigSet,
}

impl BlockedSignals {
    pub fn block() -> nix::Result<BlockedSignals> {
        let mut blocked = SigSet::empty();
        blocked.add(Signal::SIGINT);
        blocked.add(Signal::SIGQUIT);
        let mut previous = SigSet::empty();
        pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&blocked), Some(&mut previous))?;
        Ok(BlockedSignals { previous })
    }

    pub fn unblock(&self) {
        let _ = pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(&self.previous), None);
    }
}

impl Drop for BlockedSignals {
    fn drop(&mut self) {
        self.unblock();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuitAction {
    /// First press: ask for confirmation and start the timer.
    Confirm,
    /// Still armed but not yet confirmed: restart the timer.
    Rearm,
    Exit,
}

/// Two-state quit confirmation: idle until the first quit, armed until the timer
/// runs out or a second quit confirms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalState {
    armed: bool,
    presses: u32,
}

impl SignalState {
    pub fn new() -> SignalState {
        SignalState::default()
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn presses(&self) -> u32 {
        self.presses
    }

    pub fn on_quit(&mut self) -> QuitAction {
        if !self.armed {
            self.armed = true;
            self.presses = 1;
            return QuitAction::Confirm;
        }
        self.presses += 1;
        if self.presses >= 2 {
            QuitAction::Exit
        } else {
            QuitAction::Rearm
        }
    }

    pub fn on_timer(&mut self) {
        self.armed = false;
        self.presses = 0;
    }
}

pub trait QuitTimer {
    fn arm(&mut self, timeout: Duration);
    fn cancel(&mut self);
}

/// One-shot timer backed by `alarm(2)`; expiry arrives as SIGALRM.
#[derive(Debug, Default)]
pub struct AlarmTimer;

impl QuitTimer for AlarmTimer {
    fn arm(&mut self, timeout: Duration) {
        let secs = timeout.as_secs().clamp(1, libc::c_uint::MAX as u64) as libc::c_uint;
        alarm::set(secs);
    }

    fn cancel(&mut self) {
        alarm::cancel();
    }
}

pub struct SignalController<T: QuitTimer> {
    state: SignalState,
    timer: T,
    timeout: Duration,
}

impl<T: QuitTimer> SignalController<T> {
    pub fn new(timer: T, timeout: Duration) -> SignalController<T> {
        SignalController {
            state: SignalState::new(),
            timer,
            timeout,
        }
    }

    pub fn state(&self) -> &SignalState {
        &self.state
    }

    /// Applies one delivery. Returns the exit status when the shell must terminate.
    /// Interrupts are not the controller's business and are ignored here.
    pub fn handle<W: Write>(&mut self, delivery: Delivery, out: &mut W) -> Option<i32> {
        match delivery {
            Delivery::Quit => match self.state.on_quit() {
                QuitAction::Confirm => {
                    let _ = writeln!(
                        out,
                        "\nPress Ctrl-\\ again within {} seconds to quit.",
                        self.timeout.as_secs()
                    );
                    let _ = out.flush();
                    self.timer.arm(self.timeout);
                    None
                }
                QuitAction::Rearm => {
                    self.timer.arm(self.timeout);
                    None
                }
                QuitAction::Exit => {
                    info!("quit confirmed");
                    self.timer.cancel();
                    Some(0)
                }
            },
            Delivery::TimerExpired => {
                debug!("quit confirmation expired");
                self.state.on_timer();
                None
            }
            Delivery::Interrupt => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakeTimer {
        armed: Vec<Duration>,
        cancelled: usize,
    }

    impl QuitTimer for FakeTimer {
        fn arm(&mut self, timeout: Duration) {
            self.armed.push(timeout);
        }

        fn cancel(&mut self) {
            self.cancelled += 1;
        }
    }

    fn controller() -> SignalController<FakeTimer> {
        SignalController::new(FakeTimer::default(), Duration::from_secs(5))
    }

    fn prompts(out: &[u8]) -> usize {
        String::from_utf8_lossy(out).matches("again within 5 seconds").count()
    }

    #[test]
    fn first_quit_arms() {
        let mut c = controller();
        let mut out = Vec::new();
        assert_eq!(c.handle(Delivery::Quit, &mut out), None);
        assert!(c.state().is_armed());
        assert_eq!(c.state().presses(), 1);
        assert_eq!(prompts(&out), 1);
        assert_eq!(c.timer.armed, vec![Duration::from_secs(5)]);
    }

    #[test]
    fn second_quit_exits() {
        let mut c = controller();
        let mut out = Vec::new();
        c.handle(Delivery::Quit, &mut out);
        assert_eq!(c.handle(Delivery::Quit, &mut out), Some(0));
        assert_eq!(prompts(&out), 1);
        assert_eq!(c.timer.cancelled, 1);
    }

    #[test]
    fn expiry_disarms() {
        let mut c = controller();
        let mut out = Vec::new();
        c.handle(Delivery::Quit, &mut out);
        assert_eq!(c.handle(Delivery::TimerExpired, &mut out), None);
        assert!(!c.state().is_armed());
        assert_eq!(c.state().presses(), 0);

        assert_eq!(c.handle(Delivery::Quit, &mut out), None);
        assert!(c.state().is_armed());
        assert_eq!(c.state().presses(), 1);
        assert_eq!(prompts(&out), 2);
    }

    #[test]
    fn interrupt_and_stray_alarm_are_harmless() {
        let mut c = controller();
        let mut out = Vec::new();
        assert_eq!(c.handle(Delivery::Interrupt, &mut out), None);
        assert_eq!(c.handle(Delivery::TimerExpired, &mut out), None);
        assert_eq!(c.state(), &SignalState::new());
        assert!(out.is_empty());
    }

    #[test]
    fn recorder_feeds_pending_queue() {
        record(libc::SIGQUIT);
        record(libc::SIGALRM);
        record(libc::SIGQUIT);
        record(libc::SIGINT);
        assert_eq!(
            take_pending(),
            vec![
                Delivery::TimerExpired,
                Delivery::Quit,
                Delivery::Quit,
                Delivery::Interrupt
            ]
        );
        assert!(take_pending().is_empty());
    }
}
