//! Signals recorded while the shell is not yet blocked must still wake it. Installs
//! process-wide handlers, so everything runs in one test.

use std::fs::File;
use std::os::fd::AsRawFd;
use std::time::{Duration, Instant};

use nix::sys::signal::{raise, Signal};
use nix::unistd;
use turnip::shell::readline::{LineReader, ReadEvent};
use turnip::shell::signals::{self, Delivery};
use turnip::{Config, Flow, ShellState};

#[test]
fn signals_before_blocking_are_not_lost() {
    signals::install().unwrap();

    // a quit that arrives before the read starts
    let (input, writer) = unistd::pipe().unwrap();
    let _writer = File::from(writer);
    raise(Signal::SIGQUIT).unwrap();
    let mut reader = LineReader::new(input.as_raw_fd()).with_wakeup(signals::wakeup_fd());
    assert_eq!(reader.read_line().unwrap(), ReadEvent::Interrupted);
    assert_eq!(signals::take_pending(), vec![Delivery::Quit]);

    // an interrupt that arrives while the pipeline is still being launched
    let mut shell = ShellState::new(Config::default());
    let started = Instant::now();
    raise(Signal::SIGINT).unwrap();
    assert_eq!(shell.process_line("sleep 5"), Flow::Continue(130));
    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(signals::take_pending().is_empty());
}
