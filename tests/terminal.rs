//! Interactive sessions driven over a pseudo-terminal.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use nix::libc;
use nix::pty::openpty;
use nix::unistd;

#[test]
fn foreground_pipelines_give_the_terminal_back() {
    let pty = openpty(None, None).unwrap();
    let mut command = Command::new(env!("CARGO_BIN_EXE_turnip"));
    command
        .env("TURNIP_RC", "")
        .env_remove("TURNIP_LOG")
        .stdin(Stdio::from(pty.slave.try_clone().unwrap()))
        .stdout(Stdio::from(pty.slave.try_clone().unwrap()))
        .stderr(Stdio::from(pty.slave));
    unsafe {
        command.pre_exec(|| {
            unistd::setsid()?;
            // make the pty the session's controlling terminal
            if libc::ioctl(libc::STDIN_FILENO, libc::TIOCSCTTY as _, 0) == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }
    let mut child = command.spawn().unwrap();
    // our copies of the slave side must go, or the reader never sees EIO
    drop(command);

    let mut master = File::from(pty.master);
    let mut reader = master.try_clone().unwrap();
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut seen = Vec::new();
        let mut buf = [0u8; 1024];
        // ends with EIO once the shell has closed the terminal
        while let Ok(n) = reader.read(&mut buf) {
            if n == 0 {
                break;
            }
            seen.extend_from_slice(&buf[..n]);
        }
        let _ = tx.send(seen);
    });

    let mut script = String::new();
    for _ in 0..20 {
        script.push_str("true | true\n");
        script.push_str("true\n");
    }
    script.push_str("printf 'ALIVE%s\\n' 42\nexit 0\n");
    master.write_all(script.as_bytes()).unwrap();

    let deadline = Instant::now() + Duration::from_secs(30);
    let status = loop {
        if let Some(status) = child.try_wait().unwrap() {
            break status;
        }
        if Instant::now() > deadline {
            let _ = child.kill();
            panic!("shell did not finish");
        }
        thread::sleep(Duration::from_millis(50));
    };

    let output = rx.recv_timeout(Duration::from_secs(10)).unwrap();
    let output = String::from_utf8_lossy(&output);
    assert!(output.contains("ALIVE42"), "{}", output);
    assert!(!output.contains("input error"), "{}", output);
    assert_eq!(status.code(), Some(0), "{}", output);
}
