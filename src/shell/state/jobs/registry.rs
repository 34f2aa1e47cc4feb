use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use super::exit_status;

/// Process ids of background pipelines, most recent last.
///
/// Every process of a backgrounded pipeline is registered, not only the last one, so
/// that each of them is eventually waited on.
#[derive(Debug, Default)]
pub struct JobRegistry {
    pids: Vec<Pid>,
}

impl JobRegistry {
    pub fn new() -> JobRegistry {
        JobRegistry::default()
    }

    pub fn push(&mut self, pid: Pid) {
        self.pids.push(pid);
    }

    pub fn pop(&mut self) -> Option<Pid> {
        self.pids.pop()
    }

    pub fn len(&self) -> usize {
        self.pids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pids.is_empty()
    }

    pub fn pids(&self) -> &[Pid] {
        &self.pids
    }

    /// Waits, without blocking, on every tracked process and forgets the ones that
    /// have terminated. Returns them with their exit status in registration order.
    pub fn reap_finished(&mut self) -> Vec<(Pid, i32)> {
        let mut finished = Vec::new();
        self.pids.retain(|&pid| match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => true,
            Ok(status) => {
                finished.push((pid, exit_status(status)));
                false
            }
            Err(Errno::ECHILD) => {
                debug!("{} is not a child of this shell any more", pid);
                false
            }
            Err(e) => {
                warn!("waitpid({}) failed: {}", pid, e);
                true
            }
        });
        finished
    }

    /// Empties the registry at shutdown. Finished processes are reaped; the rest keep
    /// running and are inherited (and eventually reaped) by init.
    pub fn drain_all(&mut self) -> Vec<(Pid, i32)> {
        let finished = self.reap_finished();
        for pid in self.pids.drain(..) {
            info!("leaving background process {} running", pid);
        }
        finished
    }
}
