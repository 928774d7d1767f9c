//! Waiting for a launched program while reaping orphans.
//!
//! Stage 2 runs as PID 1, so every process orphaned inside the VM is
//! reparented to it. Waiting for any child reaps those as well.

use std::fmt;

use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::Pid;
use tracing::{debug, error, info};

/// How a process terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Exited normally with this code.
    Code(i32),
    /// Killed by this signal.
    Signal(Signal),
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Code(0))
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Code(code) => write!(f, "exit status {}", code),
            ExitStatus::Signal(signal) => write!(f, "killed by {}", signal),
        }
    }
}

/// Outcome of [`reap_until`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reaped {
    /// Status of the awaited process, `None` if waiting failed first.
    pub status: Option<ExitStatus>,
    /// Other children reaped on the way.
    pub orphans: usize,
}

/// Wait for any child of this process (`waitpid(-1)`).
pub fn wait_any() -> nix::Result<WaitStatus> {
    waitpid(Pid::from_raw(-1), None)
}

/// Collect terminated children through `wait` until `expected` is among them.
///
/// Interrupted waits are retried. Any other wait error ends the loop.
pub fn reap_until<F>(expected: Pid, mut wait: F) -> Reaped
where
    F: FnMut() -> nix::Result<WaitStatus>,
{
    let mut orphans = 0;
    loop {
        let (pid, status) = match wait() {
            Ok(WaitStatus::Exited(pid, code)) => (pid, ExitStatus::Code(code)),
            Ok(WaitStatus::Signaled(pid, signal, _)) => (pid, ExitStatus::Signal(signal)),
            Ok(other) => {
                debug!("ignoring wait status {:?}", other);
                continue;
            }
            Err(Errno::EINTR) => continue,
            Err(e) => {
                error!("waiting for PID {} failed: {}", expected, e);
                return Reaped {
                    status: None,
                    orphans,
                };
            }
        };

        if pid == expected {
            return Reaped {
                status: Some(status),
                orphans,
            };
        }
        info!("reaped orphan PID {}, {}", pid, status);
        orphans += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    fn scripted(
        statuses: Vec<nix::Result<WaitStatus>>,
    ) -> impl FnMut() -> nix::Result<WaitStatus> {
        let mut queue: VecDeque<_> = statuses.into();
        move || queue.pop_front().unwrap_or(Err(Errno::ECHILD))
    }

    #[test]
    fn orphans_are_reaped_until_the_expected_pid() {
        let me = Pid::from_raw(42);
        let reaped = reap_until(
            me,
            scripted(vec![
                Ok(WaitStatus::Exited(Pid::from_raw(7), 0)),
                Err(Errno::EINTR),
                Ok(WaitStatus::Signaled(Pid::from_raw(8), Signal::SIGKILL, false)),
                Ok(WaitStatus::Exited(me, 3)),
                Ok(WaitStatus::Exited(Pid::from_raw(9), 0)),
            ]),
        );
        assert_eq!(reaped.status, Some(ExitStatus::Code(3)));
        assert_eq!(reaped.orphans, 2);
    }

    #[test]
    fn signal_termination_is_reported() {
        let me = Pid::from_raw(42);
        let reaped = reap_until(
            me,
            scripted(vec![Ok(WaitStatus::Signaled(me, Signal::SIGSEGV, true))]),
        );
        assert_eq!(reaped.status, Some(ExitStatus::Signal(Signal::SIGSEGV)));
        assert!(!reaped.status.unwrap().success());
    }

    #[test]
    fn unrecoverable_error_ends_the_loop() {
        let reaped = reap_until(
            Pid::from_raw(42),
            scripted(vec![Ok(WaitStatus::Exited(Pid::from_raw(7), 1))]),
        );
        assert_eq!(reaped.status, None);
        assert_eq!(reaped.orphans, 1);
    }

    #[test]
    fn display() {
        assert_eq!(ExitStatus::Code(0).to_string(), "exit status 0");
        assert_eq!(ExitStatus::Signal(Signal::SIGKILL).to_string(), "killed by SIGKILL");
    }
}
