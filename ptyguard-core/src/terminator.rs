use crate::error::{Error, Result};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

/// Delivers the remediation signal to a process.
pub trait Terminator {
    fn terminate(&self, pid: u32) -> Result<()>;
}

/// Sends `SIGTERM`, never `SIGKILL`.
pub struct SignalTerminator;

impl Terminator for SignalTerminator {
    fn terminate(&self, pid: u32) -> Result<()> {
        // pid 0 and negative values address process groups
        if pid <= 1 || pid > i32::MAX as u32 {
            return Err(Error::Signal {
                pid,
                errno: nix::Error::EINVAL,
            });
        }
        kill(Pid::from_raw(pid as i32), Signal::SIGTERM).map_err(|errno| Error::Signal { pid, errno })
    }
}
