//! Pipe plumbing shared by `execute` (spec §4.1 steps 4-5 and the controller
//! pipe protocol).

use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use nix::fcntl::{FcntlArg, FdFlag, OFlag, fcntl};
use nix::unistd::pipe;

use crate::error::ExecuteError;

/// One end of a pair of pipe fds.
pub(crate) struct PipePair {
    pub(crate) read: OwnedFd,
    pub(crate) write: OwnedFd,
}

/// The three stdio pipes set up for a child before exec (spec §4.1 step 4).
pub(crate) struct StdioPipes {
    pub(crate) stdin: PipePair,
    pub(crate) stdout: PipePair,
    pub(crate) stderr: PipePair,
}

pub(crate) fn open_pipe() -> Result<PipePair, ExecuteError> {
    let (read, write) = pipe().map_err(ExecuteError::Pipe)?;
    Ok(PipePair { read, write })
}

/// The controller pipe: only the write end is CLOEXEC, so a successful
/// `execve` in the child closes it automatically and the parent observes
/// EOF. A failed `execve` writes the errno before exiting, while the fd is
/// still open.
pub(crate) fn open_ctrl_pipe() -> Result<PipePair, ExecuteError> {
    let pair = open_pipe()?;
    fcntl(pair.write.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC)).map_err(ExecuteError::Pipe)?;
    Ok(pair)
}

pub(crate) fn set_nonblocking(fd: RawFd) -> nix::Result<()> {
    let flags = OFlag::from_bits_truncate(fcntl(fd, FcntlArg::F_GETFL)?);
    fcntl(fd, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;
    Ok(())
}

/// Closes every fd from 3 up to the process's soft descriptor limit except
/// `keep` (spec §4.1 step 5). Called only in the forked child, before exec.
pub(crate) fn close_fds_above_stdio(keep: RawFd) {
    let mut limit = libc::rlimit { rlim_cur: 0, rlim_max: 0 };
    let soft_limit = if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) } == 0 {
        limit.rlim_cur as RawFd
    } else {
        256
    };
    for fd in 3..soft_limit {
        if fd != keep {
            unsafe {
                libc::close(fd);
            }
        }
    }
}
