//! `execute` and `ProcessHandle`: fork/exec plus the liveness API (spec §4.1).

use std::ffi::CString;
use std::fs::File;
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};

use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, kill, sigaction};
use nix::sys::stat::{Mode, umask};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{
    ForkResult, Gid, Pid, Uid, User, chdir, dup2, execve, fork, getgid, getgrouplist, getuid, setgid, setgroups, setsid,
    setuid,
};
use parking_lot::Mutex;

use crate::command::CommandTemplate;
use crate::env::merged_environ;
use crate::error::ExecuteError;
use crate::pipes::{PipePair, StdioPipes, close_fds_above_stdio, open_ctrl_pipe, open_pipe, set_nonblocking};

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Exited(i32),
    Signaled(Signal),
}

impl ExitOutcome {
    /// True if the process ran to completion with status 0.
    pub fn success(self) -> bool {
        matches!(self, ExitOutcome::Exited(0))
    }
}

/// A forked and exec'd child process, plus its stdio pipes.
pub struct ProcessHandle {
    pid: Pid,
    argv0: String,
    stdin: Mutex<Option<File>>,
    stdout: Mutex<Option<File>>,
    stderr: Mutex<Option<File>>,
    exit_status: Mutex<Option<ExitOutcome>>,
    detached: AtomicBool,
}

fn to_cstring(s: &str) -> Result<CString, ExecuteError> {
    CString::new(s).map_err(|_| ExecuteError::InvalidArgv(s.to_string()))
}

/// Fork and exec `cmd`. See spec §4.1 for the full child-side contract.
pub fn execute(cmd: &CommandTemplate) -> Result<ProcessHandle, ExecuteError> {
    let ctrl = open_ctrl_pipe()?;
    let stdio = StdioPipes { stdin: open_pipe()?, stdout: open_pipe()?, stderr: open_pipe()? };

    let path = to_cstring(&cmd.argv[0])?;
    let argv: Vec<CString> = cmd.argv.iter().map(|s| to_cstring(s)).collect::<Result<_, _>>()?;
    let envp = merged_environ(&cmd.env);

    // Safety: the child branch below only calls async-signal-safe-adjacent
    // nix/libc wrappers and either execve()s or _exit()s; it never returns
    // into the parent's Rust call stack.
    match unsafe { fork() }.map_err(ExecuteError::Fork)? {
        ForkResult::Child => {
            child_exec(cmd, &ctrl, &stdio, &path, &argv, &envp);
        }
        ForkResult::Parent { child } => {
            drop(ctrl.write);
            drop(stdio.stdin.read);
            drop(stdio.stdout.write);
            drop(stdio.stderr.write);

            let mut errno_buf = [0u8; 4];
            let ctrl_read_fd = ctrl.read.as_raw_fd();
            let n = read_ctrl_pipe(ctrl_read_fd, &mut errno_buf);
            drop(ctrl.read);

            if n == 4 {
                let errno = i32::from_ne_bytes(errno_buf);
                let _ = waitpid(child, None);
                return Err(ExecuteError::Exec(nix::Error::from_raw(errno)));
            }

            set_nonblocking(stdio.stdin.write.as_raw_fd()).map_err(ExecuteError::Pipe)?;
            set_nonblocking(stdio.stdout.read.as_raw_fd()).map_err(ExecuteError::Pipe)?;
            set_nonblocking(stdio.stderr.read.as_raw_fd()).map_err(ExecuteError::Pipe)?;

            Ok(ProcessHandle {
                pid: child,
                argv0: cmd.argv[0].clone(),
                stdin: Mutex::new(Some(owned_fd_to_file(stdio.stdin.write))),
                stdout: Mutex::new(Some(owned_fd_to_file(stdio.stdout.read))),
                stderr: Mutex::new(Some(owned_fd_to_file(stdio.stderr.read))),
                exit_status: Mutex::new(None),
                detached: AtomicBool::new(false),
            })
        }
    }
}

fn owned_fd_to_file(fd: OwnedFd) -> File {
    unsafe { File::from_raw_fd(fd.into_raw_fd()) }
}

/// Blocking read of exactly `buf.len()` bytes, or fewer on EOF. Restarts on
/// EINTR, matching the parent-side controller pipe protocol.
fn read_ctrl_pipe(fd: RawFd, buf: &mut [u8; 4]) -> usize {
    use nix::unistd::read;
    let mut total = 0;
    while total < buf.len() {
        match read(fd, &mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(nix::Error::EINTR) => continue,
            Err(_) => break,
        }
    }
    total
}

/// The child side of `execute`. Never returns: either `execve` replaces this
/// process image, or we report the errno over the controller pipe and
/// `_exit(127)`.
fn child_exec(cmd: &CommandTemplate, ctrl: &PipePair, stdio: &StdioPipes, path: &CString, argv: &[CString], envp: &[CString]) -> ! {
    let result = child_exec_inner(cmd, ctrl, stdio, path, argv, envp);
    let errno = result.unwrap_or(libc::EIO);
    let bytes = errno.to_ne_bytes();
    let _ = nix::unistd::write(unsafe { std::os::fd::BorrowedFd::borrow_raw(ctrl.write.as_raw_fd()) }, &bytes);
    std::process::exit(127);
}

fn child_exec_inner(cmd: &CommandTemplate, ctrl: &PipePair, stdio: &StdioPipes, path: &CString, argv: &[CString], envp: &[CString]) -> Result<i32, i32> {
    reset_signal_handlers();

    if let Some(dir) = &cmd.working_directory {
        chdir(dir.as_path()).map_err(errno_of)?;
    }

    setsid().map_err(errno_of)?;

    dup2(stdio.stdin.read.as_raw_fd(), 0).map_err(errno_of)?;
    dup2(stdio.stdout.write.as_raw_fd(), 1).map_err(errno_of)?;
    dup2(stdio.stderr.write.as_raw_fd(), 2).map_err(errno_of)?;

    close_fds_above_stdio(ctrl.write.as_raw_fd());

    drop_privileges(cmd.gid, cmd.uid)?;

    umask(Mode::from_bits_truncate(cmd.umask));

    let _ = execve(path, argv, envp).map_err(errno_of)?;
    unreachable!("execve only returns on error")
}

fn errno_of(e: nix::Error) -> i32 {
    e as i32
}

/// Resets every catchable signal to its default disposition except SIGHUP
/// and SIGPIPE, which become SIG_IGN (spec §4.1 step 1).
fn reset_signal_handlers() {
    for signal in Signal::iterator() {
        if matches!(signal, Signal::SIGKILL | Signal::SIGSTOP) {
            continue;
        }
        let handler = if matches!(signal, Signal::SIGHUP | Signal::SIGPIPE) { SigHandler::SigIgn } else { SigHandler::SigDfl };
        let action = SigAction::new(handler, SaFlags::empty(), SigSet::empty());
        let _ = unsafe { sigaction(signal, &action) };
    }
}

/// Drops group then user privileges, verifying each with a readback (spec
/// §4.1 step 6).
fn drop_privileges(gid: Option<Gid>, uid: Option<Uid>) -> Result<(), i32> {
    if let Some(gid) = gid {
        setgid(gid).map_err(errno_of)?;
        if getgid() != gid {
            return Err(libc::EPERM);
        }
    }
    if let Some(uid) = uid {
        let primary_gid = gid.unwrap_or_else(getgid);
        let groups = match User::from_uid(uid) {
            Ok(Some(user)) => getgrouplist(&CString::new(user.name).unwrap_or_default(), primary_gid).unwrap_or_else(|_| vec![primary_gid]),
            _ => vec![primary_gid],
        };
        setgroups(&groups).map_err(errno_of)?;
        setuid(uid).map_err(errno_of)?;
        if getuid() != uid {
            return Err(libc::EPERM);
        }
    }
    Ok(())
}

impl ProcessHandle {
    pub fn pid(&self) -> i32 {
        self.pid.as_raw()
    }

    pub fn argv0(&self) -> &str {
        &self.argv0
    }

    /// Non-blocking liveness check. Reaps the child and caches its exit
    /// status the first time it is observed to have exited.
    pub fn is_running(&self) -> bool {
        self.exit_status().is_none()
    }

    /// Returns the cached exit status, polling with `WNOHANG` if none is
    /// cached yet.
    pub fn exit_status(&self) -> Option<ExitOutcome> {
        let mut cached = self.exit_status.lock();
        if cached.is_some() {
            return *cached;
        }
        match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(_, code)) => {
                *cached = Some(ExitOutcome::Exited(code));
            }
            Ok(WaitStatus::Signaled(_, signal, _)) => {
                *cached = Some(ExitOutcome::Signaled(signal));
            }
            _ => {}
        }
        *cached
    }

    /// Blocking wait, restartable across `EINTR` (spec §4.1 "Liveness API").
    pub fn wait_for(&self) -> Result<ExitOutcome, ExecuteError> {
        {
            let cached = self.exit_status.lock();
            if let Some(status) = *cached {
                return Ok(status);
            }
        }
        loop {
            match waitpid(self.pid, None) {
                Ok(WaitStatus::Exited(_, code)) => {
                    let status = ExitOutcome::Exited(code);
                    *self.exit_status.lock() = Some(status);
                    return Ok(status);
                }
                Ok(WaitStatus::Signaled(_, signal, _)) => {
                    let status = ExitOutcome::Signaled(signal);
                    *self.exit_status.lock() = Some(status);
                    return Ok(status);
                }
                Ok(_) => continue,
                Err(nix::Error::EINTR) => continue,
                Err(e) => return Err(ExecuteError::Wait(e)),
            }
        }
    }

    pub fn terminate(&self) -> Result<(), ExecuteError> {
        kill(self.pid, Signal::SIGTERM).map_err(ExecuteError::Signal)
    }

    pub fn kill(&self) -> Result<(), ExecuteError> {
        kill(self.pid, Signal::SIGKILL).map_err(ExecuteError::Signal)
    }

    pub fn stdin(&self) -> parking_lot::MutexGuard<'_, Option<File>> {
        self.stdin.lock()
    }

    pub fn stdout(&self) -> parking_lot::MutexGuard<'_, Option<File>> {
        self.stdout.lock()
    }

    pub fn stderr(&self) -> parking_lot::MutexGuard<'_, Option<File>> {
        self.stderr.lock()
    }

    /// Closes the stdio pipes but keeps the handle reachable; the next
    /// `Drop` will not kill the child (spec §4.1 "Liveness API").
    pub fn detach(&self) {
        self.stdin.lock().take();
        self.stdout.lock().take();
        self.stderr.lock().take();
        self.detached.store(true, Ordering::Release);
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if !self.detached.load(Ordering::Acquire) && self.exit_status().is_none() {
            let _ = self.kill();
            let _ = self.wait_for();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandTemplate;
    use std::io::Read;

    #[test]
    fn execute_true_succeeds_and_exits_zero() {
        let cmd = CommandTemplate::build_command("/bin/true", Vec::new()).expect("build");
        let handle = execute(&cmd).expect("execute");
        let status = handle.wait_for().expect("wait");
        assert_eq!(status, ExitOutcome::Exited(0));
    }

    #[test]
    fn execute_nonexistent_binary_reports_exec_error() {
        let cmd = CommandTemplate::build_command("/no/such/binary-xyz", Vec::new()).expect("build");
        let err = execute(&cmd);
        assert!(err.is_err());
    }

    #[test]
    fn stdout_is_captured_through_the_pipe() {
        let cmd = CommandTemplate::build_command("/bin/echo", vec!["hello".to_string()]).expect("build");
        let handle = execute(&cmd).expect("execute");
        handle.wait_for().expect("wait");
        let mut buf = String::new();
        if let Some(file) = handle.stdout().as_mut() {
            // the pipe is nonblocking and the child has already exited, so
            // all buffered output is available without blocking.
            let _ = file.read_to_string(&mut buf);
        }
        assert!(buf.contains("hello"));
    }

    #[test]
    fn terminate_kills_a_long_running_child() {
        let cmd = CommandTemplate::build_command("/bin/sleep", vec!["30".to_string()]).expect("build");
        let handle = execute(&cmd).expect("execute");
        assert!(handle.is_running());
        handle.terminate().expect("terminate");
        let status = handle.wait_for().expect("wait");
        assert_eq!(status, ExitOutcome::Signaled(Signal::SIGTERM));
    }

    #[test]
    fn detach_prevents_drop_from_killing_the_child() {
        let cmd = CommandTemplate::build_command("/bin/sleep", vec!["30".to_string()]).expect("build");
        let handle = execute(&cmd).expect("execute");
        let pid = handle.pid();
        handle.detach();
        drop(handle);
        // the child is still alive; clean it up directly.
        assert_eq!(unsafe { libc::kill(pid, 0) }, 0);
        unsafe {
            libc::kill(pid, libc::SIGKILL);
        }
        let _ = waitpid(Pid::from_raw(pid), None);
    }
}
