//! `build_command`: a reusable command template (spec §4.1).

use std::path::PathBuf;

use nix::unistd::{Uid, geteuid};

use crate::error::CommandError;

/// A reusable command template. Cloning and re-`execute`-ing the same
/// `CommandTemplate` is how the Task Scheduler re-runs a periodic check's
/// probe command every cycle.
#[derive(Debug, Clone)]
pub struct CommandTemplate {
    pub(crate) argv: Vec<String>,
    pub(crate) uid: Option<Uid>,
    pub(crate) gid: Option<nix::unistd::Gid>,
    pub(crate) working_directory: Option<PathBuf>,
    pub(crate) umask: u32,
    pub(crate) env: Vec<(String, String)>,
}

impl CommandTemplate {
    /// Build a command template running `path` with `argv` (argv[0] is
    /// `path` itself; additional arguments follow). Setting uid/gid when the
    /// calling process is not root fails the build (spec §4.1).
    pub fn build_command(path: impl Into<String>, args: impl IntoIterator<Item = String>) -> Result<Self, CommandError> {
        let mut argv = vec![path.into()];
        argv.extend(args);
        if argv[0].is_empty() {
            return Err(CommandError::EmptyArgv);
        }
        Ok(Self { argv, uid: None, gid: None, working_directory: None, umask: 0o022, env: Vec::new() })
    }

    pub fn with_uid(mut self, uid: u32) -> Result<Self, CommandError> {
        self.require_root()?;
        self.uid = Some(Uid::from_raw(uid));
        Ok(self)
    }

    pub fn with_gid(mut self, gid: u32) -> Result<Self, CommandError> {
        self.require_root()?;
        self.gid = Some(nix::unistd::Gid::from_raw(gid));
        Ok(self)
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn with_umask(mut self, umask: u32) -> Self {
        self.umask = umask;
        self
    }

    /// Merge one key/value override into the child environment. Keys set
    /// here replace any same-key entry the child would otherwise inherit
    /// from the parent's environ (spec §4.1 "Environment").
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    fn require_root(&self) -> Result<(), CommandError> {
        if !geteuid().is_root() {
            return Err(CommandError::PrivilegeDropRequiresRoot);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_command_rejects_empty_path() {
        assert!(CommandTemplate::build_command("", Vec::new()).is_err());
    }

    #[test]
    fn build_command_keeps_argv_order() {
        let cmd = CommandTemplate::build_command("/bin/echo", vec!["hi".to_string()]).unwrap();
        assert_eq!(cmd.argv(), &["/bin/echo", "hi"]);
    }

    #[test]
    fn with_uid_fails_when_not_root() {
        if !geteuid().is_root() {
            let cmd = CommandTemplate::build_command("/bin/true", Vec::new()).unwrap();
            assert!(cmd.with_uid(1000).is_err());
        }
    }
}
