use std::{
    ffi::OsStr,
    process::{Command, Stdio},
};

use anyhow::{Context, Result};

use crate::errors::Error;

/// An external command run on behalf of the user, e.g. `update-grub`.
#[derive(Debug)]
pub(crate) struct Task {
    description: String,
    exe: String,
    quiet: bool,
    cmd: Command,
}

impl Task {
    pub(crate) fn new(description: impl AsRef<str>, exe: impl AsRef<str>) -> Self {
        let exe = exe.as_ref().to_owned();
        let mut cmd = Command::new(&exe);
        // Default to noninteractive
        cmd.stdin(Stdio::null());
        Self {
            description: description.as_ref().to_owned(),
            exe,
            quiet: false,
            cmd,
        }
    }

    pub(crate) fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    pub(crate) fn args<S: AsRef<OsStr>>(mut self, args: impl IntoIterator<Item = S>) -> Self {
        self.cmd.args(args);
        self
    }

    /// Build a task from an argv-style list, e.g. from configuration.
    pub(crate) fn from_argv(description: impl AsRef<str>, argv: &[String]) -> Result<Self> {
        let (exe, args) = argv
            .split_first()
            .ok_or_else(|| anyhow::anyhow!("Empty command for {}", description.as_ref()))?;
        Ok(Self::new(description, exe).args(args))
    }

    /// Run the command, returning an error if the command does not exit successfully.
    pub(crate) fn run(self) -> Result<()> {
        let description = self.description;
        let mut cmd = self.cmd;
        if !self.quiet {
            println!("{description}");
        }
        tracing::debug!("exec: {cmd:?}");
        let st = match cmd.status() {
            Ok(st) => st,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::ExternalCommandMissing { command: self.exe }.into());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Spawning {description} failed"));
            }
        };
        if !st.success() {
            anyhow::bail!("Task {description} failed: {st:?}");
        }
        Ok(())
    }
}
