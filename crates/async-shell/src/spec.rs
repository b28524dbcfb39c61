//! Immutable description of a process to run

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_process::{Command as AsyncCommand, Stdio};

use crate::error::{Error, Result};

/// How the program is invoked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// Execute the program directly with the argument vector
    Direct,
    /// Hand the command line to a system shell
    Shell {
        /// Shell binary overriding the platform default
        executable: Option<PathBuf>,
    },
}

/// A validated, immutable command description.
///
/// Built with [`CommandSpec::builder`] for direct execution or
/// [`CommandSpec::shell`] for a shell command line. Cloning is cheap enough
/// to rerun the same spec as often as needed.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    program: OsString,
    args: Vec<OsString>,
    env: BTreeMap<OsString, OsString>,
    env_clear: bool,
    current_dir: Option<PathBuf>,
    input: Option<Vec<u8>>,
    interactive_stdin: bool,
    timeout: Option<Duration>,
    check: bool,
    invocation: Invocation,
}

impl CommandSpec {
    /// Start building a spec that executes `program` directly
    pub fn builder<S: AsRef<OsStr>>(program: S) -> CommandSpecBuilder {
        CommandSpecBuilder::new(program.as_ref().to_owned(), Invocation::Direct)
    }

    /// Start building a spec that runs `line` through the system shell
    pub fn shell<S: AsRef<OsStr>>(line: S) -> CommandSpecBuilder {
        CommandSpecBuilder::new(
            line.as_ref().to_owned(),
            Invocation::Shell { executable: None },
        )
    }

    /// The program, or the shell line in shell mode
    pub fn get_program(&self) -> &OsStr {
        &self.program
    }

    /// The arguments
    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    /// Environment overrides
    pub fn get_envs(&self) -> &BTreeMap<OsString, OsString> {
        &self.env
    }

    /// Whether the inherited environment is dropped
    pub fn is_env_cleared(&self) -> bool {
        self.env_clear
    }

    /// The working directory
    pub fn get_current_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    /// Bytes written to the process's stdin
    pub fn get_input(&self) -> Option<&[u8]> {
        self.input.as_deref()
    }

    /// Whether stdin stays open for a [`StdinHandle`](crate::StdinHandle)
    pub fn is_stdin_interactive(&self) -> bool {
        self.interactive_stdin
    }

    /// Upper bound on the run time
    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Whether a non-zero exit is reported as an error
    pub fn is_checked(&self) -> bool {
        self.check
    }

    /// Direct or shell invocation
    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    /// Copy of this spec with non-zero exits reported as errors
    pub fn checked(&self) -> Self {
        Self {
            check: true,
            ..self.clone()
        }
    }

    /// Convert into an `async_process::Command` with all stdio piped
    pub fn prepare(&self) -> AsyncCommand {
        let mut cmd = match &self.invocation {
            Invocation::Direct => AsyncCommand::new(&self.program),
            Invocation::Shell { executable } => {
                shell_command(executable.as_deref(), &self.program)
            }
        };

        cmd.args(&self.args);

        if self.env_clear {
            cmd.env_clear();
        }
        for (key, val) in &self.env {
            cmd.env(key, val);
        }

        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        cmd
    }
}

#[cfg(unix)]
fn shell_command(executable: Option<&Path>, line: &OsStr) -> AsyncCommand {
    let mut cmd = AsyncCommand::new(executable.unwrap_or(Path::new("/bin/sh")));
    cmd.arg("-c").arg(line);
    cmd
}

#[cfg(windows)]
fn shell_command(executable: Option<&Path>, line: &OsStr) -> AsyncCommand {
    let mut cmd = AsyncCommand::new(executable.unwrap_or(Path::new("cmd")));
    cmd.arg("/C").arg(line);
    cmd
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            let arg = arg.to_string_lossy();
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " {arg:?}")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Builder for [`CommandSpec`]; validation happens in [`build`](Self::build)
#[derive(Debug, Clone)]
pub struct CommandSpecBuilder(CommandSpec);

impl CommandSpecBuilder {
    fn new(program: OsString, invocation: Invocation) -> Self {
        Self(CommandSpec {
            program,
            args: Vec::new(),
            env: BTreeMap::new(),
            env_clear: false,
            current_dir: None,
            input: None,
            interactive_stdin: false,
            timeout: None,
            check: false,
            invocation,
        })
    }

    /// Add an argument
    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        self.0.args.push(arg.as_ref().to_owned());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.0
            .args
            .extend(args.into_iter().map(|arg| arg.as_ref().to_owned()));
        self
    }

    /// Set an environment variable, overriding the inherited value
    pub fn env<K, V>(mut self, key: K, val: V) -> Self
    where
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        self.0
            .env
            .insert(key.as_ref().to_owned(), val.as_ref().to_owned());
        self
    }

    /// Set multiple environment variables
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        for (key, val) in vars {
            self = self.env(key, val);
        }
        self
    }

    /// Start from an empty environment instead of inheriting one
    pub fn env_clear(mut self) -> Self {
        self.0.env_clear = true;
        self
    }

    /// Set the working directory
    pub fn current_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.0.current_dir = Some(dir.as_ref().to_owned());
        self
    }

    /// Bytes to write to stdin before closing it
    pub fn input(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.0.input = Some(input.into());
        self
    }

    /// Keep stdin open and hand it out as a
    /// [`StdinHandle`](crate::StdinHandle) through
    /// [`Execution::stdin`](crate::Execution::stdin). Cannot be combined with
    /// [`input`](Self::input).
    pub fn interactive_stdin(mut self) -> Self {
        self.0.interactive_stdin = true;
        self
    }

    /// Terminate the process if it runs longer than `timeout`
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.0.timeout = Some(timeout);
        self
    }

    /// Report a non-zero exit as [`Error::NonZeroExit`]
    pub fn check(mut self, check: bool) -> Self {
        self.0.check = check;
        self
    }

    /// Use a specific shell binary. Only meaningful for [`CommandSpec::shell`].
    pub fn shell_executable<P: AsRef<Path>>(mut self, executable: P) -> Self {
        if let Invocation::Shell { executable: shell } = &mut self.0.invocation {
            *shell = Some(executable.as_ref().to_owned());
        }
        self
    }

    /// Validate and build the spec
    pub fn build(self) -> Result<CommandSpec> {
        let spec = self.0;

        let program = spec.program.to_string_lossy();
        if program.trim().is_empty() {
            return Err(Error::invalid_command("program must not be empty"));
        }

        if let Some(dir) = &spec.current_dir {
            if !dir.is_dir() {
                return Err(Error::invalid_command(format!(
                    "working directory does not exist: {}",
                    dir.display()
                )));
            }
        }

        if spec.timeout == Some(Duration::ZERO) {
            return Err(Error::invalid_command("timeout must be positive"));
        }

        if spec.interactive_stdin && spec.input.is_some() {
            return Err(Error::invalid_command(
                "input cannot be combined with interactive stdin",
            ));
        }

        Ok(spec)
    }
}
