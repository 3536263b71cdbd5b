//! Immutable command descriptor

use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::ops::BitOr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cancel::Cancellation;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::options::{Credentials, PtyOptions, ResourcePolicy, Validation};
use crate::pipe::{CaptureBuffer, Source, Target};
use crate::pump::RunSession;
use crate::result::{BufferedCommandResult, CommandResult};
use crate::task::CommandTask;

/// A command to be executed
///
/// Every `with_*` method consumes the command and returns a new one, so a
/// configured command can be cloned and executed any number of times, also
/// concurrently, without runs affecting each other.
///
/// ```no_run
/// # futures_lite::future::block_on(async {
/// use procflow::{CaptureBuffer, Command};
///
/// let output = CaptureBuffer::new();
/// let result = Command::new("git")
///     .with_args(["rev-parse", "HEAD"])
///     .with_stdout(output.target())
///     .execute()?
///     .await?;
/// println!("{} -> {}", result.exit_code, output.text(encoding_rs::UTF_8));
/// # procflow::Result::Ok(()) });
/// ```
#[derive(Clone)]
pub struct Command {
    program: OsString,
    args: Vec<OsString>,
    current_dir: Option<PathBuf>,
    /// `None` removes the variable from the inherited environment
    env: HashMap<OsString, Option<OsString>>,
    credentials: Credentials,
    resources: ResourcePolicy,
    pty: Option<PtyOptions>,
    stdin: Source,
    stdout: Target,
    stderr: Target,
    validation: Validation,
    config: Arc<Config>,
}

impl Command {
    /// Create a command for the given program.
    ///
    /// Pipes default to `Null`, validation to [`Validation::ZeroExitCode`].
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self {
            program: program.as_ref().to_owned(),
            args: Vec::new(),
            current_dir: None,
            env: HashMap::new(),
            credentials: Credentials::default(),
            resources: ResourcePolicy::default(),
            pty: None,
            stdin: Source::Null,
            stdout: Target::Null,
            stderr: Target::Null,
            validation: Validation::default(),
            config: Arc::new(Config::default()),
        }
    }

    /// Replace the program
    pub fn with_program<S: AsRef<OsStr>>(mut self, program: S) -> Self {
        self.program = program.as_ref().to_owned();
        self
    }

    /// Append one argument
    pub fn with_arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    /// Replace all arguments
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args = args.into_iter().map(|arg| arg.as_ref().to_owned()).collect();
        self
    }

    /// Set the working directory
    pub fn with_current_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.current_dir = Some(dir.as_ref().to_owned());
        self
    }

    /// Set an environment variable
    pub fn with_env<K, V>(mut self, key: K, value: V) -> Self
    where
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        self.env
            .insert(key.as_ref().to_owned(), Some(value.as_ref().to_owned()));
        self
    }

    /// Remove a variable from the environment the child inherits
    pub fn with_env_removed<K: AsRef<OsStr>>(mut self, key: K) -> Self {
        self.env.insert(key.as_ref().to_owned(), None);
        self
    }

    /// Apply a set of overrides; `None` values remove the variable
    pub fn with_envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, Option<V>)>,
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        for (key, value) in vars {
            self.env.insert(
                key.as_ref().to_owned(),
                value.map(|value| value.as_ref().to_owned()),
            );
        }
        self
    }

    /// Run as another user
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Set priority and processor affinity
    pub fn with_resources(mut self, resources: ResourcePolicy) -> Self {
        self.resources = resources;
        self
    }

    /// Run attached to a pseudo-terminal.
    ///
    /// Standard output and error become one stream, delivered to the stdout
    /// target.
    pub fn with_pty(mut self, options: PtyOptions) -> Self {
        self.pty = Some(options);
        self
    }

    /// Set the standard input source
    pub fn with_stdin(mut self, source: impl Into<Source>) -> Self {
        self.stdin = source.into();
        self
    }

    /// Set the standard output target
    pub fn with_stdout(mut self, target: Target) -> Self {
        self.stdout = target;
        self
    }

    /// Set the standard error target
    pub fn with_stderr(mut self, target: Target) -> Self {
        self.stderr = target;
        self
    }

    /// Set exit code validation
    pub fn with_validation(mut self, validation: Validation) -> Self {
        self.validation = validation;
        self
    }

    /// Set the engine configuration used by runs of this command
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Arc::new(config);
        self
    }

    /// The program to execute
    pub fn program(&self) -> &OsStr {
        &self.program
    }

    /// The arguments
    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// The working directory, if set
    pub fn current_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    /// Environment overrides; `None` means the variable is removed
    pub fn envs(&self) -> impl Iterator<Item = (&OsStr, Option<&OsStr>)> {
        self.env
            .iter()
            .map(|(key, value)| (key.as_os_str(), value.as_deref()))
    }

    /// Credentials the child runs with
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Resource policy
    pub fn resources(&self) -> &ResourcePolicy {
        &self.resources
    }

    /// Pseudo-terminal options, if PTY mode is enabled
    pub fn pty(&self) -> Option<&PtyOptions> {
        self.pty.as_ref()
    }

    /// Standard input source
    pub fn stdin(&self) -> &Source {
        &self.stdin
    }

    /// Standard output target
    pub fn stdout(&self) -> &Target {
        &self.stdout
    }

    /// Standard error target
    pub fn stderr(&self) -> &Target {
        &self.stderr
    }

    /// Exit code validation
    pub fn validation(&self) -> Validation {
        self.validation
    }

    /// Engine configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Start the command without external cancellation
    pub fn execute(&self) -> Result<CommandTask<CommandResult>> {
        self.execute_with(Cancellation::default())
    }

    /// Start the command.
    ///
    /// The process is running when this returns, so a missing executable or
    /// bad working directory is reported here rather than by the task. The
    /// returned task must be awaited (or spawned on an executor) for the
    /// pumps to make progress.
    pub fn execute_with(&self, cancellation: Cancellation) -> Result<CommandTask<CommandResult>> {
        let cancellation = cancellation.child();
        let session = RunSession::start(self, cancellation.clone())?;
        let task = CommandTask::new(
            session.pid(),
            session.start_time(),
            cancellation,
            Box::pin(session.run()),
        );

        match self.validation {
            Validation::None => Ok(task),
            Validation::ZeroExitCode => {
                let command = self.to_string();
                Ok(task.and_then(move |result| {
                    check_exit_code(&command, result.exit_code, None)?;
                    Ok(result)
                }))
            }
        }
    }

    /// Start the command, capturing standard output and error as text
    pub fn execute_buffered(&self) -> Result<CommandTask<BufferedCommandResult>> {
        self.execute_buffered_with(Cancellation::default())
    }

    /// Start the command, capturing standard output and error as text.
    ///
    /// The capture is merged with the configured targets, which still receive
    /// everything. A validation error carries the captured standard error.
    pub fn execute_buffered_with(
        &self,
        cancellation: Cancellation,
    ) -> Result<CommandTask<BufferedCommandResult>> {
        let stdout = CaptureBuffer::new();
        let stderr = CaptureBuffer::new();
        let encoding = self.config.text_encoding();

        let task = self
            .clone()
            .with_stdout(Target::merge([self.stdout.clone(), stdout.target()]))
            .with_stderr(Target::merge([self.stderr.clone(), stderr.target()]))
            .with_validation(Validation::None)
            .execute_with(cancellation)?;

        let validation = self.validation;
        let command = self.to_string();
        Ok(task.and_then(move |result| {
            let stdout = stdout.text(encoding);
            let stderr = stderr.text(encoding);
            if validation == Validation::ZeroExitCode {
                check_exit_code(&command, result.exit_code, Some(&stderr))?;
            }
            Ok(BufferedCommandResult::new(result, stdout, stderr))
        }))
    }
}

fn check_exit_code(command: &str, exit_code: i32, stderr: Option<&str>) -> Result<()> {
    if exit_code == 0 {
        return Ok(());
    }
    Err(Error::Validation {
        command: command.to_string(),
        exit_code,
        stderr: stderr.map(str::to_string),
    })
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            let arg = arg.to_string_lossy();
            if arg.is_empty() || arg.contains(char::is_whitespace) || arg.contains('"') {
                write!(f, " \"{}\"", arg.replace('"', "\\\""))?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("current_dir", &self.current_dir)
            .field("env", &self.env)
            .field("pty", &self.pty)
            .field("stdin", &self.stdin)
            .field("stdout", &self.stdout)
            .field("stderr", &self.stderr)
            .field("validation", &self.validation)
            .finish_non_exhaustive()
    }
}

/// `source | command` feeds the source into the command's stdin
impl BitOr<Command> for Source {
    type Output = Command;

    fn bitor(self, command: Command) -> Command {
        command.with_stdin(self)
    }
}

/// `command | target` sends standard output to the target
impl BitOr<Target> for Command {
    type Output = Command;

    fn bitor(self, target: Target) -> Command {
        self.with_stdout(target)
    }
}

/// `command | (stdout, stderr)` sets both output targets
impl BitOr<(Target, Target)> for Command {
    type Output = Command;

    fn bitor(self, (stdout, stderr): (Target, Target)) -> Command {
        self.with_stdout(stdout).with_stderr(stderr)
    }
}

/// `upstream | downstream` pipes one command's stdout into the next one's stdin
impl BitOr<Command> for Command {
    type Output = Command;

    fn bitor(self, downstream: Command) -> Command {
        downstream.with_stdin(Source::command(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders_do_not_mutate_original() {
        let base = Command::new("echo").with_arg("a");
        let derived = base.clone().with_arg("b").with_env("KEY", "value");
        assert_eq!(base.args().len(), 1);
        assert_eq!(derived.args().len(), 2);
        assert_eq!(base.envs().count(), 0);
    }

    #[test]
    fn test_with_args_replaces() {
        let command = Command::new("ls").with_arg("-l").with_args(["-a", "/tmp"]);
        assert_eq!(command.args(), &[OsString::from("-a"), OsString::from("/tmp")]);
    }

    #[test]
    fn test_env_removal_is_recorded() {
        let command = Command::new("env")
            .with_env("KEEP", "1")
            .with_env_removed("HOME");
        let removed: Vec<_> = command.envs().filter(|(_, v)| v.is_none()).collect();
        assert_eq!(removed, vec![(OsStr::new("HOME"), None)]);
    }

    #[test]
    fn test_display_quotes_arguments() {
        let command = Command::new("sh").with_args(["-c", "echo hi", ""]);
        assert_eq!(command.to_string(), "sh -c \"echo hi\" \"\"");
    }

    #[test]
    fn test_pipe_operators() {
        let buffer = CaptureBuffer::new();
        let command = Source::text("input") | Command::new("cat") | buffer.target();
        assert!(matches!(command.stdin(), Source::Bytes(_)));
        assert!(matches!(command.stdout(), Target::Stream { .. }));

        let chained = Command::new("printf").with_arg("x") | Command::new("cat");
        match chained.stdin() {
            Source::Command(upstream) => assert_eq!(upstream.to_string(), "printf x"),
            other => panic!("unexpected stdin {other:?}"),
        }

        let split = Command::new("cat") | (Target::null(), buffer.target());
        assert!(split.stdout().is_null());
        assert!(!split.stderr().is_null());
    }

    #[test]
    fn test_empty_program_is_rejected() {
        let err = Command::new("").execute().unwrap_err();
        assert!(matches!(err, Error::InvalidCommand { .. }));
    }
}
