use std::io::Write;
use std::process::{Command, Output, Stdio};
use std::thread;
use tracing::{debug, trace};

/// Failure to run an external command.
#[derive(Debug, thiserror::Error)]
pub enum CmdError {
    #[error("failed to execute command: {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command failed ({status}): {command}\n{stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
}

impl CmdError {
    /// Captured stderr of a command that ran and exited non-zero.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            CmdError::Failed { stderr, .. } => Some(stderr),
            CmdError::Spawn { .. } => None,
        }
    }
}

/// A builder for executing external commands with unified error handling
pub struct Cmd<'a> {
    command: &'a str,
    args: Vec<String>,
    stdin: Option<&'a [u8]>,
}

impl<'a> Cmd<'a> {
    /// Create a new command builder
    pub fn new(command: &'a str) -> Self {
        Self {
            command,
            args: Vec::new(),
            stdin: None,
        }
    }

    /// Add a single argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Feed `input` to the child's stdin, then close it.
    pub fn stdin(mut self, input: &'a [u8]) -> Self {
        self.stdin = Some(input);
        self
    }

    fn display(command: &str, args: &[String]) -> String {
        if args.is_empty() {
            command.to_string()
        } else {
            format!("{} {}", command, args.join(" "))
        }
    }

    /// Execute the command and return the output.
    /// Returns an error if the command fails (non-zero exit code)
    pub fn run(self) -> Result<Output, CmdError> {
        let Cmd {
            command,
            args,
            stdin,
        } = self;

        trace!(command, args = ?args, "cmd:run start");

        let mut cmd = Command::new(command);
        cmd.args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });

        let spawn_err = |source: std::io::Error| CmdError::Spawn {
            command: Self::display(command, &args),
            source,
        };

        let mut child = cmd.spawn().map_err(spawn_err)?;
        // Stdin is fed from its own thread while stdout and stderr drain, so
        // a child that writes before it has read all its input cannot stall.
        let output = thread::scope(|scope| {
            if let Some(input) = stdin
                && let Some(mut pipe) = child.stdin.take()
            {
                scope.spawn(move || {
                    // A child that exits early closes the pipe; its exit status reports why.
                    if let Err(e) = pipe.write_all(input) {
                        debug!(command, error = %e, "cmd:run stdin write failed");
                    }
                });
            }
            child.wait_with_output()
        })
        .map_err(spawn_err)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(
                command,
                args = ?args,
                status = ?output.status.code(),
                stderr = %stderr.trim(),
                "cmd:run failure"
            );
            return Err(CmdError::Failed {
                command: Self::display(command, &args),
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }
        trace!(command, "cmd:run success");
        Ok(output)
    }

    /// Execute the command and return stdout as a trimmed string
    pub fn run_and_capture_stdout(self) -> Result<String, CmdError> {
        let output = self.run()?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
