//! Launch descriptions and lifecycle events of supervised processes.

use std::fmt;
use std::path::PathBuf;
use std::process::ExitStatus;

use tokio::process::Command;
use tokio::sync::mpsc;

/// What to run: program, arguments, working directory and extra env.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl LaunchSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Render as a shell-like line for logging.
    pub fn display_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    pub(crate) fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }
}

/// Per-launch options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchOptions {
    /// Substring that marks the process as ready when seen in its output.
    /// Without a pattern the process counts as ready as soon as it spawned.
    pub readiness_pattern: Option<String>,
}

impl LaunchOptions {
    pub fn with_readiness(pattern: impl Into<String>) -> Self {
        Self {
            readiness_pattern: Some(pattern.into()),
        }
    }
}

/// Lifecycle status of a tracked process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Spawned, readiness marker not seen yet.
    Starting,
    /// Readiness marker seen.
    Running,
    /// Exited; about to leave the registry.
    Exited,
}

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExitInfo {
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Terminating signal, if it was killed by one (unix only).
    pub signal: Option<i32>,
}

impl ExitInfo {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub(crate) fn from_status(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(signal)) => write!(f, "signal {signal}"),
            (None, None) => f.write_str("unknown exit status"),
        }
    }
}

/// Event emitted for a supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessEvent {
    /// The readiness pattern was observed (at most once per launch).
    Ready,
    /// The process exited and left the registry (exactly once per launch).
    Exited(ExitInfo),
}

/// Event stream of one launch.
pub type ProcessEvents = mpsc::UnboundedReceiver<ProcessEvent>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_args() {
        let spec = LaunchSpec::new("java")
            .arg("-Xmx2g")
            .args(["-jar", "graphhopper.jar", "server", "config.yml"])
            .current_dir("/data");

        assert_eq!(spec.args.len(), 5);
        assert_eq!(spec.current_dir, Some(PathBuf::from("/data")));
        assert_eq!(
            spec.display_line(),
            "java -Xmx2g -jar graphhopper.jar server config.yml"
        );
    }

    #[test]
    fn exit_info_display() {
        let ok = ExitInfo { code: Some(0), signal: None };
        assert!(ok.success());
        assert_eq!(ok.to_string(), "exit code 0");

        let killed = ExitInfo { code: None, signal: Some(15) };
        assert!(!killed.success());
        assert_eq!(killed.to_string(), "signal 15");
    }
}
