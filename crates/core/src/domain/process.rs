// Process Domain Model

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Liveness of a supervised child
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessState {
    Running,
    /// Exit code, `None` when the child was ended by a signal
    Exited(Option<i32>),
    /// Forcibly killed by the supervisor
    Killed,
}

impl ProcessState {
    pub fn is_running(&self) -> bool {
        matches!(self, ProcessState::Running)
    }
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessState::Running => write!(f, "RUNNING"),
            ProcessState::Exited(Some(code)) => write!(f, "EXITED({})", code),
            ProcessState::Exited(None) => write!(f, "EXITED(signal)"),
            ProcessState::Killed => write!(f, "KILLED"),
        }
    }
}

/// What to launch
///
/// The child inherits the parent environment; `env` only adds or overrides
/// variables on top of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub executable: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_dir: Option<PathBuf>,
}

impl ProcessSpec {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            env: HashMap::new(),
            working_dir: None,
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

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Human-readable command line, for logs only
    pub fn display_command(&self) -> String {
        if self.args.is_empty() {
            self.executable.clone()
        } else {
            format!("{} {}", self.executable, self.args.join(" "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_builder() {
        let spec = ProcessSpec::new("uvx")
            .arg("mcp-server-time")
            .args(["--local-timezone", "UTC"])
            .env("DEBUG", "1")
            .working_dir("/tmp");

        assert_eq!(spec.executable, "uvx");
        assert_eq!(spec.args, vec!["mcp-server-time", "--local-timezone", "UTC"]);
        assert_eq!(spec.env.get("DEBUG"), Some(&"1".to_string()));
        assert_eq!(spec.working_dir, Some(PathBuf::from("/tmp")));
        assert_eq!(
            spec.display_command(),
            "uvx mcp-server-time --local-timezone UTC"
        );
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ProcessState::Running.to_string(), "RUNNING");
        assert_eq!(ProcessState::Exited(Some(3)).to_string(), "EXITED(3)");
        assert_eq!(ProcessState::Exited(None).to_string(), "EXITED(signal)");
        assert_eq!(ProcessState::Killed.to_string(), "KILLED");
        assert!(ProcessState::Running.is_running());
        assert!(!ProcessState::Killed.is_running());
    }
}
