//! Centralized configuration for the pipe calculator.
//!
//! Constants for the transport and the demo driver, plus [`PipeName`], which
//! maps the shared channel name onto a platform endpoint.

use crate::{PipeCalcError, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Transport configuration.
pub struct PipeConfig;

impl PipeConfig {
    pub const DEFAULT_PIPE_NAME: &'static str = "CalculatorPipe";
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
    /// Back-off between attempts while a Windows pipe instance is busy.
    pub const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(50);
    pub const UNIX_SOCKET_SUFFIX: &'static str = ".sock";
    /// Appended to the socket path for the file a running server keeps locked.
    pub const LOCK_FILE_SUFFIX: &'static str = ".lock";
    pub const WINDOWS_PIPE_PREFIX: &'static str = r"\\.\pipe\";
}

/// Timing used by the demo driver.
pub struct DemoConfig;

impl DemoConfig {
    pub const SERVER_START_DELAY: Duration = Duration::from_millis(100);
    pub const IDLE_INTERVAL: Duration = Duration::from_secs(1);
}

/// Name of a duplex channel shared by client and server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipeName(String);

impl PipeName {
    /// Validate and wrap a channel name.
    ///
    /// A plain name is resolved per platform. On unix an absolute path is
    /// used verbatim as the socket path.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(PipeCalcError::Config {
                message: "pipe name must not be empty".to_string(),
            });
        }
        if name.contains('\0') {
            return Err(PipeCalcError::Config {
                message: format!("pipe name contains a NUL byte: {:?}", name),
            });
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filesystem path of the unix-domain socket backing this name.
    pub fn socket_path(&self) -> PathBuf {
        let raw = PathBuf::from(&self.0);
        if raw.is_absolute() {
            return raw;
        }
        let dir = dirs::runtime_dir().unwrap_or_else(std::env::temp_dir);
        dir.join(format!("{}{}", self.0, PipeConfig::UNIX_SOCKET_SUFFIX))
    }

    /// Full Windows named pipe path (`\\.\pipe\<name>`).
    pub fn pipe_path(&self) -> String {
        if self.0.starts_with(PipeConfig::WINDOWS_PIPE_PREFIX) {
            self.0.clone()
        } else {
            format!("{}{}", PipeConfig::WINDOWS_PIPE_PREFIX, self.0)
        }
    }
}

impl Default for PipeName {
    fn default() -> Self {
        Self(PipeConfig::DEFAULT_PIPE_NAME.to_string())
    }
}

impl std::fmt::Display for PipeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PipeName {
    type Err = PipeCalcError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_name() {
        assert_eq!(PipeName::default().as_str(), "CalculatorPipe");
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(PipeName::new("").is_err());
        assert!(PipeName::new("   ").is_err());
        assert!(PipeName::new("a\0b").is_err());
    }

    #[test]
    fn test_socket_path_for_plain_name() {
        let name = PipeName::new("CalcTest").unwrap();
        let path = name.socket_path();
        assert!(path.ends_with("CalcTest.sock"));
    }

    #[cfg(unix)]
    #[test]
    fn test_absolute_socket_path_is_verbatim() {
        let name = PipeName::new("/tmp/pipecalc/custom.sock").unwrap();
        assert_eq!(name.socket_path(), PathBuf::from("/tmp/pipecalc/custom.sock"));
    }

    #[test]
    fn test_pipe_path_prefix() {
        let name = PipeName::new("CalculatorPipe").unwrap();
        assert_eq!(name.pipe_path(), r"\\.\pipe\CalculatorPipe");

        let prefixed = PipeName::new(r"\\.\pipe\Other").unwrap();
        assert_eq!(prefixed.pipe_path(), r"\\.\pipe\Other");
    }

    #[test]
    fn test_timeouts_are_reasonable() {
        assert!(PipeConfig::CONNECT_TIMEOUT > PipeConfig::CONNECT_RETRY_INTERVAL);
        assert!(DemoConfig::IDLE_INTERVAL > DemoConfig::SERVER_START_DELAY);
    }
}
