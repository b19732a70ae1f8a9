//! Pipeline error taxonomy.
//!
//! Every failure a run can surface is represented here, so consumers can
//! react without string matching:
//!
//! | Kind       | Invalidates connection | Published |
//! |------------|------------------------|-----------|
//! | Connection | yes                    | yes       |
//! | Preprocess | no                     | yes       |
//! | Compile    | no                     | yes       |
//! | Canceled   | no                     | never     |
//!
//! Cancellation is success, not failure: a superseded run aborts quietly and
//! the delivery task drops it without telling anyone. All three published
//! kinds are terminal for the current run only; prior state (the last good
//! remote compiler list, the last built index) stays intact unless the kind
//! specifically invalidates it.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ExplorerError {
    /// Non-200 status or transport failure while talking to the remote
    /// service. The stale compiler list is retained; only the connected
    /// status is dropped.
    #[error("error reading from {url}: {detail}")]
    Connection { url: String, detail: String },

    /// The local preprocessor exited non-zero or produced no output.
    #[error(
        "cannot run preprocessor:\n{command_line}\nworking directory:\n{working_dir}\n\
         exit code {exit_code}\noutput:\n{stdout}errors:\n{stderr}"
    )]
    Preprocess {
        command_line: String,
        working_dir: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    /// The remote service accepted the request but the compilation failed.
    /// Not a pipeline fault: the request succeeded, the code did not.
    #[error("{stderr}\n{source_text}")]
    Compile {
        stderr: String,
        source_text: String,
    },

    /// The run was superseded or reset mid-flight.
    #[error("canceled")]
    Canceled,
}

impl ExplorerError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "connection",
            Self::Preprocess { .. } => "preprocess",
            Self::Compile { .. } => "compile",
            Self::Canceled => "canceled",
        }
    }

    /// Whether this failure drops the "connected" status of the remote list.
    pub fn invalidates_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_error_invalidates_connection() {
        let err = ExplorerError::Connection {
            url: "http://localhost:10240/api/compilers".into(),
            detail: "HTTP error code: 502".into(),
        };
        assert!(err.invalidates_connection());
        assert!(!err.is_cancellation());
        assert_eq!(err.kind(), "connection");
        let message = err.to_string();
        assert!(message.contains("http://localhost:10240/api/compilers"));
        assert!(message.contains("502"));
    }

    #[test]
    fn preprocess_error_carries_the_invocation() {
        let err = ExplorerError::Preprocess {
            command_line: "/usr/bin/gcc -E -o - -x c++ -c -".into(),
            working_dir: "/usr/bin".into(),
            exit_code: 1,
            stdout: String::new(),
            stderr: "fatal error".into(),
        };
        assert!(!err.invalidates_connection());
        let message = err.to_string();
        assert!(message.contains("/usr/bin/gcc -E -o - -x c++ -c -"));
        assert!(message.contains("exit code 1"));
        assert!(message.contains("fatal error"));
    }

    #[test]
    fn compile_error_carries_stderr_and_source() {
        let err = ExplorerError::Compile {
            stderr: "error: x".into(),
            source_text: "int main() {}".into(),
        };
        let message = err.to_string();
        assert!(message.contains("error: x"));
        assert!(message.contains("int main() {}"));
    }

    #[test]
    fn canceled_is_silent() {
        assert!(ExplorerError::Canceled.is_cancellation());
        assert_eq!(ExplorerError::Canceled.kind(), "canceled");
    }
}
