//! MCP Error Types
//!
//! One error enum covers every failure of the connection layer. [`McpError::kind`]
//! folds the variants onto the five categories callers act on: connection
//! problems (retryable), protocol errors reported by the server, configuration
//! mistakes, schema discovery failures and caller cancellation.

use crate::protocol::messages::JsonRpcError;
use thiserror::Error;

/// Broad classification of an [`McpError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Handshake or transport failure; may be retried
    Connection,
    /// Server-reported failure of a tool, resource or prompt request
    Protocol,
    /// Malformed declaration or unsafe executable
    Config,
    /// Tool schema discovery failed
    Schema,
    /// The caller's cancellation signal fired
    Cancellation,
}

/// Declaration-time configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("command cannot be empty")]
    EmptyCommand,

    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("command path must be absolute: {0}")]
    NotAbsolute(String),

    #[error("command path is a directory, not executable: {0}")]
    PathIsDirectory(String),

    #[error("command path is not a regular file: {0}")]
    NotRegularFile(String),

    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unsupported URL scheme '{0}' (expected stdio://, http://, https:// or mcp://)")]
    UnsupportedScheme(String),

    #[error("unknown preset: {0}")]
    UnknownPreset(String),

    #[error("invalid environment entry '{0}' (expected KEY=VALUE)")]
    InvalidEnv(String),

    #[error("server name cannot be empty")]
    EmptyName,

    #[error("duplicate server name: {0}")]
    DuplicateName(String),

    #[error("{kind} server '{name}' is missing its {field}")]
    MissingField {
        name: String,
        kind: &'static str,
        field: &'static str,
    },

    #[error("stdio transport support is disabled in this build")]
    StdioDisabled,

    #[error("invalid server document: {0}")]
    Document(String),

    #[error("registry entry '{0}' has no npm, pypi or remote launch method")]
    NoLaunchMethod(String),
}

/// MCP Client Error
///
/// Represents all possible errors that can occur during MCP operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// JSON-RPC error returned by the server
    #[error("MCP server error: {0}")]
    ServerError(#[from] JsonRpcError),

    /// A tool call completed with `isError` set; carries the server's own text
    #[error("tool '{tool}' reported an error: {message}")]
    ToolError { tool: String, message: String },

    /// Transport-level error (I/O, connection, etc.)
    #[error("Transport error: {0}")]
    Transport(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Protocol error (unexpected message format, version mismatch, etc.)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Timeout waiting for response
    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Client not initialized
    #[error("Client not initialized - call initialize() first")]
    NotInitialized,

    /// Tool not found
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Process spawn error
    #[error("Failed to spawn process: {0}")]
    ProcessSpawn(String),

    /// Process exited unexpectedly
    #[error("MCP server process exited unexpectedly")]
    ProcessExited,

    /// Invalid response ID
    #[error("Response ID mismatch: expected {expected}, got {actual}")]
    ResponseIdMismatch { expected: String, actual: String },

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A single malformed or unsafe declaration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Every declaration error collected by a builder
    #[error("{} configuration error(s): {}", .0.len(), join_errors(.0))]
    ConfigErrors(Vec<ConfigError>),

    /// Tool schema discovery failed
    #[error("schema discovery failed: {0}")]
    Schema(String),

    /// The caller's cancellation signal fired
    #[error("operation cancelled")]
    Cancelled,

    /// The connection cache was shut down
    #[error("connection cache is shut down")]
    CacheClosed,

    /// Opening a session to a named server failed
    #[error("failed to connect to '{server}': {source}")]
    Connect {
        server: String,
        #[source]
        source: Box<McpError>,
    },

    /// Retry policy exhausted
    #[error("{operation} failed after {attempts} attempt(s): {source}")]
    RetryExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<McpError>,
    },
}

fn join_errors(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl McpError {
    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        McpError::Transport(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        McpError::Protocol(msg.into())
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            McpError::Connect { source, .. } => source.kind(),
            McpError::Transport(_)
            | McpError::Timeout(_)
            | McpError::NotInitialized
            | McpError::ProcessSpawn(_)
            | McpError::ProcessExited
            | McpError::Io(_)
            | McpError::CacheClosed
            | McpError::RetryExhausted { .. } => ErrorKind::Connection,
            McpError::ServerError(_)
            | McpError::ToolError { .. }
            | McpError::Json(_)
            | McpError::Protocol(_)
            | McpError::ToolNotFound(_)
            | McpError::ResponseIdMismatch { .. } => ErrorKind::Protocol,
            McpError::Config(_) | McpError::ConfigErrors(_) => ErrorKind::Config,
            McpError::Schema(_) => ErrorKind::Schema,
            McpError::Cancelled => ErrorKind::Cancellation,
        }
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, McpError::Timeout(_))
    }

    /// Check if this is a server error
    pub fn is_server_error(&self) -> bool {
        matches!(self, McpError::ServerError(_))
    }

    /// Check if the process has exited
    pub fn is_process_exited(&self) -> bool {
        matches!(self, McpError::ProcessExited)
    }

    /// Check if the caller cancelled the operation
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root_cause(), McpError::Cancelled)
    }

    /// The innermost error, looking through retry exhaustion and connect context
    pub fn root_cause(&self) -> &McpError {
        match self {
            McpError::RetryExhausted { source, .. } | McpError::Connect { source, .. } => {
                source.root_cause()
            }
            other => other,
        }
    }
}

/// Result type alias for MCP operations
pub type McpResult<T> = Result<T, McpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = McpError::ToolNotFound("read_file".to_string());
        assert_eq!(err.to_string(), "Tool not found: read_file");
    }

    #[test]
    fn test_config_error_messages() {
        assert_eq!(
            ConfigError::EmptyCommand.to_string(),
            "command cannot be empty"
        );
        assert!(ConfigError::PathIsDirectory("/tmp".into())
            .to_string()
            .starts_with("command path is a directory, not executable"));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(McpError::transport("refused").kind(), ErrorKind::Connection);
        assert_eq!(McpError::Cancelled.kind(), ErrorKind::Cancellation);
        assert_eq!(McpError::Schema("x".into()).kind(), ErrorKind::Schema);
        assert_eq!(
            McpError::from(ConfigError::EmptyCommand).kind(),
            ErrorKind::Config
        );
        let server = JsonRpcError {
            code: -32602,
            message: "bad params".into(),
            data: None,
        };
        assert_eq!(McpError::from(server).kind(), ErrorKind::Protocol);
    }

    #[test]
    fn test_retry_exhausted_keeps_root_cause() {
        let err = McpError::RetryExhausted {
            operation: "tools/list on 'fs'".into(),
            attempts: 3,
            source: Box::new(McpError::transport("connection refused")),
        };
        let text = err.to_string();
        assert!(text.contains("'fs'"));
        assert!(text.contains("3 attempt(s)"));
        assert!(text.contains("connection refused"));
        assert!(matches!(err.root_cause(), McpError::Transport(_)));
    }

    #[test]
    fn test_connect_error_names_server_and_keeps_kind() {
        let err = McpError::Connect {
            server: "github".into(),
            source: Box::new(McpError::from(ConfigError::CommandNotFound("npx".into()))),
        };
        assert_eq!(
            err.to_string(),
            "failed to connect to 'github': configuration error: command not found: npx"
        );
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(matches!(err.root_cause(), McpError::Config(_)));

        let cancelled = McpError::Connect {
            server: "github".into(),
            source: Box::new(McpError::Cancelled),
        };
        assert!(cancelled.is_cancelled());
    }

    #[test]
    fn test_config_errors_aggregate() {
        let err = McpError::ConfigErrors(vec![
            ConfigError::EmptyCommand,
            ConfigError::UnknownPreset("nope".into()),
        ]);
        let text = err.to_string();
        assert!(text.starts_with("2 configuration error(s)"));
        assert!(text.contains("unknown preset: nope"));
    }
}
