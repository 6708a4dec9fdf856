//! Opening sessions
//!
//! A [`Connector`] turns a [`ServerConfig`] into an initialized [`McpClient`].
//! [`TransportConnector`] is the production implementation: it validates and
//! launches stdio servers or dials HTTP endpoints, then runs the handshake.
//! It never retries; that is the caller's concern.

use crate::client::{McpClient, McpClientConfig};
use crate::config::{HttpVariant, ServerConfig, ServerKind};
use crate::protocol::{ConfigError, McpError};
use crate::transport::HttpTransport;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Opens one live session for a server declaration
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &ServerConfig) -> Result<McpClient, McpError>;
}

/// Connects over stdio or HTTP depending on the declaration
#[derive(Debug, Clone)]
pub struct TransportConnector {
    client_config: McpClientConfig,
    http_timeout: Duration,
}

impl Default for TransportConnector {
    fn default() -> Self {
        Self {
            client_config: McpClientConfig::default(),
            http_timeout: Duration::from_secs(30),
        }
    }
}

impl TransportConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Client settings applied to every session this connector opens
    pub fn with_client_config(mut self, client_config: McpClientConfig) -> Self {
        self.client_config = client_config;
        self
    }

    /// Per-request timeout of the HTTP transports
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    fn client_config_for(&self, config: &ServerConfig) -> McpClientConfig {
        self.client_config.clone().with_label(config.name())
    }

    #[cfg(feature = "stdio")]
    async fn connect_stdio(&self, config: &ServerConfig) -> Result<McpClient, McpError> {
        use crate::transport::{StdioConfig, StdioTransport};

        let command = resolve_command(config.command().unwrap_or_default())?;
        let mut stdio = StdioConfig::new(command.to_string_lossy())
            .args(config.args().iter().cloned())
            .label(config.name());
        stdio.env = config.env().clone();

        let transport = StdioTransport::spawn_with_config(stdio).await?;
        McpClient::connect_with_config(transport, self.client_config_for(config)).await
    }

    #[cfg(not(feature = "stdio"))]
    async fn connect_stdio(&self, _config: &ServerConfig) -> Result<McpClient, McpError> {
        Err(ConfigError::StdioDisabled.into())
    }

    async fn connect_http(&self, config: &ServerConfig) -> Result<McpClient, McpError> {
        let url = config.url().ok_or_else(|| ConfigError::MissingField {
            name: config.name().to_string(),
            kind: "http",
            field: "url",
        })?;

        let mut builder = HttpTransport::new(url).with_timeout_secs(self.http_timeout.as_secs().max(1));
        if let Some(token) = config.token() {
            builder = builder.bearer_token(token);
        }

        let client_config = self.client_config_for(config);
        match config.http_variant() {
            HttpVariant::Streamable => {
                McpClient::connect_with_config(builder.build()?, client_config).await
            }
            HttpVariant::Sse => {
                McpClient::connect_with_config(builder.connect_sse().await?, client_config).await
            }
        }
    }
}

#[async_trait]
impl Connector for TransportConnector {
    #[instrument(skip_all, fields(server = %config.name(), kind = config.kind().as_str()))]
    async fn connect(&self, config: &ServerConfig) -> Result<McpClient, McpError> {
        config.validate()?;
        debug!("Connecting to MCP server");

        let client = match config.kind() {
            ServerKind::Stdio => self.connect_stdio(config).await?,
            ServerKind::Http => self.connect_http(config).await?,
        };

        if let Some(identity) = client.identity() {
            info!(
                server_name = %identity.name,
                protocol_version = %identity.protocol_version,
                "MCP session established"
            );
        }
        Ok(client)
    }
}

/// Resolve a stdio command to a validated absolute path.
///
/// A bare name is looked up on `PATH`; anything containing a separator is
/// taken as written and must then be absolute.
pub fn resolve_command(command: &str) -> Result<PathBuf, ConfigError> {
    resolve_command_in(command, std::env::var_os("PATH"))
}

fn resolve_command_in(command: &str, path_var: Option<OsString>) -> Result<PathBuf, ConfigError> {
    let command = command.trim();
    if command.is_empty() {
        return Err(ConfigError::EmptyCommand);
    }

    let path = if command.contains(std::path::MAIN_SEPARATOR) || command.contains('/') {
        PathBuf::from(command)
    } else {
        search_path(command, path_var)
            .ok_or_else(|| ConfigError::CommandNotFound(command.to_string()))?
    };

    if !path.is_absolute() {
        return Err(ConfigError::NotAbsolute(path.display().to_string()));
    }
    let metadata = std::fs::metadata(&path)
        .map_err(|_| ConfigError::CommandNotFound(path.display().to_string()))?;
    if metadata.is_dir() {
        return Err(ConfigError::PathIsDirectory(path.display().to_string()));
    }
    if !metadata.is_file() {
        return Err(ConfigError::NotRegularFile(path.display().to_string()));
    }
    Ok(path)
}

fn search_path(command: &str, path_var: Option<OsString>) -> Option<PathBuf> {
    let path_var = path_var?;
    std::env::split_paths(&path_var)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(command))
        .find(|candidate| is_file(candidate))
}

fn is_file(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ErrorKind;

    #[test]
    fn test_empty_command_rejected() {
        let err = resolve_command_in("   ", None).unwrap_err();
        assert_eq!(err.to_string(), "command cannot be empty");
    }

    #[test]
    fn test_directory_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_command_in(dir.path().to_str().unwrap(), None).unwrap_err();
        assert!(matches!(err, ConfigError::PathIsDirectory(_)));
        assert!(err
            .to_string()
            .starts_with("command path is a directory, not executable"));
    }

    #[cfg(unix)]
    #[test]
    fn test_device_rejected() {
        let err = resolve_command_in("/dev/null", None).unwrap_err();
        assert_eq!(err, ConfigError::NotRegularFile("/dev/null".into()));
    }

    #[test]
    fn test_relative_path_rejected() {
        let err = resolve_command_in("bin/server", None).unwrap_err();
        assert!(matches!(err, ConfigError::NotAbsolute(_)));
    }

    #[test]
    fn test_missing_command() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_command_in("no-such-server", Some(dir.path().as_os_str().to_owned()))
            .unwrap_err();
        assert_eq!(err, ConfigError::CommandNotFound("no-such-server".into()));

        let missing = dir.path().join("gone");
        let err = resolve_command_in(missing.to_str().unwrap(), None).unwrap_err();
        assert!(matches!(err, ConfigError::CommandNotFound(_)));
    }

    #[test]
    fn test_path_lookup_skips_directories() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::create_dir(first.path().join("my-server")).unwrap();
        std::fs::write(second.path().join("my-server"), "#!/bin/sh\n").unwrap();

        let path_var = std::env::join_paths([first.path(), second.path()]).unwrap();
        let resolved = resolve_command_in("my-server", Some(path_var)).unwrap();
        assert_eq!(resolved, second.path().join("my-server"));
    }

    #[tokio::test]
    async fn test_invalid_declaration_fails_before_connecting() {
        let connector = TransportConnector::new();
        let err = connector
            .connect(&ServerConfig::stdio("x", "", Vec::<String>::new()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[cfg(all(unix, feature = "stdio"))]
    #[tokio::test]
    async fn test_stdio_handshake_with_shell_server() {
        let script = r#"read line
echo '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2025-03-26","capabilities":{"tools":{}},"serverInfo":{"name":"sh-server","version":"0.1"}}}'
cat > /dev/null"#;
        let config = ServerConfig::stdio("shell", "/bin/sh", ["-c", script]);

        let client = TransportConnector::new().connect(&config).await.unwrap();
        let identity = client.identity().unwrap();
        assert_eq!(identity.name, "sh-server");
        assert!(identity.supports_tools());
        assert_eq!(client.label(), "shell");
        client.close().await.unwrap();
    }

    #[cfg(all(unix, feature = "stdio"))]
    #[tokio::test]
    async fn test_handshake_failure_includes_stderr() {
        let config = ServerConfig::stdio(
            "broken",
            "/bin/sh",
            ["-c", "echo 'missing API key' >&2; sleep 0.2"],
        );

        let err = TransportConnector::new().connect(&config).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert!(err.to_string().contains("missing API key"), "{err}");
    }

    #[tokio::test]
    async fn test_http_connect_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = ServerConfig::http("gone", format!("http://127.0.0.1:{port}/mcp"));
        let err = TransportConnector::new().connect(&config).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }
}
