//! Stdio Transport for MCP
//!
//! This transport spawns an MCP server as a subprocess and communicates
//! with it via stdin/stdout using newline-delimited JSON. Stderr is drained by
//! a background task into the log and a bounded tail kept for diagnostics; it is
//! never parsed as protocol data.

use crate::protocol::McpError;
use crate::transport::Transport;
use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::{debug, error, trace, warn};

/// Number of stderr lines retained for diagnostics
const STDERR_TAIL_LINES: usize = 50;

/// Stdio Transport Configuration
#[derive(Debug, Clone)]
pub struct StdioConfig {
    /// Executable to run; the connector passes an already validated absolute path
    pub command: String,

    /// Arguments for the command
    pub args: Vec<String>,

    /// Environment overrides, layered over the inherited process environment
    pub env: BTreeMap<String, String>,

    /// Working directory for the process
    pub working_dir: Option<String>,

    /// Server name used in log fields
    pub label: Option<String>,
}

impl StdioConfig {
    /// Create a new stdio configuration
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
            label: None,
        }
    }

    /// Add an argument
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
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Set an environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the working directory
    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Name the server in log output
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

type StderrTail = Arc<Mutex<VecDeque<String>>>;

/// Stdio Transport
///
/// Spawns an MCP server as a child process and communicates via stdin/stdout.
pub struct StdioTransport {
    /// Child process handle
    child: Child,

    /// Stdin writer
    stdin: ChildStdin,

    /// Stdout reader (buffered for line reading)
    stdout: BufReader<ChildStdout>,

    /// Bytes of a line not yet terminated by a newline; survives cancelled reads
    pending: Vec<u8>,

    /// Last lines written to stderr
    stderr_tail: StderrTail,

    /// Whether the transport is connected
    connected: bool,

    /// Server command (for debug/error messages)
    command_str: String,
}

impl StdioTransport {
    /// Spawn a new MCP server process
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let transport = StdioTransport::spawn("/usr/bin/npx", &["-y", "@modelcontextprotocol/server-memory"]).await?;
    /// ```
    pub async fn spawn(command: &str, args: &[&str]) -> Result<Self, McpError> {
        let config = StdioConfig::new(command).args(args.iter().copied());
        Self::spawn_with_config(config).await
    }

    /// Spawn a new MCP server process with full configuration
    pub async fn spawn_with_config(config: StdioConfig) -> Result<Self, McpError> {
        let command_str = format!("{} {}", config.command, config.args.join(" "))
            .trim_end()
            .to_string();
        let label = config.label.clone().unwrap_or_else(|| config.command.clone());
        debug!(server = %label, command = %command_str, "Spawning MCP server process");

        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(ref dir) = config.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            error!(server = %label, error = %e, command = %command_str, "Failed to spawn MCP server");
            McpError::ProcessSpawn(format!("{}: {}", command_str, e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::ProcessSpawn("Failed to capture stdin".to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::ProcessSpawn("Failed to capture stdout".to_string()))?;

        let stderr_tail: StderrTail = Arc::new(Mutex::new(VecDeque::new()));
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_stderr(stderr, label.clone(), stderr_tail.clone()));
        }

        debug!(server = %label, pid = ?child.id(), "MCP server process spawned");

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            pending: Vec::new(),
            stderr_tail,
            connected: true,
            command_str,
        })
    }

    /// Check if the child process is still running
    pub fn check_process(&mut self) -> Result<(), McpError> {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.connected = false;
                warn!(
                    command = %self.command_str,
                    exit_code = ?status.code(),
                    "MCP server process exited"
                );
                Err(McpError::ProcessExited)
            }
            Ok(None) => Ok(()),
            Err(e) => {
                self.connected = false;
                Err(McpError::Io(e))
            }
        }
    }

    /// Kill the child process
    pub async fn kill(&mut self) -> Result<(), McpError> {
        debug!(command = %self.command_str, "Killing MCP server process");
        self.child.kill().await.map_err(McpError::Io)?;
        self.connected = false;
        Ok(())
    }

    /// Last lines the server wrote to stderr, oldest first
    pub fn stderr_tail(&self) -> Vec<String> {
        match self.stderr_tail.lock() {
            Ok(tail) => tail.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }
}

async fn drain_stderr(stderr: ChildStderr, label: String, tail: StderrTail) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                debug!(server = %label, "stderr: {}", line);
                let mut tail = match tail.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Ok(None) => break,
            Err(e) => {
                trace!(server = %label, error = %e, "Stopped reading MCP server stderr");
                break;
            }
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&mut self, message: &str) -> Result<(), McpError> {
        self.check_process()?;

        trace!(message = %message, "Sending message to MCP server");

        self.stdin
            .write_all(message.as_bytes())
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to write to MCP server stdin");
                McpError::Transport(format!("Write failed: {}", e))
            })?;

        self.stdin
            .write_all(b"\n")
            .await
            .map_err(|e| McpError::Transport(format!("Write newline failed: {}", e)))?;

        self.stdin
            .flush()
            .await
            .map_err(|e| McpError::Transport(format!("Flush failed: {}", e)))?;

        Ok(())
    }

    async fn receive(&mut self) -> Result<String, McpError> {
        loop {
            // read_until appends into `pending`, so a cancelled read keeps its bytes.
            let bytes_read = self
                .stdout
                .read_until(b'\n', &mut self.pending)
                .await
                .map_err(|e| {
                    error!(error = %e, "Failed to read from MCP server stdout");
                    McpError::Transport(format!("Read failed: {}", e))
                })?;

            if bytes_read == 0 && self.pending.is_empty() {
                self.connected = false;
                return Err(McpError::ProcessExited);
            }

            let raw = std::mem::take(&mut self.pending);
            let line = String::from_utf8(raw)
                .map_err(|e| McpError::protocol(format!("Non UTF-8 output from server: {}", e)))?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            trace!(message = %line, "Received message from MCP server");
            return Ok(line.to_string());
        }
    }

    async fn close(&mut self) -> Result<(), McpError> {
        if self.connected {
            debug!(command = %self.command_str, "Closing MCP server connection");

            // Give the process a moment to exit gracefully after we stop writing
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

            if self.check_process().is_ok() {
                self.kill().await?;
            }
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn diagnostics(&self) -> Option<String> {
        let tail = self.stderr_tail();
        if tail.is_empty() {
            None
        } else {
            Some(tail.join("\n"))
        }
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        if self.connected {
            // Best effort: we cannot await in drop
            let _ = self.child.start_kill();
        }
    }
}
