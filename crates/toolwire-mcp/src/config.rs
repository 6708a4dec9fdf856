//! Server declarations
//!
//! A [`ServerConfig`] names one MCP server and how to reach it. Values are
//! immutable once built; the connection cache keys sessions by [`ServerKey`].

use crate::protocol::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// How a server is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerKind {
    /// Local subprocess speaking newline-delimited JSON
    Stdio,
    /// Remote endpoint over HTTP
    Http,
}

impl ServerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerKind::Stdio => "stdio",
            ServerKind::Http => "http",
        }
    }
}

/// HTTP sub-protocol
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpVariant {
    /// POST per message, JSON or event-stream replies
    #[default]
    Streamable,
    /// Long-lived event stream plus a POST endpoint
    Sse,
}

impl HttpVariant {
    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "sse" => Some(HttpVariant::Sse),
            "streamable" | "streamable-http" | "streamable_http" | "http" => {
                Some(HttpVariant::Streamable)
            }
            _ => None,
        }
    }
}

/// Identity of a server session: kind, name and command or URL
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerKey {
    kind: &'static str,
    name: String,
    target: String,
}

impl ServerKey {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ServerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind, self.name, self.target)
    }
}

/// Declaration of one MCP server
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "ServerConfigDocument")]
pub struct ServerConfig {
    name: String,
    kind: ServerKind,
    command: Option<String>,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    url: Option<String>,
    token: Option<String>,
    /// `None` until declared; the URL's `transport` query may still pick one
    http_variant: Option<HttpVariant>,
}

impl ServerConfig {
    /// A local subprocess server
    pub fn stdio<I, S>(name: impl Into<String>, command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            kind: ServerKind::Stdio,
            command: Some(command.into()),
            args: args.into_iter().map(Into::into).collect(),
            env: BTreeMap::new(),
            url: None,
            token: None,
            http_variant: None,
        }
    }

    /// A remote server over streamable HTTP
    pub fn http(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ServerKind::Http,
            command: None,
            args: Vec::new(),
            env: BTreeMap::new(),
            url: Some(url.into()),
            token: None,
            http_variant: None,
        }
    }

    /// Add an environment override for the subprocess
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Bearer token sent in the `Authorization` header
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.token = if token.is_empty() { None } else { Some(token) };
        self
    }

    pub fn with_http_variant(mut self, variant: HttpVariant) -> Self {
        self.http_variant = Some(variant);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ServerKind {
        self.kind
    }

    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn http_variant(&self) -> HttpVariant {
        self.http_variant.unwrap_or_default()
    }

    /// The variant if one was declared rather than defaulted
    pub(crate) fn declared_http_variant(&self) -> Option<HttpVariant> {
        self.http_variant
    }

    /// Cache key: kind, name and command or URL
    pub fn key(&self) -> ServerKey {
        let target = match self.kind {
            ServerKind::Stdio => self.command.clone().unwrap_or_default(),
            ServerKind::Http => self.url.clone().unwrap_or_default(),
        };
        ServerKey {
            kind: self.kind.as_str(),
            name: self.name.clone(),
            target,
        }
    }

    /// Check the declaration is complete. Executable checks happen at connect.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        match self.kind {
            ServerKind::Stdio => match self.command.as_deref().map(str::trim) {
                None | Some("") => Err(ConfigError::EmptyCommand),
                Some(_) => Ok(()),
            },
            ServerKind::Http => {
                let url = self.url.as_deref().ok_or_else(|| ConfigError::MissingField {
                    name: self.name.clone(),
                    kind: "http",
                    field: "url",
                })?;
                let parsed = reqwest::Url::parse(url).map_err(|e| ConfigError::InvalidUrl {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;
                match parsed.scheme() {
                    "http" | "https" => Ok(()),
                    other => Err(ConfigError::UnsupportedScheme(other.to_string())),
                }
            }
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("command", &self.command)
            .field("args", &self.args)
            .field("env", &self.env.keys().collect::<Vec<_>>())
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("http_variant", &self.http_variant())
            .finish()
    }
}

/// Split a `KEY=VALUE` entry
pub(crate) fn parse_env_entry(entry: &str) -> Result<(String, String), ConfigError> {
    match entry.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(ConfigError::InvalidEnv(entry.to_string())),
    }
}

/// Environment as written in a config document
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EnvSpec {
    List(Vec<String>),
    Map(BTreeMap<String, String>),
}

impl Default for EnvSpec {
    fn default() -> Self {
        EnvSpec::Map(BTreeMap::new())
    }
}

/// Inbound JSON shape of a server declaration
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerConfigDocument {
    name: String,
    #[serde(rename = "type", default)]
    kind: Option<ServerKind>,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: EnvSpec,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    http_variant: Option<String>,
}

impl TryFrom<ServerConfigDocument> for ServerConfig {
    type Error = ConfigError;

    fn try_from(doc: ServerConfigDocument) -> Result<Self, Self::Error> {
        let kind = match doc.kind {
            Some(kind) => kind,
            None if doc.url.is_some() => ServerKind::Http,
            None => ServerKind::Stdio,
        };

        let env = match doc.env {
            EnvSpec::Map(map) => map,
            EnvSpec::List(entries) => entries
                .iter()
                .map(|entry| parse_env_entry(entry))
                .collect::<Result<_, _>>()?,
        };

        let http_variant = match doc.http_variant.as_deref() {
            None => None,
            Some(raw) => Some(HttpVariant::parse(raw).ok_or_else(|| ConfigError::InvalidUrl {
                url: doc.url.clone().unwrap_or_default(),
                reason: format!("unknown HTTP variant '{}'", raw),
            })?),
        };

        let config = match kind {
            ServerKind::Stdio => {
                let command = doc.command.ok_or_else(|| ConfigError::MissingField {
                    name: doc.name.clone(),
                    kind: "stdio",
                    field: "command",
                })?;
                ServerConfig::stdio(doc.name, command, doc.args).with_envs(env)
            }
            ServerKind::Http => {
                let url = doc.url.ok_or_else(|| ConfigError::MissingField {
                    name: doc.name.clone(),
                    kind: "http",
                    field: "url",
                })?;
                let config = ServerConfig::http(doc.name, url);
                match http_variant {
                    Some(variant) => config.with_http_variant(variant),
                    None => config,
                }
            }
        };

        Ok(match doc.token {
            Some(token) => config.with_token(token),
            None => config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_distinguishes_kind_and_target() {
        let a = ServerConfig::stdio("fs", "npx", ["-y", "pkg"]);
        let b = ServerConfig::stdio("fs", "uvx", ["pkg"]);
        let c = ServerConfig::http("fs", "http://localhost:3000/mcp");
        assert_ne!(a.key(), b.key());
        assert_ne!(a.key(), c.key());
        assert_eq!(a.key(), a.clone().with_env("K", "V").key());
        assert_eq!(a.key().to_string(), "stdio:fs:npx");
    }

    #[test]
    fn test_deserialize_env_list_and_map() {
        let from_list: ServerConfig = serde_json::from_value(json!({
            "name": "git",
            "type": "stdio",
            "command": "uvx",
            "args": ["mcp-server-git"],
            "env": ["GIT_DIR=/repo/.git", "EMPTY="]
        }))
        .unwrap();
        assert_eq!(from_list.env()["GIT_DIR"], "/repo/.git");
        assert_eq!(from_list.env()["EMPTY"], "");

        let from_map: ServerConfig = serde_json::from_value(json!({
            "name": "git",
            "command": "uvx",
            "args": ["mcp-server-git"],
            "env": {"GIT_DIR": "/repo/.git", "EMPTY": ""}
        }))
        .unwrap();
        assert_eq!(from_list, from_map);
    }

    #[test]
    fn test_deserialize_http_with_variant_and_token() {
        let config: ServerConfig = serde_json::from_value(json!({
            "name": "remote",
            "url": "https://mcp.example.com/sse",
            "httpVariant": "sse",
            "token": "abc"
        }))
        .unwrap();
        assert_eq!(config.kind(), ServerKind::Http);
        assert_eq!(config.http_variant(), HttpVariant::Sse);
        assert_eq!(config.token(), Some("abc"));
        assert!(!format!("{:?}", config).contains("abc"));
    }

    #[test]
    fn test_deserialize_rejects_bad_env_entry() {
        let err = serde_json::from_value::<ServerConfig>(json!({
            "name": "x",
            "command": "cat",
            "env": ["NOVALUE"]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("NOVALUE"));
    }

    #[test]
    fn test_validate() {
        assert_eq!(
            ServerConfig::stdio("x", "  ", Vec::<String>::new()).validate(),
            Err(ConfigError::EmptyCommand)
        );
        assert_eq!(
            ServerConfig::stdio("", "cat", Vec::<String>::new()).validate(),
            Err(ConfigError::EmptyName)
        );
        assert!(matches!(
            ServerConfig::http("x", "not a url").validate(),
            Err(ConfigError::InvalidUrl { .. })
        ));
        assert!(matches!(
            ServerConfig::http("x", "ftp://host/mcp").validate(),
            Err(ConfigError::UnsupportedScheme(_))
        ));
        assert!(ServerConfig::http("x", "https://host/mcp").validate().is_ok());
    }

    #[test]
    fn test_empty_token_is_no_token() {
        let config = ServerConfig::http("x", "https://host/mcp").with_token("");
        assert!(config.token().is_none());
    }
}
