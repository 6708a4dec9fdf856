//! Well-known reference servers, addressable as `mcp://<name>`

use crate::config::ServerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preset {
    pub name: &'static str,
    pub description: &'static str,
    pub command: &'static str,
    pub args: &'static [&'static str],
}

impl Preset {
    /// Stdio declaration for this preset under `server_name`
    pub fn to_config(&self, server_name: impl Into<String>) -> ServerConfig {
        ServerConfig::stdio(server_name, self.command, self.args.iter().copied())
    }
}

const PRESETS: &[Preset] = &[
    Preset {
        name: "filesystem",
        description: "Read and write files under the working directory",
        command: "npx",
        args: &["-y", "@modelcontextprotocol/server-filesystem", "."],
    },
    Preset {
        name: "memory",
        description: "Knowledge-graph memory",
        command: "npx",
        args: &["-y", "@modelcontextprotocol/server-memory"],
    },
    Preset {
        name: "fetch",
        description: "Fetch web pages as markdown",
        command: "uvx",
        args: &["mcp-server-fetch"],
    },
    Preset {
        name: "git",
        description: "Inspect and manipulate git repositories",
        command: "uvx",
        args: &["mcp-server-git"],
    },
    Preset {
        name: "time",
        description: "Current time and timezone conversion",
        command: "uvx",
        args: &["mcp-server-time"],
    },
    Preset {
        name: "sequential-thinking",
        description: "Structured step-by-step reasoning",
        command: "npx",
        args: &["-y", "@modelcontextprotocol/server-sequential-thinking"],
    },
    Preset {
        name: "everything",
        description: "Protocol test server exercising every feature",
        command: "npx",
        args: &["-y", "@modelcontextprotocol/server-everything"],
    },
];

pub fn preset(name: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|p| p.name.eq_ignore_ascii_case(name))
}

pub fn presets() -> &'static [Preset] {
    PRESETS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerKind;

    #[test]
    fn test_lookup() {
        assert_eq!(presets().len(), 7);
        let git = preset("Git").unwrap();
        assert_eq!(git.command, "uvx");
        assert!(preset("nope").is_none());
    }

    #[test]
    fn test_to_config() {
        let config = preset("memory").unwrap().to_config("mem");
        assert_eq!(config.name(), "mem");
        assert_eq!(config.kind(), ServerKind::Stdio);
        assert_eq!(config.command(), Some("npx"));
        assert_eq!(config.args(), ["-y", "@modelcontextprotocol/server-memory"]);
    }
}
