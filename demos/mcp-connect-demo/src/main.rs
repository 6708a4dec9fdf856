//! MCP connection demo
//!
//! Connects a handful of MCP servers through the builder and the shared
//! connection cache, registers their tools next to a lazily connected one, and
//! optionally calls a tool.
//!
//! ## Prerequisites
//!
//! Node.js (`npx`) and uv (`uvx`) on the PATH for the default presets.
//!
//! ## Running the Demo
//!
//! ```bash
//! # Default servers: memory (eager) and time (lazy)
//! cargo run -p mcp-connect-demo
//!
//! # Servers from a JSON document, then call one tool
//! cargo run -p mcp-connect-demo -- servers.json memory_read_graph '{}'
//!
//! # More detail
//! RUST_LOG=toolwire_mcp=debug cargo run -p mcp-connect-demo
//! ```

use std::sync::Arc;
use toolwire_core::ToolRegistry;
use toolwire_mcp::{
    create_mcp_tools, ConfigBuilder, ConnectionCache, LazyTool, TransportConnector,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let mut args = std::env::args().skip(1);
    let config_path = args.next().filter(|a| a != "-");
    let call = args.next().map(|name| (name, args.next().unwrap_or_default()));

    let builder = match &config_path {
        Some(path) => {
            info!(path = %path, "Loading server declarations");
            ConfigBuilder::from_json_file(path)?
        }
        None => ConfigBuilder::new()
            .add_preset("memory", "memory")
            .add_server_url("time", "mcp://time")
            .lazy(),
    };

    let cache = Arc::new(ConnectionCache::new(Arc::new(TransportConnector::new())));
    let built = builder.build(&cache).await?;

    let mut registry = ToolRegistry::new();
    for server in &built.connected {
        let tools = create_mcp_tools(&server.client, Some(server.config.name())).await?;
        info!(server = %server.config.name(), tools = tools.len(), "Registered tools");
        registry.register_all(tools);
    }
    for failure in &built.failures {
        warn!(server = %failure.config.name(), error = %failure.error, "Server unavailable");
    }
    for config in built.deferred {
        if config_path.is_none() && config.name() == "time" {
            let lazy = LazyTool::new(
                cache.clone(),
                config,
                "get_current_time",
                "Current time in a given IANA timezone",
            );
            registry.register(Arc::new(lazy));
        } else {
            info!(server = %config.name(), "Deferred server has no lazy tools registered");
        }
    }

    info!("Available tools:");
    for schema in registry.schemas().await {
        info!(
            "  - {}: {} {}",
            schema.name,
            schema.description,
            serde_json::to_string(&schema.parameters)?
        );
    }

    if let Some((name, input)) = call {
        match registry.run(&name, &input).await {
            Ok(output) => info!(tool = %name, "Result:\n{}", output),
            Err(e) => warn!(tool = %name, error = %e, "Tool call failed"),
        }
    }

    cache.shutdown().await;
    Ok(())
}
