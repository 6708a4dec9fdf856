//! Tool-consumer interface for toolwire.
//! Integrations (MCP servers, native tools) implement [`Tool`]; the agent loop
//! only ever sees this uniform shape, whatever transport or laziness backs it.

pub mod tools;

pub use tools::{empty_object_schema, Tool, ToolBox, ToolRegistry, ToolSchema};
