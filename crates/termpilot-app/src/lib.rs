// termpilot: interactive terminal sessions behind a safety pipeline,
// served to automated clients as JSON tool calls.

pub mod config;
pub mod core;
pub mod pipeline;
pub mod server;
pub mod tools;

pub use config::{Cli, Commands};
pub use core::tool::{ParameterDefinition, Tool, ToolParameters, ToolResult};
pub use core::tool_context::ToolContext;
pub use core::tool_registry::ToolRegistry;
pub use pipeline::{CommandPipeline, PipelineConfig};
pub use server::Server;
