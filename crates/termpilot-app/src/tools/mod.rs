// Tool surface exposed to protocol clients

pub mod session_tools;

pub use session_tools::*;

use crate::core::tool_registry::ToolRegistry;

/// Registry holding every session tool
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(CreateSessionTool);
    registry.register(SendCommandTool);
    registry.register(ReadOutputTool);
    registry.register(ListSessionsTool);
    registry.register(CloseSessionTool);
    registry.register(SendControlTool);
    registry.register(ConfirmDangerousCommandTool);
    registry.register(ResizeSessionTool);
    registry
}
