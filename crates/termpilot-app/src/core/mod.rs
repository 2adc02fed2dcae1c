pub mod tool;
pub mod tool_context;
pub mod tool_registry;
