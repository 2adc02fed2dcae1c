use std::collections::HashMap;
use std::sync::Arc;

use super::tool::{Tool, ToolParameters, ToolResult};
use super::tool_context::ToolContext;

/// Registry for managing and discovering tools
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.get_tool_names())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    /// Get a tool by name
    pub fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Check if a tool exists
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Tool names, sorted
    pub fn get_tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Execute a tool by name
    pub async fn execute_tool(&self, name: &str, params: ToolParameters, context: &ToolContext) -> ToolResult {
        match self.get_tool(name) {
            Some(tool) => tool.execute(params, context).await,
            None => ToolResult::error(format!("Tool '{}' not found", name)),
        }
    }

    /// All tool definitions, sorted by name for stable output
    pub fn definitions(&self) -> Vec<serde_json::Value> {
        let mut tools: Vec<_> = self.tools.iter().collect();
        tools.sort_by_key(|(name, _)| name.as_str());
        tools.into_iter().map(|(_, tool)| tool.definition()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tool::ParameterDefinition;
    use crate::param;

    struct MockTool;

    #[async_trait::async_trait]
    impl Tool for MockTool {
        fn name(&self) -> &str {
            "mock"
        }

        fn description(&self) -> &str {
            "A mock tool"
        }

        fn parameters(&self) -> HashMap<String, ParameterDefinition> {
            HashMap::from([
                param!("value", "string", "Any value", required),
                param!("count", "integer", "How many", optional, 3),
            ])
        }

        async fn execute(&self, _params: ToolParameters, _context: &ToolContext) -> ToolResult {
            ToolResult::success("mock result".to_string())
        }
    }

    #[test]
    fn test_register_and_define() {
        let mut registry = ToolRegistry::new();
        registry.register(MockTool);
        assert!(registry.has_tool("mock"));
        assert!(!registry.has_tool("missing"));

        let definitions = registry.definitions();
        assert_eq!(definitions.len(), 1);
        let schema = &definitions[0]["input_schema"];
        assert_eq!(schema["required"], serde_json::json!(["value"]));
        assert_eq!(schema["properties"]["count"]["default"], serde_json::json!(3));
    }
}
