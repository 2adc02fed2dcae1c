use std::sync::Arc;

use crate::pipeline::CommandPipeline;

/// Tool execution context
///
/// Gives tools access to the shared command pipeline and, through it, the
/// session manager.
#[derive(Clone)]
pub struct ToolContext {
    pub pipeline: Arc<CommandPipeline>,
}

impl ToolContext {
    pub fn new(pipeline: Arc<CommandPipeline>) -> Self {
        Self { pipeline }
    }
}
