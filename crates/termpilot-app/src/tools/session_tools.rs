// Session tools: thin adapters from JSON arguments to the command pipeline

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use termpilot_terminal::CreateSessionRequest;
use termpilot_types::EngineError;

use crate::core::tool::{ParameterDefinition, Tool, ToolParameters, ToolResult};
use crate::core::tool_context::ToolContext;
use crate::param;

/// Error text for a failed tool call. Engine errors are prefixed with
/// their failure class so callers can tell policy from liveness problems.
pub fn describe_error(e: &anyhow::Error) -> String {
    match e.downcast_ref::<EngineError>() {
        Some(engine) => format!("{}: {}", engine.kind(), engine),
        None => format!("invalid_arguments: {:#}", e),
    }
}

fn finish(result: Result<ToolResult>) -> ToolResult {
    result.unwrap_or_else(|e| ToolResult::error(describe_error(&e)))
}

fn timeout_param(params: &ToolParameters) -> Result<Option<Duration>> {
    Ok(params.get_optional::<u64>("timeout_ms")?.map(Duration::from_millis))
}

/// Tool for starting a new interactive session
pub struct CreateSessionTool;

impl CreateSessionTool {
    async fn run(&self, params: ToolParameters, context: &ToolContext) -> Result<ToolResult> {
        let request = CreateSessionRequest {
            command: params.get_required("command")?,
            args: params.get_optional("args")?.unwrap_or_default(),
            name: params.get_optional("name")?,
            cwd: params.get_optional::<String>("cwd")?.map(PathBuf::from),
            env: params.get_optional::<HashMap<String, String>>("env")?.unwrap_or_default(),
            cols: params.get_optional("cols")?,
            rows: params.get_optional("rows")?,
        };
        let created = context.pipeline.create_session(request).await?;
        Ok(ToolResult::json(&created))
    }
}

#[async_trait]
impl Tool for CreateSessionTool {
    fn name(&self) -> &str {
        "create_session"
    }

    fn description(&self) -> &str {
        "Start an interactive program (shell, REPL, database client) in a new session. Returns the session id, name, pid and whether it runs on a pty or on pipes."
    }

    fn parameters(&self) -> HashMap<String, ParameterDefinition> {
        HashMap::from([
            param!("command", "string", "Program to run, e.g. 'bash' or 'python3'", required),
            param!("args", "array", "Arguments for the program", optional),
            param!("name", "string", "Display name (default: program name)", optional),
            param!("cwd", "string", "Working directory", optional),
            param!("env", "object", "Extra environment variables", optional),
            param!("cols", "integer", "Terminal width in columns", optional, 120),
            param!("rows", "integer", "Terminal height in rows", optional, 40),
        ])
    }

    async fn execute(&self, params: ToolParameters, context: &ToolContext) -> ToolResult {
        finish(self.run(params, context).await)
    }
}

/// Tool for running one input in a session
pub struct SendCommandTool;

impl SendCommandTool {
    async fn run(&self, params: ToolParameters, context: &ToolContext) -> Result<ToolResult> {
        let session_id: String = params.get_required("session_id")?;
        let input: String = params.get_required("input")?;
        let timeout = timeout_param(&params)?;
        let max_chars = params.get_optional::<usize>("max_output_chars")?;

        let output = context
            .pipeline
            .send_command(&session_id, &input, timeout, max_chars)
            .await?;
        Ok(ToolResult::json(&output))
    }
}

#[async_trait]
impl Tool for SendCommandTool {
    fn name(&self) -> &str {
        "send_command"
    }

    fn description(&self) -> &str {
        "Send a line of input to a session and wait until it finishes (prompt returns, output settles, the process exits, or the timeout passes). Dangerous inputs are refused until confirmed with confirm_dangerous_command."
    }

    fn parameters(&self) -> HashMap<String, ParameterDefinition> {
        HashMap::from([
            param!("session_id", "string", "Session to send to", required),
            param!("input", "string", "Input line; a newline is appended", required),
            param!("timeout_ms", "integer", "How long to wait for completion", optional),
            param!("max_output_chars", "integer", "Character budget for the returned output", optional),
        ])
    }

    async fn execute(&self, params: ToolParameters, context: &ToolContext) -> ToolResult {
        finish(self.run(params, context).await)
    }
}

/// Tool for reading a session's screen without sending anything
pub struct ReadOutputTool;

impl ReadOutputTool {
    async fn run(&self, params: ToolParameters, context: &ToolContext) -> Result<ToolResult> {
        let session_id: String = params.get_required("session_id")?;
        let full = params.get_optional::<bool>("full")?.unwrap_or(false);
        let screen = context.pipeline.read_output(&session_id, full).await?;
        Ok(ToolResult::json(&screen))
    }
}

#[async_trait]
impl Tool for ReadOutputTool {
    fn name(&self) -> &str {
        "read_output"
    }

    fn description(&self) -> &str {
        "Read what a session currently shows. With full=true, returns the whole scrollback history."
    }

    fn parameters(&self) -> HashMap<String, ParameterDefinition> {
        HashMap::from([
            param!("session_id", "string", "Session to read", required),
            param!("full", "boolean", "Return full history instead of the current view", optional, false),
        ])
    }

    async fn execute(&self, params: ToolParameters, context: &ToolContext) -> ToolResult {
        finish(self.run(params, context).await)
    }
}

/// Tool for listing sessions
pub struct ListSessionsTool;

#[async_trait]
impl Tool for ListSessionsTool {
    fn name(&self) -> &str {
        "list_sessions"
    }

    fn description(&self) -> &str {
        "List open sessions with their command, pid, mode, liveness, working directory and timestamps"
    }

    fn parameters(&self) -> HashMap<String, ParameterDefinition> {
        HashMap::new()
    }

    async fn execute(&self, _params: ToolParameters, context: &ToolContext) -> ToolResult {
        let sessions = context.pipeline.list_sessions().await;
        ToolResult::json(&json!({ "sessions": sessions }))
    }
}

/// Tool for closing a session
pub struct CloseSessionTool;

impl CloseSessionTool {
    async fn run(&self, params: ToolParameters, context: &ToolContext) -> Result<ToolResult> {
        let session_id: String = params.get_required("session_id")?;
        let signal = params.get_optional::<String>("signal")?;
        context
            .pipeline
            .close_session(&session_id, signal.as_deref())
            .await?;
        Ok(ToolResult::json(&json!({ "success": true, "session_id": session_id })))
    }
}

#[async_trait]
impl Tool for CloseSessionTool {
    fn name(&self) -> &str {
        "close_session"
    }

    fn description(&self) -> &str {
        "Terminate a session's process and forget the session"
    }

    fn parameters(&self) -> HashMap<String, ParameterDefinition> {
        HashMap::from([
            param!("session_id", "string", "Session to close", required),
            param!("signal", "string", "Signal to send: SIGTERM, SIGINT, SIGKILL, SIGHUP, SIGQUIT", optional, "SIGTERM"),
        ])
    }

    async fn execute(&self, params: ToolParameters, context: &ToolContext) -> ToolResult {
        finish(self.run(params, context).await)
    }
}

/// Tool for sending control keys
pub struct SendControlTool;

impl SendControlTool {
    async fn run(&self, params: ToolParameters, context: &ToolContext) -> Result<ToolResult> {
        let session_id: String = params.get_required("session_id")?;
        let key: String = params.get_required("key")?;
        let screen = context.pipeline.send_control(&session_id, &key).await?;
        Ok(ToolResult::json(&screen))
    }
}

#[async_trait]
impl Tool for SendControlTool {
    fn name(&self) -> &str {
        "send_control"
    }

    fn description(&self) -> &str {
        "Send a control key such as ctrl+c, ctrl+d, ctrl+z, tab, escape, up, down or f1, then return the output produced shortly after"
    }

    fn parameters(&self) -> HashMap<String, ParameterDefinition> {
        HashMap::from([
            param!("session_id", "string", "Session to send to", required),
            param!("key", "string", "Key name, e.g. 'ctrl+c', '^D', 'up', 'tab'", required),
        ])
    }

    async fn execute(&self, params: ToolParameters, context: &ToolContext) -> ToolResult {
        finish(self.run(params, context).await)
    }
}

/// Tool for running a blocked dangerous input once
pub struct ConfirmDangerousCommandTool;

impl ConfirmDangerousCommandTool {
    async fn run(&self, params: ToolParameters, context: &ToolContext) -> Result<ToolResult> {
        let session_id: String = params.get_required("session_id")?;
        let input: String = params.get_required("input")?;
        let justification: String = params.get_required("justification")?;
        let timeout = timeout_param(&params)?;

        let output = context
            .pipeline
            .confirm_dangerous(&session_id, &input, &justification, timeout)
            .await?;
        Ok(ToolResult::json(&output))
    }
}

#[async_trait]
impl Tool for ConfirmDangerousCommandTool {
    fn name(&self) -> &str {
        "confirm_dangerous_command"
    }

    fn description(&self) -> &str {
        "Run an input that send_command refused as dangerous. Requires a justification and only works for inputs that really are classified as dangerous."
    }

    fn parameters(&self) -> HashMap<String, ParameterDefinition> {
        HashMap::from([
            param!("session_id", "string", "Session to send to", required),
            param!("input", "string", "The exact input that was refused", required),
            param!("justification", "string", "Why this is intended (at least 10 characters)", required),
            param!("timeout_ms", "integer", "Base timeout; confirmed commands get four times this", optional),
        ])
    }

    async fn execute(&self, params: ToolParameters, context: &ToolContext) -> ToolResult {
        finish(self.run(params, context).await)
    }
}

/// Tool for changing a session's terminal size
pub struct ResizeSessionTool;

impl ResizeSessionTool {
    async fn run(&self, params: ToolParameters, context: &ToolContext) -> Result<ToolResult> {
        let session_id: String = params.get_required("session_id")?;
        let cols: u16 = params.get_required("cols")?;
        let rows: u16 = params.get_required("rows")?;
        context.pipeline.resize(&session_id, cols, rows).await?;
        Ok(ToolResult::json(&json!({ "success": true, "cols": cols, "rows": rows })))
    }
}

#[async_trait]
impl Tool for ResizeSessionTool {
    fn name(&self) -> &str {
        "resize_session"
    }

    fn description(&self) -> &str {
        "Resize a session's terminal. Has no effect on pipe-mode sessions."
    }

    fn parameters(&self) -> HashMap<String, ParameterDefinition> {
        HashMap::from([
            param!("session_id", "string", "Session to resize", required),
            param!("cols", "integer", "New width in columns", required),
            param!("rows", "integer", "New height in rows", required),
        ])
    }

    async fn execute(&self, params: ToolParameters, context: &ToolContext) -> ToolResult {
        finish(self.run(params, context).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_engine_error() {
        let err = anyhow::Error::new(EngineError::SessionNotFound("zz".into()));
        assert_eq!(describe_error(&err), "not_found: Session 'zz' not found");
    }

    #[test]
    fn test_describe_argument_error() {
        let err = anyhow::anyhow!("Required parameter 'input' missing");
        assert!(describe_error(&err).starts_with("invalid_arguments:"));
    }
}
