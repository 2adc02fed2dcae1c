//! JSON-lines front end on stdin/stdout.
//!
//! Each request line is `{"id": .., "tool": "..", "arguments": {..}}` and
//! gets exactly one response line `{"id": .., "success": .., "content": ..,
//! "error": ..}`. Requests run concurrently; responses are written in
//! completion order, so clients match them up by `id`.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use termpilot_logging::{AuditEvent, AuditLog};
use termpilot_terminal::SessionManager;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use crate::config::Cli;
use crate::core::tool::{ToolParameters, ToolResult};
use crate::core::tool_context::ToolContext;
use crate::core::tool_registry::ToolRegistry;
use crate::pipeline::CommandPipeline;
use crate::tools::default_registry;

#[derive(Debug, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub id: Value,
    pub tool: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub id: Value,
    pub success: bool,
    pub content: String,
    pub error: Option<String>,
}

impl Response {
    fn from_result(id: Value, result: ToolResult) -> Self {
        Self {
            id,
            success: result.success,
            content: result.content,
            error: result.error,
        }
    }
}

/// Everything a running server needs
pub struct Server {
    registry: ToolRegistry,
    context: ToolContext,
    audit: Arc<AuditLog>,
}

impl Server {
    pub fn new(pipeline: Arc<CommandPipeline>, audit: Arc<AuditLog>) -> Self {
        Self {
            registry: default_registry(),
            context: ToolContext::new(pipeline),
            audit,
        }
    }

    /// Build the whole engine from CLI settings
    pub fn from_cli(cli: &Cli) -> Self {
        let audit = Arc::new(AuditLog::from_destination(cli.audit_log.as_deref()));
        let manager = SessionManager::new(cli.manager_config(), Arc::clone(&audit));
        let pipeline = Arc::new(CommandPipeline::new(manager, cli.pipeline_config(), Arc::clone(&audit)));
        Self::new(pipeline, audit)
    }

    pub fn pipeline(&self) -> &CommandPipeline {
        &self.context.pipeline
    }

    /// Answer one request line
    pub async fn handle_line(&self, line: &str) -> Response {
        let request: Request = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                return Response::from_result(Value::Null, ToolResult::error(format!("invalid_request: {}", e)));
            }
        };

        let params = match ToolParameters::from_value(request.arguments) {
            Ok(params) => params,
            Err(e) => {
                return Response::from_result(request.id, ToolResult::error(format!("invalid_arguments: {}", e)));
            }
        };

        log::debug!("Tool call {} ({})", request.tool, request.id);
        let result = self.registry.execute_tool(&request.tool, params, &self.context).await;
        if let Some(error) = &result.error {
            log::debug!("Tool {} failed: {}", request.tool, error);
        }
        Response::from_result(request.id, result)
    }

    /// Serve until `input` reaches EOF, then close every session
    pub async fn serve<R, W>(self: Arc<Self>, input: R, mut output: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        self.audit.record(
            AuditEvent::ServerStart,
            None,
            json!({
                "version": env!("CARGO_PKG_VERSION"),
                "sandbox": self.pipeline().manager().sandbox_name(),
            }),
        );

        let (tx, mut rx) = mpsc::unbounded_channel::<Response>();
        let writer = tokio::spawn(async move {
            while let Some(response) = rx.recv().await {
                let mut line = serde_json::to_string(&response).context("Failed to encode response")?;
                line.push('\n');
                output.write_all(line.as_bytes()).await?;
                output.flush().await?;
            }
            Ok::<(), anyhow::Error>(())
        });

        let mut lines = input.lines();
        while let Some(line) = lines.next_line().await.context("Failed to read request")? {
            if line.trim().is_empty() {
                continue;
            }
            let server = Arc::clone(&self);
            let tx = tx.clone();
            tokio::spawn(async move {
                let response = server.handle_line(&line).await;
                let _ = tx.send(response);
            });
        }

        drop(tx);
        let written = writer.await.context("Response writer panicked")?;
        self.shutdown().await;
        written
    }

    /// Close all sessions and record the stop
    pub async fn shutdown(&self) {
        self.pipeline().shutdown().await;
        self.audit.record(AuditEvent::ServerStop, None, Value::Null);
    }
}

/// Serve on the process's stdin/stdout until EOF or ctrl-c
pub async fn run(cli: &Cli) -> Result<()> {
    let server = Arc::new(Server::from_cli(cli));
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();

    let serving = Arc::clone(&server).serve(stdin, stdout);
    tokio::select! {
        result = serving => result,
        _ = tokio::signal::ctrl_c() => {
            log::info!("Interrupted, closing sessions");
            server.shutdown().await;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineConfig;
    use termpilot_terminal::ManagerConfig;

    fn server() -> Server {
        let audit = Arc::new(AuditLog::disabled());
        let manager = SessionManager::new(ManagerConfig::default(), Arc::clone(&audit));
        let pipeline = Arc::new(CommandPipeline::new(manager, PipelineConfig::default(), Arc::clone(&audit)));
        Server::new(pipeline, audit)
    }

    #[tokio::test]
    async fn test_malformed_request() {
        let response = server().handle_line("not json").await;
        assert!(!response.success);
        assert!(response.error.unwrap().starts_with("invalid_request"));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let response = server()
            .handle_line(r#"{"id": 7, "tool": "format_disk", "arguments": {}}"#)
            .await;
        assert_eq!(response.id, json!(7));
        assert_eq!(response.error.as_deref(), Some("Tool 'format_disk' not found"));
    }

    #[tokio::test]
    async fn test_list_sessions_empty() {
        let response = server()
            .handle_line(r#"{"id": "a", "tool": "list_sessions"}"#)
            .await;
        assert!(response.success);
        let content: Value = serde_json::from_str(&response.content).unwrap();
        assert_eq!(content["sessions"], json!([]));
    }

    #[tokio::test]
    async fn test_serve_answers_each_line() {
        let server = Arc::new(server());
        let input = b"{\"id\":1,\"tool\":\"list_sessions\"}\n\n{\"id\":2,\"tool\":\"nope\"}\n";
        let (client, mut reader) = tokio::io::duplex(4096);
        server.serve(&input[..], client).await.unwrap();

        let mut text = String::new();
        tokio::io::AsyncReadExt::read_to_string(&mut reader, &mut text).await.unwrap();
        let responses: Vec<Response> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(responses.len(), 2);
        assert!(responses.iter().any(|r| r.id == json!(1) && r.success));
        assert!(responses.iter().any(|r| r.id == json!(2) && !r.success));
    }
}
