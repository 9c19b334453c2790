//! MCP server front door for editor integration (spec §6 "Editor-facing
//! surface").
//!
//! Grounded on the teacher's `TugServer` (`mcp.rs`): the same
//! `ToolRouter`/`#[tool_router]`/`#[tool_handler]` shape and lazily
//! initialized, mutex-guarded session state, generalized from one rename
//! session per workspace path into one [`Program`] per server process,
//! tracking whatever files the editor has opened rather than a single
//! workspace snapshot.

#![cfg(feature = "mcp")]

use std::path::PathBuf;
use std::sync::Arc;

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo,
    },
    tool, tool_handler, tool_router,
    transport::stdio,
    ErrorData as McpError, ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::program::Program;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct PathParams {
    /// Absolute or workspace-relative path to a tracked Python file.
    #[schemars(description = "Absolute or workspace-relative path to a tracked Python file")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct PositionParams {
    /// Absolute or workspace-relative path to a tracked Python file.
    #[schemars(description = "Absolute or workspace-relative path to a tracked Python file")]
    pub path: String,

    /// Byte offset into the file's source text.
    #[schemars(description = "Byte offset into the file's source text")]
    pub offset: u32,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CompletionParams {
    /// Absolute or workspace-relative path to a tracked Python file.
    #[schemars(description = "Absolute or workspace-relative path to a tracked Python file")]
    pub path: String,

    /// Byte offset into the file's source text.
    #[schemars(description = "Byte offset into the file's source text")]
    pub offset: u32,

    /// Prefix the suggested names must match.
    #[schemars(description = "Prefix the suggested names must match")]
    #[serde(default)]
    pub prefix: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ReferencesParams {
    /// Absolute or workspace-relative path to a tracked Python file.
    #[schemars(description = "Absolute or workspace-relative path to a tracked Python file")]
    pub path: String,

    /// Byte offset into the file's source text.
    #[schemars(description = "Byte offset into the file's source text")]
    pub offset: u32,

    /// Include the symbol's own declaration sites in the result.
    #[schemars(description = "Include the symbol's own declaration sites in the result")]
    #[serde(default)]
    pub include_declaration: bool,
}

/// The MCP server process: one shared, mutex-guarded [`Program`] that every
/// tool call reads from or mutates. Unlike the teacher's `TugServer`, there
/// is no per-call workspace switch — an editor session tracks one project
/// for the server's lifetime, so the program is created once in [`Self::new`]
/// rather than lazily on first use.
#[derive(Clone)]
pub struct PyriteServer {
    tool_router: ToolRouter<Self>,
    program: Arc<Mutex<Program>>,
}

#[tool_router]
impl PyriteServer {
    pub fn new() -> Self {
        Self { tool_router: Self::tool_router(), program: Arc::new(Mutex::new(Program::new())) }
    }

    fn io_error(path: &str, err: impl std::fmt::Display) -> McpError {
        McpError::internal_error(
            "file operation failed",
            Some(serde_json::json!({ "path": path, "error": err.to_string() })),
        )
    }

    #[tool(description = "Open or update a tracked file's content so subsequent queries see it")]
    async fn update_file(
        &self,
        Parameters(PathParams { path }): Parameters<PathParams>,
    ) -> Result<CallToolResult, McpError> {
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Self::io_error(&path, e))?;
        let mut program = self.program.lock().await;
        program.update_file(&PathBuf::from(&path), content);
        while program.analyze(64) {}
        Ok(CallToolResult::success(vec![Content::text(format!("tracked {path}"))]))
    }

    #[tool(description = "Force-compute diagnostics for a file, ordered by start offset")]
    async fn get_diagnostics(
        &self,
        Parameters(PathParams { path }): Parameters<PathParams>,
    ) -> Result<CallToolResult, McpError> {
        let mut program = self.program.lock().await;
        let diagnostics = program
            .get_diagnostics(&PathBuf::from(&path))
            .map_err(|e| Self::io_error(&path, e))?;
        let json = serde_json::to_string(&diagnostics)
            .map_err(|e| McpError::internal_error("serialization failed", Some(serde_json::json!({ "error": e.to_string() }))))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(description = "The static type of the smallest expression containing an offset")]
    async fn get_type(
        &self,
        Parameters(PositionParams { path, offset }): Parameters<PositionParams>,
    ) -> Result<CallToolResult, McpError> {
        let mut program = self.program.lock().await;
        let ty = program.get_type(&PathBuf::from(&path), offset);
        Ok(CallToolResult::success(vec![Content::text(ty.unwrap_or_else(|| "None".to_string()))]))
    }

    #[tool(description = "Every declaration of the symbol referenced at an offset")]
    async fn get_declarations_for_name(
        &self,
        Parameters(PositionParams { path, offset }): Parameters<PositionParams>,
    ) -> Result<CallToolResult, McpError> {
        let mut program = self.program.lock().await;
        let decls = program.get_declarations_for_name(&PathBuf::from(&path), offset);
        let text = decls
            .iter()
            .map(|d| format!("{:?} @ {}..{}", d.kind, d.span.start, d.span.end))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }

    #[tool(description = "Follow import-alias chains from the declaration at an offset to their origin")]
    async fn resolve_alias(
        &self,
        Parameters(PositionParams { path, offset }): Parameters<PositionParams>,
    ) -> Result<CallToolResult, McpError> {
        let mut program = self.program.lock().await;
        let resolved = program.resolve_alias(&PathBuf::from(&path), offset);
        let text = match resolved {
            Some(d) => format!("{:?} @ {}..{}", d.kind, d.span.start, d.span.end),
            None => "None".to_string(),
        };
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }

    #[tool(description = "Names visible from an offset's scope chain matching a prefix")]
    async fn get_completion_suggestions(
        &self,
        Parameters(CompletionParams { path, offset, prefix }): Parameters<CompletionParams>,
    ) -> Result<CallToolResult, McpError> {
        let mut program = self.program.lock().await;
        let suggestions = program.get_completion_suggestions(&PathBuf::from(&path), offset, &prefix);
        Ok(CallToolResult::success(vec![Content::text(suggestions.join("\n"))]))
    }

    #[tool(description = "The signature of the function being called at an offset, if any")]
    async fn get_signature_info(
        &self,
        Parameters(PositionParams { path, offset }): Parameters<PositionParams>,
    ) -> Result<CallToolResult, McpError> {
        let mut program = self.program.lock().await;
        let info = program.get_signature_info(&PathBuf::from(&path), offset);
        let text = match info {
            Some(sig) => format!("{}\x00{}", sig.label, sig.active_parameter.map_or(-1, |i| i as i64)),
            None => "None".to_string(),
        };
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }

    #[tool(description = "Every reference to the symbol at an offset within its file")]
    async fn find_references(
        &self,
        Parameters(ReferencesParams { path, offset, include_declaration }): Parameters<ReferencesParams>,
    ) -> Result<CallToolResult, McpError> {
        let mut program = self.program.lock().await;
        let spans = program.find_references(&PathBuf::from(&path), offset, include_declaration);
        let json = serde_json::to_string(
            &spans.iter().map(|s| (s.start, s.end)).collect::<Vec<_>>(),
        )
        .unwrap_or_else(|_| "[]".to_string());
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }
}

impl Default for PyriteServer {
    fn default() -> Self {
        Self::new()
    }
}

#[tool_handler]
impl ServerHandler for PyriteServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "pyrite".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "pyrite is a Python static type checker core. Use update_file to track a \
                 file's contents, then query diagnostics, types, declarations, completions, \
                 signatures, and references against it."
                    .to_string(),
            ),
        }
    }
}

/// Runs the MCP server on stdio until the client disconnects (spec §6).
pub async fn run_mcp_server() -> Result<(), pyrite_core::PyriteError> {
    let server = PyriteServer::new();
    let service = server.serve(stdio()).await.map_err(|e| pyrite_core::PyriteError::InternalError {
        message: format!("MCP server failed to start: {e}"),
    })?;
    service.waiting().await.map_err(|e| pyrite_core::PyriteError::InternalError {
        message: format!("MCP server error: {e}"),
    })?;
    Ok(())
}
