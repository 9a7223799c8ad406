//! Newline-delimited JSON-RPC 2.0 server over stdio
//!
//! One request per line in, one response per line out. Notifications (no `id`)
//! get no response. Logging goes to stderr; stdout carries only protocol.

use std::io::{BufRead, Write};

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{tool_definitions, ToolError, ToolGateway, CATALOG_VERSION};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "agentboard";

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Option<Value>,
}

fn json_rpc_response(id: Option<Value>, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id.unwrap_or(Value::Null), "result": result})
}

fn json_rpc_error(id: Option<Value>, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id.unwrap_or(Value::Null),
        "error": {"code": code, "message": message},
    })
}

fn text_content(text: String) -> Value {
    json!({"type": "text", "text": text})
}

/// Protocol state around a [`ToolGateway`]
pub struct StdioServer {
    gateway: ToolGateway,
    initialized: bool,
}

impl StdioServer {
    pub fn new(gateway: ToolGateway) -> Self {
        Self {
            gateway,
            initialized: false,
        }
    }

    /// Whether the client has completed the initialize handshake
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Serve until EOF on `reader`
    pub fn run<R: BufRead, W: Write>(&mut self, reader: R, mut writer: W) -> std::io::Result<()> {
        info!("tool server listening on stdio");
        for line in reader.lines() {
            let line = line?;
            let raw = line.trim();
            if raw.is_empty() {
                continue;
            }
            if let Some(response) = self.handle_line(raw) {
                writeln!(writer, "{}", response)?;
                writer.flush()?;
            }
        }
        info!("stdin closed, tool server exiting");
        Ok(())
    }

    /// Handle one raw line, returning the response to write (if any)
    pub fn handle_line(&mut self, raw: &str) -> Option<Value> {
        let data: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => return Some(json_rpc_error(None, PARSE_ERROR, &format!("Parse error: {e}"))),
        };

        let id = data.get("id").cloned();
        let request: JsonRpcRequest = match serde_json::from_value(data) {
            Ok(v) => v,
            Err(e) => {
                return Some(json_rpc_error(id, INVALID_REQUEST, &format!("Invalid Request: {e}")));
            }
        };

        let is_notification = request.id.is_none();
        let response = self.handle(request);
        if is_notification {
            None
        } else {
            response
        }
    }

    fn handle(&mut self, request: JsonRpcRequest) -> Option<Value> {
        debug!(method = %request.method, "rpc request");
        match request.method.as_str() {
            "initialize" => Some(json_rpc_response(
                request.id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "serverInfo": {"name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION")},
                    "capabilities": {"tools": {}},
                    "instructions": format!("agentboard tool catalog v{}", CATALOG_VERSION),
                }),
            )),
            "notifications/initialized" => {
                self.initialized = true;
                None
            }
            "ping" => Some(json_rpc_response(request.id, json!({}))),
            "tools/list" => Some(json_rpc_response(
                request.id,
                json!({"tools": tool_definitions()}),
            )),
            "tools/call" => Some(self.call_tool(request.id, request.params)),
            other => Some(json_rpc_error(
                request.id,
                METHOD_NOT_FOUND,
                &format!("Method not found: {other}"),
            )),
        }
    }

    fn call_tool(&self, id: Option<Value>, params: Option<Value>) -> Value {
        let Some(Value::Object(params)) = params else {
            return json_rpc_error(id, INVALID_PARAMS, "params must be an object");
        };
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return json_rpc_error(id, INVALID_PARAMS, "params.name must be a string");
        };
        let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

        match self.gateway.call(name, arguments) {
            Ok(result) => {
                let text = serde_json::to_string_pretty(&result).unwrap_or_else(|_| result.to_string());
                json_rpc_response(id, json!({"content": [text_content(text)], "isError": false}))
            }
            Err(ToolError::UnknownTool(name)) => {
                json_rpc_error(id, INVALID_PARAMS, &format!("Unknown tool: {name}"))
            }
            Err(e) => {
                warn!(tool = name, error = %e, "tool call failed");
                json_rpc_response(id, json!({"content": [text_content(e.to_string())], "isError": true}))
            }
        }
    }
}
