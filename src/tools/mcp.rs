//! 远程工具：MCP（JSON-RPC 2.0 over streamable HTTP）
//!
//! 每个服务器一个 McpServerConnection：initialize → notifications/initialized → tools/list；
//! 服务器返回的 Mcp-Session-Id 在后续请求中回传。响应可能是普通 JSON，也可能是 SSE（`data:` 帧）。
//! 发现到的每个工具包装为 RemoteTool，调用时发 tools/call，isError 结果按工具错误返回。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ToolServerConfig;
use crate::tools::Tool;

pub const PROTOCOL_VERSION: &str = "2025-06-18";
const SESSION_HEADER: &str = "Mcp-Session-Id";
const PROTOCOL_HEADER: &str = "MCP-Protocol-Version";

#[derive(Debug, Error)]
pub enum McpError {
    #[error("MCP server '{server}' transport error: {message}")]
    Transport { server: String, message: String },
    #[error("MCP server '{server}' returned HTTP {status}: {body}")]
    Http {
        server: String,
        status: u16,
        body: String,
    },
    #[error("MCP server '{server}' returned invalid JSON: {message}")]
    InvalidJson { server: String, message: String },
    #[error("MCP server '{server}' returned JSON-RPC error {code}: {message}")]
    Rpc {
        server: String,
        code: i64,
        message: String,
    },
    #[error("{message}")]
    ToolFailed { tool: String, message: String },
}

/// tools/list 中的一项
#[derive(Debug, Clone, PartialEq)]
pub struct ServerToolInfo {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Option<Value>,
}

/// reqwest 错误连同 source 链展开成一行；超时显式带上 "timeout"
fn describe_reqwest_error(err: &reqwest::Error) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = std::error::Error::source(err);
    while let Some(s) = source {
        parts.push(s.to_string());
        source = s.source();
    }
    let joined = parts.join(": ");
    if err.is_timeout() {
        format!("timeout: {joined}")
    } else {
        joined
    }
}

/// 解析 SSE 响应体中的全部 `data:` JSON 帧（同一事件的多行 data 先拼接）
pub fn parse_sse_messages(body: &str) -> Vec<Value> {
    fn flush(data: &mut String, messages: &mut Vec<Value>) {
        if !data.is_empty() {
            if let Ok(v) = serde_json::from_str::<Value>(data) {
                messages.push(v);
            }
            data.clear();
        }
    }

    let mut messages = Vec::new();
    let mut data = String::new();
    for line in body.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            flush(&mut data, &mut messages);
        } else if let Some(rest) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.trim_start());
        }
    }
    flush(&mut data, &mut messages);
    messages
}

/// tools/call 结果转文本：拼接所有 text 内容，其余内容原样序列化
pub fn tool_result_text(result: &Value) -> String {
    let Some(content) = result.get("content").and_then(Value::as_array) else {
        return result.to_string();
    };
    content
        .iter()
        .map(|item| match item.get("type").and_then(Value::as_str) {
            Some("text") => item
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            _ => item.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn parse_tool_list(result: &Value) -> Vec<ServerToolInfo> {
    result
        .get("tools")
        .and_then(Value::as_array)
        .map(|tools| {
            tools
                .iter()
                .filter_map(|tool| {
                    let name = tool.get("name").and_then(Value::as_str)?;
                    Some(ServerToolInfo {
                        name: name.to_string(),
                        description: tool
                            .get("description")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                        input_schema: tool.get("inputSchema").cloned(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// 单个工具服务器的会话
pub struct McpServerConnection {
    config: ToolServerConfig,
    http: Client,
    session_id: Mutex<Option<String>>,
    id_counter: AtomicU64,
}

impl McpServerConnection {
    /// 建立会话：initialize + notifications/initialized
    pub async fn connect(config: ToolServerConfig, http: Client) -> Result<Arc<Self>, McpError> {
        let conn = Arc::new(Self {
            config,
            http,
            session_id: Mutex::new(None),
            id_counter: AtomicU64::new(1),
        });
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
            "capabilities": {}
        });
        let init = conn.send_request("initialize", params).await?;
        debug!(
            server = %conn.config.name,
            protocol = init.get("protocolVersion").and_then(serde_json::Value::as_str).unwrap_or("?"),
            "MCP initialized"
        );
        conn.send_notification("notifications/initialized", json!({}))
            .await?;
        Ok(conn)
    }

    pub fn server_name(&self) -> &str {
        &self.config.name
    }

    pub async fn list_tools(&self) -> Result<Vec<ServerToolInfo>, McpError> {
        let result = self.send_request("tools/list", json!({})).await?;
        Ok(parse_tool_list(&result))
    }

    pub async fn call_tool(&self, tool: &str, arguments: Value) -> Result<String, McpError> {
        let params = json!({
            "name": tool,
            "arguments": match arguments {
                Value::Null => Value::Object(Default::default()),
                other => other,
            }
        });
        let result = self.send_request("tools/call", params).await?;
        let text = tool_result_text(&result);
        if result.get("isError").and_then(Value::as_bool).unwrap_or(false) {
            return Err(McpError::ToolFailed {
                tool: tool.to_string(),
                message: text,
            });
        }
        Ok(text)
    }

    /// 结束会话（DELETE）；服务器不支持时忽略
    pub async fn close(&self) -> Result<(), McpError> {
        let Some(session) = self.session_id.lock().await.take() else {
            return Ok(());
        };
        self.http
            .delete(&self.config.url)
            .header(SESSION_HEADER, session)
            .send()
            .await
            .map_err(|e| self.transport_error(describe_reqwest_error(&e)))?;
        Ok(())
    }

    fn next_id(&self) -> u64 {
        self.id_counter.fetch_add(1, Ordering::SeqCst)
    }

    fn transport_error(&self, message: impl Into<String>) -> McpError {
        McpError::Transport {
            server: self.config.name.clone(),
            message: message.into(),
        }
    }

    async fn send_request(&self, method: &str, params: Value) -> Result<Value, McpError> {
        let id = self.next_id();
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params
        });
        let messages = self.post(&payload).await?;
        let response = messages
            .into_iter()
            .find(|m| m.get("id").and_then(Value::as_u64) == Some(id))
            .ok_or_else(|| self.transport_error(format!("no response to '{method}'")))?;

        if let Some(err) = response.get("error") {
            return Err(McpError::Rpc {
                server: self.config.name.clone(),
                code: err.get("code").and_then(Value::as_i64).unwrap_or(-32000),
                message: err
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            });
        }
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn send_notification(&self, method: &str, params: Value) -> Result<(), McpError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params
        });
        self.post(&payload).await.map(|_| ())
    }

    /// 发送一条 JSON-RPC 消息，返回响应中的全部 JSON 消息
    async fn post(&self, payload: &Value) -> Result<Vec<Value>, McpError> {
        let mut request = self
            .http
            .post(&self.config.url)
            .header(ACCEPT, "application/json, text/event-stream")
            .json(payload);
        for (key, value) in &self.config.headers {
            request = request.header(key.as_str(), value.as_str());
        }
        if let Some(session) = self.session_id.lock().await.as_ref() {
            request = request
                .header(SESSION_HEADER, session.as_str())
                .header(PROTOCOL_HEADER, PROTOCOL_VERSION);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| self.transport_error(describe_reqwest_error(&e)))?;

        if let Some(session) = resp
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            *self.session_id.lock().await = Some(session.to_string());
        }

        let status = resp.status();
        let is_sse = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("text/event-stream"))
            .unwrap_or(false);
        let body = resp
            .text()
            .await
            .map_err(|e| self.transport_error(describe_reqwest_error(&e)))?;

        if !status.is_success() {
            return Err(McpError::Http {
                server: self.config.name.clone(),
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        if is_sse {
            return Ok(parse_sse_messages(&body));
        }
        match serde_json::from_str::<Value>(&body) {
            Ok(Value::Array(batch)) => Ok(batch),
            Ok(single) => Ok(vec![single]),
            Err(e) => Err(McpError::InvalidJson {
                server: self.config.name.clone(),
                message: e.to_string(),
            }),
        }
    }
}

/// 远程工具：调用转发到所属服务器
pub struct RemoteTool {
    connection: Arc<McpServerConnection>,
    info: ServerToolInfo,
}

impl RemoteTool {
    pub fn new(connection: Arc<McpServerConnection>, info: ServerToolInfo) -> Self {
        Self { connection, info }
    }

    pub fn server_name(&self) -> &str {
        self.connection.server_name()
    }
}

#[async_trait]
impl Tool for RemoteTool {
    fn name(&self) -> &str {
        &self.info.name
    }

    fn description(&self) -> &str {
        self.info.description.as_deref().unwrap_or("")
    }

    fn parameters_schema(&self) -> Value {
        self.info
            .input_schema
            .clone()
            .unwrap_or_else(|| json!({"type": "object", "properties": {}}))
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        self.connection
            .call_tool(&self.info.name, args)
            .await
            .map_err(|e| e.to_string())
    }
}

/// 远程工具发现接口：按服务器配置返回工具列表；任一服务器失败即整体失败
#[async_trait]
pub trait ToolDiscovery: Send + Sync {
    async fn discover(&mut self, servers: &[ToolServerConfig]) -> Result<Vec<Arc<dyn Tool>>, String>;

    /// 释放连接；未发现过时为空操作
    async fn close(&mut self) -> Result<(), String>;
}

/// 多服务器 MCP 客户端
pub struct McpClient {
    http: Client,
    connections: Vec<Arc<McpServerConnection>>,
}

impl McpClient {
    pub fn new(timeout_secs: u64) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            http,
            connections: Vec::new(),
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

#[async_trait]
impl ToolDiscovery for McpClient {
    async fn discover(&mut self, servers: &[ToolServerConfig]) -> Result<Vec<Arc<dyn Tool>>, String> {
        let mut tools: Vec<Arc<dyn Tool>> = Vec::new();
        for server in servers {
            let conn = McpServerConnection::connect(server.clone(), self.http.clone())
                .await
                .map_err(|e| e.to_string())?;
            self.connections.push(conn.clone());
            let listed = conn.list_tools().await.map_err(|e| e.to_string())?;
            info!(server = %server.name, tools = listed.len(), "MCP tools discovered");
            for info in listed {
                tools.push(Arc::new(RemoteTool::new(conn.clone(), info)));
            }
        }
        Ok(tools)
    }

    async fn close(&mut self) -> Result<(), String> {
        let mut first_error = None;
        for conn in self.connections.drain(..) {
            if let Err(e) = conn.close().await {
                warn!(server = %conn.server_name(), error = %e, "MCP session close failed");
                first_error.get_or_insert(e.to_string());
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sse_messages() {
        let body = "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n\n: ping\n\ndata: {\"a\":\ndata: 1}\n\n";
        let msgs = parse_sse_messages(body);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0]["id"], 1);
        assert_eq!(msgs[1]["a"], 1);
    }

    #[test]
    fn test_parse_sse_without_trailing_blank_line() {
        let msgs = parse_sse_messages("data: {\"id\": 7}");
        assert_eq!(msgs, vec![json!({"id": 7})]);
    }

    #[test]
    fn test_tool_result_text() {
        let result = json!({
            "content": [
                {"type": "text", "text": "first"},
                {"type": "image", "data": "..."},
                {"type": "text", "text": "second"}
            ]
        });
        let text = tool_result_text(&result);
        assert!(text.starts_with("first\n"));
        assert!(text.ends_with("\nsecond"));
        assert!(text.contains("image"));
    }

    #[test]
    fn test_parse_tool_list() {
        let result = json!({
            "tools": [
                {"name": "brave_web_search", "description": "Search", "inputSchema": {"type": "object"}},
                {"description": "nameless"},
                {"name": "browser_navigate"}
            ]
        });
        let tools = parse_tool_list(&result);
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "brave_web_search");
        assert_eq!(tools[1].description, None);
    }

    #[test]
    fn test_tool_failed_displays_message_only() {
        let err = McpError::ToolFailed {
            tool: "brave_web_search".into(),
            message: "No web results found".into(),
        };
        assert_eq!(err.to_string(), "No web results found");
    }

    #[tokio::test]
    async fn test_close_without_discovery_is_noop() {
        let mut client = McpClient::new(1);
        assert!(client.close().await.is_ok());
        assert_eq!(client.connection_count(), 0);
    }

    /// 最小 streamable HTTP 工具服务器：每个连接处理一个请求，记录收到的会话头
    async fn serve_once(mut socket: tokio::net::TcpStream, sessions: Arc<std::sync::Mutex<Vec<String>>>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let (head, body) = loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..pos]).to_string();
            let len = head
                .lines()
                .filter_map(|l| l.split_once(':'))
                .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
                .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            while buf.len() < pos + 4 + len {
                let n = socket.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
            }
            break (head, buf[pos + 4..pos + 4 + len].to_vec());
        };

        if let Some((_, v)) = head
            .lines()
            .filter_map(|l| l.split_once(':'))
            .find(|(k, _)| k.eq_ignore_ascii_case(SESSION_HEADER))
        {
            sessions.lock().unwrap().push(v.trim().to_string());
        }

        let (status, content_type, extra, payload) = if head.starts_with("DELETE") {
            ("200 OK", "application/json", String::new(), String::new())
        } else {
            let msg: Value = serde_json::from_slice(&body).unwrap();
            let id = msg.get("id").cloned().unwrap_or(Value::Null);
            match msg["method"].as_str().unwrap_or_default() {
                "initialize" => (
                    "200 OK",
                    "application/json",
                    format!("{SESSION_HEADER}: s-1\r\n"),
                    json!({"jsonrpc": "2.0", "id": id, "result": {
                        "protocolVersion": PROTOCOL_VERSION,
                        "capabilities": {"tools": {}},
                        "serverInfo": {"name": "search", "version": "1.0"}
                    }})
                    .to_string(),
                ),
                "tools/list" => (
                    "200 OK",
                    "text/event-stream",
                    String::new(),
                    format!(
                        "event: message\ndata: {}\n\n",
                        json!({"jsonrpc": "2.0", "id": id, "result": {"tools": [{
                            "name": "brave_web_search",
                            "description": "Web search",
                            "inputSchema": {"type": "object", "properties": {"query": {"type": "string"}}}
                        }]}})
                    ),
                ),
                "tools/call" => (
                    "200 OK",
                    "application/json",
                    String::new(),
                    json!({"jsonrpc": "2.0", "id": id, "result": {
                        "content": [{"type": "text", "text": "3 results"}],
                        "isError": false
                    }})
                    .to_string(),
                ),
                _ => ("202 Accepted", "application/json", String::new(), String::new()),
            }
        };
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\n{extra}Connection: close\r\n\r\n{payload}",
            payload.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
    }

    #[tokio::test]
    async fn test_discover_call_and_close_against_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let sessions = Arc::new(std::sync::Mutex::new(Vec::new()));
        let recorded = sessions.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(serve_once(socket, recorded.clone()));
            }
        });

        let mut client = McpClient::new(5);
        let servers = vec![ToolServerConfig {
            name: "search".into(),
            url: format!("http://{addr}/mcp"),
            headers: Default::default(),
        }];
        let tools = client.discover(&servers).await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name(), "brave_web_search");
        assert_eq!(tools[0].parameters_schema()["properties"]["query"]["type"], "string");
        assert_eq!(client.connection_count(), 1);

        let out = tools[0].execute(json!({"query": "precio luz"})).await.unwrap();
        assert_eq!(out, "3 results");

        client.close().await.unwrap();
        assert_eq!(client.connection_count(), 0);

        // initialize 之后的每个请求（通知、列表、调用、DELETE）都带回会话 id
        let sessions = sessions.lock().unwrap();
        assert_eq!(sessions.len(), 4);
        assert!(sessions.iter().all(|s| s == "s-1"));
    }

    #[tokio::test]
    async fn test_discover_unreachable_server_fails() {
        let mut client = McpClient::new(2);
        let servers = vec![ToolServerConfig {
            name: "down".into(),
            url: "http://127.0.0.1:1/mcp".into(),
            headers: Default::default(),
        }];
        let err = client.discover(&servers).await.err().unwrap();
        assert!(err.contains("down"));
    }
}
