use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use switchboard::{
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, McpTransport, Message, ModelCompletion,
    QueryRouter, Result, StubModel, SwitchboardError, ToolCall, ToolRegistry,
    DEFAULT_TOOL_TIMEOUT, PROTOCOL_VERSION,
};

/// An in-memory MCP server for end-to-end routing tests: advertises scripted
/// tool definitions and answers `tools/call` with canned results.
struct ScriptedServer {
    tools: Vec<Value>,
    responses: HashMap<String, Value>,
    calls: Arc<Mutex<Vec<Value>>>,
}

impl ScriptedServer {
    fn new(tools: Vec<Value>) -> Self {
        Self {
            tools,
            responses: HashMap::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn with_response(mut self, tool: &str, result: Value) -> Self {
        self.responses.insert(tool.to_string(), result);
        self
    }

    fn call_log(&self) -> Arc<Mutex<Vec<Value>>> {
        Arc::clone(&self.calls)
    }

    fn ok(result: Value, id: u64) -> JsonRpcResponse {
        JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }
}

#[async_trait]
impl McpTransport for ScriptedServer {
    async fn send(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        match request.method.as_str() {
            "initialize" => Ok(Self::ok(
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": "scripted", "version": "0.0.0"}
                }),
                request.id,
            )),
            "tools/list" => Ok(Self::ok(json!({"tools": self.tools}), request.id)),
            "tools/call" => {
                let params = request.params.clone().unwrap_or_default();
                self.calls.lock().unwrap().push(params.clone());
                let name = params["name"].as_str().unwrap_or_default();
                let result = self.responses.get(name).cloned().unwrap_or_else(|| {
                    json!({
                        "content": [{"type": "text", "text": "ok"}],
                        "isError": false
                    })
                });
                Ok(Self::ok(result, request.id))
            }
            other => Err(SwitchboardError::Rpc(format!("unexpected method {other}"))),
        }
    }

    async fn notify(&self, _notification: JsonRpcNotification) -> Result<()> {
        Ok(())
    }
}

/// Refuses every request, like a server that is not running.
struct DownServer;

#[async_trait]
impl McpTransport for DownServer {
    async fn send(&self, _request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        Err(SwitchboardError::Rpc("connection refused".to_string()))
    }

    async fn notify(&self, _notification: JsonRpcNotification) -> Result<()> {
        Err(SwitchboardError::Rpc("connection refused".to_string()))
    }
}

fn search_tool() -> Value {
    json!({
        "name": "search_duckduckgo",
        "description": "Search the web using DuckDuckGo and return top 3 results.",
        "inputSchema": {}
    })
}

/// Horoscope tool the way a real server declares it: plain string fields,
/// no enum constraint, so bad signs are the server's to reject.
fn horoscope_tool_declared() -> Value {
    json!({
        "name": "get_horoscope",
        "description": "Generate a daily or monthly horoscope for a given zodiac sign",
        "inputSchema": {
            "type": "object",
            "properties": {
                "zodiac_sign": {"type": "string"},
                "horoscope_type": {"type": "string"}
            },
            "required": ["zodiac_sign"]
        }
    })
}

async fn registry_of(servers: Vec<(String, ScriptedServer)>) -> Arc<ToolRegistry> {
    Arc::new(ToolRegistry::discover_with(servers, DEFAULT_TOOL_TIMEOUT).await)
}

#[tokio::test]
async fn search_query_routes_through_the_search_tool() {
    let server = ScriptedServer::new(vec![search_tool()]).with_response(
        "search_duckduckgo",
        json!({
            "content": [{"type": "text", "text": "1. Rust 1.80 released\n2. Release notes\n3. Blog"}],
            "isError": false
        }),
    );
    let calls = server.call_log();
    let registry = registry_of(vec![("search".to_string(), server)]).await;

    let stub = StubModel::new(vec![
        ModelCompletion::request_tools(vec![ToolCall::new(
            "search_duckduckgo",
            json!({"query": "latest Rust release"}),
        )]),
        ModelCompletion::reply("Found it in the search results."),
        ModelCompletion::reply("The latest stable Rust release is 1.80."),
    ]);
    let router = QueryRouter::new(stub.clone(), registry);

    let outcome = router
        .route("What is the latest Rust release?")
        .await
        .unwrap();

    assert_eq!(outcome.answer, "The latest stable Rust release is 1.80.");
    assert_eq!(outcome.tools_called, vec!["search_duckduckgo"]);
    assert!(!outcome.budget_exhausted);

    // The server saw exactly the arguments the model asked for.
    let sent = calls.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["arguments"]["query"], "latest Rust release");
    drop(sent);

    // Two tool-bound turns and a tool-free closing turn.
    assert_eq!(stub.bindings_seen(), vec![1, 1, 0]);

    // The closing turn saw the search results as a tool result.
    let saw_results = stub
        .last_transcript()
        .iter()
        .any(|m| matches!(m, Message::ToolResult { text, .. } if text.contains("Rust 1.80")));
    assert!(saw_results);
}

#[tokio::test]
async fn remote_tool_errors_are_folded_into_the_conversation() {
    let server = ScriptedServer::new(vec![horoscope_tool_declared()]).with_response(
        "get_horoscope",
        json!({
            "content": [{"type": "text", "text": "Invalid zodiac sign: Zzztarius"}],
            "isError": true
        }),
    );
    let registry = registry_of(vec![("astrology".to_string(), server)]).await;

    let stub = StubModel::new(vec![
        ModelCompletion::request_tools(vec![ToolCall::new(
            "get_horoscope",
            json!({"zodiac_sign": "Zzztarius"}),
        )]),
        ModelCompletion::reply("That sign does not exist."),
        ModelCompletion::reply("\"Zzztarius\" is not one of the twelve zodiac signs."),
    ]);
    let router = QueryRouter::new(stub.clone(), registry);

    let outcome = router
        .route("Horoscope for Zzztarius please")
        .await
        .unwrap();

    // The request still completed; the failure was material for the model.
    assert_eq!(
        outcome.answer,
        "\"Zzztarius\" is not one of the twelve zodiac signs."
    );
    assert_eq!(outcome.tools_called, vec!["get_horoscope"]);

    let folded = stub
        .last_transcript()
        .iter()
        .any(|m| matches!(m, Message::ToolResult { text, .. } if text.contains("Invalid zodiac sign")));
    assert!(folded);
}

#[tokio::test]
async fn plain_greeting_never_touches_a_tool() {
    let search = ScriptedServer::new(vec![search_tool()]);
    let astrology = ScriptedServer::new(vec![horoscope_tool_declared()]);
    let search_calls = search.call_log();
    let astrology_calls = astrology.call_log();
    let registry = registry_of(vec![
        ("astrology".to_string(), astrology),
        ("search".to_string(), search),
    ])
    .await;

    let stub = StubModel::new(vec![
        ModelCompletion::reply("Hello!"),
        ModelCompletion::reply("Hello! How can I help you today?"),
    ]);
    let router = QueryRouter::new(stub.clone(), registry);

    let outcome = router.route("Hello").await.unwrap();

    assert_eq!(outcome.answer, "Hello! How can I help you today?");
    assert!(outcome.tools_called.is_empty());
    assert!(search_calls.lock().unwrap().is_empty());
    assert!(astrology_calls.lock().unwrap().is_empty());

    // Both tools were offered on the first turn, none on the closing turn.
    assert_eq!(stub.bindings_seen(), vec![2, 0]);
}

#[tokio::test]
async fn unreachable_servers_leave_the_model_on_its_own() {
    let registry = Arc::new(
        ToolRegistry::discover_with(
            vec![
                ("astrology".to_string(), DownServer),
                ("search".to_string(), DownServer),
            ],
            DEFAULT_TOOL_TIMEOUT,
        )
        .await,
    );
    assert_eq!(registry.unreachable().len(), 2);
    assert!(registry.is_empty());

    let stub = StubModel::new(vec![
        ModelCompletion::reply("Rust is a systems programming language."),
        ModelCompletion::reply("Rust is a systems programming language focused on safety."),
    ]);
    let router = QueryRouter::new(stub.clone(), registry);

    let outcome = router.route("What is Rust?").await.unwrap();

    assert!(!outcome.answer.is_empty());
    assert!(outcome.tools_called.is_empty());
    // No tools could be offered on any turn.
    assert_eq!(stub.bindings_seen(), vec![0, 0]);
}

#[tokio::test]
async fn turn_budget_still_produces_an_answer() {
    let server = ScriptedServer::new(vec![search_tool()]);
    let calls = server.call_log();
    let registry = registry_of(vec![("search".to_string(), server)]).await;

    let stub = StubModel::new(vec![
        ModelCompletion::request_tools(vec![ToolCall::new(
            "search_duckduckgo",
            json!({"query": "first"}),
        )]),
        ModelCompletion::request_tools(vec![ToolCall::new(
            "search_duckduckgo",
            json!({"query": "second"}),
        )]),
        ModelCompletion::reply("Here is the best answer from two searches."),
    ]);
    let router = QueryRouter::new(stub.clone(), registry).with_max_model_turns(2);

    let outcome = router.route("keep digging").await.unwrap();

    assert!(outcome.budget_exhausted);
    assert_eq!(outcome.answer, "Here is the best answer from two searches.");
    assert_eq!(
        outcome.tools_called,
        vec!["search_duckduckgo", "search_duckduckgo"]
    );
    assert_eq!(calls.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn one_turn_can_fan_out_to_several_tools() {
    let search = ScriptedServer::new(vec![search_tool()]).with_response(
        "search_duckduckgo",
        json!({
            "content": [{"type": "text", "text": "1. Leo traits explained"}],
            "isError": false
        }),
    );
    let astrology = ScriptedServer::new(vec![horoscope_tool_declared()]).with_response(
        "get_horoscope",
        json!({
            "content": [{"type": "text", "text": "Leo: a bold day ahead"}],
            "isError": false
        }),
    );
    let search_calls = search.call_log();
    let astrology_calls = astrology.call_log();
    let registry = registry_of(vec![
        ("astrology".to_string(), astrology),
        ("search".to_string(), search),
    ])
    .await;

    let stub = StubModel::new(vec![
        ModelCompletion::request_tools(vec![
            ToolCall::new("search_duckduckgo", json!({"query": "Leo traits"})),
            ToolCall::new("get_horoscope", json!({"zodiac_sign": "Leo"})),
        ]),
        ModelCompletion::reply("Combined both results."),
        ModelCompletion::reply("Leos are bold, and today looks bright."),
    ]);
    let router = QueryRouter::new(stub.clone(), registry);

    let outcome = router
        .route("Search Leo traits and give me the Leo horoscope")
        .await
        .unwrap();

    assert_eq!(
        outcome.tools_called,
        vec!["search_duckduckgo", "get_horoscope"]
    );
    assert_eq!(search_calls.lock().unwrap().len(), 1);
    assert_eq!(astrology_calls.lock().unwrap().len(), 1);

    // Both results entered the transcript before the next model turn.
    let results = stub
        .last_transcript()
        .iter()
        .filter(|m| matches!(m, Message::ToolResult { .. }))
        .count();
    assert_eq!(results, 2);
}
