//! JSON-RPC 2.0 server over a Unix socket.
//!
//! One request per line, one response per line. Each connection runs in
//! its own task; requests on one connection are answered in order. After a
//! successful `subscribe_events` the connection also carries `event`
//! notifications, interleaved with responses.

use std::path::PathBuf;
use std::sync::Arc;

use bulut_alias::AliasError;
use bulut_execution::ExecutionError;
use bulut_intent::parser::ParserError;
use bulut_intent::ValidationError;
use bulut_scheduler::SubscriptionError;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::commands;
use crate::events::{Event, EventFilter};
use crate::DaemonState;

/// Outbound lines buffered per connection.
const OUTBOUND_BUFFER: usize = 256;

/// JSON-RPC request.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    /// Request ID.
    pub id: serde_json::Value,
    /// Method name.
    pub method: String,
    /// Parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}

/// JSON-RPC response.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    /// JSON-RPC version.
    pub jsonrpc: String,
    /// Request ID.
    pub id: serde_json::Value,
    /// Result or error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// JSON-RPC error object.
///
/// Codes -32010 to -32049 are caller errors (bad input, unknown records,
/// forbidden changes). Codes from -32050 are server-side failures.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RpcError {
    pub code: i32,
    /// Error name.
    pub message: String,
    /// Optional structured data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcResponse {
    /// Create a success response.
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: serde_json::Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

impl RpcError {
    fn with_detail(code: i32, message: &str, detail: impl ToString) -> Self {
        Self {
            code,
            message: message.to_string(),
            data: Some(serde_json::json!({"detail": detail.to_string()})),
        }
    }

    // Standard JSON-RPC errors

    /// Parse error (-32700).
    pub fn parse_error() -> Self {
        Self {
            code: -32700,
            message: "PARSE_ERROR".to_string(),
            data: None,
        }
    }

    /// Invalid request (-32600).
    pub fn invalid_request() -> Self {
        Self {
            code: -32600,
            message: "INVALID_REQUEST".to_string(),
            data: None,
        }
    }

    /// Method not found (-32601).
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: "METHOD_NOT_FOUND".to_string(),
            data: Some(serde_json::json!({"method": method})),
        }
    }

    /// Invalid params (-32602).
    pub fn invalid_params(detail: &str) -> Self {
        Self::with_detail(-32602, "INVALID_PARAMS", detail)
    }

    /// Internal error (-32603).
    pub fn internal_error(detail: &str) -> Self {
        Self::with_detail(-32603, "INTERNAL_ERROR", detail)
    }

    /// Execution not found (-32031).
    pub fn execution_not_found(id: &str) -> Self {
        Self::with_detail(-32031, "EXECUTION_NOT_FOUND", id)
    }
}

impl From<AliasError> for RpcError {
    fn from(e: AliasError) -> Self {
        match &e {
            AliasError::NotFound(_) => Self::with_detail(-32010, "ALIAS_NOT_FOUND", &e),
            AliasError::AliasTaken { .. } => Self::with_detail(-32011, "ALIAS_TAKEN", &e),
            AliasError::AddressTaken { .. } => Self::with_detail(-32012, "ADDRESS_TAKEN", &e),
            AliasError::InvalidSignature => Self::with_detail(-32013, "INVALID_SIGNATURE", &e),
            AliasError::InvalidHandle(_) | AliasError::InvalidAddress(_) => {
                Self::invalid_params(&e.to_string())
            }
            AliasError::Store(_) => Self::internal_error(&e.to_string()),
        }
    }
}

impl From<ValidationError> for RpcError {
    fn from(e: ValidationError) -> Self {
        match &e {
            ValidationError::UnknownRecipient(_) => {
                Self::with_detail(-32021, "UNKNOWN_RECIPIENT", &e)
            }
            ValidationError::ResolverUnavailable(_) => {
                Self::with_detail(-32051, "RESOLVER_UNAVAILABLE", &e)
            }
            _ => Self::with_detail(-32020, "VALIDATION_FAILED", &e),
        }
    }
}

impl From<ParserError> for RpcError {
    fn from(e: ParserError) -> Self {
        match e {
            ParserError::Incomplete { code, message } => Self {
                code: -32025,
                message: "PARSE_INCOMPLETE".to_string(),
                data: Some(serde_json::json!({"code": code, "detail": message})),
            },
            ParserError::Backend(detail) => Self::with_detail(-32050, "PARSER_UNAVAILABLE", detail),
        }
    }
}

impl From<ExecutionError> for RpcError {
    fn from(e: ExecutionError) -> Self {
        match &e {
            ExecutionError::ConsistencyViolation { .. } => {
                Self::with_detail(-32030, "CONSISTENCY_VIOLATION", &e)
            }
            ExecutionError::NotFound(id) => Self::execution_not_found(id),
            ExecutionError::NotExecutable(_) | ExecutionError::Split(_) => {
                Self::with_detail(-32032, "NOT_EXECUTABLE", &e)
            }
            ExecutionError::InvalidTransition { .. } | ExecutionError::Store(_) => {
                Self::internal_error(&e.to_string())
            }
        }
    }
}

impl From<SubscriptionError> for RpcError {
    fn from(e: SubscriptionError) -> Self {
        match &e {
            SubscriptionError::NotFound(_) => {
                Self::with_detail(-32040, "SUBSCRIPTION_NOT_FOUND", &e)
            }
            SubscriptionError::NotSubscriber(_) => Self::with_detail(-32041, "NOT_SUBSCRIBER", &e),
            SubscriptionError::InvalidTransition { .. } => {
                Self::with_detail(-32042, "INVALID_TRANSITION", &e)
            }
            SubscriptionError::InvalidIntent(_) => Self::with_detail(-32020, "VALIDATION_FAILED", &e),
            SubscriptionError::Store(_) => Self::internal_error(&e.to_string()),
        }
    }
}

/// The RPC server.
pub struct RpcServer {
    state: Arc<DaemonState>,
    socket_path: PathBuf,
}

impl RpcServer {
    /// Create a new RPC server.
    pub fn new(state: Arc<DaemonState>, socket_path: PathBuf) -> Self {
        Self { state, socket_path }
    }

    /// Run the server, accepting connections.
    pub async fn run(&self) -> anyhow::Result<()> {
        // Remove stale socket file
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        info!("IPC server listening on {:?}", self.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let state = self.state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(state, stream).await {
                            warn!("Connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }
}

/// Handle a single client connection.
///
/// Responses and event notifications share one writer task so lines never
/// interleave mid-write.
async fn handle_connection(
    state: Arc<DaemonState>,
    stream: tokio::net::UnixStream,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);

    let writer_task = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            writer.write_all(text.as_bytes()).await?;
            writer.flush().await?;
        }
        Ok::<_, std::io::Error>(())
    });

    let mut forwarder: Option<JoinHandle<()>> = None;
    let mut line = String::new();
    let result = loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break Ok(()), // EOF
            Ok(_) => {}
            Err(e) => break Err(e.into()),
        }
        if line.trim().is_empty() {
            continue;
        }

        let response = handle_line(&state, &line).await;
        // Subscribe before the acknowledgement is queued so nothing emitted
        // after it is missed.
        let subscription = match (&response.error, requested_filter(&line)) {
            (None, Some(filter)) => Some((state.event_bus.subscribe(), filter)),
            _ => None,
        };

        let mut response_json = match serde_json::to_string(&response) {
            Ok(text) => text,
            Err(e) => break Err(e.into()),
        };
        response_json.push('\n');
        if out_tx.send(response_json).await.is_err() {
            break Ok(());
        }

        if let Some((events, filter)) = subscription {
            if let Some(previous) = forwarder.take() {
                previous.abort();
            }
            debug!(categories = ?filter.categories(), "Client subscribed to events");
            forwarder = Some(tokio::spawn(forward_events(events, filter, out_tx.clone())));
        }
    };

    if let Some(task) = forwarder {
        task.abort();
    }
    drop(out_tx);
    match writer_task.await {
        Ok(Err(e)) if result.is_ok() => Err(e.into()),
        _ => result,
    }
}

/// Filter carried by a `subscribe_events` request line, if it is one.
fn requested_filter(line: &str) -> Option<EventFilter> {
    let request = serde_json::from_str::<RpcRequest>(line).ok()?;
    if request.method != "subscribe_events" {
        return None;
    }
    EventFilter::from_params(&request.params).ok()
}

/// Push matching bus events to one connection as `event` notifications.
async fn forward_events(
    mut events: broadcast::Receiver<Event>,
    filter: EventFilter,
    out: mpsc::Sender<String>,
) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event subscriber lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        if !filter.matches(&event) {
            continue;
        }
        let params = match serde_json::to_value(&event) {
            Ok(params) => params,
            Err(e) => {
                warn!(error = %e, "Unencodable event dropped");
                continue;
            }
        };
        let notification = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "event",
            "params": params,
        });
        let mut text = notification.to_string();
        text.push('\n');
        if out.send(text).await.is_err() {
            break;
        }
    }
}

/// Decode one request line and answer it.
pub async fn handle_line(state: &Arc<DaemonState>, line: &str) -> RpcResponse {
    match serde_json::from_str::<RpcRequest>(line) {
        Ok(request) if request.jsonrpc != "2.0" => {
            RpcResponse::error(request.id, RpcError::invalid_request())
        }
        Ok(request) => dispatch_request(state, request).await,
        Err(_) => RpcResponse::error(serde_json::Value::Null, RpcError::parse_error()),
    }
}

/// Dispatch a JSON-RPC request to the appropriate command handler.
async fn dispatch_request(state: &Arc<DaemonState>, request: RpcRequest) -> RpcResponse {
    let id = request.id.clone();
    let method = request.method.as_str();
    let params = &request.params;

    debug!("Dispatching RPC method: {}", method);

    let result = match method {
        // Alias directory
        "register_alias" => commands::alias::register_alias(state, params).await,
        "resolve_alias" => commands::alias::resolve_alias(state, params).await,
        "reverse_resolve" => commands::alias::reverse_resolve(state, params).await,
        "release_alias" => commands::alias::release_alias(state, params).await,

        // Intents and payments
        "parse_command" => commands::payments::parse_command(state, params).await,
        "execute_payment" => commands::payments::execute_payment(state, params).await,
        "get_execution" => commands::payments::get_execution(state, params).await,
        "get_history" => commands::payments::get_history(state, params).await,
        "get_audit_trail" => commands::payments::get_audit_trail(state, params).await,

        // Subscriptions
        "list_subscriptions" => commands::subscriptions::list_subscriptions(state, params).await,
        "pause_subscription" => commands::subscriptions::pause_subscription(state, params).await,
        "resume_subscription" => {
            commands::subscriptions::resume_subscription(state, params).await
        }
        "cancel_subscription" => {
            commands::subscriptions::cancel_subscription(state, params).await
        }

        // Diagnostics
        "health" => commands::diagnostics::health(state).await,
        "subscribe_events" => commands::diagnostics::subscribe_events(state, params).await,

        _ => Err(RpcError::method_not_found(method)),
    };

    match result {
        Ok(value) => RpcResponse::success(id, value),
        Err(err) => {
            debug!(method, code = err.code, message = %err.message, "RPC error");
            RpcResponse::error(id, err)
        }
    }
}
