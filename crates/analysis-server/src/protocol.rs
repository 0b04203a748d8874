//
// protocol.rs
//
// Line-delimited JSON front end for the binary
//
// Requests:  {"id": 1, "method": "setContents", "params": {...}}
// Responses: {"id": 1, "result": ...} or {"id": 1, "error": {"code": ..., "message": ...}}
// Events:    {"event": "computedErrors", "params": {...}}
//

use std::sync::Arc;

use anyhow::Context as _;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use crate::config::ServerConfig;
use crate::engine::{
    AnalysisDelta, AnalysisError, AnalysisOptions, ChangeSet, HighlightRegion, NavigationRegion,
    Outline, PackageMap, TextEngine,
};
use crate::error::ServerError;
use crate::notification::{AnalysisServerListener, NotificationKind, SourceSet};
use crate::server::AnalysisServer;
use crate::source::Source;

/// A decoded request. The `id` member of the line is read separately.
#[derive(Debug, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub enum Command {
    #[serde(rename_all = "camelCase")]
    CreateContext {
        name: String,
        sdk_path: String,
        #[serde(default)]
        package_map: PackageMap,
    },
    #[serde(rename_all = "camelCase")]
    DeleteContext { context_id: String },
    #[serde(rename_all = "camelCase")]
    SetContents {
        context_id: String,
        source: Source,
        contents: String,
    },
    #[serde(rename_all = "camelCase")]
    ApplyChanges {
        context_id: String,
        changes: ChangeSet,
    },
    #[serde(rename_all = "camelCase")]
    ApplyAnalysisDelta {
        context_id: String,
        delta: AnalysisDelta,
    },
    #[serde(rename_all = "camelCase")]
    SetOptions {
        context_id: String,
        options: AnalysisOptions,
    },
    #[serde(rename_all = "camelCase")]
    SetPrioritySources {
        context_id: String,
        sources: Vec<Source>,
    },
    #[serde(rename_all = "camelCase")]
    Subscribe {
        context_id: String,
        subscriptions: IndexMap<NotificationKind, SourceSet>,
    },
    GetVersion,
    Shutdown,
}

/// What the read loop does after answering a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Error member of a failed response.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

fn error_reply(id: Value, code: impl ToString, message: impl Into<String>) -> Value {
    let error = ErrorBody {
        code: code.to_string(),
        message: message.into(),
    };
    json!({ "id": id, "error": error })
}

/// Answers one request line against `server`.
pub fn handle_line(server: &AnalysisServer, line: &str) -> (Value, Flow) {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(err) => {
            log::warn!("Unparseable request: {}", err);
            return (error_reply(Value::Null, "PARSE_ERROR", err.to_string()), Flow::Continue);
        }
    };
    let id = value.get("id").cloned().unwrap_or(Value::Null);
    let command = match Command::deserialize(&value) {
        Ok(command) => command,
        Err(err) => {
            log::warn!("Invalid request {}: {}", id, err);
            return (error_reply(id, "INVALID_REQUEST", err.to_string()), Flow::Continue);
        }
    };

    log::trace!("Request {}: {:?}", id, command);
    let flow = if matches!(command, Command::Shutdown) {
        Flow::Stop
    } else {
        Flow::Continue
    };
    let reply = match dispatch(server, command) {
        Ok(result) => json!({ "id": id, "result": result }),
        Err(err) => {
            let server_error = ServerError::from_anyhow(&err);
            error_reply(id, server_error.code, server_error.message)
        }
    };
    (reply, flow)
}

fn dispatch(server: &AnalysisServer, command: Command) -> anyhow::Result<Value> {
    match command {
        Command::CreateContext {
            name,
            sdk_path,
            package_map,
        } => {
            let context_id = server.create_context(&name, &sdk_path, package_map)?;
            Ok(json!({ "contextId": context_id }))
        }
        Command::DeleteContext { context_id } => {
            server.delete_context(&context_id);
            Ok(Value::Null)
        }
        Command::SetContents {
            context_id,
            source,
            contents,
        } => {
            server.set_contents(&context_id, source, contents);
            Ok(Value::Null)
        }
        Command::ApplyChanges {
            context_id,
            changes,
        } => {
            server.apply_changes(&context_id, changes);
            Ok(Value::Null)
        }
        Command::ApplyAnalysisDelta { context_id, delta } => {
            server.apply_analysis_delta(&context_id, delta);
            Ok(Value::Null)
        }
        Command::SetOptions {
            context_id,
            options,
        } => {
            server.set_options(&context_id, options);
            Ok(Value::Null)
        }
        Command::SetPrioritySources {
            context_id,
            sources,
        } => {
            server.set_priority_sources(&context_id, sources);
            Ok(Value::Null)
        }
        Command::Subscribe {
            context_id,
            subscriptions,
        } => {
            server.subscribe(&context_id, subscriptions);
            Ok(Value::Null)
        }
        Command::GetVersion => {
            let mut version = String::new();
            server.get_version(|v| version = v.to_string());
            Ok(json!({ "version": version }))
        }
        Command::Shutdown => Ok(Value::Null),
    }
}

/// Listener that turns callbacks into event lines.
pub struct EventWriter {
    lines: mpsc::UnboundedSender<String>,
}

impl EventWriter {
    pub fn new(lines: mpsc::UnboundedSender<String>) -> Self {
        Self { lines }
    }

    fn emit(&self, event: &str, params: Value) {
        let line = json!({ "event": event, "params": params }).to_string();
        if self.lines.send(line).is_err() {
            log::debug!("Dropped {} event: output closed", event);
        }
    }
}

impl AnalysisServerListener for EventWriter {
    fn computed_errors(&self, context_id: &str, source: &Source, errors: &[AnalysisError]) {
        self.emit(
            "computedErrors",
            json!({ "contextId": context_id, "source": source, "errors": errors }),
        );
    }

    fn computed_highlights(
        &self,
        context_id: &str,
        source: &Source,
        highlights: &[HighlightRegion],
    ) {
        self.emit(
            "computedHighlights",
            json!({ "contextId": context_id, "source": source, "highlights": highlights }),
        );
    }

    fn computed_navigation(
        &self,
        context_id: &str,
        source: &Source,
        navigation: &[NavigationRegion],
    ) {
        self.emit(
            "computedNavigation",
            json!({ "contextId": context_id, "source": source, "regions": navigation }),
        );
    }

    fn computed_outline(&self, context_id: &str, source: &Source, outline: &Outline) {
        self.emit(
            "computedOutline",
            json!({ "contextId": context_id, "source": source, "outline": outline }),
        );
    }

    fn on_server_error(&self, error: &ServerError) {
        self.emit("serverError", json!(error));
    }
}

async fn write_lines<W>(mut out: W, mut lines: mpsc::UnboundedReceiver<String>) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = lines.recv().await {
        out.write_all(line.as_bytes()).await?;
        out.write_all(b"\n").await?;
        out.flush().await?;
    }
    Ok(())
}

/// Serves the protocol on stdin/stdout until `shutdown` or EOF.
pub async fn serve_stdio(config: ServerConfig) -> anyhow::Result<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    let server = AnalysisServer::start(Arc::new(TextEngine::new()), config)?;
    let listener: Arc<dyn AnalysisServerListener> = Arc::new(EventWriter::new(tx.clone()));
    server.add_analysis_server_listener(listener.clone());
    let writer = tokio::spawn(write_lines(tokio::io::stdout(), rx));

    log::info!("Serving analysis requests on stdio");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        let (reply, flow) = handle_line(&server, &line);
        if tx.send(reply.to_string()).is_err() || flow == Flow::Stop {
            break;
        }
    }

    // Joining the worker blocks, so it runs off the runtime threads.
    let server = tokio::task::spawn_blocking(move || {
        server.shutdown();
        server
    })
    .await
    .context("Shutdown task failed")?;
    server.remove_analysis_server_listener(&listener);
    drop(listener);
    drop(server);
    drop(tx);

    writer.await.context("Output task failed")?
}
