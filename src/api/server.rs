//! Line-delimited JSON server. Each connection drives its own call tree session.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::api::dto::{CallableDto, ErrorDto, ResolutionDto, StateDto};
use crate::domain::callable::CallableId;
use crate::domain::session::CallTreeSession;

/// Builds the session for a new connection. Called on the connection's thread.
pub type SessionFactory = Arc<dyn Fn() -> CallTreeSession + Send + Sync>;

#[derive(Debug, Deserialize)]
struct CommandReq {
    command: String,
    params: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct IdParams {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PathParams {
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct ArgumentParams {
    arguments: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TranslationUnitParams {
    file: PathBuf,
    #[serde(default)]
    include_system_headers: bool,
}

pub fn start_server(host: &str, port: u16, factory: SessionFactory) -> Result<()> {
    let address = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&address)
        .with_context(|| format!("Failed to bind to {}", address))?;
    info!("Callscope server listening on {}", address);
    serve(listener, factory)
}

/// Accepts connections until the listener fails.
pub fn serve(listener: TcpListener, factory: SessionFactory) -> Result<()> {
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let factory = Arc::clone(&factory);
                thread::spawn(move || {
                    let peer = stream
                        .peer_addr()
                        .map(|addr| addr.to_string())
                        .unwrap_or_else(|_| "unknown peer".to_string());
                    debug!("Connection from {}", peer);
                    if let Err(e) = handle_connection(stream, factory()) {
                        warn!("Connection error ({}): {:#}", peer, e);
                    }
                });
            }
            Err(e) => warn!("Accept error: {}", e),
        }
    }
    Ok(())
}

fn handle_connection(mut stream: TcpStream, mut session: CallTreeSession) -> Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let (response, close) = respond(&mut session, trimmed);
        let response_str = serde_json::to_string(&response)?;
        stream.write_all(response_str.as_bytes())?;
        stream.write_all(b"\n")?;
        if close {
            debug!("Client closed the session");
            break;
        }
    }
    Ok(())
}

/// The response line for one request, and whether the connection ends after it.
pub fn respond(session: &mut CallTreeSession, request: &str) -> (Value, bool) {
    let close = serde_json::from_str::<CommandReq>(request)
        .map(|req| req.command == "CLOSE")
        .unwrap_or(false);
    let response = match process_command(session, request) {
        Ok(data) => json!({
            "status": "success",
            "data": data
        }),
        Err(e) => {
            debug!("Request failed: {:#}", e);
            let error = ErrorDto::from(&e);
            json!({
                "status": "error",
                "kind": error.kind,
                "message": error.message,
                "diagnostics": error.diagnostics,
            })
        }
    };
    (response, close)
}

fn process_command(session: &mut CallTreeSession, json_str: &str) -> Result<Value> {
    let req: CommandReq = serde_json::from_str(json_str).context("Invalid JSON format")?;

    match req.command.as_str() {
        "PING" => Ok(json!("PONG")),
        "STATE" => Ok(serde_json::to_value(StateDto::from(&*session))?),
        "SET_EXTRA_ARGUMENTS" => {
            let params: ArgumentParams = params(&req)?;
            session.set_extra_arguments(params.arguments)?;
            Ok(serde_json::to_value(StateDto::from(&*session))?)
        }
        "OPEN" => {
            let params: PathParams = params(&req)?;
            session.open(&params.path)?;
            Ok(json!({ "translation_units": session.translation_units() }))
        }
        "SELECT_TU" => {
            let params: TranslationUnitParams = params(&req)?;
            let callables =
                session.select_translation_unit(&params.file, params.include_system_headers)?;
            let session = &*session;
            let dtos: Vec<CallableDto> = callables
                .iter()
                .map(|callable| CallableDto::new(callable, session))
                .collect();
            Ok(serde_json::to_value(dtos)?)
        }
        "SELECT_ROOT" => {
            let id = id_param(&req)?;
            session.select_root(&id)?;
            let session = &*session;
            let root = session.lookup(&id)?;
            Ok(serde_json::to_value(CallableDto::new(root, session))?)
        }
        "LOAD_DEFINITION" => {
            let id = id_param(&req)?;
            let resolution = session.load_definition(&id)?;
            Ok(serde_json::to_value(ResolutionDto::new(resolution, &*session))?)
        }
        "CALLEES" => {
            let id = id_param(&req)?;
            let session = &*session;
            session.lookup(&id)?;
            let dtos: Vec<CallableDto> = session
                .callees_of(&id)
                .into_iter()
                .map(|callee| CallableDto::new(callee, session))
                .collect();
            Ok(serde_json::to_value(dtos)?)
        }
        "INCLUDE" => {
            let id = id_param(&req)?;
            session.include(&id)?;
            Ok(json!({ "id": id, "included": true }))
        }
        "EXCLUDE" => {
            let id = id_param(&req)?;
            session.exclude(&id)?;
            Ok(json!({ "id": id, "included": false }))
        }
        "EXPORT" => Ok(json!(session.export()?)),
        "CLOSE" => Ok(json!("BYE")),
        _ => anyhow::bail!("Unknown command: {}", req.command),
    }
}

fn params<T: DeserializeOwned>(req: &CommandReq) -> Result<T> {
    let params = req
        .params
        .clone()
        .ok_or_else(|| anyhow::anyhow!("Missing params for {}", req.command))?;
    serde_json::from_value(params).with_context(|| format!("Invalid params for {}", req.command))
}

fn id_param(req: &CommandReq) -> Result<CallableId> {
    let params: IdParams = params(req)?;
    Ok(CallableId::from(params.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::callgraph::tests::{call, function, touch, FakeProvider};
    use crate::ports::NoopObserver;
    use tempfile::TempDir;

    fn session_with(file: &std::path::Path) -> CallTreeSession {
        let provider = FakeProvider::default();
        provider.set(
            file,
            vec![function("f", file, false), function("g", file, true), call("g()", "f()")],
        );
        CallTreeSession::new(Box::new(provider), Box::new(NoopObserver))
    }

    fn send(session: &mut CallTreeSession, request: Value) -> Value {
        respond(session, &request.to_string()).0
    }

    #[test]
    fn test_ping() {
        let dir = TempDir::new().unwrap();
        let mut session = session_with(&touch(&dir, "file.cpp"));
        let response = send(&mut session, json!({"command": "PING"}));
        assert_eq!(response, json!({"status": "success", "data": "PONG"}));
    }

    #[test]
    fn test_full_flow() {
        let dir = TempDir::new().unwrap();
        let file = touch(&dir, "file.cpp");
        let mut session = session_with(&file);

        let opened = send(&mut session, json!({"command": "OPEN", "params": {"path": file}}));
        assert_eq!(opened["status"], "success");
        assert_eq!(opened["data"]["translation_units"][0], json!(file));

        let selected = send(&mut session, json!({"command": "SELECT_TU", "params": {"file": file}}));
        let ids: Vec<&str> = selected["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["f()", "g()"]);

        send(&mut session, json!({"command": "SELECT_ROOT", "params": {"id": "g()"}}));
        let callees = send(&mut session, json!({"command": "CALLEES", "params": {"id": "g()"}}));
        assert_eq!(callees["data"][0]["qualified_name"], "void f()");
        assert_eq!(callees["data"][0]["participant"], "file.cpp");

        send(&mut session, json!({"command": "INCLUDE", "params": {"id": "f()"}}));
        let exported = send(&mut session, json!({"command": "EXPORT"}));
        assert_eq!(
            exported["data"],
            "@startuml\n\n -> \"file.cpp\": void f()\nactivate \"file.cpp\"\ndeactivate \"file.cpp\"\n\n@enduml"
        );

        let (closed, close) = respond(&mut session, &json!({"command": "CLOSE"}).to_string());
        assert_eq!(closed["data"], "BYE");
        assert!(close);
    }

    #[test]
    fn test_errors_carry_kind() {
        let dir = TempDir::new().unwrap();
        let mut session = session_with(&touch(&dir, "file.cpp"));

        let response = send(&mut session, json!({"command": "EXPORT"}));
        assert_eq!(response["status"], "error");
        assert_eq!(response["kind"], "PreconditionFailed");

        let response = send(&mut session, json!({"command": "SELECT_ROOT", "params": {"id": "g()"}}));
        assert_eq!(response["kind"], "InvalidTransition");

        let response = send(&mut session, json!({"command": "OPEN", "params": {"path": "/missing.cpp"}}));
        assert_eq!(response["kind"], "SourceNotFound");

        let response = send(&mut session, json!({"command": "FLY"}));
        assert_eq!(response["kind"], "BadRequest");

        let response = respond(&mut session, "not json").0;
        assert_eq!(response["kind"], "BadRequest");
    }
}
