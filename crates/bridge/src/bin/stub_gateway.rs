//! Minimal tool gateway used only for bridge integration tests.
//!
//! Speaks the same external interface as the real gateway: `--host/--port/--config` flags,
//! `GET /docs`, `GET /openapi.json` listing `[name]` tokens and one OpenAPI document per backend
//! under `/{name}/openapi.json`. Every configured backend command is spawned as a child process
//! so that tests can check the whole process tree is torn down.

use anyhow::Context as _;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use mcpo_bridge::McpConfig;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Parser)]
struct Args {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    #[arg(long)]
    port: u16,
    #[arg(long)]
    config: PathBuf,
    /// Exit with status 1 before binding
    #[arg(long)]
    exit_immediately: bool,
    /// Sleep before binding
    #[arg(long, default_value_t = 0)]
    startup_delay_ms: u64,
    /// Backend whose OpenAPI document answers 500 (repeatable)
    #[arg(long = "broken-server")]
    broken_servers: Vec<String>,
}

struct StubState {
    servers: Vec<String>,
    broken: Vec<String>,
    children: Vec<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.exit_immediately {
        eprintln!("stub gateway: exiting on request");
        std::process::exit(1);
    }

    let config = McpConfig::from_path(&args.config).context("read stub gateway config")?;
    let children = spawn_backends(&config);

    if args.startup_delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(args.startup_delay_ms)).await;
    }

    let state = Arc::new(StubState {
        servers: config.server_names(),
        broken: args.broken_servers,
        children: children.iter().map(Child::id).collect(),
    });

    let app = Router::new()
        .route("/docs", get(docs))
        .route("/openapi.json", get(root_document))
        .route("/_stub/children", get(list_children))
        .route("/{server}/openapi.json", get(server_document))
        .route("/{server}/echo", post(echo))
        .route("/{server}/fail", post(fail))
        .route("/{server}/nested/ping", post(ping))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind((args.host.as_str(), args.port))
        .await
        .with_context(|| format!("bind {}:{}", args.host, args.port))?;
    axum::serve(listener, app).await?;

    // Children are killed with the process group; keep the handles alive until then.
    drop(children);
    Ok(())
}

fn spawn_backends(config: &McpConfig) -> Vec<Child> {
    let mut children = Vec::new();
    for server in config.servers() {
        let mut cmd = Command::new(&server.command);
        cmd.args(&server.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(env) = &server.env {
            cmd.envs(env);
        }
        match cmd.spawn() {
            Ok(child) => children.push(child),
            Err(e) => eprintln!("stub gateway: failed to spawn backend '{}': {e}", server.name),
        }
    }
    children
}

async fn docs() -> Html<&'static str> {
    Html("<html><body>stub gateway</body></html>")
}

async fn root_document(State(state): State<Arc<StubState>>) -> Json<Value> {
    let listing: Vec<String> = state.servers.iter().map(|s| format!("- [{s}]")).collect();
    Json(json!({
        "openapi": "3.1.0",
        "info": {
            "title": "stub gateway",
            "version": "0",
            "description": format!("Tool servers:\n{}", listing.join("\n")),
        },
        "paths": {}
    }))
}

async fn list_children(State(state): State<Arc<StubState>>) -> Json<Value> {
    Json(json!({ "pids": state.children }))
}

async fn server_document(
    State(state): State<Arc<StubState>>,
    Path(server): Path<String>,
) -> Response {
    if !state.servers.contains(&server) {
        return StatusCode::NOT_FOUND.into_response();
    }
    if state.broken.contains(&server) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "broken backend").into_response();
    }
    Json(backend_document(&server)).into_response()
}

fn backend_document(server: &str) -> Value {
    json!({
        "openapi": "3.1.0",
        "info": {"title": server, "version": "0", "description": format!("{server} backend")},
        "paths": {
            "/echo": {"post": {
                "summary": "Echo",
                "description": "Return the request body",
                "requestBody": {"required": true, "content": {"application/json": {
                    "schema": {"$ref": "#/components/schemas/EchoForm"}
                }}}
            }},
            "/fail": {"post": {
                "description": "Always fails",
                "requestBody": {"content": {"application/json": {"schema": {
                    "type": "object", "properties": {}
                }}}}
            }},
            "/nested/ping": {"post": {"description": "Ping"}},
            "/status": {"get": {"description": "Not a tool"}}
        },
        "components": {"schemas": {
            "EchoForm": {
                "type": "object",
                "title": "EchoForm",
                "properties": {
                    "x": {"type": "integer", "title": "X", "description": "Value to echo"},
                    "note": {"type": "string", "title": "Note", "description": ""}
                },
                "required": ["x"]
            }
        }}
    })
}

async fn echo(Json(body): Json<Value>) -> Json<Value> {
    Json(body)
}

async fn fail() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "stub failure")
}

async fn ping(Path(server): Path<String>) -> Json<Value> {
    Json(json!({ "pong": server }))
}
