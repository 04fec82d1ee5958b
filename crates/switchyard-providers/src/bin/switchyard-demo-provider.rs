//! Minimal stdio tool provider used for local runs and integration tests.
//!
//! Reads one JSON-RPC message per line on stdin and answers on stdout.

use clap::Parser;
use log::{debug, info};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::time::Duration;
use switchyard_protocol::wire::{
    CallOperationParams, CallOperationResult, INTERNAL_ERROR, INVALID_PARAMS,
    METHOD_CALL_OPERATION, METHOD_INITIALIZE, METHOD_LIST_OPERATIONS, METHOD_NOT_FOUND,
    PROTOCOL_VERSION, RpcRequest, RpcResponse,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[derive(Parser)]
#[command(name = "switchyard-demo-provider", version)]
struct Cli {
    /// Name reported during the handshake
    #[arg(long, default_value = "demo")]
    name: String,
    /// Operations that answer with a JSON-RPC error (repeatable)
    #[arg(long = "fail-on")]
    fail_on: Vec<String>,
    /// Print log and notification lines on stdout before each response
    #[arg(long)]
    chatty: bool,
    /// Delay every tools/call answer
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,
}

fn operation_catalog() -> Value {
    let pair = json!({
        "type": "object",
        "properties": {
            "a": { "type": "number", "description": "first operand" },
            "b": { "type": "number", "description": "second operand" }
        },
        "required": ["a", "b"]
    });
    json!({
        "tools": [
            { "name": "add", "description": "Add two numbers (sum, plus)", "inputSchema": pair },
            { "name": "multiply", "description": "Multiply two numbers (product, times)", "inputSchema": pair },
            {
                "name": "echo",
                "description": "Echo the given text back",
                "inputSchema": {
                    "type": "object",
                    "properties": { "text": { "type": "string" } },
                    "required": ["text"]
                }
            },
            {
                "name": "listDirectory",
                "description": "List files in a directory on the local filesystem",
                "inputSchema": {
                    "type": "object",
                    "properties": { "path": { "type": "string", "default": "." } },
                    "required": ["path"]
                }
            }
        ]
    })
}

fn number(arguments: &Value, key: &str) -> Result<f64, String> {
    match arguments.get(key) {
        Some(Value::Number(number)) => number
            .as_f64()
            .ok_or_else(|| format!("{key} is not representable")),
        Some(Value::String(text)) => text
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("{key} is not a number")),
        _ => Err(format!("missing number argument {key}")),
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

fn run_operation(name: &str, arguments: &Value) -> Result<CallOperationResult, (i64, String)> {
    let invalid = |message: String| (INVALID_PARAMS, message);
    match name {
        "add" => {
            let sum = number(arguments, "a").map_err(invalid)?
                + number(arguments, "b").map_err(invalid)?;
            Ok(CallOperationResult::text(format_number(sum)))
        }
        "multiply" => {
            let product = number(arguments, "a").map_err(invalid)?
                * number(arguments, "b").map_err(invalid)?;
            Ok(CallOperationResult::text(format_number(product)))
        }
        "echo" => {
            let text = arguments
                .get("text")
                .and_then(Value::as_str)
                .ok_or_else(|| invalid("missing text argument".to_string()))?;
            Ok(CallOperationResult::text(text))
        }
        "listDirectory" => {
            let path = PathBuf::from(
                arguments
                    .get("path")
                    .and_then(Value::as_str)
                    .unwrap_or("."),
            );
            let entries = match std::fs::read_dir(&path) {
                Ok(entries) => entries,
                Err(err) => {
                    return Ok(CallOperationResult::error(format!(
                        "cannot list {}: {err}",
                        path.display()
                    )));
                }
            };
            let mut names: Vec<String> = entries
                .filter_map(Result::ok)
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect();
            names.sort();
            Ok(CallOperationResult::text(names.join("\n")))
        }
        other => Err((METHOD_NOT_FOUND, format!("unknown tool {other}"))),
    }
}

async fn handle(cli: &Cli, request: RpcRequest) -> Option<RpcResponse> {
    let id = request.id?;
    let response = match request.method.as_str() {
        METHOD_INITIALIZE => RpcResponse::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": { "name": cli.name, "version": env!("CARGO_PKG_VERSION") }
            }),
        ),
        METHOD_LIST_OPERATIONS => RpcResponse::success(id, operation_catalog()),
        METHOD_CALL_OPERATION => {
            if cli.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(cli.delay_ms)).await;
            }
            match serde_json::from_value::<CallOperationParams>(request.params) {
                Err(err) => RpcResponse::failure(id, INVALID_PARAMS, err.to_string()),
                Ok(params) if cli.fail_on.contains(&params.name) => RpcResponse::failure(
                    id,
                    INTERNAL_ERROR,
                    format!("{} failed on purpose", params.name),
                ),
                Ok(params) => match run_operation(&params.name, &params.arguments) {
                    Ok(result) => match serde_json::to_value(result) {
                        Ok(value) => RpcResponse::success(id, value),
                        Err(err) => RpcResponse::failure(id, INTERNAL_ERROR, err.to_string()),
                    },
                    Err((code, message)) => RpcResponse::failure(id, code, message),
                },
            }
        }
        other => RpcResponse::failure(id, METHOD_NOT_FOUND, format!("unknown method {other}")),
    };
    Some(response)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = env_logger::builder()
        .format_timestamp_millis()
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .try_init();
    let cli = Cli::parse();
    info!("demo provider starting (name={}, fail_on={:?})", cli.name, cli.fail_on);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let request = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(request) => request,
            Err(err) => {
                debug!("ignoring unparseable line (err={})", err);
                continue;
            }
        };
        let Some(response) = handle(&cli, request).await else {
            continue;
        };
        let mut out = String::new();
        if cli.chatty {
            out.push_str("demo provider: handling request\n");
            out.push_str(r#"{"jsonrpc":"2.0","method":"notifications/message","params":{"level":"info"}}"#);
            out.push('\n');
        }
        out.push_str(&serde_json::to_string(&response)?);
        out.push('\n');
        stdout.write_all(out.as_bytes()).await?;
        stdout.flush().await?;
    }
    Ok(())
}
