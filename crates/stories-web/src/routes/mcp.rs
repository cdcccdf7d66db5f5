//! MCP agent surface: JSON-RPC 2.0 over HTTP POST.
//!
//! Exposes the single-capability agents (`tools/list`, `tools/call`) behind
//! the same bearer auth as the REST API. Binary outputs are uploaded to the
//! blob store and returned as presigned URLs instead of inline payloads.

use std::time::Duration;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::AuthedKey;
use crate::error::ApiError;
use crate::state::AppState;
use stories::models::{AudioType, InputType};
use stories::pipeline::wav;

const PRESIGN_TTL: Duration = Duration::from_secs(3600);

const PARSE_ERROR: i64 = -32700;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const INTERNAL_ERROR: i64 = -32603;

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

fn rpc_result(id: Option<Value>, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn rpc_error(id: Option<Value>, code: i64, message: impl Into<String>) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message.into() } })
}

pub async fn handle(
    State(state): State<AppState>,
    AuthedKey(_key): AuthedKey,
    body: String,
) -> Result<Json<Value>, ApiError> {
    let request: RpcRequest = match serde_json::from_str(&body) {
        Ok(r) => r,
        Err(e) => return Ok(Json(rpc_error(None, PARSE_ERROR, e.to_string()))),
    };
    let id = request.id.clone();

    let response = match request.method.as_str() {
        "initialize" => rpc_result(
            id,
            json!({
                "protocolVersion": "2024-11-05",
                "serverInfo": { "name": "stories", "version": env!("CARGO_PKG_VERSION") },
                "capabilities": { "tools": {} }
            }),
        ),
        "tools/list" => rpc_result(id, json!({ "tools": tool_descriptors() })),
        "tools/call" => match call_tool(&state, &request.params).await {
            Ok(result) => rpc_result(
                id,
                json!({
                    "content": [{ "type": "text", "text": result.to_string() }]
                }),
            ),
            Err(ToolError::InvalidParams(m)) => rpc_error(id, INVALID_PARAMS, m),
            Err(ToolError::Internal(m)) => rpc_error(id, INTERNAL_ERROR, m),
        },
        other => rpc_error(id, METHOD_NOT_FOUND, format!("unknown method: {other}")),
    };

    Ok(Json(response))
}

fn tool_descriptors() -> Value {
    json!([
        {
            "name": "segment_text",
            "description": "Split text into sentence-aligned segments",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "text": { "type": "string" },
                    "target_count": { "type": "integer" },
                    "input_type": { "type": "string", "enum": ["educational", "financial", "fictional"] }
                },
                "required": ["text"]
            }
        },
        {
            "name": "narrate_segment",
            "description": "Generate a narration script and synthesized audio for a passage",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "text": { "type": "string" },
                    "audio_type": { "type": "string", "enum": ["free_speech", "podcast"] },
                    "input_type": { "type": "string", "enum": ["educational", "financial", "fictional"] }
                },
                "required": ["text"]
            }
        },
        {
            "name": "generate_image",
            "description": "Render an illustration from a prompt",
            "inputSchema": {
                "type": "object",
                "properties": { "prompt": { "type": "string" } },
                "required": ["prompt"]
            }
        },
        {
            "name": "fact_check",
            "description": "Assess the factual accuracy of a claim",
            "inputSchema": {
                "type": "object",
                "properties": { "claim": { "type": "string" } },
                "required": ["claim"]
            }
        }
    ])
}

enum ToolError {
    InvalidParams(String),
    Internal(String),
}

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

fn string_arg(arguments: &Value, key: &str) -> Result<String, ToolError> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ToolError::InvalidParams(format!("missing argument: {key}")))
}

fn input_type_arg(arguments: &Value) -> InputType {
    arguments
        .get("input_type")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or(InputType::Educational)
}

async fn call_tool(state: &AppState, params: &Value) -> Result<Value, ToolError> {
    let params: ToolCallParams = serde_json::from_value(params.clone())
        .map_err(|e| ToolError::InvalidParams(e.to_string()))?;
    let args = &params.arguments;

    match params.name.as_str() {
        "segment_text" => {
            let text = string_arg(args, "text")?;
            let target = args
                .get("target_count")
                .and_then(Value::as_i64)
                .unwrap_or(3) as i32;
            let segments = state
                .engine
                .segment(&text, target, input_type_arg(args))
                .await;
            let segments: Vec<Value> = segments
                .into_iter()
                .map(|s| {
                    json!({
                        "idx": s.idx,
                        "title": s.title,
                        "start_char": s.start_char,
                        "end_char": s.end_char,
                        "text": s.text,
                    })
                })
                .collect();
            Ok(json!({ "segments": segments }))
        }
        "narrate_segment" => {
            let text = string_arg(args, "text")?;
            let audio_type: AudioType = args
                .get("audio_type")
                .cloned()
                .and_then(|v| serde_json::from_value(v).ok())
                .unwrap_or(AudioType::FreeSpeech);
            let input_type = input_type_arg(args);

            let mut script = String::new();
            for model in &state.capabilities.narration {
                match model.narrate(&text, audio_type, input_type).await {
                    Ok(s) if !s.trim().is_empty() => {
                        script = s;
                        break;
                    }
                    _ => continue,
                }
            }
            if script.is_empty() {
                return Err(ToolError::Internal("narration produced no script".into()));
            }

            let audio = state
                .capabilities
                .speech
                .synthesize(&script, audio_type, &state.tts_voice)
                .await
                .map_err(|e| ToolError::Internal(e.to_string()))?;

            let (bytes, mime_type) = match wav::parse_pcm_mime(&audio.mime_type) {
                Some(format) => (
                    wav::wrap_pcm_in_wav(&audio.bytes, format),
                    "audio/wav".to_string(),
                ),
                None => (audio.bytes, audio.mime_type),
            };

            let key = format!("agent/{}/audio.wav", Uuid::new_v4());
            state
                .store
                .put(&key, bytes, &mime_type)
                .await
                .map_err(|e| ToolError::Internal(e.to_string()))?;
            let url = state
                .store
                .presign_get(&key, PRESIGN_TTL)
                .await
                .map_err(|e| ToolError::Internal(e.to_string()))?;

            Ok(json!({ "script": script, "audio_url": url, "mime_type": mime_type }))
        }
        "generate_image" => {
            let prompt = string_arg(args, "prompt")?;
            let image = state
                .capabilities
                .image
                .generate(&prompt)
                .await
                .map_err(|e| ToolError::Internal(e.to_string()))?;

            let key = format!("agent/{}/image", Uuid::new_v4());
            let mime = image.mime_type.clone();
            state
                .store
                .put(&key, image.bytes, &mime)
                .await
                .map_err(|e| ToolError::Internal(e.to_string()))?;
            let url = state
                .store
                .presign_get(&key, PRESIGN_TTL)
                .await
                .map_err(|e| ToolError::Internal(e.to_string()))?;

            Ok(json!({ "image_url": url, "mime_type": mime }))
        }
        "fact_check" => {
            let claim = string_arg(args, "claim")?;
            let report = state
                .capabilities
                .fact_check
                .fact_check(&claim)
                .await
                .map_err(|e| ToolError::Internal(e.to_string()))?;
            Ok(json!({ "verdict": report.verdict, "explanation": report.explanation }))
        }
        other => Err(ToolError::InvalidParams(format!("unknown tool: {other}"))),
    }
}
