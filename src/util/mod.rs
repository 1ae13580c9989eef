use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt::Display;

pub mod config;
pub mod log;
pub mod middleware;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebResult {
    pub success: bool,
    #[serde(rename = "errorCode")]
    pub code: u32,
    #[serde(rename = "errorMsg")]
    pub msg: String,
    pub data: Value,
}

#[derive(Debug, Clone)]
pub enum ServerError {
    Server,
    /// 请求本身有误，`kind` 为稳定的错误码（如 `bad_key_image`）
    BadRequest { kind: String, msg: String },
}

impl ServerError {
    pub fn bad_request(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        ServerError::BadRequest {
            kind: kind.into(),
            msg: msg.into(),
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            ServerError::Server => "server_error",
            ServerError::BadRequest { kind, .. } => kind,
        }
    }
}

impl Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let str = match self {
            ServerError::Server => "Server internal error",
            ServerError::BadRequest { msg, .. } => msg,
        };
        write!(f, "{}", str)
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match self {
            ServerError::Server => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        (status, WebResult::err(self).into_json()).into_response()
    }
}

impl WebResult {
    pub fn ok(data: impl Serialize) -> Self {
        Self {
            success: true,
            code: 200,
            msg: "".to_string(),
            data: json!(data),
        }
    }

    pub fn err(err: ServerError) -> Self {
        let code = match err {
            ServerError::Server => 500,
            ServerError::BadRequest { .. } => 400,
        };
        Self {
            success: false,
            code,
            msg: err.to_string(),
            data: json!({ "kind": err.kind() }),
        }
    }
}

pub trait IntoJson {
    fn into_json(self) -> Json<WebResult>;
}

impl IntoJson for WebResult {
    fn into_json(self) -> Json<WebResult> {
        Json(self)
    }
}
