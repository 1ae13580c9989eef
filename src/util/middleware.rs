use crate::util::log::ACCESS_TARGET;
use axum::{extract::Request, http::HeaderMap, middleware::Next, response::Response};
use std::time::Instant;
use uuid::Uuid;

/// 请求 ID，写入请求扩展，处理函数可通过 `Extension<RequestId>` 读取
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

const SLOW_REQUEST_MS: u128 = 5_000;

fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .or_else(|| headers.get("x-real-ip"))
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
}

fn extract_user_agent(headers: &HeaderMap) -> String {
    headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

fn parse_content_length(headers: &HeaderMap) -> usize {
    headers
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0)
}

fn is_quiet_path(path: &str) -> bool {
    const QUIET_EXACT: &[&str] = &["/api/health", "/favicon.ico"];
    QUIET_EXACT.contains(&path)
}

// 统一请求日志中间件
pub async fn request_logging_middleware(mut request: Request, next: Next) -> Response {
    let start_time = Instant::now();
    let request_id = Uuid::new_v4().to_string();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let headers = request.headers();
    let user_agent = extract_user_agent(headers);
    let client_ip = extract_client_ip(headers).unwrap_or_else(|| "unknown".to_string());
    let request_size = parse_content_length(headers);
    request.extensions_mut().insert(RequestId(request_id.clone()));

    let quiet_path = is_quiet_path(uri.path());
    if !quiet_path {
        tracing::debug!(
            target: ACCESS_TARGET,
            event = "http.request.start",
            request_id = %request_id,
            method = %method,
            path = %uri.path(),
            request_bytes = request_size,
            user_agent = %user_agent,
            client_ip = %client_ip
        );
    }

    let response = next.run(request).await;
    let duration_ms = start_time.elapsed().as_millis();
    let status = response.status();
    let response_size = parse_content_length(response.headers());

    if status.is_server_error() {
        tracing::error!(
            target: ACCESS_TARGET,
            event = "http.request.error",
            request_id = %request_id,
            method = %method,
            path = %uri.path(),
            status = status.as_u16(),
            duration_ms = duration_ms as u64,
            request_bytes = request_size,
            response_bytes = response_size,
            client_ip = %client_ip
        );
    } else if status.is_client_error() {
        tracing::warn!(
            target: ACCESS_TARGET,
            event = "http.request.complete",
            request_id = %request_id,
            method = %method,
            path = %uri.path(),
            status = status.as_u16(),
            duration_ms = duration_ms as u64,
            request_bytes = request_size,
            response_bytes = response_size,
            client_ip = %client_ip
        );
    } else if quiet_path {
        tracing::debug!(
            target: ACCESS_TARGET,
            event = "http.request.complete",
            request_id = %request_id,
            method = %method,
            path = %uri.path(),
            status = status.as_u16(),
            duration_ms = duration_ms as u64
        );
    } else {
        tracing::info!(
            target: ACCESS_TARGET,
            event = "http.request.complete",
            request_id = %request_id,
            method = %method,
            path = %uri.path(),
            status = status.as_u16(),
            duration_ms = duration_ms as u64,
            request_bytes = request_size,
            response_bytes = response_size,
            user_agent = %user_agent,
            client_ip = %client_ip
        );
    }

    if !quiet_path && duration_ms > SLOW_REQUEST_MS {
        tracing::warn!(
            target: ACCESS_TARGET,
            event = "http.request.slow",
            request_id = %request_id,
            method = %method,
            path = %uri.path(),
            duration_ms = duration_ms as u64,
            status = status.as_u16()
        );
    }

    response
}
