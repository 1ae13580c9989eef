mod grading;
mod meta;

use crate::util::middleware;
use crate::AppState;
use axum::extract::DefaultBodyLimit;
use axum::middleware::from_fn;
use axum::routing::{get, post};
use axum::Router;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tracing::{info, warn};

/// 创建安全的CORS配置
fn create_cors_layer() -> CorsLayer {
    // 从环境变量读取允许的域名，默认为本地开发
    let allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:8964,http://127.0.0.1:8964".to_string());
    cors_layer_for(&allowed_origins)
}

fn cors_layer_for(allowed_origins: &str) -> CorsLayer {
    info!(event = "http.cors", origins = %allowed_origins);

    CorsLayer::new()
        .allow_origin(
            allowed_origins
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .filter_map(|s| match s.trim().parse() {
                    Ok(origin) => Some(origin),
                    Err(e) => {
                        warn!(event = "http.cors.invalid_origin", origin = %s, error = %e);
                        None
                    }
                })
                .collect::<Vec<_>>(),
        )
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
            axum::http::header::ACCEPT,
        ])
        .allow_credentials(true)
}

pub fn routes(app_state: AppState) -> Router {
    let limits = &app_state.config.limits;
    let body_limit = limits.max_upload_bytes();
    let request_timeout = Duration::from_secs(limits.request_timeout_secs.max(1));

    let omr_routes = Router::new()
        .route("/api/omr/config", get(meta::config))
        .route("/api/omr/sheet", post(grading::detect_sheet))
        .route("/api/omr/score", post(grading::score))
        .route("/api/omr/grade", post(grading::grade))
        .layer(DefaultBodyLimit::max(body_limit));

    Router::new()
        .route("/api/health", get(meta::health))
        .merge(omr_routes)
        .with_state(app_state)
        // 全局中间件
        .layer(TimeoutLayer::new(request_timeout))
        .layer(from_fn(middleware::request_logging_middleware))
        .layer(create_cors_layer())
}
