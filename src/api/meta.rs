//! 元数据接口：健康检查与当前识别配置

use crate::build_info;
use crate::util::{IntoJson, WebResult};
use crate::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::json;

/// GET /api/health
pub async fn health(State(app_state): State<AppState>) -> Json<WebResult> {
    let limits = &app_state.config.limits;
    WebResult::ok(json!({
        "status": "ok",
        "build": build_info::current(),
        "strategy": app_state.grading.strategy_name(),
        "max_concurrent_sheets": limits.max_concurrent_sheets,
        "available_permits": app_state.grading.available_permits(),
    }))
    .into_json()
}

/// GET /api/omr/config
pub async fn config(State(app_state): State<AppState>) -> Json<WebResult> {
    let config = &app_state.config;
    WebResult::ok(json!({
        "omr": config.omr,
        "grading": app_state.grading.grading_options(),
        "limits": config.limits,
    }))
    .into_json()
}
