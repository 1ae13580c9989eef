//! 答题卡识别与评分接口

use crate::model::{GradingError, SheetUpload};
use crate::util::middleware::RequestId;
use crate::util::{IntoJson, ServerError, WebResult};
use crate::AppState;
use axum::extract::multipart::{Field, MultipartError};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use axum::{Extension, Json};
use omr_conn::AnswerMap;
use serde::Deserialize;
use tracing::{error, info};

type ApiResult = Result<Json<WebResult>, ServerError>;

/// 答题卡图片可用的字段名
const IMAGE_FIELDS: &[&str] = &["image", "file", "sheet"];

impl From<GradingError> for ServerError {
    fn from(err: GradingError) -> Self {
        if err.is_internal() {
            error!(event = "grading.internal_error", error = %err);
            return ServerError::Server;
        }
        ServerError::bad_request(err.kind(), err.to_string())
    }
}

fn multipart_error(err: MultipartError) -> ServerError {
    ServerError::bad_request("bad_multipart", err.body_text())
}

async fn read_upload(field: Field<'_>, fallback_name: String) -> Result<SheetUpload, ServerError> {
    let name = field
        .file_name()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or(fallback_name);
    let bytes = field.bytes().await.map_err(multipart_error)?;
    Ok(SheetUpload::new(name, bytes.to_vec()))
}

/// POST /api/omr/sheet
pub async fn detect_sheet(
    State(app_state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    mut multipart: Multipart,
) -> ApiResult {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let is_image = field
            .name()
            .is_some_and(|name| IMAGE_FIELDS.contains(&name));
        if is_image && upload.is_none() {
            upload = Some(read_upload(field, "sheet".to_string()).await?);
        }
    }
    let upload = upload.ok_or(GradingError::MissingField("image"))?;

    info!(
        event = "api.sheet.received",
        request_id = %request_id.0,
        sheet = %upload.name,
        bytes = upload.bytes.len()
    );
    let report = app_state.grading.detect(upload).await?;
    Ok(WebResult::ok(report).into_json())
}

#[derive(Debug, Deserialize)]
pub struct ScoreRequest {
    pub key: AnswerMap,
    pub student: AnswerMap,
    #[serde(default)]
    pub pass_threshold: Option<f64>,
}

fn json_error(rejection: JsonRejection) -> ServerError {
    ServerError::bad_request("bad_json", rejection.body_text())
}

/// POST /api/omr/score
pub async fn score(
    State(app_state): State<AppState>,
    payload: Result<Json<ScoreRequest>, JsonRejection>,
) -> ApiResult {
    let Json(request) = payload.map_err(json_error)?;
    let result = app_state
        .grading
        .score(&request.key, &request.student, request.pass_threshold)?;
    Ok(WebResult::ok(result).into_json())
}

/// POST /api/omr/grade
///
/// 字段：`key` 标准答案卡一张，`student` 学生答题卡一张或多张，
/// 可选 `pass_threshold` 覆盖配置的及格线
pub async fn grade(
    State(app_state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    mut multipart: Multipart,
) -> ApiResult {
    let mut key = None;
    let mut students = Vec::new();
    let mut pass_threshold = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "key" => key = Some(read_upload(field, "key".to_string()).await?),
            "student" | "students" => {
                let fallback = format!("student-{}", students.len() + 1);
                students.push(read_upload(field, fallback).await?);
            }
            "pass_threshold" => {
                let text = field.text().await.map_err(multipart_error)?;
                let value = text.trim().parse::<f64>().map_err(|_| {
                    ServerError::bad_request("invalid_threshold", format!("无效的及格线: {}", text))
                })?;
                pass_threshold = Some(value);
            }
            _ => {}
        }
    }
    let key = key.ok_or(GradingError::MissingField("key"))?;

    info!(
        event = "api.grade.received",
        request_id = %request_id.0,
        students = students.len(),
        pass_threshold = ?pass_threshold
    );
    let report = app_state.grading.grade(key, students, pass_threshold).await?;
    Ok(WebResult::ok(report).into_json())
}
