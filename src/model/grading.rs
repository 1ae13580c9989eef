//! 评分服务
//!
//! 识别是 CPU 密集型工作：每张答题卡在 `spawn_blocking` 中执行，
//! 由信号量限制同时处理的数量，并受单张处理时限约束。
//! 单张学生答题卡的失败只记录在该张结果中。

use crate::util::config::Config;
use futures::future::join_all;
use omr_conn::{
    grade_student, read_key, score_sheet_checked, AnswerMap, BatchReport, BatchSummary,
    DetectionError, GradingOptions, KeySheetError, NamedSheet, RawImage, ScoreError, ScoreResult,
    SheetOutcome, SheetProcessor, SheetReport, SheetStatus,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// 上传的一张答题卡
#[derive(Debug, Clone)]
pub struct SheetUpload {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl SheetUpload {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

#[derive(Debug, Error)]
pub enum GradingError {
    #[error(transparent)]
    BadImage(#[from] DetectionError),
    #[error(transparent)]
    Key(#[from] KeySheetError),
    #[error(transparent)]
    Score(#[from] ScoreError),
    #[error("答题卡处理超时 ({0}s)")]
    Timeout(u64),
    #[error("单次最多评分 {max} 张答题卡，实际 {got} 张")]
    TooManySheets { max: usize, got: usize },
    #[error("缺少字段: {0}")]
    MissingField(&'static str),
    #[error("内部错误: {0}")]
    Internal(String),
}

impl GradingError {
    pub fn kind(&self) -> &'static str {
        match self {
            GradingError::BadImage(e) => e.kind(),
            GradingError::Key(e) => e.kind(),
            GradingError::Score(e) => e.kind(),
            GradingError::Timeout(_) => "timeout",
            GradingError::TooManySheets { .. } => "too_many_sheets",
            GradingError::MissingField(_) => "missing_field",
            GradingError::Internal(_) => "internal",
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, GradingError::Internal(_))
    }
}

/// 评分请求的结果
#[derive(Debug, Clone, Serialize)]
pub struct GradingReport {
    pub request_id: String,
    pub strategy: &'static str,
    pub pass_threshold: f64,
    pub elapsed_ms: u64,
    #[serde(flatten)]
    pub batch: BatchReport,
}

/// 运行中的阻塞任务失败原因
enum RunError {
    Timeout,
    Failed(String),
}

pub struct GradingService {
    processor: Arc<SheetProcessor>,
    grading: GradingOptions,
    semaphore: Arc<Semaphore>,
    sheet_timeout: Duration,
    max_sheets_per_request: usize,
}

impl GradingService {
    pub fn new(config: &Config) -> Self {
        let max_concurrent = config.limits.max_concurrent_sheets.max(1);
        info!(
            event = "grading.service.init",
            strategy = config.omr.strategy.as_str(),
            max_concurrent,
            sheet_timeout_secs = config.limits.sheet_timeout_secs
        );
        Self {
            processor: Arc::new(SheetProcessor::new(config.omr.clone())),
            grading: config.grading.clone(),
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            sheet_timeout: Duration::from_secs(config.limits.sheet_timeout_secs),
            max_sheets_per_request: config.limits.max_sheets_per_request,
        }
    }

    pub fn grading_options(&self) -> &GradingOptions {
        &self.grading
    }

    pub fn strategy_name(&self) -> &'static str {
        self.processor.strategy().kind().as_str()
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// 识别单张答题卡
    pub async fn detect(&self, upload: SheetUpload) -> Result<SheetReport, GradingError> {
        let processor = Arc::clone(&self.processor);
        let name = upload.name.clone();
        let result = self
            .run_blocking(move || processor.process(&RawImage::new(&upload.bytes)))
            .await;
        match result {
            Ok(report) => Ok(report?),
            Err(RunError::Timeout) => {
                warn!(event = "grading.sheet.timeout", sheet = %name);
                Err(GradingError::Timeout(self.sheet_timeout.as_secs()))
            }
            Err(RunError::Failed(msg)) => Err(GradingError::Internal(msg)),
        }
    }

    /// 比对两份已识别的答案表
    pub fn score(
        &self,
        key: &AnswerMap,
        student: &AnswerMap,
        pass_threshold: Option<f64>,
    ) -> Result<ScoreResult, GradingError> {
        let options = self.options_with(pass_threshold)?;
        Ok(score_sheet_checked(
            key,
            student,
            options.pass_threshold,
            options.strict_row_count,
        )?)
    }

    /// 识别标准答案卡并逐张评分学生答题卡
    pub async fn grade(
        &self,
        key: SheetUpload,
        students: Vec<SheetUpload>,
        pass_threshold: Option<f64>,
    ) -> Result<GradingReport, GradingError> {
        let started = Instant::now();
        let request_id = uuid::Uuid::new_v4().to_string();
        if students.is_empty() {
            return Err(GradingError::MissingField("student"));
        }
        if students.len() > self.max_sheets_per_request {
            return Err(GradingError::TooManySheets {
                max: self.max_sheets_per_request,
                got: students.len(),
            });
        }
        let options = self.options_with(pass_threshold)?;

        let processor = Arc::clone(&self.processor);
        let key_answers = match self
            .run_blocking(move || read_key(&processor, &RawImage::new(&key.bytes)))
            .await
        {
            Ok(answers) => Arc::new(answers?),
            Err(RunError::Timeout) => return Err(GradingError::Timeout(self.sheet_timeout.as_secs())),
            Err(RunError::Failed(msg)) => return Err(GradingError::Internal(msg)),
        };

        let jobs = students
            .into_iter()
            .map(|upload| self.grade_one(Arc::clone(&key_answers), upload, options.clone()));
        let sheets: Vec<SheetOutcome> = join_all(jobs).await;
        let summary = BatchSummary::from_outcomes(&sheets);

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            event = "grading.request.done",
            request_id = %request_id,
            questions = key_answers.len(),
            total = summary.total,
            graded = summary.graded,
            passed = summary.passed,
            elapsed_ms
        );

        Ok(GradingReport {
            request_id,
            strategy: self.strategy_name(),
            pass_threshold: options.pass_threshold,
            elapsed_ms,
            batch: BatchReport {
                key: Arc::unwrap_or_clone(key_answers),
                sheets,
                summary,
            },
        })
    }

    async fn grade_one(
        &self,
        key: Arc<AnswerMap>,
        upload: SheetUpload,
        options: GradingOptions,
    ) -> SheetOutcome {
        let processor = Arc::clone(&self.processor);
        let name = upload.name.clone();
        let result = self
            .run_blocking(move || {
                let sheet = NamedSheet {
                    name: &upload.name,
                    raw: RawImage::new(&upload.bytes),
                };
                grade_student(&processor, &key, &sheet, &options)
            })
            .await;
        match result {
            Ok(outcome) => outcome,
            Err(RunError::Timeout) => {
                warn!(event = "grading.sheet.timeout", sheet = %name);
                SheetOutcome::timeout(name, self.sheet_timeout.as_secs())
            }
            Err(RunError::Failed(msg)) => SheetOutcome::failed(name, SheetStatus::Failed, msg),
        }
    }

    fn options_with(&self, pass_threshold: Option<f64>) -> Result<GradingOptions, GradingError> {
        let mut options = self.grading.clone();
        if let Some(threshold) = pass_threshold {
            if !threshold.is_finite() || !(0.0..=100.0).contains(&threshold) {
                return Err(ScoreError::InvalidThreshold(threshold).into());
            }
            options.pass_threshold = threshold;
        }
        Ok(options)
    }

    /// 获取并发许可后在阻塞线程池中执行；许可随任务结束释放
    async fn run_blocking<T, F>(&self, job: F) -> Result<T, RunError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|e| RunError::Failed(format!("semaphore closed: {}", e)))?;
        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        });
        match tokio::time::timeout(self.sheet_timeout, handle).await {
            Err(_) => Err(RunError::Timeout),
            Ok(Err(join_err)) => Err(RunError::Failed(join_err.to_string())),
            Ok(Ok(value)) => Ok(value),
        }
    }
}
