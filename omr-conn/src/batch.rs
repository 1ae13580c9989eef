//! 批量评分：一张标准答案卡 + 多张学生答题卡
//!
//! 学生答题卡之间互不影响，在 rayon 线程池上逐张并行处理；
//! 单张失败只体现在该张的结果状态中。

use crate::answer::AnswerMap;
use crate::config::DetectionConfig;
use crate::error::{KeySheetError, ScoreError};
use crate::pipeline::{SheetProcessor, SheetStats};
use crate::preprocess::RawImage;
use crate::score::{score_sheet, score_sheet_checked, ScoreResult};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// 评分选项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingOptions {
    /// 及格线（百分比）
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: f64,
    /// 题目数量不一致时拒绝评分
    #[serde(default = "default_strict_row_count")]
    pub strict_row_count: bool,
}

impl Default for GradingOptions {
    fn default() -> Self {
        Self {
            pass_threshold: default_pass_threshold(),
            strict_row_count: default_strict_row_count(),
        }
    }
}

fn default_pass_threshold() -> f64 {
    60.0
}

fn default_strict_row_count() -> bool {
    true
}

/// 待评分的学生答题卡
#[derive(Debug, Clone, Copy)]
pub struct NamedSheet<'a> {
    pub name: &'a str,
    pub raw: RawImage<'a>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SheetStatus {
    Graded,
    /// 识别成功但没有任何题目被填涂
    NoMarks,
    BadImage,
    RowCountMismatch,
    /// 调用方设置的处理时限已到
    Timeout,
    Failed,
}

impl SheetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SheetStatus::Graded => "graded",
            SheetStatus::NoMarks => "no_marks",
            SheetStatus::BadImage => "bad_image",
            SheetStatus::RowCountMismatch => "row_count_mismatch",
            SheetStatus::Timeout => "timeout",
            SheetStatus::Failed => "failed",
        }
    }
}

/// 单张学生答题卡的评分结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetOutcome {
    pub name: String,
    pub status: SheetStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<ScoreResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answers: Option<AnswerMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<SheetStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SheetOutcome {
    pub fn failed(name: impl Into<String>, status: SheetStatus, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            score: None,
            answers: None,
            stats: None,
            error: Some(error.into()),
        }
    }

    pub fn timeout(name: impl Into<String>, secs: u64) -> Self {
        Self::failed(name, SheetStatus::Timeout, format!("处理超时 ({}s)", secs))
    }

    pub fn passed(&self) -> bool {
        self.score.as_ref().is_some_and(|score| score.passed)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub graded: usize,
    pub passed: usize,
    pub failed: usize,
    /// 已评分答题卡的平均百分比
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_percentage: Option<f64>,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[SheetOutcome]) -> Self {
        let scores: Vec<&ScoreResult> = outcomes.iter().filter_map(|o| o.score.as_ref()).collect();
        let average_percentage = (!scores.is_empty()).then(|| {
            let sum: f64 = scores.iter().map(|score| score.percentage).sum();
            (sum / scores.len() as f64 * 100.0).round() / 100.0
        });
        Self {
            total: outcomes.len(),
            graded: scores.len(),
            passed: outcomes.iter().filter(|o| o.passed()).count(),
            failed: outcomes.len() - scores.len(),
            average_percentage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub key: AnswerMap,
    pub sheets: Vec<SheetOutcome>,
    pub summary: BatchSummary,
}

/// 识别标准答案卡；识别不出任何题目时视为不可用
pub fn read_key(processor: &SheetProcessor, raw: &RawImage<'_>) -> Result<AnswerMap, KeySheetError> {
    let report = processor.process(raw)?;
    if report.answers.is_empty() {
        return Err(KeySheetError::Empty);
    }
    Ok(report.answers)
}

/// 识别并评分一张学生答题卡
pub fn grade_student(
    processor: &SheetProcessor,
    key: &AnswerMap,
    sheet: &NamedSheet<'_>,
    options: &GradingOptions,
) -> SheetOutcome {
    let report = match processor.process(&sheet.raw) {
        Ok(report) => report,
        Err(e) => {
            warn!(event = "omr.grade.bad_image", sheet = sheet.name, kind = e.kind(), error = %e);
            return SheetOutcome::failed(sheet.name, SheetStatus::BadImage, e.to_string());
        }
    };

    let (status, scored) = if report.answers.answered() == 0 {
        (
            SheetStatus::NoMarks,
            score_sheet(key, &report.answers, options.pass_threshold),
        )
    } else {
        (
            SheetStatus::Graded,
            score_sheet_checked(
                key,
                &report.answers,
                options.pass_threshold,
                options.strict_row_count,
            ),
        )
    };

    match scored {
        Ok(score) => SheetOutcome {
            name: sheet.name.to_string(),
            status,
            score: Some(score),
            answers: Some(report.answers),
            stats: Some(report.stats),
            error: None,
        },
        Err(e) => {
            let status = match e {
                ScoreError::RowCountMismatch { .. } => SheetStatus::RowCountMismatch,
                _ => SheetStatus::Failed,
            };
            warn!(event = "omr.grade.score_failed", sheet = sheet.name, kind = e.kind(), error = %e);
            SheetOutcome {
                name: sheet.name.to_string(),
                status,
                score: None,
                answers: Some(report.answers),
                stats: Some(report.stats),
                error: Some(e.to_string()),
            }
        }
    }
}

/// 批量评分；结果顺序与输入顺序一致
pub fn grade_batch(
    key: &RawImage<'_>,
    students: &[NamedSheet<'_>],
    config: &DetectionConfig,
    options: &GradingOptions,
) -> Result<BatchReport, KeySheetError> {
    let processor = SheetProcessor::new(config.clone());
    let key_answers = read_key(&processor, key)?;

    let sheets: Vec<SheetOutcome> = students
        .par_iter()
        .map(|sheet| grade_student(&processor, &key_answers, sheet, options))
        .collect();
    let summary = BatchSummary::from_outcomes(&sheets);
    info!(
        event = "omr.batch.done",
        questions = key_answers.len(),
        total = summary.total,
        graded = summary.graded,
        passed = summary.passed
    );

    Ok(BatchReport {
        key: key_answers,
        sheets,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{answer_sheet_png, test_config};

    fn named<'a>(name: &'a str, bytes: &'a [u8]) -> NamedSheet<'a> {
        NamedSheet {
            name,
            raw: RawImage::new(bytes),
        }
    }

    #[test]
    fn test_grades_each_sheet_independently() {
        let key = answer_sheet_png(&[Some(0), Some(1), Some(2)], 4);
        let good = answer_sheet_png(&[Some(0), Some(1), Some(2)], 4);
        let partial = answer_sheet_png(&[Some(0), Some(2), Some(2)], 4);
        let blank = answer_sheet_png(&[None, None, None], 4);
        let broken = b"broken".to_vec();

        let students = [
            named("good", &good),
            named("partial", &partial),
            named("blank", &blank),
            named("broken", &broken),
        ];
        let report = grade_batch(
            &RawImage::new(&key),
            &students,
            &test_config(),
            &GradingOptions::default(),
        )
        .unwrap();

        assert_eq!(report.key.len(), 3);
        let statuses: Vec<SheetStatus> = report.sheets.iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![
                SheetStatus::Graded,
                SheetStatus::Graded,
                SheetStatus::NoMarks,
                SheetStatus::BadImage
            ]
        );
        assert_eq!(report.sheets[0].score.as_ref().unwrap().percentage, 100.0);
        assert_eq!(report.sheets[1].score.as_ref().unwrap().percentage, 66.67);
        assert_eq!(report.sheets[2].score.as_ref().unwrap().correct_count, 0);
        assert_eq!(report.summary.total, 4);
        assert_eq!(report.summary.graded, 3);
        assert_eq!(report.summary.passed, 2);
        assert_eq!(report.summary.failed, 1);
    }

    #[test]
    fn test_row_count_mismatch_status() {
        let key = answer_sheet_png(&[Some(0), Some(1), Some(2)], 4);
        let short = answer_sheet_png(&[Some(0), Some(1)], 4);
        let students = [named("short", &short)];

        let strict = grade_batch(
            &RawImage::new(&key),
            &students,
            &test_config(),
            &GradingOptions::default(),
        )
        .unwrap();
        assert_eq!(strict.sheets[0].status, SheetStatus::RowCountMismatch);
        assert!(strict.sheets[0].score.is_none());

        let lenient = GradingOptions {
            strict_row_count: false,
            ..GradingOptions::default()
        };
        let report = grade_batch(&RawImage::new(&key), &students, &test_config(), &lenient).unwrap();
        assert_eq!(report.sheets[0].status, SheetStatus::Graded);
        assert_eq!(report.sheets[0].score.as_ref().unwrap().correct_count, 2);
    }

    #[test]
    fn test_unreadable_key_fails_batch() {
        let student = answer_sheet_png(&[Some(0)], 4);
        let err = grade_batch(
            &RawImage::new(b"nope"),
            &[named("s", &student)],
            &test_config(),
            &GradingOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "bad_key_image");
    }

    #[test]
    fn test_blank_key_is_empty() {
        let blank = crate::test_support::encode(
            &image::GrayImage::from_pixel(200, 200, image::Luma([255])),
            image::ImageFormat::Png,
        );
        let err = grade_batch(
            &RawImage::new(&blank),
            &[],
            &test_config(),
            &GradingOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err, KeySheetError::Empty);
    }
}
