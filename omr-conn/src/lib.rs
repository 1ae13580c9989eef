//! 答题卡光学识别（OMR）引擎
//!
//! 输入一张扫描或拍摄的答题卡图片，输出题号 → 选项字母的答案表，
//! 并提供与标准答案比对评分的能力。

pub mod answer;
pub mod batch;
pub mod classify;
pub mod config;
pub mod error;
pub mod group;
pub mod locate;
pub mod pipeline;
pub mod preprocess;
pub mod score;
pub mod strategy;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use answer::AnswerMap;
pub use batch::{grade_batch, grade_student, read_key, BatchReport, BatchSummary, GradingOptions, NamedSheet, SheetOutcome, SheetStatus};
pub use config::{DetectionConfig, StrategyKind};
pub use error::{DetectionError, KeySheetError, ScoreError};
pub use pipeline::{process_sheet, SheetProcessor, SheetReport, SheetStats};
pub use preprocess::RawImage;
pub use score::{score_sheet, score_sheet_checked, ScoreResult};
pub use strategy::{AdaptiveStrategy, DetectionStrategy, FixedThresholdStrategy};
