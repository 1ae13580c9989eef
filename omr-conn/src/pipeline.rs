//! 单张答题卡识别流水线
//!
//! 规范化 → 气泡定位 → 行聚类 → 填涂判定 → 答案表
//! 每次调用相互独立，不保留任何跨调用状态。

use crate::answer::AnswerMap;
use crate::classify::RowDecision;
use crate::config::DetectionConfig;
use crate::error::DetectionError;
use crate::group::group_rows;
use crate::locate::locate_bubbles;
use crate::preprocess::{normalize, normalize_gray, NormalizedImage, RawImage};
use crate::strategy::{strategy_for, DetectionStrategy};
use image::GrayImage;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info};

/// 识别过程的诊断信息
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SheetStats {
    pub width: u32,
    pub height: u32,
    pub skew_degrees: f32,
    pub candidates: usize,
    pub rows: usize,
    pub dropped_rows: usize,
    /// 同一行有多个气泡达到判定条件的题号
    pub multi_marked: Vec<u32>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetReport {
    pub answers: AnswerMap,
    pub stats: SheetStats,
}

/// 持有配置与策略的处理器，可在线程间共享
pub struct SheetProcessor {
    config: DetectionConfig,
    strategy: Box<dyn DetectionStrategy>,
}

impl SheetProcessor {
    pub fn new(config: DetectionConfig) -> Self {
        let strategy = strategy_for(&config);
        Self { config, strategy }
    }

    /// 使用自定义策略
    pub fn with_strategy(config: DetectionConfig, strategy: Box<dyn DetectionStrategy>) -> Self {
        Self { config, strategy }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn strategy(&self) -> &dyn DetectionStrategy {
        self.strategy.as_ref()
    }

    pub fn process(&self, raw: &RawImage<'_>) -> Result<SheetReport, DetectionError> {
        let started = Instant::now();
        let normalized = normalize(raw, &self.config.normalize, self.strategy.as_ref())?;
        Ok(self.detect(&normalized, started))
    }

    /// 跳过解码，直接处理灰度图
    pub fn process_gray(&self, gray: GrayImage) -> Result<SheetReport, DetectionError> {
        let started = Instant::now();
        let normalized = normalize_gray(gray, &self.config.normalize, self.strategy.as_ref())?;
        Ok(self.detect(&normalized, started))
    }

    /// 定位之后的阶段不会失败：无候选或无有效行时得到空答案表
    fn detect(&self, normalized: &NormalizedImage, started: Instant) -> SheetReport {
        let candidates = locate_bubbles(normalized, &self.config.locate);
        let grouped = group_rows(&candidates, &self.config.group);

        let decisions: Vec<RowDecision> = grouped
            .rows
            .iter()
            .map(|row| self.strategy.classify(row))
            .collect();
        for (index, decision) in decisions.iter().enumerate() {
            debug!(
                event = "omr.classify.row",
                question = index + 1,
                selected = ?decision.selected,
                max_fill = decision.max_fill,
                mean_fill = decision.mean_fill
            );
        }

        let multi_marked = decisions
            .iter()
            .enumerate()
            .filter(|(_, decision)| decision.is_multi_marked())
            .map(|(index, _)| index as u32 + 1)
            .collect();
        let answers = AnswerMap::from_decisions(&decisions);

        let stats = SheetStats {
            width: normalized.width(),
            height: normalized.height(),
            skew_degrees: normalized.skew_degrees(),
            candidates: candidates.len(),
            rows: grouped.rows.len(),
            dropped_rows: grouped.dropped,
            multi_marked,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            event = "omr.sheet.processed",
            strategy = self.strategy.kind().as_str(),
            questions = answers.len(),
            answered = answers.answered(),
            candidates = stats.candidates,
            dropped_rows = stats.dropped_rows,
            elapsed_ms = stats.elapsed_ms
        );

        SheetReport { answers, stats }
    }
}

impl std::fmt::Debug for SheetProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SheetProcessor")
            .field("config", &self.config)
            .field("strategy", &self.strategy.kind())
            .finish()
    }
}

/// 识别一张答题卡，返回答案表
pub fn process_sheet(raw: &RawImage<'_>, config: &DetectionConfig) -> Result<AnswerMap, DetectionError> {
    SheetProcessor::new(config.clone())
        .process(raw)
        .map(|report| report.answers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyKind;
    use crate::test_support::{answer_sheet, answer_sheet_png, encode, test_config, SheetBuilder};
    use image::{ImageFormat, Luma};

    #[test]
    fn test_blank_sheet_yields_empty_map() {
        let white = encode(&GrayImage::from_pixel(300, 300, Luma([255])), ImageFormat::Png);
        let answers = process_sheet(&RawImage::new(&white), &test_config()).unwrap();
        assert!(answers.is_empty());
    }

    #[test]
    fn test_reads_marked_sheet() {
        let png = answer_sheet_png(&[Some(0), Some(2), None, Some(3), Some(1)], 4);
        let answers = process_sheet(&RawImage::new(&png), &test_config()).unwrap();
        let expected: AnswerMap = vec![
            (1, Some('A')),
            (2, Some('C')),
            (3, None),
            (4, Some('D')),
            (5, Some('B')),
        ]
        .into_iter()
        .collect();
        assert_eq!(answers, expected);
    }

    #[test]
    fn test_identical_bytes_identical_answers() {
        let png = answer_sheet_png(&[Some(1), Some(1), Some(0)], 5);
        let config = test_config();
        let first = process_sheet(&RawImage::new(&png), &config).unwrap();
        let second = process_sheet(&RawImage::new(&png), &config).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_lone_bubble_row_is_skipped() {
        let sheet = SheetBuilder::new(360, 220)
            .row(50, &[false, true, false, false])
            .row(100, &[true])
            .row(150, &[false, false, false, true])
            .render();
        let report = SheetProcessor::new(test_config()).process_gray(sheet).unwrap();
        assert_eq!(report.stats.dropped_rows, 1);
        assert_eq!(report.answers.len(), 2);
        assert_eq!(report.answers.get(1), Some(Some('B')));
        assert_eq!(report.answers.get(2), Some(Some('D')));
    }

    #[test]
    fn test_fixed_threshold_strategy() {
        let mut config = test_config();
        config.strategy = StrategyKind::FixedThreshold;
        let processor = SheetProcessor::new(config);
        assert_eq!(processor.strategy().kind(), StrategyKind::FixedThreshold);
        let report = processor
            .process_gray(answer_sheet(&[Some(2), None, Some(0)], 4))
            .unwrap();
        assert_eq!(report.answers.get(1), Some(Some('C')));
        assert_eq!(report.answers.get(2), Some(None));
        assert_eq!(report.answers.get(3), Some(Some('A')));
    }

    fn draw_border(sheet: &mut GrayImage, thickness: u32) {
        let (width, height) = sheet.dimensions();
        for y in 0..height {
            for x in 0..width {
                let edge = x < thickness
                    || y < thickness
                    || x >= width - thickness
                    || y >= height - thickness;
                if edge {
                    sheet.put_pixel(x, y, Luma([0]));
                }
            }
        }
    }

    #[test]
    fn test_framed_sheet_is_read() {
        let mut sheet = answer_sheet(&[Some(0), Some(2), Some(3)], 4);
        draw_border(&mut sheet, 3);
        let report = SheetProcessor::new(test_config()).process_gray(sheet).unwrap();
        assert_eq!(report.answers.len(), 3);
        assert_eq!(report.answers.get(1), Some(Some('A')));
        assert_eq!(report.answers.get(2), Some(Some('C')));
        assert_eq!(report.answers.get(3), Some(Some('D')));
    }

    #[test]
    fn test_framed_sheet_with_fixed_threshold() {
        let mut config = test_config();
        config.strategy = StrategyKind::FixedThreshold;
        let mut sheet = answer_sheet(&[Some(1), None], 4);
        draw_border(&mut sheet, 3);
        let report = SheetProcessor::new(config).process_gray(sheet).unwrap();
        assert_eq!(report.answers.get(1), Some(Some('B')));
        assert_eq!(report.answers.get(2), Some(None));
    }

    #[test]
    fn test_stats_report_candidates() {
        let report = SheetProcessor::new(test_config())
            .process_gray(answer_sheet(&[Some(0), Some(1)], 4))
            .unwrap();
        assert_eq!(report.stats.candidates, 8);
        assert_eq!(report.stats.rows, 2);
        assert!(report.stats.multi_marked.is_empty());
    }

    #[test]
    fn test_undecodable_bytes_error() {
        let err = process_sheet(&RawImage::new(b"not an image"), &test_config()).unwrap_err();
        assert_eq!(err.kind(), "unsupported_format");
    }
}
