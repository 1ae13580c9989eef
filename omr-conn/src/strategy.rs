//! 可替换的识别策略
//!
//! 各策略共享同一条流水线，只在二值化方式与填涂判定上不同，
//! 由配置 `strategy` 选择。

use crate::classify::{classify_fixed, classify_relative, RowDecision};
use crate::config::{ClassifyConfig, DetectionConfig, NormalizeConfig, StrategyKind};
use crate::group::QuestionRow;
use crate::preprocess::{adaptive_binarize, global_binarize};
use image::GrayImage;

pub trait DetectionStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// 灰度图 → 掩码（255 = 墨迹）
    fn binarize(&self, gray: &GrayImage, config: &NormalizeConfig) -> GrayImage;

    /// 单行填涂判定
    fn classify(&self, row: &QuestionRow) -> RowDecision;
}

/// 自适应二值化 + 相对判定（默认）
#[derive(Debug, Clone, Default)]
pub struct AdaptiveStrategy {
    pub classify: ClassifyConfig,
}

impl DetectionStrategy for AdaptiveStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Adaptive
    }

    fn binarize(&self, gray: &GrayImage, config: &NormalizeConfig) -> GrayImage {
        adaptive_binarize(gray, config.block_radius, config.threshold_offset)
    }

    fn classify(&self, row: &QuestionRow) -> RowDecision {
        classify_relative(row, &self.classify)
    }
}

/// Otsu 全局二值化 + 固定填充率阈值
#[derive(Debug, Clone)]
pub struct FixedThresholdStrategy {
    pub fill_threshold: f64,
}

impl DetectionStrategy for FixedThresholdStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::FixedThreshold
    }

    fn binarize(&self, gray: &GrayImage, _config: &NormalizeConfig) -> GrayImage {
        global_binarize(gray, None)
    }

    fn classify(&self, row: &QuestionRow) -> RowDecision {
        classify_fixed(row, self.fill_threshold)
    }
}

/// 根据配置构建策略
pub fn strategy_for(config: &DetectionConfig) -> Box<dyn DetectionStrategy> {
    match config.strategy {
        StrategyKind::Adaptive => Box::new(AdaptiveStrategy {
            classify: config.classify.clone(),
        }),
        StrategyKind::FixedThreshold => Box::new(FixedThresholdStrategy {
            fill_threshold: config.fixed_threshold.fill_threshold,
        }),
    }
}
