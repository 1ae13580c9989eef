//! 填涂判定
//!
//! 相对判定：行内最大填充率必须同时
//! 1. 严格大于绝对下限 `fill_floor`（整行未涂时不误判）
//! 2. 严格大于 `fill_relative_multiplier` × 行均值（印刷底色一致时不误判）
//!
//! 与扫描亮度无关：整行填充率同比例缩放时结论不变（只要仍高于下限）。
//! 完全相同的最大值取最左侧选项。

use crate::config::ClassifyConfig;
use crate::group::{option_letter, QuestionRow};
use serde::Serialize;

/// 单行判定结果
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RowDecision {
    pub selected: Option<char>,
    pub max_fill: f64,
    pub mean_fill: f64,
    /// 同时满足两项条件的气泡数，大于 1 表示疑似多涂
    pub marked_count: usize,
}

impl RowDecision {
    pub fn no_answer(max_fill: f64, mean_fill: f64) -> Self {
        Self {
            selected: None,
            max_fill,
            mean_fill,
            marked_count: 0,
        }
    }

    pub fn is_multi_marked(&self) -> bool {
        self.marked_count > 1
    }
}

/// 相对阈值判定
pub fn classify_relative(row: &QuestionRow, config: &ClassifyConfig) -> RowDecision {
    let Some((max_index, max_fill)) = leftmost_max(row) else {
        return RowDecision::no_answer(0.0, 0.0);
    };
    let mean_fill = row.fill_ratios().sum::<f64>() / row.len() as f64;
    let relative_floor = config.fill_relative_multiplier * mean_fill;
    let clears = |fill: f64| fill > config.fill_floor && fill > relative_floor;

    if !clears(max_fill) {
        return RowDecision::no_answer(max_fill, mean_fill);
    }
    RowDecision {
        selected: option_letter(max_index),
        max_fill,
        mean_fill,
        marked_count: row.fill_ratios().filter(|&fill| clears(fill)).count(),
    }
}

/// 固定阈值判定：填充率达到阈值即视为已涂，多个时取填充率最大者
pub fn classify_fixed(row: &QuestionRow, fill_threshold: f64) -> RowDecision {
    let Some((max_index, max_fill)) = leftmost_max(row) else {
        return RowDecision::no_answer(0.0, 0.0);
    };
    let mean_fill = row.fill_ratios().sum::<f64>() / row.len() as f64;
    if max_fill < fill_threshold {
        return RowDecision::no_answer(max_fill, mean_fill);
    }
    RowDecision {
        selected: option_letter(max_index),
        max_fill,
        mean_fill,
        marked_count: row.fill_ratios().filter(|&fill| fill >= fill_threshold).count(),
    }
}

/// 最大填充率及其下标；并列时保留最左侧
fn leftmost_max(row: &QuestionRow) -> Option<(usize, f64)> {
    row.fill_ratios()
        .enumerate()
        .fold(None, |best, (index, fill)| match best {
            Some((_, best_fill)) if fill <= best_fill => best,
            _ => Some((index, fill)),
        })
}
