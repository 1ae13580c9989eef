//! 行聚类：按纵向中心把气泡归入题目行，行内按横向位置排序

use crate::config::GroupConfig;
use crate::locate::BubbleRegion;
use serde::Serialize;
use tracing::{debug, warn};

/// 单行可表示的最多选项数（A-Z）
pub const MAX_OPTIONS: usize = 26;

/// 一道题的选项气泡，下标 0 对应 A
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionRow {
    bubbles: Vec<BubbleRegion>,
}

impl QuestionRow {
    /// 少于两个气泡或超过 26 个时不构成选择题
    pub fn new(mut bubbles: Vec<BubbleRegion>) -> Option<Self> {
        if bubbles.len() < 2 || bubbles.len() > MAX_OPTIONS {
            return None;
        }
        bubbles.sort_by(|a, b| {
            a.center_x()
                .total_cmp(&b.center_x())
                .then(a.center_y().total_cmp(&b.center_y()))
        });
        Some(Self { bubbles })
    }

    pub fn bubbles(&self) -> &[BubbleRegion] {
        &self.bubbles
    }

    pub fn len(&self) -> usize {
        self.bubbles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bubbles.is_empty()
    }

    pub fn fill_ratios(&self) -> impl Iterator<Item = f64> + '_ {
        self.bubbles.iter().map(|b| b.fill_ratio)
    }
}

/// 选项下标转字母
pub fn option_letter(index: usize) -> Option<char> {
    (index < MAX_OPTIONS).then(|| (b'A' + index as u8) as char)
}

/// 分组结果，同时保留被丢弃行的数量
#[derive(Debug, Clone, Default)]
pub struct GroupedRows {
    pub rows: Vec<QuestionRow>,
    pub dropped: usize,
}

/// 自上而下聚类成题目行
pub fn group_rows(candidates: &[BubbleRegion], config: &GroupConfig) -> GroupedRows {
    let mut sorted = candidates.to_vec();
    sorted.sort_by(|a, b| {
        a.center_y()
            .total_cmp(&b.center_y())
            .then(a.center_x().total_cmp(&b.center_x()))
    });

    // (参考中心, 成员)
    let mut open_rows: Vec<(f64, Vec<BubbleRegion>)> = Vec::new();
    for bubble in sorted {
        let cy = bubble.center_y();
        let joins = open_rows
            .last()
            .is_some_and(|(reference, _)| (cy - reference).abs() <= config.row_vertical_tolerance);
        if joins {
            if let Some((_, members)) = open_rows.last_mut() {
                members.push(bubble);
                continue;
            }
        }
        open_rows.push((cy, vec![bubble]));
    }

    let mut grouped = GroupedRows::default();
    for (reference, members) in open_rows {
        let count = members.len();
        match QuestionRow::new(members) {
            Some(row) => grouped.rows.push(row),
            None => {
                if count > MAX_OPTIONS {
                    warn!(
                        event = "omr.group.row_too_wide",
                        center_y = reference,
                        bubbles = count
                    );
                }
                grouped.dropped += 1;
            }
        }
    }

    debug!(
        event = "omr.group.done",
        rows = grouped.rows.len(),
        dropped = grouped.dropped
    );
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bubble(cx: u32, cy: u32) -> BubbleRegion {
        BubbleRegion::new(cx - 10, cy - 10, 20, 20, 0.3)
    }

    #[test]
    fn test_rows_sorted_top_to_bottom_left_to_right() {
        let candidates = vec![
            bubble(200, 100),
            bubble(60, 52),
            bubble(120, 100),
            bubble(120, 48),
            bubble(60, 101),
        ];
        let grouped = group_rows(&candidates, &GroupConfig::default());
        assert_eq!(grouped.rows.len(), 2);
        let first: Vec<f64> = grouped.rows[0].bubbles().iter().map(|b| b.center_x()).collect();
        assert_eq!(first, vec![60.0, 120.0]);
        let second: Vec<f64> = grouped.rows[1].bubbles().iter().map(|b| b.center_x()).collect();
        assert_eq!(second, vec![60.0, 120.0, 200.0]);
    }

    #[test]
    fn test_single_bubble_row_dropped() {
        let candidates = vec![bubble(60, 50), bubble(120, 50), bubble(60, 100), bubble(60, 150), bubble(120, 150)];
        let grouped = group_rows(&candidates, &GroupConfig::default());
        assert_eq!(grouped.rows.len(), 2);
        assert_eq!(grouped.dropped, 1);
        assert!((grouped.rows[1].bubbles()[0].center_y() - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_tolerance_splits_rows() {
        let candidates = vec![bubble(60, 50), bubble(120, 50), bubble(60, 70), bubble(120, 70)];
        let tight = GroupConfig {
            row_vertical_tolerance: 5.0,
        };
        assert_eq!(group_rows(&candidates, &tight).rows.len(), 2);
        let loose = GroupConfig {
            row_vertical_tolerance: 25.0,
        };
        let grouped = group_rows(&candidates, &loose);
        assert_eq!(grouped.rows.len(), 1);
        assert_eq!(grouped.rows[0].len(), 4);
    }

    #[test]
    fn test_empty_input() {
        let grouped = group_rows(&[], &GroupConfig::default());
        assert!(grouped.rows.is_empty());
        assert_eq!(grouped.dropped, 0);
    }

    #[test]
    fn test_option_letters() {
        assert_eq!(option_letter(0), Some('A'));
        assert_eq!(option_letter(3), Some('D'));
        assert_eq!(option_letter(26), None);
    }
}
