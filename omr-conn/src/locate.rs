//! 气泡定位：追踪掩码外轮廓，按面积与宽高比过滤候选

use crate::config::LocateConfig;
use crate::preprocess::NormalizedImage;
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::point::Point;
use serde::Serialize;
use tracing::debug;

/// 候选气泡的外接矩形与填充率
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BubbleRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// 轮廓围成的面积（像素）
    pub area: f64,
    /// 矩形内墨迹像素占比 0.0-1.0
    pub fill_ratio: f64,
}

impl BubbleRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32, fill_ratio: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            area: width as f64 * height as f64,
            fill_ratio,
        }
    }

    pub fn center_x(&self) -> f64 {
        self.x as f64 + self.width as f64 / 2.0
    }

    pub fn center_y(&self) -> f64 {
        self.y as f64 + self.height as f64 / 2.0
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height.max(1) as f64
    }
}

/// 从规范化图像中找出所有候选气泡（按发现顺序）
pub fn locate_bubbles(image: &NormalizedImage, config: &LocateConfig) -> Vec<BubbleRegion> {
    let contours: Vec<Contour<u32>> = find_contours(image.mask());
    let mut outer = 0usize;

    let bubbles: Vec<BubbleRegion> = contours
        .iter()
        // 外轮廓不论嵌套层级都参与，印刷边框内的气泡也要保留
        .filter(|contour| contour.border_type == BorderType::Outer)
        .inspect(|_| outer += 1)
        .filter_map(|contour| {
            let (x, y, width, height) = contour_bounds(&contour.points)?;
            let area = polygon_area(&contour.points);
            if area < config.min_bubble_area || area > config.max_bubble_area {
                return None;
            }
            if !is_bubble_shaped(width, height, config.aspect_ratio_tolerance) {
                return None;
            }
            let set = image.count_set(x, y, width, height);
            Some(BubbleRegion {
                x,
                y,
                width,
                height,
                area,
                fill_ratio: set as f64 / (width as f64 * height as f64),
            })
        })
        .collect();
    let bubbles = drop_enclosed(bubbles);

    debug!(
        event = "omr.locate.done",
        contours = contours.len(),
        outer,
        candidates = bubbles.len()
    );
    bubbles
}

/// 去掉落在另一个候选框内部的候选（圆圈孔洞里的笔迹已计入外圈的填充率）
fn drop_enclosed(bubbles: Vec<BubbleRegion>) -> Vec<BubbleRegion> {
    bubbles
        .iter()
        .enumerate()
        .filter(|(i, inner)| {
            !bubbles
                .iter()
                .enumerate()
                .any(|(j, outer)| *i != j && encloses(outer, inner))
        })
        .map(|(_, bubble)| *bubble)
        .collect()
}

fn encloses(outer: &BubbleRegion, inner: &BubbleRegion) -> bool {
    outer.x <= inner.x
        && outer.y <= inner.y
        && outer.x + outer.width >= inner.x + inner.width
        && outer.y + outer.height >= inner.y + inner.height
        && outer.area > inner.area
}

/// 外接矩形宽高比是否足够接近正方形
pub fn is_bubble_shaped(width: u32, height: u32, tolerance: f64) -> bool {
    if width == 0 || height == 0 {
        return false;
    }
    let ratio = width as f64 / height as f64;
    (ratio - 1.0).abs() <= tolerance
}

fn contour_bounds(points: &[Point<u32>]) -> Option<(u32, u32, u32, u32)> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Some((min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
}

/// 鞋带公式
fn polygon_area(points: &[Point<u32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice = 0.0f64;
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        twice += p.x as f64 * q.y as f64 - q.x as f64 * p.y as f64;
    }
    twice.abs() / 2.0
}
