//! 测试用合成答题卡

use crate::config::DetectionConfig;
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use std::io::Cursor;

pub const BUBBLE_RADIUS: u32 = 12;
pub const RING_INNER_RADIUS: u32 = 8;
pub const FIRST_X: u32 = 60;
pub const SPACING_X: u32 = 60;
pub const FIRST_Y: u32 = 50;
pub const SPACING_Y: u32 = 50;

/// 白底黑圈的答题卡绘制器
pub struct SheetBuilder {
    width: u32,
    height: u32,
    bubbles: Vec<(u32, u32, bool)>,
}

impl SheetBuilder {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bubbles: Vec::new(),
        }
    }

    /// 在纵坐标 `y` 处画一行气泡，`filled[i]` 表示第 i 个选项是否涂黑
    pub fn row(self, y: u32, filled: &[bool]) -> Self {
        self.row_at(y, FIRST_X, filled)
    }

    pub fn row_at(mut self, y: u32, first_x: u32, filled: &[bool]) -> Self {
        for (i, &is_filled) in filled.iter().enumerate() {
            self.bubbles
                .push((first_x + i as u32 * SPACING_X, y, is_filled));
        }
        self
    }

    pub fn render(&self) -> GrayImage {
        let mut image = GrayImage::from_pixel(self.width, self.height, Luma([255]));
        for &(cx, cy, filled) in &self.bubbles {
            let inner = if filled { 0 } else { RING_INNER_RADIUS };
            paint_ring(&mut image, cx, cy, BUBBLE_RADIUS, inner);
        }
        image
    }
}

/// 按题目生成整张答题卡：`marks[q]` 为第 q 题涂黑的选项下标
pub fn answer_sheet(marks: &[Option<usize>], options: usize) -> GrayImage {
    let width = FIRST_X * 2 + SPACING_X * options as u32;
    let height = FIRST_Y + SPACING_Y * marks.len() as u32;
    let mut builder = SheetBuilder::new(width, height);
    for (q, mark) in marks.iter().enumerate() {
        let filled: Vec<bool> = (0..options).map(|i| Some(i) == *mark).collect();
        builder = builder.row(FIRST_Y + q as u32 * SPACING_Y, &filled);
    }
    builder.render()
}

pub fn encode(image: &GrayImage, format: ImageFormat) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(image.clone())
        .write_to(&mut cursor, format)
        .unwrap();
    cursor.into_inner()
}

pub fn answer_sheet_png(marks: &[Option<usize>], options: usize) -> Vec<u8> {
    encode(&answer_sheet(marks, options), ImageFormat::Png)
}

/// 合成图不含长直线，关闭纠偏以保证测试确定性
pub fn test_config() -> DetectionConfig {
    let mut config = DetectionConfig::default();
    config.normalize.deskew = false;
    config
}

fn paint_ring(image: &mut GrayImage, cx: u32, cy: u32, outer: u32, inner: u32) {
    let outer_sq = (outer * outer) as i64;
    let inner_sq = (inner * inner) as i64;
    let r = outer as i64;
    for dy in -r..=r {
        for dx in -r..=r {
            let d2 = dx * dx + dy * dy;
            if d2 > outer_sq || (inner > 0 && d2 < inner_sq) {
                continue;
            }
            let x = cx as i64 + dx;
            let y = cy as i64 + dy;
            if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
                image.put_pixel(x as u32, y as u32, Luma([0]));
            }
        }
    }
}
