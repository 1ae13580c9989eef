//! 图像规范化：解码、方向校正、纠偏、二值化、去噪
//! 输出灰度图与同尺寸掩码（255 = 墨迹，0 = 背景）

use crate::config::NormalizeConfig;
use crate::error::DetectionError;
use crate::strategy::DetectionStrategy;
use image::codecs::jpeg::JpegDecoder;
use image::metadata::Orientation;
use image::{DynamicImage, GrayImage, ImageDecoder, ImageFormat, Luma};
use imageproc::contrast::otsu_level;
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use imageproc::hough::{detect_lines, LineDetectionOptions};
use imageproc::morphology::{close, open};
use std::io::Cursor;
use tracing::debug;

pub const INK: u8 = 255;
pub const BACKGROUND: u8 = 0;

const SKEW_BLUR_SIGMA: f32 = 2.0;
const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;
const MIN_LINE_VOTES: f32 = 60.0;
const LINE_VOTE_RATIO: f32 = 0.3;

/// 调用方提供的原始图片字节（流水线不保留）
#[derive(Debug, Clone, Copy)]
pub struct RawImage<'a> {
    bytes: &'a [u8],
    format: Option<ImageFormat>,
}

impl<'a> RawImage<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            format: None,
        }
    }

    /// 调用方已知格式时使用（例如来自上传文件的扩展名）
    pub fn with_format(bytes: &'a [u8], format: ImageFormat) -> Self {
        Self {
            bytes,
            format: Some(format),
        }
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn declared_format(&self) -> Option<ImageFormat> {
        self.format
    }
}

impl<'a> From<&'a [u8]> for RawImage<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        RawImage::new(bytes)
    }
}

/// 规范化后的工作图像
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    gray: GrayImage,
    mask: GrayImage,
    skew_degrees: f32,
}

impl NormalizedImage {
    pub fn from_parts(gray: GrayImage, mask: GrayImage) -> Result<Self, DetectionError> {
        if gray.dimensions() != mask.dimensions() {
            return Err(DetectionError::InvalidDimensions {
                width: mask.width(),
                height: mask.height(),
                reason: format!(
                    "掩码尺寸与灰度图 {}x{} 不一致",
                    gray.width(),
                    gray.height()
                ),
            });
        }
        Ok(Self {
            gray,
            mask,
            skew_degrees: 0.0,
        })
    }

    pub fn gray(&self) -> &GrayImage {
        &self.gray
    }

    pub fn mask(&self) -> &GrayImage {
        &self.mask
    }

    pub fn width(&self) -> u32 {
        self.mask.width()
    }

    pub fn height(&self) -> u32 {
        self.mask.height()
    }

    /// 已纠正的倾斜角度（度）
    pub fn skew_degrees(&self) -> f32 {
        self.skew_degrees
    }

    /// 统计矩形内的墨迹像素，超出图像的部分忽略
    pub fn count_set(&self, x: u32, y: u32, width: u32, height: u32) -> u64 {
        let x_end = x.saturating_add(width).min(self.width());
        let y_end = y.saturating_add(height).min(self.height());
        let mut count = 0u64;
        for py in y.min(y_end)..y_end {
            for px in x.min(x_end)..x_end {
                if self.mask.get_pixel(px, py).0[0] == INK {
                    count += 1;
                }
            }
        }
        count
    }
}

/// 完整规范化流程：解码 → 灰度 → 纠偏 → 策略二值化 → 开闭运算
pub fn normalize(
    raw: &RawImage<'_>,
    config: &NormalizeConfig,
    strategy: &dyn DetectionStrategy,
) -> Result<NormalizedImage, DetectionError> {
    let gray = decode_gray(raw, config)?;
    normalize_gray(gray, config, strategy)
}

/// 从已解码的灰度图开始规范化
pub fn normalize_gray(
    gray: GrayImage,
    config: &NormalizeConfig,
    strategy: &dyn DetectionStrategy,
) -> Result<NormalizedImage, DetectionError> {
    check_dimensions(gray.width(), gray.height(), config)?;

    let (gray, skew_degrees) = if config.deskew {
        deskew(gray, config)
    } else {
        (gray, 0.0)
    };

    let mask = strategy.binarize(&gray, config);
    let mask = denoise(&mask, config.morph_radius);
    debug!(
        event = "omr.normalize.done",
        width = mask.width(),
        height = mask.height(),
        skew_degrees,
        strategy = strategy.kind().as_str()
    );

    Ok(NormalizedImage {
        gray,
        mask,
        skew_degrees,
    })
}

/// 解码并转换为灰度图
pub fn decode_gray(raw: &RawImage<'_>, config: &NormalizeConfig) -> Result<GrayImage, DetectionError> {
    let bytes = raw.bytes();
    let format = match raw.declared_format() {
        Some(format) => format,
        None => image::guess_format(bytes)
            .map_err(|e| DetectionError::UnsupportedFormat(format!("无法识别格式: {}", e)))?,
    };
    if !matches!(
        format,
        ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::Bmp | ImageFormat::Tiff
    ) {
        return Err(DetectionError::UnsupportedFormat(format!("{:?}", format)));
    }

    let mut image = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| DetectionError::ImageDecode(e.to_string()))?;

    if let Some(orientation) = read_orientation(bytes, format) {
        image.apply_orientation(orientation);
    }

    check_dimensions(image.width(), image.height(), config)?;
    Ok(to_gray(image))
}

fn to_gray(image: DynamicImage) -> GrayImage {
    match image {
        DynamicImage::ImageLuma8(gray) => gray,
        other => other.to_luma8(),
    }
}

fn read_orientation(bytes: &[u8], format: ImageFormat) -> Option<Orientation> {
    match format {
        ImageFormat::Jpeg => {
            let cursor = Cursor::new(bytes);
            let mut decoder = JpegDecoder::new(cursor).ok()?;
            decoder
                .orientation()
                .ok()
                .filter(|orientation| *orientation != Orientation::NoTransforms)
        }
        _ => None,
    }
}

pub fn check_dimensions(width: u32, height: u32, config: &NormalizeConfig) -> Result<(), DetectionError> {
    let invalid = |reason: String| DetectionError::InvalidDimensions {
        width,
        height,
        reason,
    };
    if width == 0 || height == 0 {
        return Err(invalid("空图片".to_string()));
    }
    if width < config.min_dimension || height < config.min_dimension {
        return Err(invalid(format!("小于最小边长 {}", config.min_dimension)));
    }
    let pixels = width as u64 * height as u64;
    if pixels > config.max_pixels {
        return Err(invalid(format!("像素总数超过上限 {}", config.max_pixels)));
    }
    Ok(())
}

/// 估计答题卡倾斜角（度，正值表示向右下倾斜）
///
/// 只统计与水平方向夹角不超过 `max_skew_degrees` 的直线，
/// 取中位数以抵抗少量误检。
pub fn estimate_skew(gray: &GrayImage, config: &NormalizeConfig) -> Option<f32> {
    let blurred = gaussian_blur_f32(gray, SKEW_BLUR_SIGMA);
    let edges = canny(&blurred, CANNY_LOW, CANNY_HIGH);
    let vote_threshold = (gray.width() as f32 * LINE_VOTE_RATIO).max(MIN_LINE_VOTES) as u32;
    let lines = detect_lines(
        &edges,
        LineDetectionOptions {
            vote_threshold,
            suppression_radius: 8,
        },
    );

    // 水平线的法线角为 90°
    let mut angles: Vec<f32> = lines
        .iter()
        .map(|line| line.angle_in_degrees as f32 - 90.0)
        .filter(|angle| angle.abs() <= config.max_skew_degrees)
        .collect();
    debug!(
        event = "omr.skew.lines",
        total = lines.len(),
        horizontal = angles.len(),
        vote_threshold
    );
    if angles.is_empty() {
        return None;
    }
    angles.sort_by(|a, b| a.total_cmp(b));
    Some(angles[angles.len() / 2])
}

/// 纠偏；返回图像及实际旋转的角度
pub fn deskew(gray: GrayImage, config: &NormalizeConfig) -> (GrayImage, f32) {
    let Some(skew) = estimate_skew(&gray, config) else {
        return (gray, 0.0);
    };
    if skew.abs() < config.min_skew_degrees {
        return (gray, 0.0);
    }
    // rotate_about_center 顺时针旋转，向右下倾斜需要逆时针转回
    let rotated = rotate_about_center(
        &gray,
        (-skew).to_radians(),
        Interpolation::Bilinear,
        Luma([255u8]),
    );
    debug!(event = "omr.skew.corrected", skew_degrees = skew);
    (rotated, skew)
}

/// 局部均值自适应二值化：比窗口均值暗 `offset` 以上的像素记为墨迹
pub fn adaptive_binarize(gray: &GrayImage, block_radius: u32, offset: i32) -> GrayImage {
    let (width, height) = gray.dimensions();
    let integral = IntegralImage::new(gray);
    let mut mask = GrayImage::new(width, height);

    for y in 0..height {
        for x in 0..width {
            let mean = integral.window_mean(x, y, block_radius);
            let threshold = mean as i64 - offset as i64;
            let value = gray.get_pixel(x, y).0[0] as i64;
            let out = if value < threshold { INK } else { BACKGROUND };
            mask.put_pixel(x, y, Luma([out]));
        }
    }
    mask
}

/// 全局二值化：不高于 `level` 的像素记为墨迹；`level` 为 None 时使用 Otsu 阈值
///
/// Otsu 返回的是暗类的上界，因此比较必须包含等号。
pub fn global_binarize(gray: &GrayImage, level: Option<u8>) -> GrayImage {
    let level = level.unwrap_or_else(|| otsu_level(gray));
    let (width, height) = gray.dimensions();
    let mut mask = GrayImage::new(width, height);
    for (x, y, pixel) in gray.enumerate_pixels() {
        let out = if pixel.0[0] <= level { INK } else { BACKGROUND };
        mask.put_pixel(x, y, Luma([out]));
    }
    mask
}

/// 开运算去除噪点，闭运算填补涂卡缺口
pub fn denoise(mask: &GrayImage, radius: u8) -> GrayImage {
    if radius == 0 {
        return mask.clone();
    }
    let opened = open(mask, Norm::LInf, radius);
    close(&opened, Norm::LInf, radius)
}

/// 积分图（面积和表），尺寸为 (w+1) x (h+1)，首行首列为 0
struct IntegralImage {
    table: Vec<u64>,
    width: u32,
    height: u32,
}

impl IntegralImage {
    fn new(gray: &GrayImage) -> Self {
        let (width, height) = gray.dimensions();
        let stride = width as usize + 1;
        let mut table = vec![0u64; stride * (height as usize + 1)];
        for y in 0..height as usize {
            let mut row_sum = 0u64;
            for x in 0..width as usize {
                row_sum += gray.get_pixel(x as u32, y as u32).0[0] as u64;
                table[(y + 1) * stride + x + 1] = row_sum + table[y * stride + x + 1];
            }
        }
        Self {
            table,
            width,
            height,
        }
    }

    fn window_mean(&self, cx: u32, cy: u32, radius: u32) -> u64 {
        let x0 = cx.saturating_sub(radius) as usize;
        let y0 = cy.saturating_sub(radius) as usize;
        let x1 = (cx.saturating_add(radius) + 1).min(self.width) as usize;
        let y1 = (cy.saturating_add(radius) + 1).min(self.height) as usize;
        let stride = self.width as usize + 1;
        let sum = self.table[y1 * stride + x1] + self.table[y0 * stride + x0]
            - self.table[y0 * stride + x1]
            - self.table[y1 * stride + x0];
        let area = ((x1 - x0) * (y1 - y0)) as u64;
        sum / area.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::AdaptiveStrategy;
    use crate::test_support::{encode, SheetBuilder};

    #[test]
    fn test_unsupported_bytes() {
        let bytes = b"definitely not an image";
        let err = decode_gray(&RawImage::new(bytes), &NormalizeConfig::default()).unwrap_err();
        assert_eq!(err.kind(), "unsupported_format");
    }

    #[test]
    fn test_gif_is_rejected() {
        let gif = b"GIF89a\x20\x00\x20\x00\x00\x00\x00;";
        let err = decode_gray(&RawImage::new(gif), &NormalizeConfig::default()).unwrap_err();
        assert_eq!(err.kind(), "unsupported_format");
    }

    #[test]
    fn test_truncated_png_fails_decode() {
        let png = encode(&GrayImage::from_pixel(64, 64, Luma([200])), ImageFormat::Png);
        let truncated = &png[..png.len() / 2];
        let err = decode_gray(&RawImage::new(truncated), &NormalizeConfig::default()).unwrap_err();
        assert_eq!(err.kind(), "image_decode");
    }

    #[test]
    fn test_zero_sized_image() {
        let strategy = AdaptiveStrategy::default();
        let err = normalize_gray(GrayImage::new(0, 0), &NormalizeConfig::default(), &strategy)
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_dimensions");
    }

    #[test]
    fn test_tiny_image_rejected() {
        let err = check_dimensions(8, 200, &NormalizeConfig::default()).unwrap_err();
        assert!(matches!(err, DetectionError::InvalidDimensions { width: 8, .. }));
    }

    #[test]
    fn test_blank_image_has_empty_mask() {
        let strategy = AdaptiveStrategy::default();
        let white = GrayImage::from_pixel(120, 80, Luma([255]));
        let normalized = normalize_gray(white, &NormalizeConfig::default(), &strategy).unwrap();
        assert_eq!(normalized.count_set(0, 0, 120, 80), 0);
        assert_eq!(normalized.skew_degrees(), 0.0);
    }

    #[test]
    fn test_adaptive_binarize_marks_dark_disc() {
        let sheet = SheetBuilder::new(200, 120).row(60, &[true]).render();
        let mask = adaptive_binarize(&sheet, 25, 10);
        assert_eq!(mask.get_pixel(60, 60).0[0], INK);
        assert_eq!(mask.get_pixel(5, 5).0[0], BACKGROUND);
    }

    #[test]
    fn test_global_binarize_uses_level() {
        let mut gray = GrayImage::from_pixel(20, 20, Luma([230]));
        gray.put_pixel(3, 3, Luma([20]));
        let mask = global_binarize(&gray, Some(128));
        assert_eq!(mask.get_pixel(3, 3).0[0], INK);
        assert_eq!(mask.get_pixel(4, 4).0[0], BACKGROUND);
    }

    #[test]
    fn test_global_binarize_two_tone_otsu() {
        let mut gray = GrayImage::from_pixel(40, 40, Luma([255]));
        for y in 10..20 {
            for x in 10..20 {
                gray.put_pixel(x, y, Luma([0]));
            }
        }
        assert_eq!(otsu_level(&gray), 0);
        let mask = global_binarize(&gray, None);
        assert_eq!(mask.get_pixel(15, 15).0[0], INK);
        assert_eq!(mask.get_pixel(30, 30).0[0], BACKGROUND);
        let set = mask.pixels().filter(|p| p.0[0] == INK).count();
        assert_eq!(set, 100);
    }

    #[test]
    fn test_global_binarize_level_is_inclusive() {
        let mut gray = GrayImage::from_pixel(4, 1, Luma([200]));
        gray.put_pixel(0, 0, Luma([99]));
        gray.put_pixel(1, 0, Luma([100]));
        gray.put_pixel(2, 0, Luma([101]));
        let mask = global_binarize(&gray, Some(100));
        assert_eq!(mask.get_pixel(0, 0).0[0], INK);
        assert_eq!(mask.get_pixel(1, 0).0[0], INK);
        assert_eq!(mask.get_pixel(2, 0).0[0], BACKGROUND);
    }

    #[test]
    fn test_denoise_removes_speckle() {
        let mut mask = GrayImage::new(40, 40);
        mask.put_pixel(10, 10, Luma([INK]));
        let cleaned = denoise(&mask, 1);
        assert_eq!(cleaned.get_pixel(10, 10).0[0], BACKGROUND);
    }

    #[test]
    fn test_straight_sheet_is_not_rotated() {
        let mut gray = GrayImage::from_pixel(300, 200, Luma([255]));
        for x in 10..290 {
            for y in 50..53 {
                gray.put_pixel(x, y, Luma([0]));
            }
            for y in 140..143 {
                gray.put_pixel(x, y, Luma([0]));
            }
        }
        let (out, skew) = deskew(gray.clone(), &NormalizeConfig::default());
        assert_eq!(skew, 0.0);
        assert_eq!(out, gray);
    }

    fn ruled_sheet() -> GrayImage {
        let mut gray = GrayImage::from_pixel(400, 400, Luma([255]));
        for x in 80..320 {
            for y in (160..163).chain(240..243) {
                gray.put_pixel(x, y, Luma([0]));
            }
        }
        gray
    }

    fn tilted(gray: &GrayImage, degrees: f32) -> GrayImage {
        rotate_about_center(gray, degrees.to_radians(), Interpolation::Bilinear, Luma([255]))
    }

    #[test]
    fn test_tilted_sheet_is_corrected() {
        let config = NormalizeConfig::default();
        let sheet = tilted(&ruled_sheet(), 4.0);

        let estimated = estimate_skew(&sheet, &config).unwrap();
        assert!((estimated - 4.0).abs() <= 1.0, "estimated {}", estimated);

        let (corrected, applied) = deskew(sheet, &config);
        assert_eq!(applied, estimated);
        let residual = estimate_skew(&corrected, &config).unwrap_or(0.0);
        assert!(residual.abs() <= 1.0, "residual {}", residual);
    }

    #[test]
    fn test_skew_beyond_limit_is_ignored() {
        let sheet = tilted(&ruled_sheet(), 30.0);

        let wide = NormalizeConfig::default();
        let estimated = estimate_skew(&sheet, &wide).unwrap();
        assert!((estimated - 30.0).abs() <= 1.0, "estimated {}", estimated);

        let narrow = NormalizeConfig {
            max_skew_degrees: 10.0,
            ..NormalizeConfig::default()
        };
        assert_eq!(estimate_skew(&sheet, &narrow), None);
        let (out, applied) = deskew(sheet.clone(), &narrow);
        assert_eq!(applied, 0.0);
        assert_eq!(out, sheet);
    }

    #[test]
    fn test_skew_below_gate_is_not_applied() {
        let sheet = tilted(&ruled_sheet(), 4.0);
        let config = NormalizeConfig {
            min_skew_degrees: 10.0,
            ..NormalizeConfig::default()
        };
        let (out, applied) = deskew(sheet.clone(), &config);
        assert_eq!(applied, 0.0);
        assert_eq!(out, sheet);
    }

    #[test]
    fn test_mismatched_parts() {
        let err = NormalizedImage::from_parts(GrayImage::new(10, 10), GrayImage::new(10, 11))
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_dimensions");
    }
}
