//! 识别参数定义
//! 所有阈值均由调用方显式传入，引擎本身不持有任何全局配置

use serde::{Deserialize, Serialize};

/// 识别策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// 局部均值自适应二值化 + 行内相对填涂判定
    #[default]
    Adaptive,
    /// 全局 Otsu 二值化 + 固定填涂阈值
    FixedThreshold,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Adaptive => "adaptive",
            StrategyKind::FixedThreshold => "fixed_threshold",
        }
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "adaptive" => Ok(StrategyKind::Adaptive),
            "fixed_threshold" | "fixed" => Ok(StrategyKind::FixedThreshold),
            other => Err(format!("未知的识别策略: {}", other)),
        }
    }
}

/// 识别总配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DetectionConfig {
    #[serde(default)]
    pub strategy: StrategyKind,
    #[serde(default)]
    pub normalize: NormalizeConfig,
    #[serde(default)]
    pub locate: LocateConfig,
    #[serde(default)]
    pub group: GroupConfig,
    #[serde(default)]
    pub classify: ClassifyConfig,
    #[serde(default)]
    pub fixed_threshold: FixedThresholdConfig,
}

/// 图像规范化参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizeConfig {
    #[serde(default = "default_deskew")]
    pub deskew: bool,
    /// 纠偏角度上限（度），超过视为非答题卡倾斜
    #[serde(default = "default_max_skew_degrees")]
    pub max_skew_degrees: f32,
    /// 小于该角度不旋转
    #[serde(default = "default_min_skew_degrees")]
    pub min_skew_degrees: f32,
    /// 自适应阈值的局部窗口半径（像素）
    #[serde(default = "default_block_radius")]
    pub block_radius: u32,
    /// 像素需比局部均值暗多少才记为墨迹
    #[serde(default = "default_threshold_offset")]
    pub threshold_offset: i32,
    /// 开/闭运算半径，0 表示关闭
    #[serde(default = "default_morph_radius")]
    pub morph_radius: u8,
    #[serde(default = "default_min_dimension")]
    pub min_dimension: u32,
    #[serde(default = "default_max_pixels")]
    pub max_pixels: u64,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            deskew: default_deskew(),
            max_skew_degrees: default_max_skew_degrees(),
            min_skew_degrees: default_min_skew_degrees(),
            block_radius: default_block_radius(),
            threshold_offset: default_threshold_offset(),
            morph_radius: default_morph_radius(),
            min_dimension: default_min_dimension(),
            max_pixels: default_max_pixels(),
        }
    }
}

fn default_deskew() -> bool {
    true
}

fn default_max_skew_degrees() -> f32 {
    45.0
}

fn default_min_skew_degrees() -> f32 {
    0.5
}

fn default_block_radius() -> u32 {
    25
}

fn default_threshold_offset() -> i32 {
    10
}

fn default_morph_radius() -> u8 {
    1
}

fn default_min_dimension() -> u32 {
    16
}

fn default_max_pixels() -> u64 {
    25_000_000 // ~25MP, 5000x5000
}

/// 候选气泡过滤参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocateConfig {
    #[serde(default = "default_min_bubble_area")]
    pub min_bubble_area: f64,
    #[serde(default = "default_max_bubble_area")]
    pub max_bubble_area: f64,
    /// 宽高比允许偏离 1.0 的幅度
    #[serde(default = "default_aspect_ratio_tolerance")]
    pub aspect_ratio_tolerance: f64,
}

impl Default for LocateConfig {
    fn default() -> Self {
        Self {
            min_bubble_area: default_min_bubble_area(),
            max_bubble_area: default_max_bubble_area(),
            aspect_ratio_tolerance: default_aspect_ratio_tolerance(),
        }
    }
}

fn default_min_bubble_area() -> f64 {
    100.0
}

fn default_max_bubble_area() -> f64 {
    5000.0
}

fn default_aspect_ratio_tolerance() -> f64 {
    0.25
}

/// 行聚类参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    #[serde(default = "default_row_vertical_tolerance")]
    pub row_vertical_tolerance: f64,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            row_vertical_tolerance: default_row_vertical_tolerance(),
        }
    }
}

fn default_row_vertical_tolerance() -> f64 {
    12.0
}

/// 相对填涂判定参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifyConfig {
    /// 任何气泡被判为"已涂"的最低填充率
    #[serde(default = "default_fill_floor")]
    pub fill_floor: f64,
    /// 最大填充率需超过行均值的倍数
    #[serde(default = "default_fill_relative_multiplier")]
    pub fill_relative_multiplier: f64,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            fill_floor: default_fill_floor(),
            fill_relative_multiplier: default_fill_relative_multiplier(),
        }
    }
}

fn default_fill_floor() -> f64 {
    0.5
}

fn default_fill_relative_multiplier() -> f64 {
    1.2
}

/// 固定阈值策略参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedThresholdConfig {
    #[serde(default = "default_fixed_fill_threshold")]
    pub fill_threshold: f64,
}

impl Default for FixedThresholdConfig {
    fn default() -> Self {
        Self {
            fill_threshold: default_fixed_fill_threshold(),
        }
    }
}

fn default_fixed_fill_threshold() -> f64 {
    0.6
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let json = r#"{"strategy":"fixed_threshold","classify":{"fill_floor":0.4}}"#;
        let config: DetectionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.strategy, StrategyKind::FixedThreshold);
        assert_eq!(config.classify.fill_floor, 0.4);
        assert_eq!(config.classify.fill_relative_multiplier, 1.2);
        assert_eq!(config.locate, LocateConfig::default());
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("Adaptive".parse::<StrategyKind>(), Ok(StrategyKind::Adaptive));
        assert_eq!(
            "fixed-threshold".parse::<StrategyKind>(),
            Ok(StrategyKind::FixedThreshold)
        );
        assert!("ocr".parse::<StrategyKind>().is_err());
    }
}
