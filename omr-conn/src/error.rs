use thiserror::Error;

/// 单张答题卡识别失败的原因（仅影响当前答题卡）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DetectionError {
    #[error("不支持的图片格式: {0}")]
    UnsupportedFormat(String),
    #[error("图片解码失败: {0}")]
    ImageDecode(String),
    #[error("图片尺寸无效: {width}x{height} ({reason})")]
    InvalidDimensions {
        width: u32,
        height: u32,
        reason: String,
    },
}

impl DetectionError {
    /// 稳定的错误码，供调用方区分"坏图片"
    pub fn kind(&self) -> &'static str {
        match self {
            DetectionError::UnsupportedFormat(_) => "unsupported_format",
            DetectionError::ImageDecode(_) => "image_decode",
            DetectionError::InvalidDimensions { .. } => "invalid_dimensions",
        }
    }
}

/// 评分失败的原因（仅影响当前评分调用）
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoreError {
    #[error("标准答案为空，无法评分")]
    EmptyKey,
    #[error("题目数量不一致: 标准答案 {key} 题, 学生答题卡 {student} 题")]
    RowCountMismatch { key: usize, student: usize },
    #[error("及格线必须在 0-100 之间: {0}")]
    InvalidThreshold(f64),
}

impl ScoreError {
    pub fn kind(&self) -> &'static str {
        match self {
            ScoreError::EmptyKey => "empty_key",
            ScoreError::RowCountMismatch { .. } => "row_count_mismatch",
            ScoreError::InvalidThreshold(_) => "invalid_threshold",
        }
    }
}

/// 标准答案卡无法使用，整批评分随之失败
#[derive(Debug, Clone, PartialEq, Error)]
pub enum KeySheetError {
    #[error("标准答案卡无法识别: {0}")]
    BadImage(#[from] DetectionError),
    #[error("标准答案卡未识别出任何题目")]
    Empty,
}

impl KeySheetError {
    pub fn kind(&self) -> &'static str {
        match self {
            KeySheetError::BadImage(_) => "bad_key_image",
            KeySheetError::Empty => "empty_key",
        }
    }
}
