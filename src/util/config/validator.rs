//! 配置验证模块
//! 提供配置的验证、检查和诊断功能

use super::types::*;
use omr_conn::config::{ClassifyConfig, GroupConfig, LocateConfig, NormalizeConfig};
use omr_conn::{DetectionConfig, GradingOptions, StrategyKind};

/// 配置验证器
pub struct ConfigValidator;

impl ConfigValidator {
    /// 全面验证配置
    pub fn validate_all(config: &Config) -> ValidationReport {
        let mut report = ValidationReport::new();

        Self::validate_server_config(&config.server, &mut report);
        Self::validate_logging_config(&config.logging, &mut report);
        Self::validate_detection_config(&config.omr, &mut report);
        Self::validate_grading_config(&config.grading, &mut report);
        Self::validate_limits_config(&config.limits, &mut report);

        report
    }

    fn validate_server_config(config: &ServerConfig, report: &mut ValidationReport) {
        if config.port == 0 {
            report.add_error("server.port", &format!("无效的端口号: {}", config.port));
        }
        if config.host.trim().is_empty() {
            report.add_error("server.host", "监听地址不能为空");
        }
    }

    fn validate_logging_config(config: &LoggingConfig, report: &mut ValidationReport) {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.level.to_lowercase().as_str()) {
            report.add_error("logging.level", &format!("无效的日志级别: {}", config.level));
        }

        if config.file.enabled && config.file.retention_days == Some(0) {
            report.add_warning("logging.file.retention_days", "日志保留天数为0，日志将不会被清理");
        }
    }

    fn validate_detection_config(config: &DetectionConfig, report: &mut ValidationReport) {
        Self::validate_normalize(&config.normalize, report);
        Self::validate_locate(&config.locate, report);
        Self::validate_group(&config.group, report);
        Self::validate_classify(&config.classify, report);

        let threshold = config.fixed_threshold.fill_threshold;
        if !(threshold > 0.0 && threshold < 1.0) {
            report.add_error(
                "omr.fixed_threshold.fill_threshold",
                &format!("固定填涂阈值必须在 (0, 1) 之间: {}", threshold),
            );
        }
        if config.strategy == StrategyKind::FixedThreshold {
            report.add_info("omr.strategy", "使用固定阈值策略，对扫描亮度较敏感");
        }
    }

    fn validate_normalize(config: &NormalizeConfig, report: &mut ValidationReport) {
        if config.block_radius == 0 {
            report.add_error("omr.normalize.block_radius", "自适应窗口半径必须大于0");
        }
        if config.min_dimension == 0 {
            report.add_error("omr.normalize.min_dimension", "最小边长必须大于0");
        }
        if config.max_pixels == 0 {
            report.add_error("omr.normalize.max_pixels", "像素上限必须大于0");
        }
        if config.deskew && !(0.0..=90.0).contains(&config.max_skew_degrees) {
            report.add_error(
                "omr.normalize.max_skew_degrees",
                &format!("纠偏角度上限必须在 0-90 之间: {}", config.max_skew_degrees),
            );
        }
        if config.morph_radius > 3 {
            report.add_warning(
                "omr.normalize.morph_radius",
                "形态学半径过大，细线气泡轮廓可能被腐蚀",
            );
        }
    }

    fn validate_locate(config: &LocateConfig, report: &mut ValidationReport) {
        if config.min_bubble_area <= 0.0 {
            report.add_error("omr.locate.min_bubble_area", "最小气泡面积必须大于0");
        }
        if config.max_bubble_area <= config.min_bubble_area {
            report.add_error(
                "omr.locate.max_bubble_area",
                &format!(
                    "最大气泡面积 {} 必须大于最小气泡面积 {}",
                    config.max_bubble_area, config.min_bubble_area
                ),
            );
        }
        if config.aspect_ratio_tolerance <= 0.0 {
            report.add_error("omr.locate.aspect_ratio_tolerance", "宽高比容差必须大于0");
        }
    }

    fn validate_group(config: &GroupConfig, report: &mut ValidationReport) {
        if config.row_vertical_tolerance <= 0.0 {
            report.add_error("omr.group.row_vertical_tolerance", "行纵向容差必须大于0");
        }
    }

    fn validate_classify(config: &ClassifyConfig, report: &mut ValidationReport) {
        if !(config.fill_floor > 0.0 && config.fill_floor < 1.0) {
            report.add_error(
                "omr.classify.fill_floor",
                &format!("填充率下限必须在 (0, 1) 之间: {}", config.fill_floor),
            );
        }
        if config.fill_relative_multiplier < 1.0 {
            report.add_error(
                "omr.classify.fill_relative_multiplier",
                &format!("相对倍数不能小于1: {}", config.fill_relative_multiplier),
            );
        }
    }

    fn validate_grading_config(config: &GradingOptions, report: &mut ValidationReport) {
        if !config.pass_threshold.is_finite() || !(0.0..=100.0).contains(&config.pass_threshold) {
            report.add_error(
                "grading.pass_threshold",
                &format!("及格线必须在 0-100 之间: {}", config.pass_threshold),
            );
        }
        if !config.strict_row_count {
            report.add_info(
                "grading.strict_row_count",
                "已关闭题目数量校验，缺失的题目按答错计分",
            );
        }
    }

    fn validate_limits_config(config: &LimitsConfig, report: &mut ValidationReport) {
        if config.max_upload_mb == 0 {
            report.add_error("limits.max_upload_mb", "上传上限必须大于0");
        }
        if config.max_sheets_per_request == 0 {
            report.add_error("limits.max_sheets_per_request", "单次答题卡数量上限必须大于0");
        }
        if config.max_concurrent_sheets == 0 {
            report.add_error("limits.max_concurrent_sheets", "并发处理数必须大于0");
        } else if config.max_concurrent_sheets > num_cpus::get() * 4 {
            report.add_warning(
                "limits.max_concurrent_sheets",
                &format!(
                    "并发处理数 {} 远超 CPU 核数 {}",
                    config.max_concurrent_sheets,
                    num_cpus::get()
                ),
            );
        }
        if config.sheet_timeout_secs == 0 {
            report.add_error("limits.sheet_timeout_secs", "单张处理时限必须大于0");
        }
        if config.request_timeout_secs < config.sheet_timeout_secs {
            report.add_warning(
                "limits.request_timeout_secs",
                "请求总时限小于单张处理时限，评分请求可能在出结果前被中断",
            );
        }
    }
}

/// 验证报告
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub info: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, field: &str, message: &str) {
        self.errors.push(ValidationIssue {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    pub fn add_warning(&mut self, field: &str, message: &str) {
        self.warnings.push(ValidationIssue {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    pub fn add_info(&mut self, field: &str, message: &str) {
        self.info.push(ValidationIssue {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn is_valid(&self) -> bool {
        !self.has_errors()
    }

    /// 出错的字段名
    pub fn error_fields(&self) -> Vec<&str> {
        self.errors.iter().map(|issue| issue.field.as_str()).collect()
    }
}

/// 验证问题
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let report = ConfigValidator::validate_all(&Config::default());
        assert!(report.is_valid(), "{:?}", report.errors);
    }

    #[test]
    fn test_detects_bad_values() {
        let mut config = Config::default();
        config.server.port = 0;
        config.omr.locate.min_bubble_area = 800.0;
        config.omr.locate.max_bubble_area = 400.0;
        config.omr.classify.fill_floor = 1.5;
        config.omr.classify.fill_relative_multiplier = 0.8;
        config.grading.pass_threshold = 120.0;
        config.limits.sheet_timeout_secs = 0;

        let report = ConfigValidator::validate_all(&config);
        let fields = report.error_fields();
        for field in [
            "server.port",
            "omr.locate.max_bubble_area",
            "omr.classify.fill_floor",
            "omr.classify.fill_relative_multiplier",
            "grading.pass_threshold",
            "limits.sheet_timeout_secs",
        ] {
            assert!(fields.contains(&field), "missing {}", field);
        }
    }

    #[test]
    fn test_lenient_grading_is_informational() {
        let mut config = Config::default();
        config.grading.strict_row_count = false;
        let report = ConfigValidator::validate_all(&config);
        assert!(report.is_valid());
        assert!(report
            .info
            .iter()
            .any(|issue| issue.field == "grading.strict_row_count"));
    }
}
