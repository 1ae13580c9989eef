//! 配置结构定义模块
//! 包含系统配置的所有数据结构

use omr_conn::{DetectionConfig, GradingOptions};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 主配置结构
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// 识别参数，原样传给识别引擎
    #[serde(default)]
    pub omr: DetectionConfig,
    #[serde(default)]
    pub grading: GradingOptions,
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// 服务器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8964
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: LogFileConfig,
    /// 是否输出 JSON 结构化日志
    #[serde(default)]
    pub structured: Option<bool>,
    #[serde(default)]
    pub level_config: Option<LevelConfig>,
    #[serde(default)]
    pub enable_debug_file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: LogFileConfig::default(),
            structured: Some(false),
            level_config: None,
            enable_debug_file: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// 日志文件配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogFileConfig {
    #[serde(default = "default_log_file_enabled")]
    pub enabled: bool,
    #[serde(default = "default_log_directory")]
    pub directory: String,
    #[serde(default = "default_retention_days")]
    pub retention_days: Option<u32>,
}

impl Default for LogFileConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_file_enabled(),
            directory: default_log_directory(),
            retention_days: default_retention_days(),
        }
    }
}

fn default_log_file_enabled() -> bool {
    true
}

fn default_log_directory() -> String {
    "logs".to_string()
}

fn default_retention_days() -> Option<u32> {
    Some(7)
}

/// 日志级别配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LevelConfig {
    /// HTTP 接口层
    #[serde(default)]
    pub api: Option<String>,
    /// 识别引擎（omr_conn）
    #[serde(default)]
    pub engine: Option<String>,
    /// 服务启动、配置、评分服务
    #[serde(default)]
    pub system: Option<String>,
    /// 任意 target 的级别覆盖，如 `api.grading: debug`
    #[serde(default)]
    pub overrides: HashMap<String, String>,
}

/// 资源限制
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// 单次请求的上传体积上限（MB）
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
    /// 单次评分请求的学生答题卡上限
    #[serde(default = "default_max_sheets_per_request")]
    pub max_sheets_per_request: usize,
    /// 同时处理的答题卡数量，默认等于 CPU 核数
    #[serde(default = "default_max_concurrent_sheets")]
    pub max_concurrent_sheets: usize,
    /// 单张答题卡的处理时限（秒）
    #[serde(default = "default_sheet_timeout_secs")]
    pub sheet_timeout_secs: u64,
    /// 单个 HTTP 请求的总时限（秒）
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_upload_mb: default_max_upload_mb(),
            max_sheets_per_request: default_max_sheets_per_request(),
            max_concurrent_sheets: default_max_concurrent_sheets(),
            sheet_timeout_secs: default_sheet_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_max_upload_mb() -> usize {
    50
}

fn default_max_sheets_per_request() -> usize {
    100
}

fn default_max_concurrent_sheets() -> usize {
    num_cpus::get().max(1)
}

fn default_sheet_timeout_secs() -> u64 {
    30
}

fn default_request_timeout_secs() -> u64 {
    300
}

impl LimitsConfig {
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}
