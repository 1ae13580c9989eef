//! 配置加载和管理模块
//! 处理配置文件的读取、写入、环境变量覆盖

use super::types::*;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// 配置加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 从YAML文件读取配置
    pub fn read_yaml(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        let config = serde_yaml::from_str(&config_str)
            .with_context(|| format!("解析配置文件失败: {}", path.display()))?;
        Ok(config)
    }

    /// 从进程环境变量读取配置覆盖
    pub fn apply_env_overrides(config: Config) -> Config {
        Self::apply_overrides_from(config, |key| std::env::var(key).ok())
    }

    /// 按给定的变量查找函数应用覆盖；无法解析的值保留原配置并告警
    pub fn apply_overrides_from<F>(mut config: Config, lookup: F) -> Config
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("OMR_HOST") {
            tracing::info!(event = "config.env_override", key = "OMR_HOST", value = %host);
            config.server.host = host;
        }

        if let Some(port_str) = lookup("OMR_PORT") {
            match port_str.trim().parse::<u16>() {
                Ok(port) => {
                    config.server.port = port;
                    tracing::info!(event = "config.env_override", key = "OMR_PORT", value = port);
                }
                Err(_) => tracing::warn!(
                    event = "config.env_override_invalid",
                    key = "OMR_PORT",
                    value = %port_str
                ),
            }
        }

        if let Some(level) = lookup("OMR_LOG_LEVEL") {
            tracing::info!(event = "config.env_override", key = "OMR_LOG_LEVEL", value = %level);
            config.logging.level = level.trim().to_lowercase();
        }

        if let Some(strategy) = lookup("OMR_STRATEGY") {
            match strategy.parse() {
                Ok(kind) => {
                    config.omr.strategy = kind;
                    tracing::info!(
                        event = "config.env_override",
                        key = "OMR_STRATEGY",
                        value = config.omr.strategy.as_str()
                    );
                }
                Err(e) => tracing::warn!(
                    event = "config.env_override_invalid",
                    key = "OMR_STRATEGY",
                    error = %e
                ),
            }
        }

        if let Some(threshold) = lookup("OMR_PASS_THRESHOLD") {
            match threshold.trim().parse::<f64>() {
                Ok(value) => {
                    config.grading.pass_threshold = value;
                    tracing::info!(
                        event = "config.env_override",
                        key = "OMR_PASS_THRESHOLD",
                        value
                    );
                }
                Err(_) => tracing::warn!(
                    event = "config.env_override_invalid",
                    key = "OMR_PASS_THRESHOLD",
                    value = %threshold
                ),
            }
        }

        if let Some(max) = lookup("OMR_MAX_CONCURRENT") {
            match max.trim().parse::<usize>() {
                Ok(value) => {
                    config.limits.max_concurrent_sheets = value;
                    tracing::info!(
                        event = "config.env_override",
                        key = "OMR_MAX_CONCURRENT",
                        value
                    );
                }
                Err(_) => tracing::warn!(
                    event = "config.env_override_invalid",
                    key = "OMR_MAX_CONCURRENT",
                    value = %max
                ),
            }
        }

        config
    }

    /// 智能配置加载（配置文件 + 环境变量）
    pub fn load_with_env_overrides(path: impl AsRef<Path>) -> Result<Config> {
        let base_config = Self::read_yaml(path)?;
        let config = Self::apply_env_overrides(base_config);
        tracing::debug!(event = "config.load.merged");
        Ok(config)
    }
}

/// 配置写入器
pub struct ConfigWriter;

impl ConfigWriter {
    /// 将配置写入YAML文件
    pub fn write_yaml(config: &Config, path: impl AsRef<Path>) -> Result<()> {
        let yaml_content = serde_yaml::to_string(config)?;
        fs::write(path, yaml_content)?;
        Ok(())
    }

    /// 写入配置到指定路径，确保目录存在
    pub fn write_yaml_with_dir(config: &Config, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::write_yaml(config, path)
            .with_context(|| format!("写入配置文件失败: {}", path.display()))
    }

    /// 生成配置模板
    pub fn generate_template() -> Config {
        Config::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omr_conn::StrategyKind;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "server:\n  port: 9100\nomr:\n  classify:\n    fill_floor: 0.45\n",
        )
        .unwrap();

        let config = ConfigLoader::read_yaml(&path).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.omr.classify.fill_floor, 0.45);
        assert_eq!(config.omr.classify.fill_relative_multiplier, 1.2);
        assert_eq!(config.grading.pass_threshold, 60.0);
        assert!(config.grading.strict_row_count);
    }

    #[test]
    fn test_template_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        let template = ConfigWriter::generate_template();
        ConfigWriter::write_yaml_with_dir(&template, &path).unwrap();
        assert_eq!(ConfigLoader::read_yaml(&path).unwrap(), template);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = ConfigLoader::read_yaml("/nonexistent/omr/config.yaml").unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/omr/config.yaml"));
    }

    #[test]
    fn test_env_overrides() {
        let lookup = lookup_from(&[
            ("OMR_HOST", "0.0.0.0"),
            ("OMR_PORT", "9000"),
            ("OMR_LOG_LEVEL", "DEBUG"),
            ("OMR_STRATEGY", "fixed_threshold"),
            ("OMR_PASS_THRESHOLD", "75"),
            ("OMR_MAX_CONCURRENT", "3"),
        ]);
        let config = ConfigLoader::apply_overrides_from(Config::default(), lookup);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.omr.strategy, StrategyKind::FixedThreshold);
        assert_eq!(config.grading.pass_threshold, 75.0);
        assert_eq!(config.limits.max_concurrent_sheets, 3);
    }

    #[test]
    fn test_invalid_env_values_are_ignored() {
        let lookup = lookup_from(&[("OMR_PORT", "not-a-port"), ("OMR_STRATEGY", "ocr")]);
        let config = ConfigLoader::apply_overrides_from(Config::default(), lookup);
        assert_eq!(config.server.port, 8964);
        assert_eq!(config.omr.strategy, StrategyKind::Adaptive);
    }

    #[test]
    fn test_example_config_matches_defaults() {
        let example: Config = serde_yaml::from_str(include_str!("../../../config.example.yaml")).unwrap();
        let defaults = Config::default();
        assert_eq!(example.server, defaults.server);
        assert_eq!(example.omr, defaults.omr);
        assert_eq!(example.grading, defaults.grading);
        assert_eq!(example.limits, defaults.limits);
    }
}
