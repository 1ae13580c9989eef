//! 配置管理模块
//! 负责配置文件的查找、加载、验证以及日志初始化

use crate::util::config::{Config, ConfigLoader, ConfigValidator, ValidationReport};
use crate::util::log::{log_init_with_config, LogGuard};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const LOG_FILE_PREFIX: &str = "omr-server";

/// 配置管理器
pub struct ConfigManager;

impl ConfigManager {
    /// 加载和验证配置；配置文件不存在时生成默认模板
    pub fn load_and_validate() -> Result<(Config, PathBuf, ValidationReport)> {
        let config_path = Self::find_config_file_path("config.yaml");
        let config = Self::load_from_path(&config_path)?;
        let report = ConfigValidator::validate_all(&config);
        Ok((config, config_path, report))
    }

    /// 从指定路径加载（含环境变量覆盖）
    pub fn load_from_path(config_path: &Path) -> Result<Config> {
        if config_path.exists() {
            return ConfigLoader::load_with_env_overrides(config_path)
                .with_context(|| format!("配置文件解析失败: {}", config_path.display()));
        }

        let config = Config::default();
        if let Err(write_err) = config.write_yaml_to_path(config_path) {
            eprintln!(
                "[WARN] 创建默认配置文件失败: {} - {}",
                config_path.display(),
                write_err
            );
        } else {
            eprintln!("[INFO] 已创建默认配置文件: {}", config_path.display());
        }
        Ok(ConfigLoader::apply_env_overrides(config))
    }

    /// 初始化日志系统
    pub fn initialize_logging(config: &Config) -> Result<LogGuard> {
        let guard = log_init_with_config(LOG_FILE_PREFIX, &config.logging)?;
        info!(event = "log.ready", build = %crate::build_info::summary());
        Ok(guard)
    }

    /// 输出验证结果；存在错误时返回 Err
    pub fn report_validation(report: &ValidationReport) -> Result<()> {
        for issue in &report.info {
            info!(event = "config.validation.info", field = %issue.field, message = %issue.message);
        }
        for issue in &report.warnings {
            warn!(event = "config.validation.warning", field = %issue.field, message = %issue.message);
        }
        for issue in &report.errors {
            tracing::error!(event = "config.validation.error", field = %issue.field, message = %issue.message);
        }
        if report.has_errors() {
            anyhow::bail!("配置验证失败: {} 个错误", report.errors.len());
        }
        Ok(())
    }

    /// 智能查找配置文件路径，适应开发和生产环境
    pub fn find_config_file_path(filename: &str) -> PathBuf {
        let current_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|path| path.parent().map(Path::to_path_buf));
        Self::find_config_file_in(filename, &current_dir, exe_dir.as_deref())
    }

    /// 查找顺序：./config/ → ../config/ → <exe>/../config/ → ./
    pub fn find_config_file_in(filename: &str, current_dir: &Path, exe_dir: Option<&Path>) -> PathBuf {
        let config_in_current = current_dir.join("config").join(filename);
        if config_in_current.exists() {
            return config_in_current;
        }

        if let Some(parent) = current_dir.parent() {
            let config_in_parent = parent.join("config").join(filename);
            if config_in_parent.exists() {
                return config_in_parent;
            }
        }

        if let Some(project_root) = exe_dir.and_then(Path::parent) {
            let config_in_root = project_root.join("config").join(filename);
            if config_in_root.exists() {
                return config_in_root;
            }
        }

        let dev_path = current_dir.join(filename);
        if dev_path.exists() {
            return dev_path;
        }

        // 都不存在：在 bin 目录运行时指向上级的 config/，否则当前目录
        if current_dir.file_name() == Some(std::ffi::OsStr::new("bin")) {
            if let Some(parent) = current_dir.parent() {
                return parent.join("config").join(filename);
            }
        }
        dev_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_prefers_config_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("config")).unwrap();
        fs::write(dir.path().join("config/config.yaml"), "{}").unwrap();
        fs::write(dir.path().join("config.yaml"), "{}").unwrap();

        let found = ConfigManager::find_config_file_in("config.yaml", dir.path(), None);
        assert_eq!(found, dir.path().join("config").join("config.yaml"));
    }

    #[test]
    fn test_bin_directory_falls_back_to_parent_config() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        fs::create_dir_all(&bin).unwrap();

        let found = ConfigManager::find_config_file_in("config.yaml", &bin, Some(&bin));
        assert_eq!(found, dir.path().join("config").join("config.yaml"));
    }

    #[test]
    fn test_missing_file_writes_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config").join("config.yaml");
        let config = ConfigManager::load_from_path(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.server, Config::default().server);
    }

    #[test]
    fn test_broken_yaml_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "server: [unclosed").unwrap();
        assert!(ConfigManager::load_from_path(&path).is_err());
    }

    #[test]
    fn test_validation_errors_abort() {
        let mut config = Config::default();
        config.limits.max_concurrent_sheets = 0;
        let report = ConfigValidator::validate_all(&config);
        assert!(ConfigManager::report_validation(&report).is_err());
        let ok = ConfigValidator::validate_all(&Config::default());
        assert!(ConfigManager::report_validation(&ok).is_ok());
    }
}
