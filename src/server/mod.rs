//! 服务器模块
//!
//! - 配置管理 (config.rs)
//! - HTTP服务器设置 (http.rs)

pub mod config;
pub mod http;

pub use config::ConfigManager;
pub use http::{HttpServer, ServerManager};

use crate::build_info;
use crate::util::config::{Config, ValidationReport};
use crate::util::log::LogGuard;
use crate::AppState;
use anyhow::Result;
use std::path::PathBuf;
use tracing::info;

/// 服务器引导程序 - 统一的服务器启动入口
pub struct ServerBootstrap {
    config: Config,
    config_path: PathBuf,
    _log_guard: LogGuard,
}

impl ServerBootstrap {
    /// 加载配置、初始化日志并校验配置
    pub fn new() -> Result<Self> {
        let (config, config_path, report) = ConfigManager::load_and_validate()?;
        let log_guard = ConfigManager::initialize_logging(&config)?;
        info!(event = "config.load.success", path = %config_path.display());
        ConfigManager::report_validation(&report)?;

        Ok(Self {
            config,
            config_path,
            _log_guard: log_guard,
        })
    }

    pub async fn start(self) -> Result<()> {
        info!(
            event = "server.start",
            version = %build_info::summary(),
            config = %self.config_path.display(),
            host = %self.config.server.host,
            port = self.config.server.port,
            strategy = self.config.omr.strategy.as_str(),
            pass_threshold = self.config.grading.pass_threshold
        );

        let app_state = AppState::new(self.config.clone());
        let server = ServerManager::create_server(&self.config, app_state).await?;
        ServerManager::start_server(server).await
    }
}

/// 启动HTTP服务
pub async fn start_server() -> Result<()> {
    ServerBootstrap::new()?.start().await
}

/// 仅加载并校验配置，输出结果后退出
pub fn check_config() -> Result<ValidationReport> {
    let (_config, config_path, report) = ConfigManager::load_and_validate()?;
    println!("配置文件: {}", config_path.display());
    print_report(&report);
    Ok(report)
}

fn print_report(report: &ValidationReport) {
    for issue in &report.errors {
        println!("[ERROR] {}: {}", issue.field, issue.message);
    }
    for issue in &report.warnings {
        println!("[WARN]  {}: {}", issue.field, issue.message);
    }
    for issue in &report.info {
        println!("[INFO]  {}: {}", issue.field, issue.message);
    }
    if report.is_valid() {
        println!("配置检查通过");
    } else {
        println!("配置检查失败: {} 个错误", report.errors.len());
    }
}
