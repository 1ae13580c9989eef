use std::sync::Arc;

pub mod api;
pub mod build_info;
pub mod model;
pub mod server;
pub mod util;

use model::GradingService;
use util::config::Config;

/// 应用状态结构
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// 评分服务，内部持有识别引擎与并发控制
    pub grading: Arc<GradingService>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let grading = Arc::new(GradingService::new(&config));
        Self {
            config: Arc::new(config),
            grading,
        }
    }
}
