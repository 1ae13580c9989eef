/// Build-time metadata exposed at runtime.
pub const BUILD_VERSION: &str = env!("APP_BUILD_VERSION");
pub const BUILD_COMMIT: &str = env!("APP_BUILD_COMMIT");
pub const BUILD_TIMESTAMP: &str = env!("APP_BUILD_TIMESTAMP");

/// Human-readable summary combining Cargo version and build metadata.
pub fn summary() -> String {
    format!(
        "omr-server {} (build {}, commit {}, built at {})",
        env!("CARGO_PKG_VERSION"),
        BUILD_VERSION,
        BUILD_COMMIT,
        BUILD_TIMESTAMP
    )
}

/// 健康检查接口返回的构建信息
#[derive(Debug, Clone, serde::Serialize)]
pub struct BuildInfo {
    pub package_version: &'static str,
    pub build_version: &'static str,
    pub commit: &'static str,
    pub built_at: &'static str,
}

pub fn current() -> BuildInfo {
    BuildInfo {
        package_version: env!("CARGO_PKG_VERSION"),
        build_version: BUILD_VERSION,
        commit: BUILD_COMMIT,
        built_at: BUILD_TIMESTAMP,
    }
}
