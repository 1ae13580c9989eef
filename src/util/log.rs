use crate::util::config::{LevelConfig, LoggingConfig};
use std::io;
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::daily;
use tracing_subscriber::fmt::layer;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{filter::EnvFilter, Layer, Registry};

/// 访问日志使用的 target
pub const ACCESS_TARGET: &str = "http.server";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// 持有所有文件写入线程的 guard，drop 时刷新缓冲
pub struct LogGuard {
    _guards: Vec<WorkerGuard>,
}

/// 命令行工具使用的简单日志：仅输出到 stderr，避免污染 stdout 上的 JSON
pub fn log_init_stderr(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));
    Registry::default()
        .with(layer().with_target(false).with_writer(io::stderr).with_filter(filter))
        .try_init()?;
    Ok(())
}

pub fn log_init_with_config(file_prefix: &str, config: &LoggingConfig) -> anyhow::Result<LogGuard> {
    let level_filter = parse_level(&config.level).unwrap_or(LevelFilter::INFO);
    let filter_expression = build_env_filter_expression(level_filter, config.level_config.as_ref());
    let use_json = config.structured.unwrap_or(false);

    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut guards = Vec::new();

    layers.push(make_layer(
        io::stdout,
        use_json,
        true,
        env_filter(&filter_expression, level_filter),
    ));

    let log_dir = if config.file.enabled {
        let log_dir = resolve_log_dir(&config.file.directory);
        std::fs::create_dir_all(&log_dir)?;

        let main_filter_expr = format!("{},{}=off", filter_expression, ACCESS_TARGET);
        let access_filter_expr = format!("{}={}", ACCESS_TARGET, level_filter_to_str(level_filter));

        let (main_writer, guard) =
            tracing_appender::non_blocking(daily(&log_dir, format!("{}-info", file_prefix)));
        guards.push(guard);
        layers.push(make_layer(
            main_writer,
            use_json,
            false,
            env_filter(&main_filter_expr, level_filter),
        ));

        let (access_writer, guard) =
            tracing_appender::non_blocking(daily(&log_dir, format!("{}-access", file_prefix)));
        guards.push(guard);
        layers.push(make_layer(
            access_writer,
            use_json,
            false,
            env_filter(&access_filter_expr, level_filter),
        ));

        if config.enable_debug_file {
            let debug_filter_expr = format!(
                "{},{}=off",
                build_env_filter_expression(LevelFilter::DEBUG, config.level_config.as_ref()),
                ACCESS_TARGET
            );
            let (debug_writer, guard) =
                tracing_appender::non_blocking(daily(&log_dir, format!("{}-debug", file_prefix)));
            guards.push(guard);
            layers.push(make_layer(
                debug_writer,
                use_json,
                false,
                env_filter(&debug_filter_expr, LevelFilter::DEBUG),
            ));
        }
        Some(log_dir)
    } else {
        None
    };

    Registry::default().with(layers).try_init()?;

    match &log_dir {
        Some(dir) => {
            tracing::info!(
                event = "log.init",
                level = %config.level,
                console = true,
                file = true,
                directory = %dir.display(),
                rotation = "daily",
                structured = use_json,
                access_file = format!("{}-access", file_prefix),
                split_debug = config.enable_debug_file
            );
            if let Some(retention) = config.file.retention_days.filter(|days| *days > 0) {
                tracing::info!(event = "log.retention", days = retention);
                if let Err(e) = cleanup_old_logs(dir, file_prefix, retention) {
                    tracing::warn!(event = "log.cleanup_failed", error = %e);
                }
            }
        }
        None => tracing::info!(
            event = "log.init",
            level = %config.level,
            console = true,
            file = false,
            structured = use_json
        ),
    }

    Ok(LogGuard { _guards: guards })
}

fn make_layer<W>(writer: W, json: bool, ansi: bool, filter: EnvFilter) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    if json {
        layer()
            .json()
            .with_timer(LocalTime::rfc_3339())
            .with_target(false)
            .with_ansi(ansi)
            .with_writer(writer)
            .with_filter(filter)
            .boxed()
    } else {
        layer()
            .with_timer(LocalTime::rfc_3339())
            .with_target(false)
            .with_ansi(ansi)
            .with_writer(writer)
            .with_filter(filter)
            .boxed()
    }
}

fn env_filter(expression: &str, fallback: LevelFilter) -> EnvFilter {
    EnvFilter::try_new(expression).unwrap_or_else(|_| EnvFilter::new(level_filter_to_str(fallback)))
}

/// 相对路径基于工作目录；在 bin 目录下运行时使用上级目录
fn resolve_log_dir(directory: &str) -> PathBuf {
    let path = Path::new(directory);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    let current_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let base = if current_dir.file_name() == Some(std::ffi::OsStr::new("bin")) {
        current_dir.parent().map(Path::to_path_buf).unwrap_or(current_dir)
    } else {
        current_dir
    };
    base.join(path)
}

/// 删除超过保留天数的日志文件，只处理带有本服务前缀的文件
pub fn cleanup_old_logs(log_dir: &Path, file_prefix: &str, retention_days: u32) -> anyhow::Result<usize> {
    if !log_dir.exists() {
        tracing::debug!(event = "log.cleanup.skip", directory = %log_dir.display());
        return Ok(0);
    }

    let retention = std::time::Duration::from_secs(retention_days as u64 * 24 * 60 * 60);
    let cutoff = std::time::SystemTime::now()
        .checked_sub(retention)
        .unwrap_or(std::time::UNIX_EPOCH);

    let mut deleted_count = 0;
    let mut total_size_deleted = 0u64;
    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_ours = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(file_prefix));
        if !is_ours {
            continue;
        }

        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata.modified().or_else(|_| metadata.created());
        if !matches!(modified, Ok(time) if time < cutoff) {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => {
                deleted_count += 1;
                total_size_deleted += metadata.len();
            }
            Err(e) => tracing::warn!(event = "log.cleanup.remove_failed", path = %path.display(), error = %e),
        }
    }

    if deleted_count > 0 {
        tracing::info!(
            event = "log.cleanup.done",
            deleted = deleted_count,
            freed_mb = total_size_deleted as f64 / (1024.0 * 1024.0)
        );
    }
    Ok(deleted_count)
}

fn build_env_filter_expression(default_level: LevelFilter, level_config: Option<&LevelConfig>) -> String {
    let mut directives = vec![level_filter_to_str(default_level).to_string()];

    if let Some(cfg) = level_config {
        if let Some(level) = cfg.api.as_deref().and_then(normalize_level_str) {
            directives.push(format!("omr_server::api={level}"));
        }
        if let Some(level) = cfg.engine.as_deref().and_then(normalize_level_str) {
            directives.push(format!("omr_conn={level}"));
        }
        if let Some(level) = cfg.system.as_deref().and_then(normalize_level_str) {
            directives.push(format!("omr_server::server={level}"));
            directives.push(format!("omr_server::model={level}"));
        }

        let mut overrides: Vec<_> = cfg.overrides.iter().collect();
        overrides.sort();
        for (target, level_str) in overrides {
            if let Some(level) = normalize_level_str(level_str) {
                directives.push(format!("{}={level}", normalize_directive_target(target)));
            }
        }
    }

    directives.join(",")
}

fn parse_level(level: &str) -> Option<LevelFilter> {
    match normalize_level_str(level)? {
        "trace" => Some(LevelFilter::TRACE),
        "debug" => Some(LevelFilter::DEBUG),
        "info" => Some(LevelFilter::INFO),
        "warn" => Some(LevelFilter::WARN),
        _ => Some(LevelFilter::ERROR),
    }
}

fn normalize_level_str(level: &str) -> Option<&'static str> {
    match level.to_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" => Some("warn"),
        "error" => Some("error"),
        _ => None,
    }
}

fn level_filter_to_str(level: LevelFilter) -> &'static str {
    match level {
        LevelFilter::OFF => "off",
        LevelFilter::ERROR => "error",
        LevelFilter::WARN => "warn",
        LevelFilter::INFO => "info",
        LevelFilter::DEBUG => "debug",
        LevelFilter::TRACE => "trace",
    }
}

/// `target:` 前缀原样使用；`omr_conn` 开头或含 `::` 的视为模块路径；
/// 其余按 `a.b` → `omr_server::a::b` 处理
fn normalize_directive_target(target: &str) -> String {
    if let Some(raw) = target.strip_prefix("target:") {
        raw.to_string()
    } else if target.contains("::") || target.starts_with("omr_conn") {
        target.to_string()
    } else {
        let path = target.replace('.', "::");
        format!("omr_server::{path}")
    }
}
