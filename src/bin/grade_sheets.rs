use std::env;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use omr_conn::{grade_batch, NamedSheet, RawImage};
use omr_server::server::ConfigManager;
use omr_server::util::log::log_init_stderr;

const USAGE: &str = "用法: grade-sheets [--threshold <0-100>] [--lenient] <标准答案卡> <学生答题卡>...";

struct Args {
    key: PathBuf,
    students: Vec<PathBuf>,
    pass_threshold: Option<f64>,
    lenient: bool,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args> {
    let mut paths = Vec::new();
    let mut pass_threshold = None;
    let mut lenient = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--threshold" | "-t" => {
                let value = args.next().context("--threshold 缺少参数")?;
                let value = value
                    .parse::<f64>()
                    .with_context(|| format!("无效的及格线: {}", value))?;
                pass_threshold = Some(value);
            }
            "--lenient" => lenient = true,
            "--help" | "-h" => bail!("{}", USAGE),
            _ => paths.push(PathBuf::from(arg)),
        }
    }

    if paths.len() < 2 {
        bail!("{}", USAGE);
    }
    let key = paths.remove(0);
    Ok(Args {
        key,
        students: paths,
        pass_threshold,
        lenient,
    })
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string())
}

fn main() -> Result<()> {
    let level = env::var("OMR_LOG_LEVEL").unwrap_or_else(|_| "warn".to_string());
    log_init_stderr(&level)?;

    let args = parse_args(env::args().skip(1))?;

    let config_path = ConfigManager::find_config_file_path("config.yaml");
    let config = if config_path.exists() {
        ConfigManager::load_from_path(&config_path).context("加载配置文件失败")?
    } else {
        warn!(event = "config.missing", path = %config_path.display(), "使用默认配置");
        Default::default()
    };

    let mut options = config.grading.clone();
    if let Some(threshold) = args.pass_threshold {
        if !(0.0..=100.0).contains(&threshold) {
            bail!("及格线必须在 0-100 之间: {}", threshold);
        }
        options.pass_threshold = threshold;
    }
    if args.lenient {
        options.strict_row_count = false;
    }

    let key_bytes = std::fs::read(&args.key)
        .with_context(|| format!("读取标准答案卡失败: {}", args.key.display()))?;

    let mut students = Vec::with_capacity(args.students.len());
    for path in &args.students {
        let bytes = std::fs::read(path).with_context(|| format!("读取答题卡失败: {}", path.display()))?;
        students.push((display_name(path), bytes));
    }
    let sheets: Vec<NamedSheet> = students
        .iter()
        .map(|(name, bytes)| NamedSheet {
            name,
            raw: RawImage::new(bytes),
        })
        .collect();

    let report = grade_batch(&RawImage::new(&key_bytes), &sheets, &config.omr, &options)
        .with_context(|| format!("标准答案卡识别失败: {}", args.key.display()))?;

    info!(
        event = "cli.grade.done",
        total = report.summary.total,
        passed = report.summary.passed
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
