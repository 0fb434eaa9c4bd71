use std::env;
use std::fs::create_dir_all;
use std::io::{self, Write, stdout};
use std::path::{Path, PathBuf};
use std::process::exit;

use serde::Serialize;
use tracing_appender::{
    non_blocking,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{EnvFilter, fmt::layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::batch::BatchOrchestrator;
use crate::config::BatchConfig;
use crate::runner::TaskOutcome;

mod batch;
mod config;
mod runner;
#[cfg(test)]
mod testing;
mod upload;

/// 命令行参数
#[derive(Debug, Default)]
struct Args {
    dir: Option<PathBuf>,
    config: Option<PathBuf>,
}

fn parse_args(args: &[String]) -> Args {
    let mut parsed = Args::default();
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--dir" => parsed.dir = iter.next().map(PathBuf::from),
            "--config" => parsed.config = iter.next().map(PathBuf::from),
            other => eprintln!("忽略未知参数: {}", other),
        }
    }
    parsed
}

/// 进度输出消息（写入 stdout 的 JSON Lines）
#[derive(Debug, Serialize)]
pub struct ProgressMessage {
    kind: MessageKind,
    data: serde_json::Value,
}

/// 消息类型
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Status,
    Error,
    Completed,
}

/// 打开日志文件（{log_dir}/qstore.log，不滚动）
fn open_log_file(log_dir: &Path) -> io::Result<RollingFileAppender> {
    create_dir_all(log_dir)?;
    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix("qstore")
        .filename_suffix("log")
        .build(log_dir)
        .map_err(io::Error::other)
}

/// 初始化日志系统
fn init_logging(
    log_dir: &Path,
    level: &str,
) -> io::Result<non_blocking::WorkerGuard> {
    let log_file = open_log_file(log_dir)?;
    let (non_blocking, guard) = non_blocking(log_file);

    tracing_subscriber::registry()
        .with(EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(layer().with_writer(stdout))
        .with(layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(guard)
}

fn main() {
    // 1. 解析命令行参数，缺省扫描当前目录
    let args: Vec<String> = env::args().collect();
    let args = parse_args(&args);
    let folder = match args.dir {
        Some(dir) => dir,
        None => match env::current_dir() {
            Ok(dir) => dir,
            Err(e) => {
                print_error("fatal", &format!("无法获取当前目录: {}", e));
                exit(1);
            }
        },
    };

    // 2. 读取配置
    let config = match BatchConfig::load(&folder, args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            print_error("fatal", &e.to_string());
            exit(1);
        }
    };
    let root = config.output_root(&folder);

    // 3. 初始化日志系统
    let log_dir = root.join(&config.log_dir);
    let _log_guard = match init_logging(&log_dir, &config.log_level) {
        Ok(guard) => guard,
        Err(e) => {
            print_error("fatal", &format!("无法创建日志文件 {}: {}", log_dir.display(), e));
            exit(1);
        }
    };
    tracing::info!("批处理进程启动，扫描目录: {}", folder.display());
    tracing::debug!("配置: {:?}", config);

    // 4. 并发执行全部任务
    let orchestrator = BatchOrchestrator::from_config(&config, &root);
    let report = match orchestrator.run_all(&folder) {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("无法读取任务目录 {}: {}", folder.display(), e);
            print_error("fatal", &format!("无法读取任务目录: {}", e));
            exit(1);
        }
    };

    // 5. 等待上传程序退出，仅用于记录状态
    let succeeded = report.succeeded();
    let failed = report.failed();
    let upload = match report.upload.wait() {
        Ok(status) => serde_json::to_value(status).unwrap_or_default(),
        Err(e) => serde_json::json!({ "error": e.to_string() }),
    };

    tracing::info!("脚本执行完成");
    print_completed(serde_json::json!({
        "run_id": report.run_id,
        "total": report.outcomes.len(),
        "succeeded": succeeded,
        "failed": failed,
        "upload": upload,
    }));
}

pub fn print_status(outcome: &TaskOutcome) {
    print_progress(ProgressMessage {
        kind: MessageKind::Status,
        data: serde_json::to_value(outcome).unwrap_or_default(),
    });
}

pub fn print_error(
    severity: &str,
    message: &str,
) {
    print_progress(ProgressMessage {
        kind: MessageKind::Error,
        data: serde_json::json!({
            "severity": severity,
            "message": message,
        }),
    });
}

pub fn print_completed(data: serde_json::Value) {
    print_progress(ProgressMessage {
        kind: MessageKind::Completed,
        data,
    });
}

pub fn print_progress(msg: ProgressMessage) {
    // stdout 关闭时丢弃消息，不 panic
    if let Ok(json) = serde_json::to_string(&msg) {
        let _ = writeln!(stdout().lock(), "{}", json);
    }
}
