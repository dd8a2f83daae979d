use clap::Parser;
use mirrorsync_lib::config::SyncSettings;
use mirrorsync_lib::core::SyncEngine;
use mirrorsync_lib::logging;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// 单向周期性目录镜像：让副本目录持续跟随源目录
#[derive(Parser, Debug)]
#[command(name = "mirrorsync", version, about)]
struct Cli {
    /// 源目录
    #[arg(long)]
    source: PathBuf,

    /// 副本目录
    #[arg(long)]
    replica: PathBuf,

    /// 同步间隔（秒）
    #[arg(long, default_value_t = 60)]
    interval: u64,

    /// 日志文件路径
    #[arg(long, default_value = "mirrorsync.log")]
    log_file: PathBuf,

    /// 日志级别: error / warn / info / debug / trace
    #[arg(long, default_value = "info")]
    log_level: String,

    /// 只执行一轮后退出
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = SyncSettings {
        source: cli.source,
        replica: cli.replica,
        interval_secs: cli.interval,
        log_path: cli.log_file,
    };
    settings.validate()?;

    logging::init(&settings.log_path, &cli.log_level)?;

    info!(
        "mirrorsync 启动: {} -> {} (间隔 {} 秒)",
        settings.source.display(),
        settings.replica.display(),
        settings.interval_secs
    );

    let cancelled = Arc::new(AtomicBool::new(false));
    let shutdown = Arc::new(tokio::sync::Notify::new());

    {
        let cancelled = cancelled.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("收到停止信号，等待当前操作完成...");
                cancelled.store(true, Ordering::SeqCst);
                shutdown.notify_waiters();
            }
        });
    }

    let mut engine = SyncEngine::new(settings.clone(), cancelled.clone());
    let interval = Duration::from_secs(settings.interval_secs);

    // 轮与轮严格串行：上一轮结束并等完间隔后才进入下一轮
    loop {
        match engine.run_pass().await {
            Ok(report) => {
                info!(
                    "同步报告: 扫描 {} 个条目, {} 个操作, 成功 {}, 失败 {}, 耗时 {}ms",
                    report.files_scanned,
                    report.operations_total,
                    report.succeeded,
                    report.failed,
                    report.duration_ms
                );
            }
            // 失败的轮只记日志，下一轮按计划就是重试
            Err(e) => error!("本轮同步失败: {:#}", e),
        }

        if cli.once || cancelled.load(Ordering::SeqCst) {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.notified() => break,
        }
    }

    info!("mirrorsync 退出");
    Ok(())
}
