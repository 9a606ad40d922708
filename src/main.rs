use anyhow::Context;
use bisync_lib::config::{self, RootPair};
use bisync_lib::core::{SyncEngine, TracingSink, WorkerPool};
use bisync_lib::logging::{LocalTime, LogConfig, RotatingLogFile};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error, info, warn, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// 控制台只输出消息本身
fn console_layer<S>() -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .without_time()
        .with_level(false)
        .with_target(false)
}

/// 初始化日志系统，返回的 guard 需要保留到程序结束以刷新日志
fn init_logging(config: &LogConfig, log_path: &Path) -> Option<WorkerGuard> {
    if !config.enabled {
        // 日志已禁用，只初始化一个空的 subscriber
        let subscriber = tracing_subscriber::registry();
        let _ = tracing::subscriber::set_global_default(subscriber);
        return None;
    }

    let env_filter =
        tracing_subscriber::EnvFilter::from_default_env().add_directive(config.tracing_level().into());

    match RotatingLogFile::open(log_path, config.max_size_mb) {
        Ok(file) => {
            let path = file.path().to_path_buf();
            let (writer, guard) = tracing_appender::non_blocking(file);
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_timer(LocalTime)
                .with_ansi(false)
                .with_target(false);

            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(file_layer)
                .with(console_layer());
            let _ = tracing::subscriber::set_global_default(subscriber);
            debug!("日志文件: {}", path.display());
            Some(guard)
        }
        Err(e) => {
            // 文件日志创建失败，回退到控制台
            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer());
            let _ = tracing::subscriber::set_global_default(subscriber);
            error!("无法打开日志文件 '{}': {}", log_path.display(), e);
            None
        }
    }
}

fn load_roots(path: &Path) -> anyhow::Result<RootPair> {
    RootPair::load(path).with_context(|| format!("无法加载同步目录配置 ({})", path.display()))
}

#[tokio::main]
async fn main() -> ExitCode {
    let log_config = LogConfig::load(Path::new("."));
    let log_path = log_config.log_path(Path::new("."));
    let guard = init_logging(&log_config, &log_path);

    let roots = match load_roots(&config::directories_file()) {
        Ok(roots) => roots,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(1);
        }
    };

    info!("双向同步开始");

    let pool = Arc::new(WorkerPool::with_available_parallelism());
    debug!("工作池大小: {}", pool.size());
    let engine = SyncEngine::new(pool.clone(), Arc::new(TracingSink));
    let report = engine.sync(&roots.dir_a, &roots.dir_b).await;
    pool.close();

    let summary = format!(
        "同步完成，耗时 {} (复制文件 {}, 复制目录 {}, 创建目录 {}, 失败 {})",
        report.elapsed_display(),
        report.files_copied,
        report.directories_copied,
        report.directories_created,
        report.copy_failures + report.pair_failures
    );
    if report.is_clean() {
        info!("{}", summary);
    } else {
        warn!("{}", summary);
    }

    let hint = log_config.exit_hint(guard.is_some(), &log_path);
    drop(guard);
    if let Some(hint) = hint {
        println!("{}", hint);
    }
    ExitCode::SUCCESS
}
